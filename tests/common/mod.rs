#![allow(dead_code)]

use async_trait::async_trait;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use swarm_survey::adapters::inbound::{ConnectionLimits, NdjsonListener};
use swarm_survey::domains::swarm::{MessageHandler, WireMessage};
use tokio::sync::{broadcast, Mutex};
use tokio::time::{sleep, Instant};

/// Collects every message delivered to a loopback listener.
#[derive(Default)]
pub struct Recorder {
    messages: Mutex<Vec<WireMessage>>,
}

impl Recorder {
    pub async fn messages(&self) -> Vec<WireMessage> {
        self.messages.lock().await.clone()
    }
}

#[async_trait]
impl MessageHandler for Recorder {
    async fn handle_message(&self, message: WireMessage, _origin: SocketAddr) {
        self.messages.lock().await.push(message);
    }
}

pub struct LoopbackPeer {
    pub recorder: Arc<Recorder>,
    pub addr: SocketAddr,
}

/// Start a recording listener on an ephemeral loopback port.
pub async fn spawn_recorder(shutdown: &broadcast::Sender<()>) -> LoopbackPeer {
    spawn_recorder_with(shutdown, ConnectionLimits::default()).await
}

pub async fn spawn_recorder_with(
    shutdown: &broadcast::Sender<()>,
    limits: ConnectionLimits,
) -> LoopbackPeer {
    let recorder = Arc::new(Recorder::default());
    let listener = NdjsonListener::bind("127.0.0.1:0", recorder.clone())
        .await
        .unwrap()
        .with_limits(limits);
    let addr = listener.local_addr().unwrap();
    tokio::spawn(listener.run(shutdown.subscribe()));
    LoopbackPeer { recorder, addr }
}

/// A loopback port with nothing listening on it.
pub async fn closed_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if check().await {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    false
}
