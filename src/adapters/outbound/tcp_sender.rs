use crate::common::TransportError;
use crate::domains::swarm::{MessageSender, WireMessage};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// One short-lived connection per message, newline terminated.
#[derive(Debug, Clone)]
pub struct TcpMessageSender {
    timeout: Duration,
}

impl TcpMessageSender {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn deliver(&self, endpoint: &str, payload: &[u8]) -> Result<(), TransportError> {
        let mut stream = TcpStream::connect(endpoint)
            .await
            .map_err(|source| TransportError::Connect {
                addr: endpoint.to_string(),
                source,
            })?;
        let io_err = |source| TransportError::Io {
            addr: endpoint.to_string(),
            source,
        };
        stream.write_all(payload).await.map_err(io_err)?;
        stream.shutdown().await.map_err(io_err)?;
        Ok(())
    }
}

impl Default for TcpMessageSender {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

#[async_trait]
impl MessageSender for TcpMessageSender {
    async fn send(&self, endpoint: &str, message: &WireMessage) -> Result<(), TransportError> {
        let mut payload = serde_json::to_vec(&message.to_value()?)?;
        payload.push(b'\n');

        match timeout(self.timeout, self.deliver(endpoint, &payload)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout {
                addr: endpoint.to_string(),
                timeout: self.timeout,
            }),
        }
    }
}
