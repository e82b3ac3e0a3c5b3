use crate::common::TransportError;
use crate::domains::swarm::{MessageHandler, WireMessage};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Per-connection bounds. A peer that stays silent past `idle_timeout` is
/// disconnected; a line longer than `max_line_bytes` is skipped whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionLimits {
    pub idle_timeout: Duration,
    pub max_line_bytes: usize,
}

impl Default for ConnectionLimits {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(30),
            // swarm snapshots with many peers run to a few KiB
            max_line_bytes: 64 * 1024,
        }
    }
}

/// Accepts TCP connections carrying newline-delimited JSON and hands each
/// classified message to a [`MessageHandler`].
pub struct NdjsonListener {
    listener: TcpListener,
    handler: Arc<dyn MessageHandler>,
    limits: ConnectionLimits,
}

impl NdjsonListener {
    pub async fn bind(addr: &str, handler: Arc<dyn MessageHandler>) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::Io {
                addr: addr.to_string(),
                source,
            })?;
        Ok(Self {
            listener,
            handler,
            limits: ConnectionLimits::default(),
        })
    }

    pub fn with_limits(mut self, limits: ConnectionLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until a shutdown signal arrives. Each connection gets its own
    /// task, which also ends on shutdown.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        match self.listener.local_addr() {
            Ok(addr) => info!(%addr, "listening for swarm messages"),
            Err(e) => warn!(error = %e, "listener address unavailable"),
        }

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("listener shutting down");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, origin)) => {
                        let handler = self.handler.clone();
                        let limits = self.limits;
                        let shutdown = shutdown.resubscribe();
                        tokio::spawn(async move {
                            serve_connection(stream, origin, handler, limits, shutdown).await;
                        });
                    }
                    Err(e) => error!(error = %e, "accept failed"),
                },
            }
        }
    }
}

enum Frame {
    Line,
    Oversized,
    Eof,
}

async fn serve_connection(
    stream: TcpStream,
    origin: SocketAddr,
    handler: Arc<dyn MessageHandler>,
    limits: ConnectionLimits,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut reader = BufReader::new(stream);
    let mut line = Vec::new();
    loop {
        let frame = tokio::select! {
            _ = shutdown.recv() => {
                debug!(%origin, "closing connection on shutdown");
                break;
            }
            frame = timeout(
                limits.idle_timeout,
                read_frame(&mut reader, &mut line, limits.max_line_bytes),
            ) => frame,
        };
        match frame {
            Ok(Ok(Frame::Line)) => dispatch(&line, origin, handler.as_ref()).await,
            Ok(Ok(Frame::Oversized)) => {
                warn!(%origin, max_bytes = limits.max_line_bytes, "discarding oversized line");
            }
            Ok(Ok(Frame::Eof)) => break,
            Ok(Err(e)) => {
                warn!(%origin, error = %e, "connection read failed");
                break;
            }
            Err(_) => {
                info!(%origin, idle = ?limits.idle_timeout, "closing idle connection");
                break;
            }
        }
    }
}

/// Read one newline-terminated frame into `line`, never buffering more than
/// `max` bytes of it.
async fn read_frame<R>(reader: &mut R, line: &mut Vec<u8>, max: usize) -> io::Result<Frame>
where
    R: AsyncBufRead + Unpin,
{
    line.clear();
    let read = (&mut *reader)
        .take(max as u64 + 1)
        .read_until(b'\n', line)
        .await?;
    if read == 0 {
        return Ok(Frame::Eof);
    }
    if line.last() == Some(&b'\n') || read <= max {
        return Ok(Frame::Line);
    }
    skip_line(reader).await?;
    Ok(Frame::Oversized)
}

async fn skip_line<R>(reader: &mut R) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let (consumed, done) = {
            let available = reader.fill_buf().await?;
            if available.is_empty() {
                return Ok(());
            }
            match available.iter().position(|b| *b == b'\n') {
                Some(end) => (end + 1, true),
                None => (available.len(), false),
            }
        };
        reader.consume(consumed);
        if done {
            return Ok(());
        }
    }
}

async fn dispatch(line: &[u8], origin: SocketAddr, handler: &dyn MessageHandler) {
    if line.iter().all(u8::is_ascii_whitespace) {
        return;
    }
    let value: serde_json::Value = match serde_json::from_slice(line) {
        Ok(value) => value,
        Err(e) => {
            warn!(%origin, error = %e, "discarding malformed JSON");
            return;
        }
    };
    match WireMessage::classify(value) {
        Ok(message) => {
            debug!(%origin, kind = message.kind(), "message received");
            handler.handle_message(message, origin).await;
        }
        Err(e) => warn!(%origin, error = %e, "discarding message"),
    }
}
