use super::messages::{PeerEntry, WireMessage};
use crate::common::{MissionResult, StoreError, TransportError};
use async_trait::async_trait;
use std::net::SocketAddr;

/// Durable copy of a drone's peer list.
#[async_trait]
pub trait PeerStore: Send + Sync {
    /// An absent store yields an empty list.
    async fn load(&self) -> Result<Vec<PeerEntry>, StoreError>;
    async fn save(&self, peers: &[PeerEntry]) -> Result<(), StoreError>;
    async fn clear(&self) -> Result<(), StoreError>;
}

/// Delivers one message to a `host:port` endpoint.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, endpoint: &str, message: &WireMessage) -> Result<(), TransportError>;
}

/// Receives every classified inbound message with the sender's address.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle_message(&self, message: WireMessage, origin: SocketAddr);
}

/// Starts this drone's share of a survey. Returns once the run has been
/// launched; the flight itself continues in the background.
#[async_trait]
pub trait MissionTrigger: Send + Sync {
    async fn start_mission(&self, total_drones: usize) -> MissionResult<()>;

    /// Whether a launched run is still in flight.
    fn is_running(&self) -> bool;
}
