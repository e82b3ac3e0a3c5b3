use crate::common::StoreError;
use crate::domains::swarm::{
    DroneId, DroneRecord, DroneRegistry, MessageHandler, MessageSender, MissionCommand, PeerStore,
    Registration, RegistrationOutcome, StatusReport, StatusTable, SwarmSnapshot, WireMessage,
};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorSettings {
    /// Used when a registration carries no port.
    pub default_drone_port: u16,
    /// Push a `{peers, drones}` snapshot to every drone on each status report.
    pub relay_status: bool,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            default_drone_port: 5001,
            relay_status: true,
        }
    }
}

/// Per-drone outcome of a broadcast.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BroadcastReport {
    pub delivered: Vec<DroneId>,
    pub failed: Vec<(DroneId, String)>,
}

impl BroadcastReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.failed.len()
    }
}

/// Controller side of the swarm: owns the drone registry and the latest
/// status per drone, and fans commands out to every registered drone.
pub struct SwarmCoordinator {
    registry: RwLock<DroneRegistry>,
    statuses: RwLock<StatusTable>,
    sender: Arc<dyn MessageSender>,
    store: Option<Arc<dyn PeerStore>>,
    settings: CoordinatorSettings,
}

impl SwarmCoordinator {
    pub fn new(sender: Arc<dyn MessageSender>, settings: CoordinatorSettings) -> Self {
        Self {
            registry: RwLock::new(DroneRegistry::new()),
            statuses: RwLock::new(StatusTable::new()),
            sender,
            store: None,
            settings,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn PeerStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Reload drones persisted by a previous run.
    pub async fn restore(&self) -> Result<usize, StoreError> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        let peers = store.load().await?;
        let mut registry = self.registry.write().await;
        for peer in peers {
            let port = peer.port.unwrap_or(self.settings.default_drone_port);
            registry.register(DroneRecord::new(peer.id, peer.ip, port));
        }
        info!(drones = registry.len(), "registry restored");
        Ok(registry.len())
    }

    /// Record a drone's endpoint. A new or moved drone triggers a peer list
    /// push to the whole fleet.
    pub async fn register_drone(&self, id: DroneId, address: &str, port: u16) -> RegistrationOutcome {
        let outcome = self
            .registry
            .write()
            .await
            .register(DroneRecord::new(id, address, port));

        match outcome {
            RegistrationOutcome::Unchanged => {
                debug!(drone_id = id, "duplicate registration ignored");
            }
            RegistrationOutcome::New | RegistrationOutcome::Updated => {
                info!(drone_id = id, address, port, ?outcome, "drone registered");
                self.persist().await;
                let report = self.broadcast_peer_list().await;
                if !report.is_complete() {
                    warn!(failed = report.failed.len(), "peer list not delivered to every drone");
                }
            }
        }
        outcome
    }

    pub async fn drones(&self) -> Vec<DroneRecord> {
        self.registry.read().await.records()
    }

    pub async fn drone_count(&self) -> usize {
        self.registry.read().await.len()
    }

    pub async fn status_of(&self, id: DroneId) -> Option<StatusReport> {
        self.statuses.read().await.get(id).cloned()
    }

    pub async fn record_status(&self, report: StatusReport) {
        debug!(drone_id = report.id, lat = report.gps.lat, lon = report.gps.lon, "status received");
        self.statuses.write().await.update(report);
        if self.settings.relay_status {
            self.broadcast_snapshot().await;
        }
    }

    /// Tell every registered drone to start its share of an N-drone survey.
    /// `None` uses the current registry size.
    pub async fn broadcast_mission_start(&self, total_drones: Option<usize>) -> BroadcastReport {
        let registered = self.drone_count().await;
        let total_drones = total_drones.unwrap_or(registered);
        if total_drones == 0 {
            warn!("no drones registered, mission start not sent");
            return BroadcastReport::default();
        }
        if total_drones != registered {
            warn!(total_drones, registered, "mission drone count differs from registry size");
        }

        info!(total_drones, "broadcasting mission start");
        let report = self
            .broadcast(WireMessage::Command(MissionCommand::StartMission { total_drones }))
            .await;
        info!(delivered = report.delivered.len(), failed = report.failed.len(), "mission start broadcast finished");
        report
    }

    pub async fn broadcast_peer_list(&self) -> BroadcastReport {
        let peers = self.registry.read().await.peer_entries();
        self.broadcast(WireMessage::PeerList(peers)).await
    }

    pub async fn broadcast_snapshot(&self) -> BroadcastReport {
        let peers = self.registry.read().await.peer_entries();
        let drones = self.statuses.read().await.by_wire_key();
        self.broadcast(WireMessage::Snapshot(SwarmSnapshot { peers, drones })).await
    }

    /// Ask every drone to drop its persisted peers, then forget them here too.
    pub async fn broadcast_delete_peer_state(&self) -> BroadcastReport {
        let report = self
            .broadcast(WireMessage::Command(MissionCommand::DeletePeerState))
            .await;
        if let Some(store) = &self.store {
            if let Err(e) = store.clear().await {
                warn!(error = %e, "failed to clear persisted registry");
            }
        }
        report
    }

    /// Send `message` to every registered drone concurrently. A failed send
    /// never affects the others.
    async fn broadcast(&self, message: WireMessage) -> BroadcastReport {
        let targets = self.drones().await;
        let message = Arc::new(message);
        let mut sends = JoinSet::new();

        for drone in targets {
            let sender = self.sender.clone();
            let message = message.clone();
            sends.spawn(async move {
                let result = sender.send(&drone.endpoint(), &message).await;
                (drone, result)
            });
        }

        let mut report = BroadcastReport::default();
        while let Some(joined) = sends.join_next().await {
            match joined {
                Ok((drone, Ok(()))) => {
                    debug!(drone_id = drone.id, kind = message.kind(), "delivered");
                    report.delivered.push(drone.id);
                }
                Ok((drone, Err(e))) => {
                    warn!(drone_id = drone.id, peer = %drone.endpoint(), transient = e.is_transient(), error = %e, "send failed");
                    report.failed.push((drone.id, e.to_string()));
                }
                Err(e) => error!(error = %e, "broadcast task failed"),
            }
        }
        report.delivered.sort_unstable();
        report.failed.sort_by_key(|(id, _)| *id);
        report
    }

    async fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };
        let peers = self.registry.read().await.peer_entries();
        if let Err(e) = store.save(&peers).await {
            warn!(error = %e, "failed to persist registry");
        }
    }

    async fn handle_registration(&self, registration: Registration, origin: SocketAddr) {
        let address = registration
            .ip
            .unwrap_or_else(|| origin.ip().to_string());
        let port = registration.port.unwrap_or(self.settings.default_drone_port);
        self.register_drone(registration.id, &address, port).await;
    }
}

#[async_trait]
impl MessageHandler for SwarmCoordinator {
    async fn handle_message(&self, message: WireMessage, origin: SocketAddr) {
        match message {
            WireMessage::Registration(registration) => {
                self.handle_registration(registration, origin).await
            }
            WireMessage::Status(report) => self.record_status(report).await,
            other => {
                debug!(%origin, kind = other.kind(), "ignoring message not meant for the controller");
            }
        }
    }
}
