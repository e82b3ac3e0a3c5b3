use crate::common::{StoreError, TransportError, VehicleResult};
use crate::domains::mission::VehicleControl;
use crate::domains::swarm::{
    DroneId, GpsFix, MessageHandler, MessageSender, MissionCommand, MissionTrigger, PeerEntry, PeerStore,
    PeerTable, Registration, StatusReport, StatusTable, WireMessage,
};
use async_trait::async_trait;
use chrono::Utc;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinSet;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySettings {
    pub drone_id: DroneId,
    /// Address other nodes use to reach this drone.
    pub advertised_ip: String,
    pub listen_port: u16,
    /// Controller `host:port`; `None` runs peer-to-peer only.
    pub controller: Option<String>,
    pub status_interval: Duration,
    /// Used for peers whose entry carries no port.
    pub default_peer_port: u16,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Drone side of the swarm: registers with the controller, pushes status to
/// peers and controller, and reacts to inbound peer lists, status and
/// mission commands.
pub struct PeerTelemetryService {
    settings: TelemetrySettings,
    peers: RwLock<PeerTable>,
    statuses: RwLock<StatusTable>,
    store: Arc<dyn PeerStore>,
    sender: Arc<dyn MessageSender>,
    vehicle: Option<Arc<dyn VehicleControl>>,
    trigger: Option<Arc<dyn MissionTrigger>>,
}

impl PeerTelemetryService {
    pub fn new(settings: TelemetrySettings, store: Arc<dyn PeerStore>, sender: Arc<dyn MessageSender>) -> Self {
        Self {
            settings,
            peers: RwLock::new(PeerTable::new()),
            statuses: RwLock::new(StatusTable::new()),
            store,
            sender,
            vehicle: None,
            trigger: None,
        }
    }

    pub fn with_vehicle(mut self, vehicle: Arc<dyn VehicleControl>) -> Self {
        self.vehicle = Some(vehicle);
        self
    }

    pub fn with_trigger(mut self, trigger: Arc<dyn MissionTrigger>) -> Self {
        self.trigger = Some(trigger);
        self
    }

    pub fn drone_id(&self) -> DroneId {
        self.settings.drone_id
    }

    /// Load the peer set persisted by a previous run.
    pub async fn restore_peers(&self) -> Result<usize, StoreError> {
        let entries = self.store.load().await?;
        let mut peers = self.peers.write().await;
        peers.replace_all(entries);
        info!(drone_id = self.settings.drone_id, peers = peers.len(), "peers restored");
        Ok(peers.len())
    }

    pub async fn peers(&self) -> Vec<PeerEntry> {
        self.peers.read().await.entries()
    }

    pub async fn status_of(&self, id: DroneId) -> Option<StatusReport> {
        self.statuses.read().await.get(id).cloned()
    }

    pub async fn known_statuses(&self) -> usize {
        self.statuses.read().await.len()
    }

    /// Announce this drone to the controller. Failure is logged and returned;
    /// the drone keeps running among its peers.
    pub async fn register(&self, controller: &str) -> Result<(), TransportError> {
        let registration = WireMessage::Registration(Registration {
            id: self.settings.drone_id,
            ip: Some(self.settings.advertised_ip.clone()),
            port: Some(self.settings.listen_port),
        });
        match self.sender.send(controller, &registration).await {
            Ok(()) => {
                info!(drone_id = self.settings.drone_id, controller, "registered with controller");
                Ok(())
            }
            Err(e) => {
                warn!(drone_id = self.settings.drone_id, controller, error = %e, "registration failed");
                Err(e)
            }
        }
    }

    pub async fn build_status(&self, vehicle: &dyn VehicleControl) -> VehicleResult<StatusReport> {
        let position = vehicle.position().await?;
        let velocity = vehicle.velocity().await?;
        let heartbeat = Utc::now().timestamp_millis() as f64 / 1000.0;
        Ok(StatusReport {
            id: self.settings.drone_id,
            gps: GpsFix {
                lat: position.lat,
                lon: position.lon,
                alt: position.alt,
            },
            baro: position.relative_alt,
            velocity,
            heartbeat,
        })
    }

    /// Send one status report to every other known peer and to the controller.
    pub async fn publish_status(&self) -> PublishReport {
        let Some(vehicle) = &self.vehicle else {
            return PublishReport::default();
        };
        let report = match self.build_status(vehicle.as_ref()).await {
            Ok(report) => report,
            Err(e) => {
                warn!(drone_id = self.settings.drone_id, error = %e, "status unavailable, skipping tick");
                return PublishReport::default();
            }
        };
        self.statuses.write().await.update(report.clone());

        let mut targets: Vec<String> = self
            .peers
            .read()
            .await
            .others(self.settings.drone_id)
            .iter()
            .map(|p| p.endpoint(self.settings.default_peer_port))
            .collect();
        if let Some(controller) = &self.settings.controller {
            targets.push(controller.clone());
        }

        let message = Arc::new(WireMessage::Status(report));
        let mut sends = JoinSet::new();
        for target in targets {
            let sender = self.sender.clone();
            let message = message.clone();
            sends.spawn(async move {
                let result = sender.send(&target, &message).await;
                (target, result)
            });
        }

        let mut outcome = PublishReport::default();
        while let Some(joined) = sends.join_next().await {
            match joined {
                Ok((_, Ok(()))) => outcome.delivered += 1,
                Ok((target, Err(e))) => {
                    debug!(peer = %target, error = %e, "status send failed");
                    outcome.failed += 1;
                }
                Err(e) => {
                    error!(error = %e, "status send task failed");
                    outcome.failed += 1;
                }
            }
        }
        outcome
    }

    /// Publish status every `status_interval` until shutdown.
    pub async fn run_outbound_loop(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = interval(self.settings.status_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!(drone_id = self.settings.drone_id, "telemetry loop shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let outcome = self.publish_status().await;
                    if outcome.failed > 0 {
                        debug!(delivered = outcome.delivered, failed = outcome.failed, "status published with failures");
                    }
                }
            }
        }
    }

    async fn persist_peers(&self, peers: &[PeerEntry]) {
        if let Err(e) = self.store.save(peers).await {
            warn!(drone_id = self.settings.drone_id, error = %e, "failed to persist peers");
        }
    }

    async fn replace_peers(&self, entries: Vec<PeerEntry>) {
        let snapshot = {
            let mut peers = self.peers.write().await;
            peers.replace_all(entries);
            peers.entries()
        };
        info!(drone_id = self.settings.drone_id, peers = snapshot.len(), "peer list replaced");
        self.persist_peers(&snapshot).await;
    }

    async fn merge_peer(&self, registration: Registration, origin: SocketAddr) {
        let entry = PeerEntry {
            id: registration.id,
            ip: registration.ip.unwrap_or_else(|| origin.ip().to_string()),
            port: registration.port,
        };
        let snapshot = {
            let mut peers = self.peers.write().await;
            peers.merge(vec![entry]);
            peers.entries()
        };
        debug!(drone_id = self.settings.drone_id, peer = registration.id, "peer merged");
        self.persist_peers(&snapshot).await;
    }

    async fn start_mission(&self, total_drones: usize) {
        let Some(trigger) = &self.trigger else {
            warn!(drone_id = self.settings.drone_id, "mission command received but no mission runner configured");
            return;
        };
        info!(drone_id = self.settings.drone_id, total_drones, "mission start received");
        if let Err(e) = trigger.start_mission(total_drones).await {
            error!(drone_id = self.settings.drone_id, total_drones, error = %e, "mission not started");
        }
    }

    async fn delete_peer_state(&self) {
        self.peers.write().await.clear();
        match self.store.clear().await {
            Ok(()) => info!(drone_id = self.settings.drone_id, "peer state deleted"),
            Err(e) => warn!(drone_id = self.settings.drone_id, error = %e, "failed to delete peer state"),
        }
    }
}

#[async_trait]
impl MessageHandler for PeerTelemetryService {
    async fn handle_message(&self, message: WireMessage, origin: SocketAddr) {
        match message {
            WireMessage::PeerList(entries) => self.replace_peers(entries).await,
            WireMessage::Snapshot(snapshot) => {
                self.replace_peers(snapshot.peers).await;
                let mut statuses = self.statuses.write().await;
                for report in snapshot.drones.into_values() {
                    statuses.update(report);
                }
            }
            WireMessage::Status(report) => {
                debug!(drone_id = self.settings.drone_id, from = report.id, "peer status received");
                self.statuses.write().await.update(report);
            }
            WireMessage::Registration(registration) => self.merge_peer(registration, origin).await,
            WireMessage::Command(MissionCommand::StartMission { total_drones }) => {
                self.start_mission(total_drones).await
            }
            WireMessage::Command(MissionCommand::DeletePeerState) => self.delete_peer_state().await,
        }
    }
}
