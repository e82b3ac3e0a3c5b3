use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use swarm_survey::adapters::inbound::NdjsonListener;
use swarm_survey::adapters::outbound::{
    JsonFilePeerStore, RandomTargetGenerator, SimulatedVehicleLink, TcpMessageSender,
};
use swarm_survey::application::{PeerTelemetryService, SurveyMissionService, TargetPursuitService};
use swarm_survey::config::MissionMode;
use swarm_survey::domains::mission::{MissionExecutor, TargetPursuit, VehicleControl, VehicleLink};
use swarm_survey::domains::survey::BoundarySource;
use swarm_survey::domains::swarm::MissionTrigger;
use swarm_survey::{logging, Config};
use tokio::sync::broadcast;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load(Config::resolve_path())?;
    logging::init(&config.logging);

    let drone_id = config.drone.id;
    info!(drone_id, port = config.drone.listen_port, "starting drone agent");

    let link = Arc::new(SimulatedVehicleLink::spawn(config.simulation_settings()));
    let telemetry_vehicle: Arc<dyn VehicleControl> = Arc::from(link.connect().await?);

    let boundary = config.boundary_source();
    let missions: Arc<dyn MissionTrigger> = match config.mission.mode {
        MissionMode::Survey => Arc::new(SurveyMissionService::new(
            drone_id,
            boundary,
            config.coverage_planner(),
            MissionExecutor::new(config.executor_settings()),
            link.clone(),
        )),
        MissionMode::Pursuit => {
            // targets are drawn over the whole field; each drone keeps its own share
            let area = boundary.load_boundary().await?;
            let (min_delay, max_delay) = config.target_delay_range();
            let targets = Arc::new(RandomTargetGenerator::new(
                area.polygon().clone(),
                min_delay,
                max_delay,
            ));
            Arc::new(TargetPursuitService::new(
                drone_id,
                boundary,
                TargetPursuit::new(config.pursuit_settings()),
                link.clone(),
                targets,
            ))
        }
    };
    info!(drone_id, mode = ?config.mission.mode, "mission mode selected");

    let sender = Arc::new(TcpMessageSender::new(Duration::from_millis(
        config.drone.send_timeout_ms,
    )));
    let store = Arc::new(JsonFilePeerStore::new(&config.drone.peers_file));
    let telemetry = Arc::new(
        PeerTelemetryService::new(config.telemetry_settings(), store, sender)
            .with_vehicle(telemetry_vehicle.clone())
            .with_trigger(missions.clone()),
    );

    if let Err(e) = telemetry.restore_peers().await {
        warn!(drone_id, error = %e, "could not restore peers, starting empty");
    }

    let (shutdown_tx, _) = broadcast::channel(1);
    let bind = format!("{}:{}", config.drone.bind_address, config.drone.listen_port);
    let listener = NdjsonListener::bind(&bind, telemetry.clone()).await?;
    let listener_task = tokio::spawn(listener.run(shutdown_tx.subscribe()));

    if config.drone.register_with_controller {
        // failure is already logged; the drone still serves its peers
        let _ = telemetry.register(&config.controller_endpoint()).await;
    }

    let outbound_task = tokio::spawn(telemetry.clone().run_outbound_loop(shutdown_tx.subscribe()));

    tokio::signal::ctrl_c().await?;
    info!(drone_id, "shutting down drone agent");
    let _ = shutdown_tx.send(());

    for (name, task) in [("listener", listener_task), ("telemetry", outbound_task)] {
        if let Err(e) = task.await {
            warn!(drone_id, task = name, error = %e, "task ended abnormally");
        }
    }
    if missions.is_running() {
        warn!(drone_id, "exiting while a mission is still in flight");
    }
    if let Err(e) = telemetry_vehicle.close().await {
        warn!(drone_id, error = %e, "failed to close telemetry vehicle handle");
    }
    Ok(())
}
