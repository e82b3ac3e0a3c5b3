use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use swarm_survey::adapters::inbound::NdjsonListener;
use swarm_survey::adapters::outbound::{JsonFilePeerStore, TcpMessageSender};
use swarm_survey::application::SwarmCoordinator;
use swarm_survey::{logging, Config};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::{info, warn};

#[derive(Debug, PartialEq)]
enum ConsoleCommand {
    Start(Option<usize>),
    Peers,
    Quit,
}

fn parse_console_command(line: &str) -> Option<ConsoleCommand> {
    let mut words = line.split_whitespace();
    match words.next()? {
        "start" => Some(ConsoleCommand::Start(words.next().and_then(|n| n.parse().ok()))),
        "peers" => Some(ConsoleCommand::Peers),
        "quit" | "exit" => Some(ConsoleCommand::Quit),
        _ => None,
    }
}

/// Operator console on stdin. Returns true when the operator asked to quit,
/// false when stdin closed.
async fn run_console(coordinator: Arc<SwarmCoordinator>) -> bool {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    info!("console ready: start [N] | peers | quit");

    while let Ok(Some(line)) = lines.next_line().await {
        match parse_console_command(&line) {
            Some(ConsoleCommand::Start(total)) => {
                let report = coordinator.broadcast_mission_start(total).await;
                info!(delivered = ?report.delivered, failed = ?report.failed, "mission start sent");
            }
            Some(ConsoleCommand::Peers) => {
                for drone in coordinator.drones().await {
                    info!(drone_id = drone.id, endpoint = %drone.endpoint(), registered_at = %drone.registered_at, "drone");
                }
            }
            Some(ConsoleCommand::Quit) => return true,
            None if line.trim().is_empty() => {}
            None => warn!(input = %line.trim(), "unknown console command"),
        }
    }
    false
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load(Config::resolve_path())?;
    logging::init(&config.logging);

    info!(port = config.controller.port, "starting swarm controller");

    let sender = Arc::new(TcpMessageSender::new(Duration::from_millis(
        config.drone.send_timeout_ms,
    )));
    let mut coordinator = SwarmCoordinator::new(sender, config.coordinator_settings());
    if let Some(path) = &config.controller.registry_file {
        coordinator = coordinator.with_store(Arc::new(JsonFilePeerStore::new(path)));
    }
    let coordinator = Arc::new(coordinator);
    if let Err(e) = coordinator.restore().await {
        warn!(error = %e, "could not restore registry, starting empty");
    }

    let (shutdown_tx, _) = broadcast::channel(1);
    let bind = format!("{}:{}", config.controller.bind_address, config.controller.port);
    let listener = NdjsonListener::bind(&bind, coordinator.clone()).await?;
    let listener_task = tokio::spawn(listener.run(shutdown_tx.subscribe()));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("interrupt received"),
        quit = run_console(coordinator.clone()) => {
            if !quit {
                info!("console input closed, waiting for interrupt");
                tokio::signal::ctrl_c().await?;
            }
        }
    }

    info!("shutting down swarm controller");
    let report = coordinator.broadcast_delete_peer_state().await;
    info!(delivered = report.delivered.len(), failed = report.failed.len(), "peer state delete sent");

    let _ = shutdown_tx.send(());
    if let Err(e) = listener_task.await {
        warn!(error = %e, "listener task ended abnormally");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_commands() {
        assert_eq!(parse_console_command("start"), Some(ConsoleCommand::Start(None)));
        assert_eq!(parse_console_command("start 3"), Some(ConsoleCommand::Start(Some(3))));
        assert_eq!(parse_console_command("  peers "), Some(ConsoleCommand::Peers));
        assert_eq!(parse_console_command("quit"), Some(ConsoleCommand::Quit));
        assert_eq!(parse_console_command("launch"), None);
    }
}
