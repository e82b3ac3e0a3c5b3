mod common;

use common::{closed_port, eventually, spawn_recorder};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use swarm_survey::adapters::inbound::NdjsonListener;
use swarm_survey::adapters::outbound::{InMemoryPeerStore, TcpMessageSender};
use swarm_survey::application::{CoordinatorSettings, SwarmCoordinator};
use swarm_survey::domains::swarm::{
    GpsFix, MessageHandler, MissionCommand, PeerEntry, PeerStore, Registration, RegistrationOutcome,
    StatusReport, WireMessage,
};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::broadcast;

fn coordinator(relay_status: bool) -> SwarmCoordinator {
    SwarmCoordinator::new(
        Arc::new(TcpMessageSender::new(Duration::from_millis(500))),
        CoordinatorSettings {
            default_drone_port: 5001,
            relay_status,
        },
    )
}

fn origin() -> SocketAddr {
    "127.0.0.1:40000".parse().unwrap()
}

fn has_start(messages: &[WireMessage], total: usize) -> bool {
    messages.iter().any(|m| {
        *m == WireMessage::Command(MissionCommand::StartMission {
            total_drones: total,
        })
    })
}

#[tokio::test]
async fn test_mission_start_survives_unreachable_drone() {
    let (shutdown, _) = broadcast::channel(1);
    let first = spawn_recorder(&shutdown).await;
    let second = spawn_recorder(&shutdown).await;
    let dead_port = closed_port().await;

    let coordinator = coordinator(false);
    coordinator.register_drone(0, "127.0.0.1", first.addr.port()).await;
    coordinator.register_drone(1, "127.0.0.1", second.addr.port()).await;
    coordinator.register_drone(2, "127.0.0.1", dead_port).await;

    let report = coordinator.broadcast_mission_start(None).await;

    assert_eq!(report.delivered, vec![0, 1]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, 2);
    assert_eq!(report.attempted(), 3);

    for peer in [&first, &second] {
        let recorder = peer.recorder.clone();
        assert!(eventually(|| {
            let recorder = recorder.clone();
            async move { has_start(&recorder.messages().await, 3) }
        })
        .await);
    }
    let _ = shutdown.send(());
}

#[tokio::test]
async fn test_registration_pushes_peer_list() {
    let (shutdown, _) = broadcast::channel(1);
    let first = spawn_recorder(&shutdown).await;
    let second = spawn_recorder(&shutdown).await;

    let coordinator = coordinator(false);
    coordinator.register_drone(0, "127.0.0.1", first.addr.port()).await;
    coordinator.register_drone(1, "127.0.0.1", second.addr.port()).await;

    let recorder = first.recorder.clone();
    let got_full_list = eventually(|| {
        let recorder = recorder.clone();
        async move {
            recorder.messages().await.iter().any(|m| match m {
                WireMessage::PeerList(peers) => peers.len() == 2,
                _ => false,
            })
        }
    })
    .await;
    assert!(got_full_list);
    let _ = shutdown.send(());
}

#[tokio::test]
async fn test_registration_is_idempotent_and_last_wins() {
    let coordinator = coordinator(false);
    let port = closed_port().await;

    assert_eq!(
        coordinator.register_drone(4, "127.0.0.1", port).await,
        RegistrationOutcome::New
    );
    assert_eq!(
        coordinator.register_drone(4, "127.0.0.1", port).await,
        RegistrationOutcome::Unchanged
    );
    assert_eq!(
        coordinator.register_drone(4, "127.0.0.2", port).await,
        RegistrationOutcome::Updated
    );

    let drones = coordinator.drones().await;
    assert_eq!(drones.len(), 1);
    assert_eq!(drones[0].address, "127.0.0.2");
}

#[tokio::test]
async fn test_registration_without_address_uses_sender_ip() {
    let coordinator = coordinator(false);
    coordinator
        .handle_message(
            WireMessage::Registration(Registration {
                id: 7,
                ip: None,
                port: Some(6007),
            }),
            "10.1.2.3:55555".parse().unwrap(),
        )
        .await;

    let drones = coordinator.drones().await;
    assert_eq!(drones[0].endpoint(), "10.1.2.3:6007");
}

#[tokio::test]
async fn test_registration_over_tcp() {
    let (shutdown, _) = broadcast::channel(1);
    let coordinator = Arc::new(coordinator(false));
    let listener = NdjsonListener::bind("127.0.0.1:0", coordinator.clone())
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(listener.run(shutdown.subscribe()));

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let payload = format!(
        "not json\n{}\n{}\n",
        json!({"hello": "world"}),
        json!({"id": 3, "ip": "127.0.0.1", "port": 6003})
    );
    stream.write_all(payload.as_bytes()).await.unwrap();
    stream.shutdown().await.unwrap();

    let c = coordinator.clone();
    assert!(eventually(|| {
        let c = c.clone();
        async move { c.drone_count().await == 1 }
    })
    .await);
    assert_eq!(coordinator.drones().await[0].port, 6003);
    let _ = shutdown.send(());
}

#[tokio::test]
async fn test_status_is_relayed_as_snapshot() {
    let (shutdown, _) = broadcast::channel(1);
    let drone = spawn_recorder(&shutdown).await;
    let coordinator = coordinator(true);
    coordinator.register_drone(0, "127.0.0.1", drone.addr.port()).await;

    let report = StatusReport {
        id: 0,
        gps: GpsFix {
            lat: 47.0,
            lon: 8.0,
            alt: 450.0,
        },
        baro: 50.0,
        velocity: [1.0, 2.0, 0.0],
        heartbeat: 1_700_000_000.0,
    };
    coordinator.handle_message(WireMessage::Status(report.clone()), origin()).await;
    assert_eq!(coordinator.status_of(0).await, Some(report.clone()));

    let recorder = drone.recorder.clone();
    assert!(eventually(|| {
        let recorder = recorder.clone();
        let report = report.clone();
        async move {
            recorder.messages().await.iter().any(|m| match m {
                WireMessage::Snapshot(s) => s.drones.get("0") == Some(&report) && s.peers.len() == 1,
                _ => false,
            })
        }
    })
    .await);
    let _ = shutdown.send(());
}

#[tokio::test]
async fn test_delete_peer_state_reaches_drones_and_clears_store() {
    let (shutdown, _) = broadcast::channel(1);
    let drone = spawn_recorder(&shutdown).await;
    let store = Arc::new(InMemoryPeerStore::new());
    let coordinator = coordinator(false).with_store(store.clone());
    coordinator.register_drone(0, "127.0.0.1", drone.addr.port()).await;
    assert_eq!(store.load().await.unwrap().len(), 1);

    let report = coordinator.broadcast_delete_peer_state().await;
    assert!(report.is_complete());
    assert!(store.load().await.unwrap().is_empty());

    let recorder = drone.recorder.clone();
    assert!(eventually(|| {
        let recorder = recorder.clone();
        async move {
            recorder
                .messages()
                .await
                .contains(&WireMessage::Command(MissionCommand::DeletePeerState))
        }
    })
    .await);
    let _ = shutdown.send(());
}

#[tokio::test]
async fn test_restore_reloads_persisted_drones() {
    let store = Arc::new(InMemoryPeerStore::with_peers(vec![
        PeerEntry {
            id: 0,
            ip: "10.0.0.1".to_string(),
            port: Some(6000),
        },
        PeerEntry {
            id: 1,
            ip: "10.0.0.2".to_string(),
            port: None,
        },
    ]));
    let coordinator = coordinator(false).with_store(store);

    assert_eq!(coordinator.restore().await.unwrap(), 2);
    let drones = coordinator.drones().await;
    assert_eq!(drones[0].endpoint(), "10.0.0.1:6000");
    assert_eq!(drones[1].endpoint(), "10.0.0.2:5001");
}

#[tokio::test]
async fn test_mission_start_with_empty_registry_sends_nothing() {
    let coordinator = coordinator(false);
    let report = coordinator.broadcast_mission_start(None).await;
    assert_eq!(report.attempted(), 0);
}
