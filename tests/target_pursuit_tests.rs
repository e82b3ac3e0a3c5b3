use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use swarm_survey::adapters::outbound::{SimulatedVehicleLink, SimulationSettings};
use swarm_survey::application::TargetPursuitService;
use swarm_survey::domains::mission::{
    Attitude, FlightMode, MissionItem, MissionPhase, MissionTimings, PursuitSettings, TargetPursuit,
    TargetQueue, TargetSource, VehicleControl, VehicleLink, VehiclePosition,
};
use swarm_survey::domains::survey::{AreaPartitioner, BoundarySource, SurveyArea};
use swarm_survey::domains::swarm::MissionTrigger;
use swarm_survey::{BoundaryError, GeoPoint, MissionError, VehicleError, VehicleResult};
use tokio::sync::broadcast;
use tokio::time::{sleep, Instant};

const HOME: GeoPoint = GeoPoint {
    lat: 47.0005,
    lon: 8.0015,
};

/// Roughly 110 m north-south by 230 m east-west.
fn field() -> SurveyArea {
    SurveyArea::new(vec![
        GeoPoint::new(47.0, 8.0),
        GeoPoint::new(47.0, 8.003),
        GeoPoint::new(47.001, 8.003),
        GeoPoint::new(47.001, 8.0),
    ])
}

struct FixedBoundary;

#[async_trait]
impl BoundarySource for FixedBoundary {
    async fn load_boundary(&self) -> Result<SurveyArea, BoundaryError> {
        Ok(field())
    }
}

/// Hands out a fixed list of targets, then reports exhaustion.
struct ScriptedTargets(Mutex<VecDeque<GeoPoint>>);

impl ScriptedTargets {
    fn new(targets: &[GeoPoint]) -> Self {
        Self(Mutex::new(targets.iter().copied().collect()))
    }
}

#[async_trait]
impl TargetSource for ScriptedTargets {
    async fn next_target(&self) -> Option<GeoPoint> {
        self.0.lock().unwrap().pop_front()
    }
}

/// Wraps a simulated airframe, recording every `goto` and optionally
/// refusing them.
struct RecordingVehicle {
    inner: Box<dyn VehicleControl>,
    gotos: Mutex<Vec<GeoPoint>>,
    refuse_goto: bool,
}

impl RecordingVehicle {
    fn new(inner: Box<dyn VehicleControl>) -> Self {
        Self {
            inner,
            gotos: Mutex::new(Vec::new()),
            refuse_goto: false,
        }
    }

    fn gotos(&self) -> Vec<GeoPoint> {
        self.gotos.lock().unwrap().clone()
    }
}

#[async_trait]
impl VehicleControl for RecordingVehicle {
    async fn position(&self) -> VehicleResult<VehiclePosition> {
        self.inner.position().await
    }

    async fn velocity(&self) -> VehicleResult<[f64; 3]> {
        self.inner.velocity().await
    }

    async fn attitude(&self) -> VehicleResult<Attitude> {
        self.inner.attitude().await
    }

    async fn mode(&self) -> VehicleResult<FlightMode> {
        self.inner.mode().await
    }

    async fn set_mode(&self, mode: FlightMode) -> VehicleResult<()> {
        self.inner.set_mode(mode).await
    }

    async fn armed(&self) -> VehicleResult<bool> {
        self.inner.armed().await
    }

    async fn set_armed(&self, armed: bool) -> VehicleResult<()> {
        self.inner.set_armed(armed).await
    }

    async fn parameter(&self, name: &str) -> VehicleResult<Option<f64>> {
        self.inner.parameter(name).await
    }

    async fn set_parameter(&self, name: &str, value: f64) -> VehicleResult<()> {
        self.inner.set_parameter(name, value).await
    }

    async fn upload_mission(&self, items: &[MissionItem]) -> VehicleResult<()> {
        self.inner.upload_mission(items).await
    }

    async fn mission_progress(&self) -> VehicleResult<usize> {
        self.inner.mission_progress().await
    }

    async fn send_speed_command(&self, speed_ms: f64) -> VehicleResult<()> {
        self.inner.send_speed_command(speed_ms).await
    }

    async fn takeoff(&self, relative_alt: f64) -> VehicleResult<()> {
        self.inner.takeoff(relative_alt).await
    }

    async fn goto(&self, target: GeoPoint, relative_alt: f64) -> VehicleResult<()> {
        if self.refuse_goto {
            return Err(VehicleError::Rejected {
                command: "goto".to_string(),
                reason: "geofence".to_string(),
            });
        }
        self.gotos.lock().unwrap().push(target);
        self.inner.goto(target, relative_alt).await
    }

    async fn close(&self) -> VehicleResult<()> {
        self.inner.close().await
    }
}

fn sim() -> SimulatedVehicleLink {
    SimulatedVehicleLink::spawn(SimulationSettings {
        start: HOME,
        tick: Duration::from_millis(5),
        time_scale: 100.0,
        ..SimulationSettings::default()
    })
}

fn fast_pursuit(max_targets: Option<usize>) -> PursuitSettings {
    PursuitSettings {
        hover: Duration::from_millis(10),
        leg_timeout: Duration::from_secs(5),
        max_targets,
        timings: MissionTimings {
            mode_timeout: Duration::from_millis(200),
            arm_timeout: Duration::from_millis(200),
            confirm_poll: Duration::from_millis(5),
            monitor_poll: Duration::from_millis(5),
            transit_timeout: Duration::from_secs(5),
            landing_timeout: Duration::from_secs(5),
        },
        ..PursuitSettings::default()
    }
}

fn whole_field_queue() -> TargetQueue {
    TargetQueue::new(AreaPartitioner.partition(&field(), 1, 0).unwrap())
}

async fn assert_landed(link: &SimulatedVehicleLink) {
    let observer = link.connect().await.unwrap();
    assert!(!observer.armed().await.unwrap());
    assert!(observer.position().await.unwrap().relative_alt <= 1.0);
}

#[tokio::test]
async fn test_visits_targets_nearest_first_then_lands() {
    let link = sim();
    let vehicle = RecordingVehicle::new(link.connect().await.unwrap());
    let queue = whole_field_queue();

    let far = GeoPoint::new(47.0009, 8.0029);
    let near = GeoPoint::new(47.0006, 8.0017);
    let mid = GeoPoint::new(47.0002, 8.0022);
    for target in [far, near, mid] {
        assert!(queue.offer(target).await);
    }
    assert!(!queue.offer(GeoPoint::new(47.002, 8.0015)).await);

    let (_stop_tx, stop) = broadcast::channel(1);
    let pursuit = TargetPursuit::new(fast_pursuit(Some(3)));
    let report = pursuit.run(&vehicle, &queue, stop).await.unwrap();

    assert_eq!(report.targets_visited, 3);
    assert_eq!(vehicle.gotos(), vec![near, mid, far]);
    assert!(queue.is_empty().await);
    assert!(matches!(vehicle.armed().await, Err(VehicleError::Closed)));
    assert_landed(&link).await;
}

#[tokio::test]
async fn test_stop_signal_returns_to_launch() {
    let link = sim();
    let vehicle = RecordingVehicle::new(link.connect().await.unwrap());
    let queue = whole_field_queue();
    let (stop_tx, stop) = broadcast::channel(1);

    let observer = link.connect().await.unwrap();
    let run = tokio::spawn(async move {
        let pursuit = TargetPursuit::new(fast_pursuit(None));
        let report = pursuit.run(&vehicle, &queue, stop).await;
        (report, vehicle.gotos())
    });

    let deadline = Instant::now() + Duration::from_secs(2);
    while observer.position().await.unwrap().relative_alt < 9.5 {
        assert!(Instant::now() < deadline, "never reached pursuit altitude");
        sleep(Duration::from_millis(5)).await;
    }
    stop_tx.send(()).unwrap();

    let (report, gotos) = run.await.unwrap();
    assert_eq!(report.unwrap().targets_visited, 0);
    assert!(gotos.is_empty());
    let position = observer.position().await.unwrap();
    assert!(GeoPoint::new(position.lat, position.lon).distance_to(&HOME) < 1.0);
    assert_landed(&link).await;
}

#[tokio::test]
async fn test_refused_leg_runs_abort_sequence() {
    let link = sim();
    let mut vehicle = RecordingVehicle::new(link.connect().await.unwrap());
    vehicle.refuse_goto = true;
    let queue = whole_field_queue();
    queue.offer(GeoPoint::new(47.0006, 8.0017)).await;

    let (_stop_tx, stop) = broadcast::channel(1);
    let err = TargetPursuit::new(fast_pursuit(None))
        .run(&vehicle, &queue, stop)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        MissionError::Vehicle {
            phase: MissionPhase::Transit,
            source: VehicleError::Rejected { .. },
        }
    ));
    let observer = link.connect().await.unwrap();
    assert_eq!(observer.mode().await.unwrap(), FlightMode::Qrtl);
    assert_landed(&link).await;
}

#[tokio::test]
async fn test_service_pursues_only_its_own_strip() {
    let link = Arc::new(sim());
    let west = GeoPoint::new(47.0005, 8.0005);
    let east = GeoPoint::new(47.0005, 8.0025);
    let west_far = GeoPoint::new(47.0009, 8.0001);
    let service = TargetPursuitService::new(
        0,
        Arc::new(FixedBoundary),
        TargetPursuit::new(fast_pursuit(Some(2))),
        link.clone(),
        Arc::new(ScriptedTargets::new(&[east, west, west_far])),
    );

    service.start_mission(2).await.unwrap();
    assert!(service.is_running());
    assert!(matches!(
        service.start_mission(2).await,
        Err(MissionError::AlreadyRunning)
    ));

    let report = service.wait_for_run().await.unwrap().unwrap();
    assert_eq!(report.targets_visited, 2);
    assert!(!service.is_running());
    assert_landed(&link).await;
}
