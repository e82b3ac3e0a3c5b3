use crate::common::{GeoPoint, VehicleError, VehicleResult, METERS_PER_DEG_LAT};
use crate::domains::mission::{
    survey_parameters, Attitude, FlightMode, MissionItem, VehicleControl, VehicleLink, VehiclePosition,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info};

/// Horizontal distance at which a waypoint counts as reached.
const ACCEPTANCE_RADIUS_M: f64 = 5.0;

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationSettings {
    pub start: GeoPoint,
    pub ground_alt_msl: f64,
    pub tick: Duration,
    pub speed_ms: f64,
    pub climb_rate_ms: f64,
    /// Simulated seconds per wall-clock second.
    pub time_scale: f64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            start: GeoPoint::new(0.0, 0.0),
            ground_alt_msl: 0.0,
            tick: Duration::from_millis(100),
            speed_ms: 18.0,
            climb_rate_ms: 5.0,
            time_scale: 1.0,
        }
    }
}

#[derive(Debug)]
struct SimState {
    mode: FlightMode,
    armed: bool,
    position: GeoPoint,
    relative_alt: f64,
    home: GeoPoint,
    velocity: [f64; 3],
    yaw: f64,
    items: Vec<MissionItem>,
    current: usize,
    /// GUIDED destination and relative altitude.
    guided_target: Option<(GeoPoint, f64)>,
    params: BTreeMap<String, f64>,
}

impl SimState {
    fn new(settings: &SimulationSettings) -> Self {
        // stock 15 m/s envelope
        let params = survey_parameters(15.0)
            .into_iter()
            .map(|p| (p.name, p.value))
            .collect();
        Self {
            mode: FlightMode::Other("MANUAL".to_string()),
            armed: false,
            position: settings.start,
            relative_alt: 0.0,
            home: settings.start,
            velocity: [0.0; 3],
            yaw: 0.0,
            items: Vec::new(),
            current: 0,
            guided_target: None,
            params,
        }
    }

    fn step(&mut self, dt: f64, settings: &SimulationSettings) {
        self.velocity = [0.0; 3];
        if !self.armed {
            return;
        }
        match self.mode {
            FlightMode::Auto => self.step_mission(dt, settings),
            FlightMode::Guided => {
                if let Some((target, alt)) = self.guided_target {
                    self.climb_to(alt, dt, settings.climb_rate_ms);
                    self.fly_towards(target, dt, settings.speed_ms);
                }
            }
            FlightMode::Rtl => {
                let home = self.home;
                if self.fly_towards(home, dt, settings.speed_ms) {
                    self.descend(dt, settings.climb_rate_ms);
                }
            }
            FlightMode::Qrtl => self.descend(dt, settings.climb_rate_ms),
            _ => {}
        }
    }

    fn step_mission(&mut self, dt: f64, settings: &SimulationSettings) {
        let Some(item) = self.items.get(self.current).copied() else {
            return;
        };
        let reached = match item {
            MissionItem::SetHome { lat, lon, .. } => {
                self.home = GeoPoint::new(lat, lon);
                true
            }
            MissionItem::Takeoff { alt, .. } => self.climb_to(alt, dt, settings.climb_rate_ms),
            MissionItem::Waypoint { lat, lon, alt } => {
                let level = self.climb_to(alt, dt, settings.climb_rate_ms);
                self.fly_towards(GeoPoint::new(lat, lon), dt, settings.speed_ms) && level
            }
            MissionItem::ReturnToLaunch => {
                self.mode = FlightMode::Rtl;
                true
            }
        };
        if reached {
            self.current += 1;
            debug!(item = self.current, "simulated vehicle advanced mission item");
        }
    }

    /// Returns true once within the acceptance radius of `target`.
    fn fly_towards(&mut self, target: GeoPoint, dt: f64, speed_ms: f64) -> bool {
        let remaining = self.position.distance_to(&target);
        let step = speed_ms * dt;
        if remaining <= ACCEPTANCE_RADIUS_M.max(step) {
            self.position = target;
            return true;
        }
        let fraction = step / remaining;
        let d_lat = (target.lat - self.position.lat) * fraction;
        let d_lon = (target.lon - self.position.lon) * fraction;
        let north = d_lat * METERS_PER_DEG_LAT;
        let east = d_lon * METERS_PER_DEG_LAT * self.position.lat.to_radians().cos();
        self.position.lat += d_lat;
        self.position.lon += d_lon;
        self.velocity[0] = north / dt;
        self.velocity[1] = east / dt;
        self.yaw = east.atan2(north);
        false
    }

    fn climb_to(&mut self, alt: f64, dt: f64, rate: f64) -> bool {
        let delta = alt - self.relative_alt;
        let step = rate * dt;
        if delta.abs() <= step {
            self.relative_alt = alt;
            return true;
        }
        let change = step.copysign(delta);
        self.relative_alt += change;
        self.velocity[2] = -change / dt;
        false
    }

    fn require_guided_flight(&self, command: &str) -> VehicleResult<()> {
        if self.mode == FlightMode::Guided && self.armed {
            return Ok(());
        }
        Err(VehicleError::Rejected {
            command: command.to_string(),
            reason: format!("needs armed GUIDED, vehicle is {} (armed: {})", self.mode, self.armed),
        })
    }

    /// Lands and disarms on touchdown.
    fn descend(&mut self, dt: f64, rate: f64) {
        if self.climb_to(0.0, dt, rate) {
            self.armed = false;
            info!("simulated vehicle landed and disarmed");
        }
    }
}

/// Connection handle to a simulated airframe. Closing a handle leaves the
/// airframe and other handles untouched.
pub struct SimulatedVehicle {
    state: Arc<Mutex<SimState>>,
    ground_alt_msl: f64,
    closed: AtomicBool,
}

impl SimulatedVehicle {
    async fn with_state<T>(&self, f: impl FnOnce(&mut SimState) -> VehicleResult<T>) -> VehicleResult<T> {
        if self.closed.load(Ordering::Acquire) {
            return Err(VehicleError::Closed);
        }
        let mut state = self.state.lock().await;
        f(&mut state)
    }
}

async fn run_ticker(state: Weak<Mutex<SimState>>, settings: SimulationSettings) {
    let mut ticker = interval(settings.tick);
    let dt = settings.tick.as_secs_f64() * settings.time_scale;
    loop {
        ticker.tick().await;
        let Some(shared) = state.upgrade() else {
            break;
        };
        shared.lock().await.step(dt, &settings);
    }
}

#[async_trait]
impl VehicleControl for SimulatedVehicle {
    async fn position(&self) -> VehicleResult<VehiclePosition> {
        let ground = self.ground_alt_msl;
        self.with_state(|s| {
            Ok(VehiclePosition {
                lat: s.position.lat,
                lon: s.position.lon,
                alt: ground + s.relative_alt,
                relative_alt: s.relative_alt,
            })
        })
        .await
    }

    async fn velocity(&self) -> VehicleResult<[f64; 3]> {
        self.with_state(|s| Ok(s.velocity)).await
    }

    async fn attitude(&self) -> VehicleResult<Attitude> {
        self.with_state(|s| {
            Ok(Attitude {
                roll: 0.0,
                pitch: 0.0,
                yaw: s.yaw,
            })
        })
        .await
    }

    async fn mode(&self) -> VehicleResult<FlightMode> {
        self.with_state(|s| Ok(s.mode.clone())).await
    }

    async fn set_mode(&self, mode: FlightMode) -> VehicleResult<()> {
        self.with_state(|s| {
            if let FlightMode::Other(name) = &mode {
                return Err(VehicleError::Rejected {
                    command: "set_mode".to_string(),
                    reason: format!("unsupported mode {}", name),
                });
            }
            if mode != FlightMode::Guided {
                s.guided_target = None;
            }
            s.mode = mode;
            Ok(())
        })
        .await
    }

    async fn armed(&self) -> VehicleResult<bool> {
        self.with_state(|s| Ok(s.armed)).await
    }

    async fn set_armed(&self, armed: bool) -> VehicleResult<()> {
        self.with_state(|s| {
            if armed && s.items.is_empty() && s.mode != FlightMode::Guided {
                return Err(VehicleError::Rejected {
                    command: "arm".to_string(),
                    reason: "no mission loaded".to_string(),
                });
            }
            if !armed {
                s.guided_target = None;
            }
            s.armed = armed;
            Ok(())
        })
        .await
    }

    async fn parameter(&self, name: &str) -> VehicleResult<Option<f64>> {
        self.with_state(|s| Ok(s.params.get(name).copied())).await
    }

    async fn set_parameter(&self, name: &str, value: f64) -> VehicleResult<()> {
        self.with_state(|s| match s.params.get_mut(name) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(VehicleError::Rejected {
                command: format!("set {}", name),
                reason: "unknown parameter".to_string(),
            }),
        })
        .await
    }

    async fn upload_mission(&self, items: &[MissionItem]) -> VehicleResult<()> {
        self.with_state(|s| {
            s.items = items.to_vec();
            s.current = 0;
            Ok(())
        })
        .await
    }

    async fn mission_progress(&self) -> VehicleResult<usize> {
        self.with_state(|s| Ok(s.current)).await
    }

    async fn send_speed_command(&self, speed_ms: f64) -> VehicleResult<()> {
        if speed_ms <= 0.0 {
            return Err(VehicleError::Rejected {
                command: "change_speed".to_string(),
                reason: format!("speed {} m/s", speed_ms),
            });
        }
        self.with_state(|_| Ok(())).await
    }

    async fn takeoff(&self, relative_alt: f64) -> VehicleResult<()> {
        self.with_state(|s| {
            s.require_guided_flight("takeoff")?;
            s.guided_target = Some((s.position, relative_alt));
            Ok(())
        })
        .await
    }

    async fn goto(&self, target: GeoPoint, relative_alt: f64) -> VehicleResult<()> {
        self.with_state(|s| {
            s.require_guided_flight("goto")?;
            s.guided_target = Some((target, relative_alt));
            Ok(())
        })
        .await
    }

    async fn close(&self) -> VehicleResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(VehicleError::Closed);
        }
        Ok(())
    }
}

/// Owns one simulated airframe and its kinematic tick. Every `connect`
/// returns a new handle to the same airframe.
pub struct SimulatedVehicleLink {
    state: Arc<Mutex<SimState>>,
    settings: SimulationSettings,
    ticker: JoinHandle<()>,
}

impl SimulatedVehicleLink {
    /// Must be called from within a tokio runtime.
    pub fn spawn(settings: SimulationSettings) -> Self {
        let state = Arc::new(Mutex::new(SimState::new(&settings)));
        let ticker = tokio::spawn(run_ticker(Arc::downgrade(&state), settings.clone()));
        info!(start = ?settings.start, "simulated airframe started");
        Self {
            state,
            settings,
            ticker,
        }
    }

    pub fn handle(&self) -> SimulatedVehicle {
        SimulatedVehicle {
            state: self.state.clone(),
            ground_alt_msl: self.settings.ground_alt_msl,
            closed: AtomicBool::new(false),
        }
    }
}

impl Drop for SimulatedVehicleLink {
    fn drop(&mut self) {
        self.ticker.abort();
    }
}

#[async_trait]
impl VehicleLink for SimulatedVehicleLink {
    async fn connect(&self) -> VehicleResult<Box<dyn VehicleControl>> {
        debug!("opening simulated vehicle handle");
        Ok(Box::new(self.handle()))
    }
}
