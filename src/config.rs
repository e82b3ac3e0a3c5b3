use crate::adapters::outbound::{GeoJsonBoundaryLoader, KmlBoundaryLoader, SimulationSettings};
use crate::application::{CoordinatorSettings, TelemetrySettings};
use crate::common::GeoPoint;
use crate::domains::mission::{survey_parameters, ExecutorSettings, MissionTimings, PursuitSettings};
use crate::domains::survey::{BoundarySource, CameraSpec, CoveragePlanner};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub controller: ControllerConfig,
    pub drone: DroneConfig,
    pub survey: SurveyConfig,
    pub camera: CameraConfig,
    pub mission: MissionConfig,
    pub pursuit: PursuitConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub bind_address: String,
    pub port: u16,
    /// Address drones use to reach the controller.
    pub advertised_host: String,
    pub relay_status: bool,
    pub registry_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DroneConfig {
    pub id: u32,
    pub bind_address: String,
    pub listen_port: u16,
    pub advertised_ip: String,
    pub peers_file: PathBuf,
    pub status_interval_ms: u64,
    pub send_timeout_ms: u64,
    pub register_with_controller: bool,
    pub simulation: SimulationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub start_lat: f64,
    pub start_lon: f64,
    pub ground_alt_msl: f64,
    pub tick_ms: u64,
    pub speed_ms: f64,
    pub climb_rate_ms: f64,
    pub time_scale: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurveyConfig {
    pub boundary_file: PathBuf,
    pub altitude_m: f64,
    pub overlap_pct: f64,
    pub sidelap_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub sensor_res_w: u32,
    pub sensor_res_h: u32,
    pub pixel_size_mm: f64,
    pub focal_length_mm: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MissionConfig {
    pub mode: MissionMode,
    pub cruise_speed_ms: f64,
    pub bank_warning_deg: f64,
    pub parameter_tolerance: f64,
    pub mode_timeout_ms: u64,
    pub arm_timeout_ms: u64,
    pub confirm_poll_ms: u64,
    pub monitor_poll_ms: u64,
    pub transit_timeout_s: u64,
    pub landing_timeout_s: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissionMode {
    /// Lawnmower coverage of the drone's sub-region.
    #[default]
    Survey,
    /// Chase live targets inside the sub-region.
    Pursuit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PursuitConfig {
    pub altitude_m: f64,
    pub arrival_radius_m: f64,
    pub hover_s: u64,
    pub leg_timeout_s: u64,
    pub max_targets: Option<usize>,
    /// Delay range of the simulated target feed.
    pub target_min_delay_ms: u64,
    pub target_max_delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directives; `RUST_LOG` takes precedence.
    pub filter: String,
}

impl Config {
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Defaults, then the TOML file if it exists, then `SWARM__SECTION__KEY`
    /// environment variables.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::Config::try_from(&Config::default())?)
            .add_source(::config::File::from(path.as_ref()).required(false))
            .add_source(
                ::config::Environment::with_prefix("SWARM")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// First CLI argument, else `SWARM_CONFIG`, else `swarm.toml`.
    pub fn resolve_path() -> PathBuf {
        std::env::args()
            .nth(1)
            .or_else(|| std::env::var("SWARM_CONFIG").ok())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("swarm.toml"))
    }

    pub fn controller_endpoint(&self) -> String {
        format!("{}:{}", self.controller.advertised_host, self.controller.port)
    }

    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            default_drone_port: self.drone.listen_port,
            relay_status: self.controller.relay_status,
        }
    }

    pub fn telemetry_settings(&self) -> TelemetrySettings {
        TelemetrySettings {
            drone_id: self.drone.id,
            advertised_ip: self.drone.advertised_ip.clone(),
            listen_port: self.drone.listen_port,
            controller: self
                .drone
                .register_with_controller
                .then(|| self.controller_endpoint()),
            status_interval: Duration::from_millis(self.drone.status_interval_ms),
            default_peer_port: self.drone.listen_port,
        }
    }

    pub fn coverage_planner(&self) -> CoveragePlanner {
        let camera = CameraSpec {
            sensor_res_w: self.camera.sensor_res_w,
            sensor_res_h: self.camera.sensor_res_h,
            pixel_size_mm: self.camera.pixel_size_mm,
            focal_length_mm: self.camera.focal_length_mm,
        };
        CoveragePlanner::new(
            camera,
            self.survey.altitude_m,
            self.survey.overlap_pct,
            self.survey.sidelap_pct,
        )
    }

    /// KML for a `.kml` boundary file, GeoJSON otherwise.
    pub fn boundary_source(&self) -> Arc<dyn BoundarySource> {
        let path = &self.survey.boundary_file;
        let is_kml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("kml"));
        if is_kml {
            Arc::new(KmlBoundaryLoader::new(path))
        } else {
            Arc::new(GeoJsonBoundaryLoader::new(path))
        }
    }

    fn mission_timings(&self) -> MissionTimings {
        let m = &self.mission;
        MissionTimings {
            mode_timeout: Duration::from_millis(m.mode_timeout_ms),
            arm_timeout: Duration::from_millis(m.arm_timeout_ms),
            confirm_poll: Duration::from_millis(m.confirm_poll_ms),
            monitor_poll: Duration::from_millis(m.monitor_poll_ms),
            transit_timeout: Duration::from_secs(m.transit_timeout_s),
            landing_timeout: Duration::from_secs(m.landing_timeout_s),
        }
    }

    pub fn executor_settings(&self) -> ExecutorSettings {
        let m = &self.mission;
        ExecutorSettings {
            cruise_speed_ms: m.cruise_speed_ms,
            bank_warning_deg: m.bank_warning_deg,
            parameter_tolerance: m.parameter_tolerance,
            parameters: survey_parameters(m.cruise_speed_ms),
            timings: self.mission_timings(),
        }
    }

    pub fn pursuit_settings(&self) -> PursuitSettings {
        let p = &self.pursuit;
        PursuitSettings {
            altitude_m: p.altitude_m,
            arrival_radius_m: p.arrival_radius_m,
            hover: Duration::from_secs(p.hover_s),
            leg_timeout: Duration::from_secs(p.leg_timeout_s),
            max_targets: p.max_targets,
            timings: self.mission_timings(),
        }
    }

    pub fn target_delay_range(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.pursuit.target_min_delay_ms),
            Duration::from_millis(self.pursuit.target_max_delay_ms),
        )
    }

    pub fn simulation_settings(&self) -> SimulationSettings {
        let s = &self.drone.simulation;
        SimulationSettings {
            start: GeoPoint::new(s.start_lat, s.start_lon),
            ground_alt_msl: s.ground_alt_msl,
            tick: Duration::from_millis(s.tick_ms),
            speed_ms: s.speed_ms,
            climb_rate_ms: s.climb_rate_ms,
            time_scale: s.time_scale,
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 5000,
            advertised_host: "127.0.0.1".to_string(),
            relay_status: true,
            registry_file: None,
        }
    }
}

impl Default for DroneConfig {
    fn default() -> Self {
        Self {
            id: 0,
            bind_address: "0.0.0.0".to_string(),
            listen_port: 5001,
            advertised_ip: "127.0.0.1".to_string(),
            peers_file: PathBuf::from("peers.json"),
            status_interval_ms: 1000,
            send_timeout_ms: 1000,
            register_with_controller: true,
            simulation: SimulationConfig::default(),
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            start_lat: 0.0,
            start_lon: 0.0,
            ground_alt_msl: 0.0,
            tick_ms: 100,
            speed_ms: 18.0,
            climb_rate_ms: 5.0,
            time_scale: 1.0,
        }
    }
}

impl Default for SurveyConfig {
    fn default() -> Self {
        Self {
            boundary_file: PathBuf::from("boundary.geojson"),
            altitude_m: 50.0,
            overlap_pct: 15.0,
            sidelap_pct: 15.0,
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        let camera = CameraSpec::default();
        Self {
            sensor_res_w: camera.sensor_res_w,
            sensor_res_h: camera.sensor_res_h,
            pixel_size_mm: camera.pixel_size_mm,
            focal_length_mm: camera.focal_length_mm,
        }
    }
}

impl Default for MissionConfig {
    fn default() -> Self {
        Self {
            mode: MissionMode::Survey,
            cruise_speed_ms: 18.0,
            bank_warning_deg: 50.0,
            parameter_tolerance: 1e-3,
            mode_timeout_ms: 10_000,
            arm_timeout_ms: 10_000,
            confirm_poll_ms: 200,
            monitor_poll_ms: 1000,
            transit_timeout_s: 3600,
            landing_timeout_s: 900,
        }
    }
}

impl Default for PursuitConfig {
    fn default() -> Self {
        Self {
            altitude_m: 10.0,
            arrival_radius_m: 2.0,
            hover_s: 5,
            leg_timeout_s: 600,
            max_targets: None,
            target_min_delay_ms: 1000,
            target_max_delay_ms: 7000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}
