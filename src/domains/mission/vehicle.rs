use super::plan::MissionItem;
use crate::common::{GeoPoint, VehicleError, VehicleResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlightMode {
    Guided,
    Auto,
    Rtl,
    /// Vertical (VTOL) return-to-launch used for emergency recovery.
    Qrtl,
    Other(String),
}

impl FlightMode {
    pub fn name(&self) -> &str {
        match self {
            FlightMode::Guided => "GUIDED",
            FlightMode::Auto => "AUTO",
            FlightMode::Rtl => "RTL",
            FlightMode::Qrtl => "QRTL",
            FlightMode::Other(name) => name,
        }
    }

    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "GUIDED" => FlightMode::Guided,
            "AUTO" => FlightMode::Auto,
            "RTL" => FlightMode::Rtl,
            "QRTL" => FlightMode::Qrtl,
            other => FlightMode::Other(other.to_string()),
        }
    }
}

impl fmt::Display for FlightMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VehiclePosition {
    pub lat: f64,
    pub lon: f64,
    /// Altitude above mean sea level, meters.
    pub alt: f64,
    /// Altitude above home, meters.
    pub relative_alt: f64,
}

/// Attitude in radians.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Attitude {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

impl Attitude {
    pub fn bank_angle_deg(&self) -> f64 {
        self.roll.to_degrees().abs()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleState {
    pub mode: FlightMode,
    pub armed: bool,
    pub position: VehiclePosition,
    pub attitude: Attitude,
    pub mission_progress: usize,
}

/// Command/query surface of the autopilot.
///
/// Commands return once the request is sent; their effect shows up in later
/// reads, so callers poll for confirmation.
#[async_trait]
pub trait VehicleControl: Send + Sync {
    async fn position(&self) -> VehicleResult<VehiclePosition>;
    /// Velocity vector (north, east, down) in m/s.
    async fn velocity(&self) -> VehicleResult<[f64; 3]>;
    async fn attitude(&self) -> VehicleResult<Attitude>;
    async fn mode(&self) -> VehicleResult<FlightMode>;
    async fn set_mode(&self, mode: FlightMode) -> VehicleResult<()>;
    async fn armed(&self) -> VehicleResult<bool>;
    async fn set_armed(&self, armed: bool) -> VehicleResult<()>;
    /// `None` when the firmware does not know the parameter.
    async fn parameter(&self, name: &str) -> VehicleResult<Option<f64>>;
    async fn set_parameter(&self, name: &str, value: f64) -> VehicleResult<()>;
    /// Replaces any mission already stored on the vehicle.
    async fn upload_mission(&self, items: &[MissionItem]) -> VehicleResult<()>;
    /// Index of the mission item currently being executed.
    async fn mission_progress(&self) -> VehicleResult<usize>;
    async fn send_speed_command(&self, speed_ms: f64) -> VehicleResult<()>;
    async fn close(&self) -> VehicleResult<()>;

    /// Climb to `relative_alt` in GUIDED mode. Firmware without guided
    /// takeoff rejects it.
    async fn takeoff(&self, relative_alt: f64) -> VehicleResult<()> {
        Err(VehicleError::Rejected {
            command: format!("takeoff {}", relative_alt),
            reason: "guided takeoff not supported".to_string(),
        })
    }

    /// Fly to `target` at `relative_alt` in GUIDED mode.
    async fn goto(&self, target: GeoPoint, relative_alt: f64) -> VehicleResult<()> {
        Err(VehicleError::Rejected {
            command: format!("goto {:.6},{:.6} @ {}", target.lat, target.lon, relative_alt),
            reason: "guided navigation not supported".to_string(),
        })
    }

    async fn state(&self) -> VehicleResult<VehicleState> {
        Ok(VehicleState {
            mode: self.mode().await?,
            armed: self.armed().await?,
            position: self.position().await?,
            attitude: self.attitude().await?,
            mission_progress: self.mission_progress().await?,
        })
    }
}

/// Opens vehicle connections; each mission run gets its own handle.
#[async_trait]
pub trait VehicleLink: Send + Sync {
    async fn connect(&self) -> VehicleResult<Box<dyn VehicleControl>>;
}
