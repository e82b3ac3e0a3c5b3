use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleParameter {
    pub name: String,
    pub value: f64,
    /// A mismatch on a critical parameter stops the mission before takeoff.
    pub critical: bool,
}

impl VehicleParameter {
    pub fn new(name: &str, value: f64, critical: bool) -> Self {
        Self {
            name: name.to_string(),
            value,
            critical,
        }
    }

    pub fn matches(&self, actual: f64, tolerance: f64) -> bool {
        (actual - self.value).abs() <= tolerance
    }
}

/// Speed envelope, attitude limits and speed-hold weighting for survey flight.
/// Speeds are in cm/s as the autopilot expects them.
pub fn survey_parameters(cruise_speed_ms: f64) -> Vec<VehicleParameter> {
    let cruise_cms = (cruise_speed_ms * 100.0).round();
    vec![
        VehicleParameter::new("AIRSPEED_MIN", cruise_cms - 100.0, false),
        VehicleParameter::new("AIRSPEED_CRUISE", cruise_cms, true),
        VehicleParameter::new("AIRSPEED_MAX", cruise_cms + 200.0, false),
        VehicleParameter::new("SCALING_SPEED", cruise_cms, false),
        VehicleParameter::new("WPNAV_SPEED", cruise_cms, true),
        VehicleParameter::new("ROLL_LIMIT_DEG", 50.0, false),
        VehicleParameter::new("PTCH_LIM_MAX_DEG", 25.0, false),
        VehicleParameter::new("PTCH_LIM_MIN_DEG", -10.0, false),
        VehicleParameter::new("TECS_SPEEDWEIGHT", 2.0, true),
    ]
}
