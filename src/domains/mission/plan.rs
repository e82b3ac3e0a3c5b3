use crate::common::{haversine_distance, GeoPoint, MissionError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub seq: usize,
    pub lat: f64,
    pub lon: f64,
    pub alt: f64,
}

impl Waypoint {
    pub fn position(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lon)
    }
}

/// Ordered waypoint sequence; the first waypoint is the home/launch point.
/// Deserialization goes through [`MissionPlan::new`], so a decoded plan has
/// the same length guarantee as a constructed one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "UncheckedPlan")]
pub struct MissionPlan {
    waypoints: Vec<Waypoint>,
}

#[derive(Deserialize)]
struct UncheckedPlan {
    waypoints: Vec<Waypoint>,
}

impl TryFrom<UncheckedPlan> for MissionPlan {
    type Error = MissionError;

    fn try_from(plan: UncheckedPlan) -> Result<Self, Self::Error> {
        Self::new(plan.waypoints)
    }
}

impl MissionPlan {
    pub const MIN_WAYPOINTS: usize = 2;

    pub fn new(waypoints: Vec<Waypoint>) -> Result<Self, MissionError> {
        if waypoints.len() < Self::MIN_WAYPOINTS {
            return Err(MissionError::InvalidPlan(format!(
                "expected at least {} waypoints, got {}",
                Self::MIN_WAYPOINTS,
                waypoints.len()
            )));
        }
        Ok(Self { waypoints })
    }

    /// Tag every point with `altitude_m` and number them in order.
    pub fn from_points(points: &[GeoPoint], altitude_m: f64) -> Result<Self, MissionError> {
        let waypoints = points
            .iter()
            .enumerate()
            .map(|(seq, p)| Waypoint {
                seq,
                lat: p.lat,
                lon: p.lon,
                alt: altitude_m,
            })
            .collect();
        Self::new(waypoints)
    }

    pub fn home(&self) -> &Waypoint {
        &self.waypoints[0]
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    /// Sum of great-circle legs between consecutive waypoints.
    pub fn total_distance_m(&self) -> f64 {
        self.waypoints
            .windows(2)
            .map(|w| haversine_distance(w[0].lat, w[0].lon, w[1].lat, w[1].lon))
            .sum()
    }

    /// Build the upload sequence: set-home, takeoff, one nav item per remaining
    /// waypoint, then return-to-launch.
    pub fn to_mission_items(&self) -> Vec<MissionItem> {
        let home = self.home();
        let mut items = Vec::with_capacity(self.waypoints.len() + 2);
        items.push(MissionItem::SetHome {
            lat: home.lat,
            lon: home.lon,
            alt: home.alt,
        });
        items.push(MissionItem::Takeoff {
            lat: home.lat,
            lon: home.lon,
            alt: home.alt,
        });
        items.extend(self.waypoints[1..].iter().map(|wp| MissionItem::Waypoint {
            lat: wp.lat,
            lon: wp.lon,
            alt: wp.alt,
        }));
        items.push(MissionItem::ReturnToLaunch);
        items
    }
}

/// One entry of the command sequence uploaded to the autopilot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MissionItem {
    SetHome { lat: f64, lon: f64, alt: f64 },
    Takeoff { lat: f64, lon: f64, alt: f64 },
    Waypoint { lat: f64, lon: f64, alt: f64 },
    ReturnToLaunch,
}

impl MissionItem {
    pub fn target(&self) -> Option<(GeoPoint, f64)> {
        match *self {
            MissionItem::SetHome { lat, lon, alt }
            | MissionItem::Takeoff { lat, lon, alt }
            | MissionItem::Waypoint { lat, lon, alt } => Some((GeoPoint::new(lat, lon), alt)),
            MissionItem::ReturnToLaunch => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_requires_two_waypoints() {
        let single = MissionPlan::from_points(&[GeoPoint::new(1.0, 2.0)], 50.0);
        assert!(matches!(single, Err(MissionError::InvalidPlan(_))));
    }

    #[test]
    fn test_decoding_enforces_minimum_length() {
        let empty = serde_json::from_str::<MissionPlan>(r#"{"waypoints": []}"#);
        assert!(empty.unwrap_err().to_string().contains("at least 2 waypoints"));

        let one = r#"{"waypoints": [{"seq": 0, "lat": 1.0, "lon": 2.0, "alt": 50.0}]}"#;
        assert!(serde_json::from_str::<MissionPlan>(one).is_err());
    }

    #[test]
    fn test_decoded_plan_matches_encoded() {
        let plan =
            MissionPlan::from_points(&[GeoPoint::new(1.0, 2.0), GeoPoint::new(1.1, 2.0)], 50.0).unwrap();
        let json = serde_json::to_string(&plan).unwrap();
        let decoded: MissionPlan = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.home(), plan.home());
        assert_eq!(decoded, plan);
    }

    #[test]
    fn test_mission_items_wrap_waypoints() {
        let plan = MissionPlan::from_points(
            &[
                GeoPoint::new(10.0, 20.0),
                GeoPoint::new(10.1, 20.0),
                GeoPoint::new(10.1, 20.1),
            ],
            50.0,
        )
        .unwrap();
        let items = plan.to_mission_items();
        assert_eq!(items.len(), plan.len() + 2);
        assert!(matches!(items[0], MissionItem::SetHome { lat, .. } if lat == 10.0));
        assert!(matches!(items[1], MissionItem::Takeoff { alt, .. } if alt == 50.0));
        assert!(matches!(items[2], MissionItem::Waypoint { lat, .. } if lat == 10.1));
        assert_eq!(items[items.len() - 1], MissionItem::ReturnToLaunch);
    }
}
