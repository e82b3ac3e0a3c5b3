use crate::common::MessageError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

pub type DroneId = u32;

/// Reachability of one drone as shared in peer lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerEntry {
    pub id: DroneId,
    #[serde(alias = "address")]
    pub ip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl PeerEntry {
    pub fn endpoint(&self, default_port: u16) -> String {
        format!("{}:{}", self.ip, self.port.unwrap_or(default_port))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub id: DroneId,
    #[serde(default, alias = "address", skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsFix {
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub alt: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub id: DroneId,
    pub gps: GpsFix,
    /// Barometric altitude, meters.
    pub baro: f64,
    /// North, east, down in m/s.
    pub velocity: [f64; 3],
    /// Seconds since the Unix epoch.
    pub heartbeat: f64,
}

/// Full peer list plus the latest status per drone, keyed by drone id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwarmSnapshot {
    pub peers: Vec<PeerEntry>,
    pub drones: BTreeMap<String, StatusReport>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissionCommand {
    StartMission { total_drones: usize },
    DeletePeerState,
}

const START_MISSION: &str = "start mission";
const DELETE_PEERS: &str = "delete_peers_file";

/// Every message shape exchanged between drones and the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum WireMessage {
    Registration(Registration),
    Status(StatusReport),
    PeerList(Vec<PeerEntry>),
    Snapshot(SwarmSnapshot),
    Command(MissionCommand),
}

impl WireMessage {
    /// Identify a decoded JSON value by its shape.
    pub fn classify(value: Value) -> Result<WireMessage, MessageError> {
        match value {
            Value::Array(_) => decode("peer list", value).map(WireMessage::PeerList),
            Value::Object(ref obj) => {
                if let Some(command) = obj.get("command") {
                    return classify_command(command, obj).map(WireMessage::Command);
                }
                if obj.contains_key("peers") && obj.contains_key("drones") {
                    return decode("snapshot", value).map(WireMessage::Snapshot);
                }
                if !obj.contains_key("id") {
                    return Err(MessageError::Unrecognized(value.to_string()));
                }
                if obj.contains_key("gps") {
                    decode("status", value).map(WireMessage::Status)
                } else if ["port", "ip", "address"].iter().any(|k| obj.contains_key(*k)) {
                    decode("registration", value).map(WireMessage::Registration)
                } else {
                    Err(MessageError::Unrecognized(value.to_string()))
                }
            }
            other => Err(MessageError::Unrecognized(other.to_string())),
        }
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        match self {
            WireMessage::Registration(r) => serde_json::to_value(r),
            WireMessage::Status(s) => serde_json::to_value(s),
            WireMessage::PeerList(p) => serde_json::to_value(p),
            WireMessage::Snapshot(s) => serde_json::to_value(s),
            WireMessage::Command(MissionCommand::StartMission { total_drones }) => {
                Ok(json!({ "command": START_MISSION, "total_drones": total_drones }))
            }
            WireMessage::Command(MissionCommand::DeletePeerState) => {
                Ok(json!({ "command": DELETE_PEERS }))
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            WireMessage::Registration(_) => "registration",
            WireMessage::Status(_) => "status",
            WireMessage::PeerList(_) => "peer list",
            WireMessage::Snapshot(_) => "snapshot",
            WireMessage::Command(_) => "command",
        }
    }
}

fn classify_command(command: &Value, obj: &Map<String, Value>) -> Result<MissionCommand, MessageError> {
    match command.as_str() {
        Some(START_MISSION) => {
            let total_drones = obj
                .get("total_drones")
                .and_then(Value::as_u64)
                .unwrap_or(1) as usize;
            if total_drones == 0 {
                return Err(MessageError::Invalid {
                    shape: "command",
                    reason: "total_drones must be at least 1".to_string(),
                });
            }
            Ok(MissionCommand::StartMission { total_drones })
        }
        Some(DELETE_PEERS) => Ok(MissionCommand::DeletePeerState),
        _ => Err(MessageError::Unrecognized(command.to_string())),
    }
}

fn decode<T: serde::de::DeserializeOwned>(shape: &'static str, value: Value) -> Result<T, MessageError> {
    serde_json::from_value(value).map_err(|e| MessageError::Invalid {
        shape,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_registration_with_ip_or_port() {
        let by_ip = WireMessage::classify(json!({"id": 3, "ip": "10.0.0.3"})).unwrap();
        assert!(matches!(by_ip, WireMessage::Registration(Registration { id: 3, port: None, .. })));

        let by_port = WireMessage::classify(json!({"id": 1, "port": 12346})).unwrap();
        assert!(matches!(by_port, WireMessage::Registration(Registration { ip: None, port: Some(12346), .. })));
    }

    #[test]
    fn test_classify_start_mission_defaults_to_one_drone() {
        let msg = WireMessage::classify(json!({"command": "start mission"})).unwrap();
        assert_eq!(msg, WireMessage::Command(MissionCommand::StartMission { total_drones: 1 }));
    }

    #[test]
    fn test_command_round_trips_through_wire_shape() {
        let cmd = WireMessage::Command(MissionCommand::StartMission { total_drones: 3 });
        let value = cmd.to_value().unwrap();
        assert_eq!(value, json!({"command": "start mission", "total_drones": 3}));
        assert_eq!(WireMessage::classify(value).unwrap(), cmd);
    }

    #[test]
    fn test_unknown_shapes_rejected() {
        assert!(matches!(
            WireMessage::classify(json!({"hello": "world"})),
            Err(MessageError::Unrecognized(_))
        ));
        assert!(matches!(
            WireMessage::classify(json!({"command": "self destruct"})),
            Err(MessageError::Unrecognized(_))
        ));
        assert!(matches!(
            WireMessage::classify(json!({"id": 1, "gps": "nowhere"})),
            Err(MessageError::Invalid { shape: "status", .. })
        ));
    }
}
