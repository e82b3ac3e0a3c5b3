pub mod peer_telemetry_service;
pub mod survey_mission_service;
pub mod swarm_coordinator;
pub mod target_pursuit_service;

pub use peer_telemetry_service::*;
pub use survey_mission_service::*;
pub use swarm_coordinator::*;
pub use target_pursuit_service::*;
