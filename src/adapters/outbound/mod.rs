pub mod geojson_boundary;
pub mod kml_boundary;
pub mod peer_file_store;
pub mod random_targets;
pub mod simulated_vehicle;
pub mod tcp_sender;

pub use geojson_boundary::*;
pub use kml_boundary::*;
pub use peer_file_store::*;
pub use random_targets::*;
pub use simulated_vehicle::*;
pub use tcp_sender::*;
