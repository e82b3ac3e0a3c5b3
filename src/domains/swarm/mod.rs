pub mod messages;
pub mod peers;
pub mod ports;
pub mod registry;

pub use messages::*;
pub use peers::*;
pub use ports::*;
pub use registry::*;
