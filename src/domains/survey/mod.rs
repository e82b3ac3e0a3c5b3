pub mod area;
pub mod coverage;
pub mod partition;
pub mod ports;

pub use area::*;
pub use coverage::*;
pub use partition::*;
pub use ports::*;
