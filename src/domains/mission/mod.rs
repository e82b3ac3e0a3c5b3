pub mod executor;
pub mod guard;
pub mod params;
pub mod plan;
pub mod pursuit;
pub mod vehicle;

pub use executor::*;
pub use guard::*;
pub use params::*;
pub use plan::*;
pub use pursuit::*;
pub use vehicle::*;
