pub mod error;
pub mod geodesy;

pub use error::*;
pub use geodesy::*;
