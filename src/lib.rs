pub mod adapters;
pub mod application;
pub mod common;
pub mod config;
pub mod domains;
pub mod logging;

pub use config::Config;

pub use common::*;
