pub mod tcp_listener;

pub use tcp_listener::*;
