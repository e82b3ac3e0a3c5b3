use std::time::Duration;
use thiserror::Error;

use crate::domains::mission::MissionPhase;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PartitionError {
    #[error("Survey polygon is degenerate: {vertices} vertices")]
    DegeneratePolygon { vertices: usize },

    #[error("Invalid partition request: index {index} of {total_parts} parts")]
    InvalidIndex { index: usize, total_parts: usize },

    #[error("Strip {index} of {total_parts} does not intersect the survey polygon")]
    EmptyRegion { index: usize, total_parts: usize },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanningError {
    #[error("Region has zero area")]
    EmptyRegion,

    #[error("No scan line intersects the region (line spacing {line_spacing_m:.2} m)")]
    NoCoverage { line_spacing_m: f64 },

    #[error("Invalid planning parameter: {reason}")]
    InvalidParameter { reason: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum VehicleError {
    #[error("Vehicle link unavailable: {0}")]
    Link(String),

    #[error("Vehicle rejected command {command}: {reason}")]
    Rejected { command: String, reason: String },

    #[error("Vehicle connection is closed")]
    Closed,
}

#[derive(Error, Debug)]
pub enum MissionError {
    #[error("Critical parameters not applied: {0:?}")]
    CriticalParameters(Vec<String>),

    #[error("Timed out after {timeout:?} during {phase} waiting for {condition}")]
    Timeout {
        phase: MissionPhase,
        condition: String,
        timeout: Duration,
    },

    #[error("Vehicle error during {phase}: {source}")]
    Vehicle {
        phase: MissionPhase,
        #[source]
        source: VehicleError,
    },

    #[error("Mission plan rejected: {0}")]
    InvalidPlan(String),

    #[error("A mission is already running on this vehicle")]
    AlreadyRunning,

    #[error("Partition failed: {0}")]
    Partition(#[from] PartitionError),

    #[error("Planning failed: {0}")]
    Planning(#[from] PlanningError),

    #[error("Boundary unavailable: {0}")]
    Boundary(#[from] BoundaryError),
}

impl MissionError {
    pub fn vehicle(phase: MissionPhase) -> impl FnOnce(VehicleError) -> MissionError {
        move |source| MissionError::Vehicle { phase, source }
    }
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Timed out after {timeout:?} talking to {addr}")]
    Timeout { addr: String, timeout: Duration },

    #[error("I/O error with {addr}: {source}")]
    Io {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

impl TransportError {
    /// Transient failures abandon a single send; the caller keeps running.
    pub fn is_transient(&self) -> bool {
        !matches!(self, TransportError::Encode(_))
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MessageError {
    #[error("Unrecognized message: {0}")]
    Unrecognized(String),

    #[error("Malformed {shape} message: {reason}")]
    Invalid { shape: &'static str, reason: String },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Peer store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Peer store contents invalid: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum BoundaryError {
    #[error("Failed to read boundary file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse GeoJSON: {0}")]
    Parse(String),

    #[error("No polygon found in boundary document")]
    NoPolygon,
}

pub type MissionResult<T> = Result<T, MissionError>;
pub type VehicleResult<T> = Result<T, VehicleError>;
