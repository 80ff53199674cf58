//! Error taxonomy (spec.md 7).
//!
//! Library code returns `Result<_, SimError>`; only the CLI binary
//! flattens into `anyhow` at its boundary, the teacher's split of "library
//! returns typed errors, binary flattens with anyhow".

use thiserror::Error;

/// Errors the simulation core can report. Never produced by `panic!`.
#[derive(Debug, Error)]
pub enum SimError {
    /// Rejected at `ExperimentConfig::validate()`, before any state exists.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The caller's cancellation signal was observed at a cooperative
    /// yield point.
    #[error("simulation cancelled at slot {slot}")]
    Cancelled { slot: usize },

    /// A slot raised an exception the driver could not recover from.
    /// Carries the slot index and policy for diagnosis; partial results
    /// are retained by the caller, not by this error.
    #[error("slot {slot} failed under {algorithm:?}: {reason}")]
    SlotFailure {
        slot: usize,
        algorithm: offload_types::Algorithm,
        reason: String,
    },
}

/// Configuration validation failures (spec.md 7 "Configuration error").
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("experiment configuration has no sensors")]
    EmptySensorList,

    #[error("duplicate sensor id: {0}")]
    DuplicateSensorId(String),

    #[error("duplicate edge id: {0}")]
    DuplicateEdgeId(String),

    #[error("sensor {sensor_id} references unknown edge {edge_id}")]
    UnknownEdgeReference { sensor_id: String, edge_id: String },

    #[error("global constant {name} must be positive, got {value}")]
    NonPositiveGlobal { name: &'static str, value: f64 },

    #[error("sensor {sensor_id} field {field} must be positive, got {value}")]
    NonPositiveSensorField { sensor_id: String, field: &'static str, value: f64 },

    #[error("total_slots must be greater than zero")]
    ZeroSlots,
}
