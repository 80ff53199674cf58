//! # offload-sim
//!
//! Slotted discrete-event simulation core comparing a Baseline Lyapunov
//! drift-plus-penalty IoT edge-offload policy against a Predictive
//! MPC+stochastic-optimizer policy, both run against the same stochastic
//! per-slot draws (spec.md §1).
//!
//! [`driver::Simulation`] is the entry point: construct with a validated
//! [`offload_types::ExperimentConfig`] and an [`optimizer::AnyOptimizer`],
//! then call [`driver::Simulation::run`].

pub mod cancellation;
pub mod config;
pub mod csv_export;
pub mod error;
pub mod events;
pub mod driver;
pub mod optimizer;
pub mod policy;
pub mod rng;
pub mod state;

pub use config::ValidateConfig;
pub use driver::Simulation;
pub use error::{ConfigError, SimError};
