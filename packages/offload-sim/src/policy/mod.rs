//! The two scheduling policies under comparison (spec.md 4.4 / 4.5).

pub mod baseline;
pub mod predictive;
