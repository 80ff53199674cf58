//! Experiment configuration validation (supplemented feature, SPEC_FULL 4).
//!
//! `ExperimentConfig` itself lives in `offload-types` as a pure data type;
//! validation lives here so the data crate stays dependency-free of the
//! simulation core's error type.

use std::collections::HashSet;

use offload_types::ExperimentConfig;

use crate::error::ConfigError;

/// Reject a configuration before any [`crate::driver::Simulation`] is
/// built from it (spec.md 7 "Configuration error: rejected at entry; no
/// state produced").
pub trait ValidateConfig {
    fn validate(&self) -> Result<(), ConfigError>;
}

impl ValidateConfig for ExperimentConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.sensors.is_empty() {
            return Err(ConfigError::EmptySensorList);
        }
        if self.total_slots == 0 {
            return Err(ConfigError::ZeroSlots);
        }

        let mut seen_sensors = HashSet::new();
        for sensor in &self.sensors {
            if !seen_sensors.insert(sensor.id.as_str()) {
                return Err(ConfigError::DuplicateSensorId(sensor.id.clone()));
            }
        }

        let mut seen_edges = HashSet::new();
        for edge in &self.edges {
            if !seen_edges.insert(edge.id.as_str()) {
                return Err(ConfigError::DuplicateEdgeId(edge.id.clone()));
            }
        }

        for sensor in &self.sensors {
            if !seen_edges.contains(sensor.edge_id.as_str()) {
                return Err(ConfigError::UnknownEdgeReference {
                    sensor_id: sensor.id.clone(),
                    edge_id: sensor.edge_id.clone(),
                });
            }
            if sensor.f_max_hz <= 0.0 {
                return Err(ConfigError::NonPositiveSensorField {
                    sensor_id: sensor.id.clone(),
                    field: "f_max_hz",
                    value: sensor.f_max_hz,
                });
            }
            if sensor.p_max_w < 0.0 {
                return Err(ConfigError::NonPositiveSensorField {
                    sensor_id: sensor.id.clone(),
                    field: "p_max_w",
                    value: sensor.p_max_w,
                });
            }
        }

        let g = &self.globals;
        if g.v <= 0.0 {
            return Err(ConfigError::NonPositiveGlobal { name: "v", value: g.v });
        }
        if g.tau_s <= 0.0 {
            return Err(ConfigError::NonPositiveGlobal { name: "tau_s", value: g.tau_s });
        }
        if g.bandwidth_hz <= 0.0 {
            return Err(ConfigError::NonPositiveGlobal { name: "bandwidth_hz", value: g.bandwidth_hz });
        }
        if g.theta <= 0.0 {
            return Err(ConfigError::NonPositiveGlobal { name: "theta", value: g.theta });
        }
        if g.noise_power_w <= 0.0 {
            return Err(ConfigError::NonPositiveGlobal { name: "noise_power_w", value: g.noise_power_w });
        }

        Ok(())
    }
}
