//! CSV export/import (supplemented feature, SPEC_FULL 4).
//!
//! Uses the `csv` crate rather than hand-rolled string joins, matching the
//! exact header and row ordering of spec.md 6: all Baseline rows first
//! (slot-major, sensor-minor), then all Predictive rows.

use offload_types::{Algorithm, SimulationState, SlotRecord};
use serde::{Deserialize, Serialize};

use crate::error::SimError;

/// One exported row. Field order is the wire contract — do not reorder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CsvRow {
    pub slot: usize,
    pub algorithm: Algorithm,
    pub sensor_id: String,
    #[serde(rename = "H_l")]
    pub h_l: f64,
    #[serde(rename = "H_o")]
    pub h_o: f64,
    #[serde(rename = "H_k")]
    pub h_k: f64,
    pub alpha: f64,
    #[serde(rename = "local_energy_J")]
    pub local_energy_j: f64,
    #[serde(rename = "tx_energy_J")]
    pub tx_energy_j: f64,
    #[serde(rename = "battery_J")]
    pub battery_j: f64,
    pub arrival_bits: f64,
    #[serde(rename = "harvest_J")]
    pub harvest_j: f64,
}

fn rows_for(records: &[SlotRecord]) -> Vec<CsvRow> {
    let mut rows = Vec::new();
    for record in records {
        for sensor in &record.sensors {
            rows.push(CsvRow {
                slot: record.slot,
                algorithm: record.algorithm,
                sensor_id: sensor.id.clone(),
                h_l: sensor.h_l,
                h_o: sensor.h_o,
                h_k: sensor.h_k,
                alpha: sensor.alpha,
                local_energy_j: sensor.local_energy_j,
                tx_energy_j: sensor.tx_energy_j,
                battery_j: sensor.battery_j,
                arrival_bits: sensor.arrival_bits,
                harvest_j: sensor.harvest_j,
            });
        }
    }
    rows
}

/// Serialize a finished run to CSV text: all Baseline rows, then all
/// Predictive rows (spec.md 6).
pub fn export_csv(state: &SimulationState) -> Result<String, SimError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows_for(&state.baseline_results).into_iter().chain(rows_for(&state.predictive_results)) {
        writer
            .serialize(&row)
            .map_err(|e| SimError::SlotFailure { slot: row.slot, algorithm: row.algorithm, reason: e.to_string() })?;
    }
    let bytes = writer.into_inner().map_err(|e| SimError::SlotFailure {
        slot: 0,
        algorithm: Algorithm::Baseline,
        reason: e.to_string(),
    })?;
    String::from_utf8(bytes).map_err(|e| SimError::SlotFailure {
        slot: 0,
        algorithm: Algorithm::Baseline,
        reason: e.to_string(),
    })
}

/// Parse CSV text back into rows, in file order. Used for the
/// export/parse/re-export idempotence check (spec.md 8).
pub fn parse_csv(text: &str) -> Result<Vec<CsvRow>, SimError> {
    let mut reader = csv::Reader::from_reader(text.as_bytes());
    reader
        .deserialize()
        .collect::<Result<Vec<CsvRow>, csv::Error>>()
        .map_err(|e| SimError::SlotFailure { slot: 0, algorithm: Algorithm::Baseline, reason: e.to_string() })
}
