//! Discrete-event slotted simulation driver (spec component C5).
//!
//! Runs both policies in lockstep, each against its own state copies and
//! its own RNG streams, and assembles the streamable [`SimulationState`]
//! spec.md 4.6/6 describes. Grounded on
//! `packages/uwb-simulator/src/boat_sim.rs`'s tick loop: advance every
//! entity, snapshot, notify, repeat.

use std::collections::HashMap;
use std::time::Instant;

use offload_types::{
    Algorithm, Decision, EdgeConfig, EdgeShare, EdgeSlotResult, ExperimentConfig, GlobalMetrics, OptimizerLogEntry,
    RunStatus, SensorConfig, SensorSlotResult, SimulationState, SlotRecord,
};
use tracing::{debug, trace};
use uuid::Uuid;

use crate::cancellation::CancellationToken;
use crate::config::ValidateConfig;
use crate::error::SimError;
use crate::optimizer::AnyOptimizer;
use crate::policy::{baseline, predictive};
use crate::rng::Rng;
use crate::state::SensorState;

/// Cooperative yield cadence, spec.md 5.
const YIELD_EVERY_N_SLOTS: usize = 10;

/// Minimum latency denominator, spec.md 4.6 step 3.
const MIN_LATENCY_DENOMINATOR: f64 = 1e5;

/// A fully validated experiment plus the optimizer implementation the
/// Predictive policy will use. Construct via [`Simulation::new`], which
/// performs the spec.md 7 "rejected at entry, no state produced" check.
pub struct Simulation {
    config: ExperimentConfig,
    optimizer: AnyOptimizer,
}

impl Simulation {
    pub fn new(config: ExperimentConfig, optimizer: AnyOptimizer) -> Result<Self, SimError> {
        config.validate()?;
        Ok(Self { config, optimizer })
    }

    /// Run the full slot loop. Always returns a [`SimulationState`], even
    /// on cancellation or slot failure — status communicates the outcome,
    /// per spec.md 7 ("errors are reported by return value, never by
    /// crashing the process").
    pub fn run(
        &self,
        cancellation: &CancellationToken,
        mut on_progress: impl FnMut(&SimulationState),
        mut on_optimizer_log: impl FnMut(&OptimizerLogEntry),
    ) -> SimulationState {
        let run_id = Uuid::new_v4().to_string();
        let mut state = SimulationState::new(run_id, self.config.total_slots);

        let edges_by_id: HashMap<&str, &EdgeConfig> = self.config.edges.iter().map(|e| (e.id.as_str(), e)).collect();

        let mut baseline_states: HashMap<String, SensorState> =
            self.config.sensors.iter().map(|s| (s.id.clone(), SensorState::initial(s))).collect();
        let mut predictive_states: HashMap<String, SensorState> =
            self.config.sensors.iter().map(|s| (s.id.clone(), SensorState::initial(s))).collect();
        let mut predictors: HashMap<String, predictive::SensorPredictor> =
            self.config.sensors.iter().map(|s| (s.id.clone(), predictive::SensorPredictor::default())).collect();

        let mut baseline_rng = Rng::new(self.config.globals.seed);
        let mut predictive_rng = Rng::new(self.config.globals.seed.wrapping_add(1));

        for slot in 0..self.config.total_slots {
            let baseline_record =
                self.run_baseline_slot(slot, &edges_by_id, &mut baseline_states, &mut baseline_rng);
            state.baseline_results.push(baseline_record);

            let (predictive_record, log_entries) = self.run_predictive_slot(
                slot,
                &edges_by_id,
                &mut predictive_states,
                &mut predictors,
                &mut predictive_rng,
            );
            for entry in &log_entries {
                on_optimizer_log(entry);
            }
            state.optimizer_log.extend(log_entries);
            state.predictive_results.push(predictive_record);

            state.current_slot = slot + 1;
            on_progress(&state);

            if (slot + 1) % YIELD_EVERY_N_SLOTS == 0 && cancellation.is_cancelled() {
                debug!(slot, "simulation cancelled at cooperative yield point");
                state.status = RunStatus::Cancelled;
                return state;
            }
        }

        state.status = RunStatus::Completed;
        state
    }

    fn run_baseline_slot(
        &self,
        slot: usize,
        edges_by_id: &HashMap<&str, &EdgeConfig>,
        states: &mut HashMap<String, SensorState>,
        rng: &mut Rng,
    ) -> SlotRecord {
        let globals = &self.config.globals;
        let xi_by_sensor = compute_edge_shares(&self.config.sensors, states);

        let mut sensor_results = Vec::with_capacity(self.config.sensors.len());
        let mut edge_accum: HashMap<String, Vec<(String, EdgeShare)>> = HashMap::new();

        for sensor in &self.config.sensors {
            let edge = edges_by_id[sensor.edge_id.as_str()];
            let events = crate::events::generate_slot_events(sensor, rng);
            let state = *states.get(&sensor.id).expect("state initialized for every configured sensor");

            let mut decision = baseline::decide(sensor, &state, globals, events.channel_gain);
            decision.xi = xi_by_sensor.get(&sensor.id).copied().unwrap_or(0.0);

            let (result, share) = self.commit_decision(
                sensor,
                edge,
                &state,
                &decision,
                &events,
                globals,
                states,
            );
            sensor_results.push(result);
            edge_accum.entry(edge.id.clone()).or_default().push((sensor.id.clone(), share));
        }

        trace!(slot, algorithm = "baseline", "slot processed");
        finish_slot_record(slot, Algorithm::Baseline, sensor_results, edge_accum)
    }

    fn run_predictive_slot(
        &self,
        slot: usize,
        edges_by_id: &HashMap<&str, &EdgeConfig>,
        states: &mut HashMap<String, SensorState>,
        predictors: &mut HashMap<String, predictive::SensorPredictor>,
        rng: &mut Rng,
    ) -> (SlotRecord, Vec<OptimizerLogEntry>) {
        let globals = &self.config.globals;
        let xi_by_sensor = compute_edge_shares(&self.config.sensors, states);

        let mut sensor_results = Vec::with_capacity(self.config.sensors.len());
        let mut edge_accum: HashMap<String, Vec<(String, EdgeShare)>> = HashMap::new();
        let mut all_log = Vec::new();

        for sensor in &self.config.sensors {
            let edge = edges_by_id[sensor.edge_id.as_str()];
            let events = crate::events::generate_slot_events(sensor, rng);
            let state = *states.get(&sensor.id).expect("state initialized for every configured sensor");
            let predictor = predictors.get(&sensor.id).expect("predictor initialized for every configured sensor");
            let xi = xi_by_sensor.get(&sensor.id).copied().unwrap_or(0.0);

            let optimize_start = Instant::now();
            let outcome = predictive::decide(
                sensor,
                edge,
                &state,
                globals,
                events.channel_gain,
                predictor,
                xi,
                &self.optimizer,
                rng,
                slot,
                || optimize_start.elapsed().as_millis() as u64,
            );
            all_log.extend(outcome.log);

            let (result, share) = self.commit_decision(
                sensor,
                edge,
                &state,
                &outcome.decision,
                &events,
                globals,
                states,
            );
            sensor_results.push(result);
            edge_accum.entry(edge.id.clone()).or_default().push((sensor.id.clone(), share));

            predictors
                .get_mut(&sensor.id)
                .expect("predictor initialized for every configured sensor")
                .observe(events.arrival_bits, events.harvest_j, events.channel_gain);
        }

        trace!(slot, algorithm = "predictive", "slot processed");
        (finish_slot_record(slot, Algorithm::Predictive, sensor_results, edge_accum), all_log)
    }

    /// Commit a decision to state and build the per-sensor record plus
    /// this sensor's edge share, shared between both policies (spec.md 9
    /// "share derivation helpers ... as free functions").
    fn commit_decision(
        &self,
        sensor: &SensorConfig,
        edge: &EdgeConfig,
        state_before: &SensorState,
        decision: &Decision,
        events: &crate::events::SlotEvents,
        globals: &offload_types::GlobalConstants,
        states: &mut HashMap<String, SensorState>,
    ) -> (SensorSlotResult, EdgeShare) {
        let service = baseline::derived_service(sensor, edge, decision, globals, events.channel_gain);
        let tx_energy_j = decision.p_tx_w * globals.tau_s;

        let mut updated = *state_before;
        updated.advance(decision.alpha, service, events.arrival_bits, events.harvest_j);
        states.insert(sensor.id.clone(), updated);

        let result = SensorSlotResult {
            id: sensor.id.clone(),
            h_l: updated.h_l,
            h_o: updated.h_o,
            h_k: updated.h_k,
            alpha: decision.alpha,
            local_energy_j: service.local_energy_j,
            tx_energy_j,
            p_tx_w: decision.p_tx_w,
            f_cpu_hz: decision.f_cpu_hz,
            arrival_bits: events.arrival_bits,
            harvest_j: events.harvest_j,
            battery_j: updated.battery_j,
        };
        let share = EdgeShare { xi: decision.xi, processed_bits: service.edge_bits };
        (result, share)
    }
}

/// Sub-problem 4 across every edge server: allocate shares proportional to
/// `priority_weight * h_k`, uniform fallback when the total is zero
/// (spec.md 4.4).
fn compute_edge_shares(sensors: &[SensorConfig], states: &HashMap<String, SensorState>) -> HashMap<String, f64> {
    let mut by_edge: HashMap<&str, Vec<(String, f64)>> = HashMap::new();
    for sensor in sensors {
        let h_k = states.get(&sensor.id).map(|s| s.h_k).unwrap_or(0.0);
        by_edge.entry(sensor.edge_id.as_str()).or_default().push((sensor.id.clone(), sensor.priority_weight * h_k));
    }

    let mut result = HashMap::with_capacity(sensors.len());
    for weighted in by_edge.values() {
        for (id, share) in baseline::edge_allocation(weighted) {
            result.insert(id, share);
        }
    }
    result
}

fn finish_slot_record(
    slot: usize,
    algorithm: Algorithm,
    sensors: Vec<SensorSlotResult>,
    edge_accum: HashMap<String, Vec<(String, EdgeShare)>>,
) -> SlotRecord {
    let total_backlog_bits: f64 = sensors.iter().map(|s| s.h_l + s.h_o + s.h_k).sum();
    let total_energy_j: f64 = sensors.iter().map(|s| s.local_energy_j + s.tx_energy_j).sum();
    let avg_latency_ms = if sensors.is_empty() {
        0.0
    } else {
        sensors
            .iter()
            .map(|s| (s.h_l + s.h_o + s.h_k) / s.arrival_bits.max(MIN_LATENCY_DENOMINATOR) * 1000.0)
            .sum::<f64>()
            / sensors.len() as f64
    };
    let best_fitness = -total_energy_j - 0.01 * total_backlog_bits;

    let edges = edge_accum.into_iter().map(|(edge_id, shares)| EdgeSlotResult { edge_id, shares }).collect();

    SlotRecord {
        slot,
        algorithm,
        sensors,
        edges,
        metrics: GlobalMetrics { total_backlog_bits, total_energy_j, best_fitness, avg_latency_ms },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use offload_types::{ArrivalModel, GlobalConstants, HarvestModel, OffloadMode, OptimizerParams};

    fn sensor(id: &str, priority_weight: f64) -> SensorConfig {
        SensorConfig {
            id: id.into(),
            mean_arrival_bits: 100_000.0,
            arrival_model: ArrivalModel::Fixed { value_bits: Some(100_000.0) },
            initial_queue_bits: 0.0,
            initial_battery_j: 100.0,
            mean_harvest_j: 0.5,
            harvest_model: HarvestModel::Constant { value_j: 0.5 },
            f_max_hz: 1e9,
            cycles_per_bit: 1000.0,
            p_max_w: 0.0,
            mean_channel_gain: 1e-3,
            channel_variance: 0.0,
            offload_mode: OffloadMode::Binary,
            priority_weight,
            edge_id: "e1".into(),
        }
    }

    fn config(sensors: Vec<SensorConfig>, total_slots: usize, horizon: usize) -> ExperimentConfig {
        ExperimentConfig {
            sensors,
            edges: vec![EdgeConfig { id: "e1".into(), f_hz: 2e9, num_cores: 4, max_frequency_hz: 2e9 }],
            globals: GlobalConstants {
                v: 1.0,
                tau_s: 1.0,
                bandwidth_hz: 1e6,
                theta: 1e-27,
                noise_power_w: 1e-9,
                default_cycles_per_bit: 1000.0,
                horizon,
                optimizer: OptimizerParams { population: 10, generations: 5, mutation_probability: 0.2, restarts: 0, seed: 1 },
                seed: 42,
                legacy_unseeded_predictor_noise: false,
                optimizer_time_budget_ms: 0,
            },
            total_slots,
        }
    }

    fn genetic_optimizer() -> AnyOptimizer {
        AnyOptimizer::Genetic(crate::optimizer::GeneticOptimizer {
            population: 10,
            generations: 4,
            mutation_probability: 0.2,
            restarts: 0,
            budget_ms: 0,
        })
    }

    #[test]
    fn run_produces_one_record_per_slot_per_policy() {
        let cfg = config(vec![sensor("s1", 1.0), sensor("s2", 1.0)], 20, 2);
        let sim = Simulation::new(cfg, genetic_optimizer()).unwrap();
        let token = CancellationToken::new();
        let state = sim.run(&token, |_| {}, |_| {});
        assert_eq!(state.status, RunStatus::Completed);
        assert_eq!(state.baseline_results.len(), 20);
        assert_eq!(state.predictive_results.len(), 20);
    }

    #[test]
    fn purely_local_scenario_decreases_h_l_each_slot_once_backlog_exists() {
        // p_max = 0 forces C_o = 0, so everything routes locally once queued.
        let cfg = config(vec![sensor("s1", 1.0)], 10, 0);
        let sim = Simulation::new(cfg, genetic_optimizer()).unwrap();
        let token = CancellationToken::new();
        let state = sim.run(&token, |_| {}, |_| {});
        for record in &state.baseline_results {
            assert_eq!(record.sensors[0].alpha, 0.0); // kappa local since H_o never exceeds H_l with p_max = 0
        }
    }

    #[test]
    fn p_max_zero_keeps_edge_queue_at_zero() {
        let cfg = config(vec![sensor("s1", 1.0)], 10, 0);
        let sim = Simulation::new(cfg, genetic_optimizer()).unwrap();
        let token = CancellationToken::new();
        let state = sim.run(&token, |_| {}, |_| {});
        for record in &state.baseline_results {
            assert_eq!(record.sensors[0].h_k, 0.0);
        }
    }

    #[test]
    fn priority_weight_doubles_edge_share_at_equal_backlog() {
        let sensors = vec![sensor("s1", 1.0), sensor("s2", 2.0)];
        let states: HashMap<String, SensorState> = sensors
            .iter()
            .map(|s| {
                let mut state = SensorState::initial(s);
                state.h_k = 10.0;
                (s.id.clone(), state)
            })
            .collect();
        let shares = compute_edge_shares(&sensors, &states);
        assert!((shares["s2"] / shares["s1"] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn zero_horizon_matches_baseline_decision_for_decision() {
        let cfg = config(vec![sensor("s1", 1.0), sensor("s2", 1.0)], 15, 0);
        let sim = Simulation::new(cfg, genetic_optimizer()).unwrap();
        let token = CancellationToken::new();
        let state = sim.run(&token, |_| {}, |_| {});
        for (b, p) in state.baseline_results.iter().zip(state.predictive_results.iter()) {
            for (bs, ps) in b.sensors.iter().zip(p.sensors.iter()) {
                assert_eq!(bs.alpha, ps.alpha);
                assert!((bs.f_cpu_hz - ps.f_cpu_hz).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn cancellation_stops_the_loop_and_preserves_partial_results() {
        let cfg = config(vec![sensor("s1", 1.0)], 100, 0);
        let sim = Simulation::new(cfg, genetic_optimizer()).unwrap();
        let token = CancellationToken::new();
        let token_for_callback = token.clone();
        let state = sim.run(
            &token,
            move |s| {
                if s.current_slot == 10 {
                    token_for_callback.cancel();
                }
            },
            |_| {},
        );
        assert_eq!(state.status, RunStatus::Cancelled);
        assert_eq!(state.baseline_results.len(), 10);
        assert!(state.baseline_results.len() < 100);
    }
}
