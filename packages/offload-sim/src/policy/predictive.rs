//! Predictive MPC + stochastic-optimizer policy (spec component C4b).
//!
//! Layered atop [`super::baseline`]: rolling EWMA prediction windows feed a
//! pluggable [`crate::optimizer::Optimizer`] that searches the same
//! three-gene action space the Baseline policy computes in closed form.
//! Grounded the same way as the rest of the core — small free functions
//! over plain structs, no hidden mutable globals.

use std::collections::VecDeque;

use offload_types::{Decision, EdgeConfig, GlobalConstants, OffloadMode, OptimizerLogEntry, SensorConfig};

use crate::optimizer::{AnyOptimizer, GeneBounds, Genome, Optimizer};
use crate::policy::baseline;
use crate::rng::Rng;
use crate::state::{edge_service_bits, effective_cycles_per_bit, local_energy_j, local_service_bits, tx_rate_bits, SensorState};

/// Rolling window size, spec.md 4.5.
const WINDOW_SIZE: usize = 50;
/// EWMA smoothing factor, spec.md 4.5.
const EWMA_ALPHA: f64 = 0.3;
/// Geometric discount per horizon step, spec.md 4.5.
const DISCOUNT: f64 = 0.95;
/// Infeasibility penalty, spec.md 4.5.
const PENALTY: f64 = 1e6;

/// A fixed-capacity, newest-last FIFO window of recent observations.
#[derive(Debug, Clone, Default)]
pub struct RollingWindow {
    values: VecDeque<f64>,
}

impl RollingWindow {
    pub fn push(&mut self, value: f64) {
        if self.values.len() == WINDOW_SIZE {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    /// EWMA over the window, newest-weighted, falling back to `fallback`
    /// when the window is empty.
    pub fn ewma(&self, fallback: f64) -> f64 {
        let mut iter = self.values.iter();
        let Some(&first) = iter.next() else {
            return fallback;
        };
        let mut acc = first;
        for &v in iter {
            acc = EWMA_ALPHA * v + (1.0 - EWMA_ALPHA) * acc;
        }
        acc
    }
}

/// Per-sensor prediction state: one rolling window per observed signal.
#[derive(Debug, Clone, Default)]
pub struct SensorPredictor {
    pub arrival: RollingWindow,
    pub harvest: RollingWindow,
    pub channel: RollingWindow,
}

impl SensorPredictor {
    /// Append one realized slot's observations (spec.md 4.5: "after each
    /// realized slot, the three new observations are appended").
    pub fn observe(&mut self, arrival_bits: f64, harvest_j: f64, channel_gain: f64) {
        self.arrival.push(arrival_bits);
        self.harvest.push(harvest_j);
        self.channel.push(channel_gain);
    }
}

/// One horizon step's predicted events.
#[derive(Debug, Clone, Copy)]
pub struct PredictedSlot {
    pub arrival_bits: f64,
    pub harvest_j: f64,
    pub channel_gain: f64,
}

/// Emit `horizon` predicted slots, each the EWMA times independent uniform
/// noise (spec.md 4.5). `noise_rng` is the seeded stream by default
/// (`legacy_unseeded_predictor_noise = false`); pass an unseeded stream to
/// replicate the legacy behavior the open question names.
pub fn predict(
    predictor: &SensorPredictor,
    horizon: usize,
    mean_arrival_bits: f64,
    mean_harvest_j: f64,
    mean_channel_gain: f64,
    noise_rng: &mut Rng,
) -> Vec<PredictedSlot> {
    let base_arrival = predictor.arrival.ewma(mean_arrival_bits);
    let base_harvest = predictor.harvest.ewma(mean_harvest_j);
    let base_channel = predictor.channel.ewma(mean_channel_gain);

    (0..horizon)
        .map(|_| PredictedSlot {
            arrival_bits: base_arrival * noise_rng.uniform(0.9, 1.1),
            harvest_j: base_harvest * noise_rng.uniform(0.8, 1.2),
            channel_gain: base_channel * noise_rng.uniform(0.85, 1.15),
        })
        .collect()
}

/// Gene bounds for the three-gene action space, spec.md 4.5: alpha in
/// [0,1], normalized frequency in [0.1,1], normalized power in [0,1].
pub fn gene_bounds() -> Vec<GeneBounds> {
    vec![
        GeneBounds { min: 0.0, max: 1.0 },
        GeneBounds { min: 0.1, max: 1.0 },
        GeneBounds { min: 0.0, max: 1.0 },
    ]
}

/// Map a raw gene vector to the physical action space. `offload_mode`
/// governs gene 0: binary-mode sensors round it to a hard 0/1 scheduling
/// choice (spec.md 3 "kappa in {0,1} in binary mode"), fractional-mode
/// sensors keep it continuous. Used both by [`fitness`] (so the optimizer
/// searches within the feasible set) and by [`decide`] (so what gets
/// committed matches what was scored).
fn denormalize(genome: &Genome, sensor: &SensorConfig) -> (f64, f64, f64) {
    let alpha = match sensor.offload_mode {
        OffloadMode::Binary => {
            if genome[0] >= 0.5 {
                1.0
            } else {
                0.0
            }
        }
        OffloadMode::Fractional => genome[0],
    };
    let f_cpu_hz = genome[1] * sensor.f_max_hz;
    let p_tx_w = genome[2] * sensor.p_max_w;
    (alpha, f_cpu_hz, p_tx_w)
}

/// Simulate `predictions.len()` future slots under a candidate genome,
/// starting from `state`, and return the discounted cost (spec.md 4.5
/// "Fitness"). Edge-side service uses `edge_xi` as a fixed share estimate —
/// the optimizer reasons about one sensor at a time, so it cannot know the
/// eventual allocator output; using the sensor's last committed share is
/// the natural stand-in.
#[allow(clippy::too_many_arguments)]
pub fn fitness(
    genome: &Genome,
    sensor: &SensorConfig,
    edge: &EdgeConfig,
    globals: &GlobalConstants,
    state: &SensorState,
    predictions: &[PredictedSlot],
    edge_xi: f64,
) -> f64 {
    let bounds = gene_bounds();
    for (g, b) in genome.iter().zip(bounds.iter()) {
        if *g < b.min - 1e-9 || *g > b.max + 1e-9 {
            return PENALTY;
        }
    }

    let (alpha, f_cpu_hz, p_tx_w) = denormalize(genome, sensor);
    let cycles_per_bit = effective_cycles_per_bit(sensor, globals);

    let mut sim = *state;
    let mut cost = 0.0;
    let mut infeasible = false;

    for (h, pred) in predictions.iter().enumerate() {
        let local_bits = local_service_bits(f_cpu_hz, globals.tau_s, cycles_per_bit);
        let offload_bits = tx_rate_bits(p_tx_w, globals.bandwidth_hz, pred.channel_gain, globals.noise_power_w, globals.tau_s);
        let edge_bits = edge_service_bits(edge_xi, edge.f_hz, globals.tau_s, cycles_per_bit);
        let local_energy = local_energy_j(globals.theta, f_cpu_hz, globals.tau_s);
        let tx_energy = p_tx_w * globals.tau_s;

        if sim.battery_j - local_energy < 0.0 {
            infeasible = true;
        }

        let step_cost = globals.v * (local_energy + tx_energy)
            + sim.h_l * ((1.0 - alpha) * pred.arrival_bits - local_bits)
            + sim.h_o * (alpha * pred.arrival_bits - offload_bits);
        cost += DISCOUNT.powi(h as i32) * step_cost;

        sim.advance(
            alpha,
            crate::state::SlotService {
                local_bits,
                offload_bits,
                edge_bits,
                local_energy_j: local_energy,
            },
            pred.arrival_bits,
            pred.harvest_j,
        );
    }

    if infeasible {
        cost += PENALTY;
    }
    cost
}

/// Telemetry plus the chosen decision for one sensor's Predictive-policy
/// slot, returned together so the driver can both commit the decision and
/// append the optimizer log.
pub struct PredictiveOutcome {
    pub decision: Decision,
    pub log: Vec<OptimizerLogEntry>,
}

/// Decide one sensor's action for this slot. When `horizon == 0`, bypasses
/// the optimizer entirely and defers to the Baseline closed form (spec.md
/// 4.5 "Fallback").
#[allow(clippy::too_many_arguments)]
pub fn decide(
    sensor: &SensorConfig,
    edge: &EdgeConfig,
    state: &SensorState,
    globals: &GlobalConstants,
    channel_gain: f64,
    predictor: &SensorPredictor,
    edge_xi: f64,
    optimizer: &AnyOptimizer,
    rng: &mut Rng,
    slot: usize,
    elapsed_ms: impl Fn() -> u64,
) -> PredictiveOutcome {
    if globals.horizon == 0 {
        let mut decision = baseline::decide(sensor, state, globals, channel_gain);
        decision.xi = edge_xi;
        return PredictiveOutcome { decision, log: Vec::new() };
    }

    // Non-legacy: noise shares the same seeded stream the optimizer search
    // draws from (spec.md 9 open question #1). Legacy: an independent,
    // non-reproducible entropy-seeded stream, matching the reference.
    let mut legacy_noise_rng = globals.legacy_unseeded_predictor_noise.then(Rng::from_entropy);
    let predictions = match legacy_noise_rng.as_mut() {
        Some(noise_rng) => predict(
            predictor,
            globals.horizon,
            sensor.mean_arrival_bits,
            sensor.mean_harvest_j,
            sensor.mean_channel_gain,
            noise_rng,
        ),
        None => predict(
            predictor,
            globals.horizon,
            sensor.mean_arrival_bits,
            sensor.mean_harvest_j,
            sensor.mean_channel_gain,
            rng,
        ),
    };

    let bounds = gene_bounds();
    let fitness_fn = |g: &Genome| fitness(g, sensor, edge, globals, state, &predictions, edge_xi);
    let result = optimizer.optimize(&bounds, &fitness_fn, rng, &sensor.id, slot, elapsed_ms);

    let (alpha, f_cpu_hz, p_tx_w) = denormalize(&result.best_genome, sensor);
    let decision = Decision {
        alpha,
        kappa: alpha >= 0.5,
        f_cpu_hz,
        p_tx_w,
        xi: edge_xi,
    };
    PredictiveOutcome { decision, log: result.log }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::GeneticOptimizer;
    use offload_types::{ArrivalModel, HarvestModel, OffloadMode, OptimizerParams};

    fn sensor() -> SensorConfig {
        SensorConfig {
            id: "s1".into(),
            mean_arrival_bits: 1000.0,
            arrival_model: ArrivalModel::Fixed { value_bits: Some(1000.0) },
            initial_queue_bits: 100.0,
            initial_battery_j: 5.0,
            mean_harvest_j: 1.0,
            harvest_model: HarvestModel::Constant { value_j: 1.0 },
            f_max_hz: 1e9,
            cycles_per_bit: 1000.0,
            p_max_w: 0.2,
            mean_channel_gain: 1e-3,
            channel_variance: 1e-8,
            offload_mode: OffloadMode::Fractional,
            priority_weight: 1.0,
            edge_id: "e1".into(),
        }
    }

    fn edge() -> EdgeConfig {
        EdgeConfig { id: "e1".into(), f_hz: 2e9, num_cores: 4, max_frequency_hz: 2e9 }
    }

    fn globals(horizon: usize) -> GlobalConstants {
        GlobalConstants {
            v: 1.0,
            tau_s: 1.0,
            bandwidth_hz: 1e6,
            theta: 1e-27,
            noise_power_w: 1e-9,
            default_cycles_per_bit: 1000.0,
            horizon,
            optimizer: OptimizerParams { population: 10, generations: 5, mutation_probability: 0.2, restarts: 0, seed: 1 },
            seed: 1,
            legacy_unseeded_predictor_noise: false,
            optimizer_time_budget_ms: 0,
        }
    }

    #[test]
    fn rolling_window_falls_back_to_mean_when_empty() {
        let w = RollingWindow::default();
        assert_eq!(w.ewma(42.0), 42.0);
    }

    #[test]
    fn rolling_window_caps_at_window_size() {
        let mut w = RollingWindow::default();
        for i in 0..(WINDOW_SIZE + 10) {
            w.push(i as f64);
        }
        assert_eq!(w.values.len(), WINDOW_SIZE);
    }

    #[test]
    fn predict_noise_is_bounded_around_ewma() {
        let mut predictor = SensorPredictor::default();
        predictor.observe(1000.0, 1.0, 1e-3);
        let mut rng = Rng::new(5);
        let preds = predict(&predictor, 5, 1000.0, 1.0, 1e-3, &mut rng);
        for p in preds {
            assert!(p.arrival_bits >= 900.0 && p.arrival_bits <= 1100.0);
            assert!(p.harvest_j >= 0.8 && p.harvest_j <= 1.2);
        }
    }

    #[test]
    fn zero_horizon_bypasses_optimizer() {
        let s = sensor();
        let e = edge();
        let g = globals(0);
        let state = SensorState::initial(&s);
        let predictor = SensorPredictor::default();
        let optimizer = AnyOptimizer::Genetic(GeneticOptimizer { population: 5, generations: 2, mutation_probability: 0.1, restarts: 0, budget_ms: 0 });
        let mut rng = Rng::new(1);
        let outcome = decide(&s, &e, &state, &g, 1e-3, &predictor, 1.0, &optimizer, &mut rng, 0, || 0);
        assert!(outcome.log.is_empty());
    }

    #[test]
    fn positive_horizon_runs_optimizer_and_produces_bounded_decision() {
        let s = sensor();
        let e = edge();
        let g = globals(3);
        let state = SensorState::initial(&s);
        let predictor = SensorPredictor::default();
        let optimizer = AnyOptimizer::Genetic(GeneticOptimizer { population: 8, generations: 3, mutation_probability: 0.2, restarts: 0, budget_ms: 0 });
        let mut rng = Rng::new(1);
        let outcome = decide(&s, &e, &state, &g, 1e-3, &predictor, 1.0, &optimizer, &mut rng, 0, || 0);
        assert!(!outcome.log.is_empty());
        assert!(outcome.decision.alpha >= 0.0 && outcome.decision.alpha <= 1.0);
        assert!(outcome.decision.f_cpu_hz >= 0.1 * s.f_max_hz && outcome.decision.f_cpu_hz <= s.f_max_hz);
    }

    #[test]
    fn fitness_penalizes_out_of_bounds_genes() {
        let s = sensor();
        let e = edge();
        let g = globals(2);
        let state = SensorState::initial(&s);
        let predictor = SensorPredictor::default();
        let mut rng = Rng::new(3);
        let predictions = predict(&predictor, 2, s.mean_arrival_bits, s.mean_harvest_j, s.mean_channel_gain, &mut rng);
        let bad = vec![2.0, 0.5, 0.5];
        assert_eq!(fitness(&bad, &s, &e, &g, &state, &predictions, 1.0), PENALTY);
    }
}
