//! # offload-types
//!
//! Shared data model for the edge-offload scheduling simulation core.
//!
//! These types are used by:
//! - `offload-sim`: the simulation engine that produces and consumes them
//! - `cli`: the experiment runner, for config import and CSV/JSON export
//!
//! ## Conventions
//!
//! - Tagged unions (`ArrivalModel`, `HarvestModel`) use `#[serde(tag = "type")]`
//!   with `snake_case` discriminators (`"poisson"`, `"fixed"`, `"uniform"`, ...).
//!   Field names and discriminators are part of the stable wire contract —
//!   do not rename without a migration plan.
//! - All physical quantities are `f64`. Bits, joules, watts, hertz and seconds
//!   are named in each field's doc comment rather than carried in the type.

use serde::{Deserialize, Serialize};

// ── Arrival / harvest / tagged models ─────────────────────────────────────────

/// How a sensor's per-slot data arrival is generated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ArrivalModel {
    /// K ~ Poisson(lambda), arrival = K * mean_arrival_bits.
    Poisson { lambda: f64 },
    /// Constant arrival per slot (falls back to mean_arrival_bits if absent).
    Fixed { value_bits: Option<f64> },
    /// Uniform(min, max) bits (falls back to [0.5, 1.5] * mean_arrival_bits).
    Uniform { min: Option<f64>, max: Option<f64> },
}

/// How a sensor's per-slot energy harvest is generated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HarvestModel {
    /// With probability p, harvest value_j joules, else 0.
    Bernoulli { p: f64, value_j: f64 },
    /// Always harvest value_j joules.
    Constant { value_j: f64 },
    /// max(0, gaussian(mean_j, std_j)).
    Gaussian { mean_j: f64, std_j: f64 },
}

/// Whether a sensor's offload decision is all-or-nothing or a continuous split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OffloadMode {
    Binary,
    Fractional,
}

// ── Immutable configuration ───────────────────────────────────────────────────

/// Per-sensor configuration, immutable for the lifetime of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    pub id: String,
    /// Mean arrival rate, bits/slot.
    pub mean_arrival_bits: f64,
    pub arrival_model: ArrivalModel,
    /// Initial queue backlog, bits. Split H_l = H_o = initial_queue_bits / 2 at t=0.
    pub initial_queue_bits: f64,
    /// Initial battery energy, joules.
    pub initial_battery_j: f64,
    /// Mean harvest, joules/slot.
    pub mean_harvest_j: f64,
    pub harvest_model: HarvestModel,
    /// Maximum local CPU frequency, Hz.
    pub f_max_hz: f64,
    /// CPU cycles required to process one bit locally.
    pub cycles_per_bit: f64,
    /// Maximum transmit power, W.
    pub p_max_w: f64,
    /// Mean channel gain (linear, not dB).
    pub mean_channel_gain: f64,
    /// Channel gain variance.
    pub channel_variance: f64,
    pub offload_mode: OffloadMode,
    /// Edge-allocation priority weight, w > 0.
    pub priority_weight: f64,
    /// Identifier of the edge server this sensor offloads to.
    pub edge_id: String,
}

/// Edge server configuration, immutable for the lifetime of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeConfig {
    pub id: String,
    /// Edge CPU frequency, Hz.
    pub f_hz: f64,
    /// Informational only; does not affect the single-queue model.
    pub num_cores: u32,
    pub max_frequency_hz: f64,
}

/// Parameters for the bounded stochastic optimizer used by the Predictive policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerParams {
    /// Population size P.
    pub population: usize,
    /// Generations G.
    pub generations: usize,
    /// Mutation probability per gene, mu in [0, 1].
    pub mutation_probability: f64,
    /// Random restarts R (0 means no restarts, just the single run).
    pub restarts: usize,
    pub seed: u64,
}

/// Global parameters shared by both policies, immutable for the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConstants {
    /// Lyapunov trade-off scalar, V > 0.
    pub v: f64,
    /// Slot duration, seconds.
    pub tau_s: f64,
    /// Channel bandwidth, Hz.
    pub bandwidth_hz: f64,
    /// CPU energy coefficient, theta > 0 (E_local = theta * f^3 * tau).
    pub theta: f64,
    /// Noise power, W (sigma^2).
    pub noise_power_w: f64,
    /// Default cycles-per-bit, used only where a sensor omits its own.
    pub default_cycles_per_bit: f64,
    /// Prediction horizon H >= 0 (0 disables the Predictive optimizer).
    pub horizon: usize,
    pub optimizer: OptimizerParams,
    /// Seed for the deterministic RNG (Baseline gets `seed`, Predictive gets `seed + 1`).
    pub seed: u64,
    /// Route the Predictive policy's prediction noise through its seeded RNG
    /// (false, default) instead of an unseeded source (true, legacy replication mode).
    #[serde(default)]
    pub legacy_unseeded_predictor_noise: bool,
    /// Per-decision optimizer wall-clock budget in milliseconds (0 = unbounded).
    #[serde(default)]
    pub optimizer_time_budget_ms: u64,
}

/// Top-level, fully-specified experiment configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub sensors: Vec<SensorConfig>,
    pub edges: Vec<EdgeConfig>,
    pub globals: GlobalConstants,
    pub total_slots: usize,
}

// ── Per-slot decisions and records ────────────────────────────────────────────

/// The decision vector a policy returns for one sensor in one slot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Decision {
    /// Offload fraction in [0, 1]. In binary mode this is 0.0 or 1.0.
    pub alpha: f64,
    /// Binary scheduling bit (kappa), meaningful in binary mode.
    pub kappa: bool,
    /// Local CPU frequency, Hz.
    pub f_cpu_hz: f64,
    /// Transmit power, W.
    pub p_tx_w: f64,
    /// Edge resource share xi in [0, 1], filled in by the edge allocator.
    pub xi: f64,
}

/// Which policy produced a given record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    Baseline,
    Predictive,
}

/// Per-sensor outcome of one slot, for one policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorSlotResult {
    pub id: String,
    pub h_l: f64,
    pub h_o: f64,
    pub h_k: f64,
    pub alpha: f64,
    pub local_energy_j: f64,
    pub tx_energy_j: f64,
    pub p_tx_w: f64,
    pub f_cpu_hz: f64,
    pub arrival_bits: f64,
    pub harvest_j: f64,
    pub battery_j: f64,
}

/// One sensor's share of one edge server's resources in a slot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EdgeShare {
    pub xi: f64,
    pub processed_bits: f64,
}

/// Edge-server-side outcome of one slot: each sensor's share keyed by sensor id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeSlotResult {
    pub edge_id: String,
    pub shares: Vec<(String, EdgeShare)>,
}

/// Global, run-wide metrics computed once per slot (spec.md 4.6 step 3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GlobalMetrics {
    pub total_backlog_bits: f64,
    pub total_energy_j: f64,
    pub best_fitness: f64,
    pub avg_latency_ms: f64,
}

/// The full record of one policy's outcome for one slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotRecord {
    pub slot: usize,
    pub algorithm: Algorithm,
    pub sensors: Vec<SensorSlotResult>,
    pub edges: Vec<EdgeSlotResult>,
    pub metrics: GlobalMetrics,
}

/// One telemetry entry emitted after a generation of the Predictive optimizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerLogEntry {
    pub sensor_id: String,
    pub slot: usize,
    pub generation: usize,
    pub best_fitness: f64,
    pub avg_fitness: f64,
    pub infeasible_count: usize,
    pub elapsed_ms: u64,
}

/// Run status, mirrors spec.md 4.6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Error,
    Cancelled,
}

/// The full, streamable state of a simulation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationState {
    /// 128-bit identifier in canonical 8-4-4-4-12 hex form.
    pub run_id: String,
    pub status: RunStatus,
    pub current_slot: usize,
    pub total_slots: usize,
    pub baseline_results: Vec<SlotRecord>,
    pub predictive_results: Vec<SlotRecord>,
    pub optimizer_log: Vec<OptimizerLogEntry>,
}

impl SimulationState {
    pub fn new(run_id: String, total_slots: usize) -> Self {
        Self {
            run_id,
            status: RunStatus::Running,
            current_slot: 0,
            total_slots,
            baseline_results: Vec::with_capacity(total_slots),
            predictive_results: Vec::with_capacity(total_slots),
            optimizer_log: Vec::new(),
        }
    }
}
