//! Sensor/edge state machine (spec component C3).
//!
//! Grounded on `packages/uwb-simulator/src/boat_sim.rs::BoatSim::tick`: a
//! plain struct holding one entity's mutable state, advanced in place each
//! tick from a config plus that tick's inputs. Here the entity is a
//! sensor's queue triple and battery instead of a boat's pose.
//!
//! The derivation helpers (`local_service_bits`, `tx_rate_bits`, ...) are
//! free functions rather than methods on a policy type, per the "share
//! derivation helpers ... as free functions parameterized by global
//! constants" guidance — both the Baseline and Predictive policies call
//! the same functions.

use offload_types::{GlobalConstants, SensorConfig};

/// One sensor's mutable runtime state: the queue triple and battery.
/// Owned independently per policy — never shared, per spec.md 3 Lifecycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorState {
    /// Local queue backlog, bits.
    pub h_l: f64,
    /// Offload-pending queue backlog, bits.
    pub h_o: f64,
    /// Edge-side queue backlog attributed to this sensor, bits.
    pub h_k: f64,
    /// Battery energy, joules.
    pub battery_j: f64,
}

impl SensorState {
    /// Construct the initial state for a sensor: H_l = H_o = initial_queue/2,
    /// H_k = 0, B = initial battery (spec.md 3).
    pub fn initial(cfg: &SensorConfig) -> Self {
        Self {
            h_l: cfg.initial_queue_bits / 2.0,
            h_o: cfg.initial_queue_bits / 2.0,
            h_k: 0.0,
            battery_j: cfg.initial_battery_j,
        }
    }
}

/// Non-negative clipping losses incurred by one slot's recurrence, used by
/// invariant tests (spec.md 8: battery/queue conservation).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ClipLosses {
    pub local_queue: f64,
    pub offload_queue: f64,
    pub edge_queue: f64,
    pub battery: f64,
}

/// `max(0, x - y)`, and the amount by which `y` exceeded `x` (the part that
/// could not be subtracted because the quantity is floored at zero).
fn clamp_sub(x: f64, y: f64) -> (f64, f64) {
    if x >= y {
        (x - y, 0.0)
    } else {
        (0.0, y - x)
    }
}

/// One slot's realized service/energy amounts, already committed by a
/// policy (spec.md 4.4 "Derived quantities committed to state").
#[derive(Debug, Clone, Copy, Default)]
pub struct SlotService {
    /// Bits processed locally, C_l.
    pub local_bits: f64,
    /// Bits transmitted to the edge, C_o.
    pub offload_bits: f64,
    /// Bits processed at the edge for this sensor, C_k.
    pub edge_bits: f64,
    /// Local CPU energy spent, E_loc.
    pub local_energy_j: f64,
}

impl SensorState {
    /// Apply the queue/battery recurrence of spec.md 4.3, given the
    /// offload fraction `alpha`, this slot's realized service/energy, and
    /// this slot's realized arrival/harvest. Returns the clipping losses
    /// so callers can check the conservation invariants of spec.md 8.
    pub fn advance(
        &mut self,
        alpha: f64,
        service: SlotService,
        arrival_bits: f64,
        harvest_j: f64,
    ) -> ClipLosses {
        let (l_served, l_clip) = clamp_sub(self.h_l, service.local_bits);
        let (o_served, o_clip) = clamp_sub(self.h_o, service.offload_bits);
        let (k_served, k_clip) = clamp_sub(self.h_k, service.edge_bits);
        let (b_spent, b_clip) = clamp_sub(self.battery_j, service.local_energy_j);

        self.h_l = l_served + (1.0 - alpha) * arrival_bits;
        self.h_o = o_served + alpha * arrival_bits;
        self.h_k = k_served + service.offload_bits;
        self.battery_j = b_spent + harvest_j;

        ClipLosses {
            local_queue: l_clip,
            offload_queue: o_clip,
            edge_queue: k_clip,
            battery: b_clip,
        }
    }
}

// ── Derivation helpers (spec.md 4.4 "Derived quantities committed to state") ──

/// C_l = f_u * tau / delta.
pub fn local_service_bits(f_cpu_hz: f64, tau_s: f64, cycles_per_bit: f64) -> f64 {
    if cycles_per_bit <= 0.0 {
        return 0.0;
    }
    f_cpu_hz * tau_s / cycles_per_bit
}

/// C_o = W * tau * log2(1 + p_u * g / sigma^2).
pub fn tx_rate_bits(p_tx_w: f64, bandwidth_hz: f64, channel_gain: f64, noise_power_w: f64, tau_s: f64) -> f64 {
    let snr = p_tx_w * channel_gain / noise_power_w.max(1e-10);
    bandwidth_hz * tau_s * (1.0 + snr).log2()
}

/// C_k = xi * f_k * tau / delta.
pub fn edge_service_bits(xi: f64, edge_f_hz: f64, tau_s: f64, cycles_per_bit: f64) -> f64 {
    if cycles_per_bit <= 0.0 {
        return 0.0;
    }
    xi * edge_f_hz * tau_s / cycles_per_bit
}

/// E_loc = theta * f_u^3 * tau.
pub fn local_energy_j(theta: f64, f_cpu_hz: f64, tau_s: f64) -> f64 {
    theta * f_cpu_hz.powi(3) * tau_s
}

/// E_tx = p_u * tau (informational).
pub fn tx_energy_j(p_tx_w: f64, tau_s: f64) -> f64 {
    p_tx_w * tau_s
}

/// Effective cycles-per-bit for a sensor: its own value, falling back to
/// the global default when the sensor's is non-positive.
pub fn effective_cycles_per_bit(sensor: &SensorConfig, globals: &GlobalConstants) -> f64 {
    if sensor.cycles_per_bit > 0.0 {
        sensor.cycles_per_bit
    } else {
        globals.default_cycles_per_bit
    }
}
