//! Stochastic event generator (spec component C2).
//!
//! Grounded on `packages/uwb-simulator/src/uwb_physics.rs::generate_epoch`:
//! one measurement struct produced per entity per tick, pulling from a
//! single shared RNG stream in a fixed order. Here the "measurement" is a
//! per-sensor `(arrival, harvest, channel gain)` triple instead of UWB
//! ranging noise, and the RNG is the deterministic `Mulberry32` of
//! [`crate::rng`] instead of `rand_distr`.

use offload_types::{ArrivalModel, HarvestModel, SensorConfig};

use crate::rng::Rng;

/// Minimum channel gain floor, guards against division by (near) zero in
/// the transmit sub-problem (spec.md 4.4 sub-problem 3 / 4.2).
const CHANNEL_GAIN_FLOOR: f64 = 1e-10;

/// One slot's raw stochastic draws for one sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotEvents {
    pub arrival_bits: f64,
    pub harvest_j: f64,
    pub channel_gain: f64,
}

/// Draw one slot's events for `sensor`. Draw order is fixed: arrival,
/// harvest, then channel, so the same (seed, sensor order) pair always
/// reproduces the same draws.
pub fn generate_slot_events(sensor: &SensorConfig, rng: &mut Rng) -> SlotEvents {
    let arrival_bits = draw_arrival(sensor, rng);
    let harvest_j = draw_harvest(sensor, rng);
    let channel_gain = draw_channel_gain(sensor, rng);
    SlotEvents {
        arrival_bits,
        harvest_j,
        channel_gain,
    }
}

fn draw_arrival(sensor: &SensorConfig, rng: &mut Rng) -> f64 {
    match &sensor.arrival_model {
        ArrivalModel::Poisson { lambda } => rng.poisson(*lambda) as f64 * sensor.mean_arrival_bits,
        ArrivalModel::Fixed { value_bits } => value_bits.unwrap_or(sensor.mean_arrival_bits),
        ArrivalModel::Uniform { min, max } => {
            let lo = min.unwrap_or(0.5 * sensor.mean_arrival_bits);
            let hi = max.unwrap_or(1.5 * sensor.mean_arrival_bits);
            rng.uniform(lo, hi)
        }
    }
}

fn draw_harvest(sensor: &SensorConfig, rng: &mut Rng) -> f64 {
    match &sensor.harvest_model {
        HarvestModel::Bernoulli { p, value_j } => {
            if rng.bernoulli(*p) {
                *value_j
            } else {
                0.0
            }
        }
        HarvestModel::Constant { value_j } => *value_j,
        HarvestModel::Gaussian { mean_j, std_j } => rng.gaussian(*mean_j, *std_j).max(0.0),
    }
}

fn draw_channel_gain(sensor: &SensorConfig, rng: &mut Rng) -> f64 {
    let variance = sensor.channel_variance.max(0.0);
    rng.gaussian(sensor.mean_channel_gain, variance.sqrt())
        .max(CHANNEL_GAIN_FLOOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use offload_types::OffloadMode;

    fn sensor(arrival: ArrivalModel, harvest: HarvestModel) -> SensorConfig {
        SensorConfig {
            id: "s1".into(),
            mean_arrival_bits: 1000.0,
            arrival_model: arrival,
            initial_queue_bits: 0.0,
            initial_battery_j: 10.0,
            mean_harvest_j: 1.0,
            harvest_model: harvest,
            f_max_hz: 1e9,
            cycles_per_bit: 1000.0,
            p_max_w: 0.1,
            mean_channel_gain: 1e-3,
            channel_variance: 1e-8,
            offload_mode: OffloadMode::Fractional,
            priority_weight: 1.0,
            edge_id: "e1".into(),
        }
    }

    #[test]
    fn all_draws_are_non_negative() {
        let s = sensor(
            ArrivalModel::Poisson { lambda: 3.0 },
            HarvestModel::Gaussian { mean_j: 0.0, std_j: 5.0 },
        );
        let mut rng = Rng::new(1);
        for _ in 0..1000 {
            let ev = generate_slot_events(&s, &mut rng);
            assert!(ev.arrival_bits >= 0.0);
            assert!(ev.harvest_j >= 0.0);
            assert!(ev.channel_gain >= CHANNEL_GAIN_FLOOR);
        }
    }

    #[test]
    fn fixed_arrival_falls_back_to_mean() {
        let s = sensor(ArrivalModel::Fixed { value_bits: None }, HarvestModel::Constant { value_j: 1.0 });
        let mut rng = Rng::new(5);
        let ev = generate_slot_events(&s, &mut rng);
        assert_eq!(ev.arrival_bits, 1000.0);
    }

    #[test]
    fn uniform_arrival_falls_back_to_default_band() {
        let s = sensor(
            ArrivalModel::Uniform { min: None, max: None },
            HarvestModel::Constant { value_j: 1.0 },
        );
        let mut rng = Rng::new(5);
        for _ in 0..200 {
            let ev = generate_slot_events(&s, &mut rng);
            assert!(ev.arrival_bits >= 500.0 && ev.arrival_bits <= 1500.0);
        }
    }

    #[test]
    fn bernoulli_harvest_is_all_or_nothing() {
        let s = sensor(
            ArrivalModel::Fixed { value_bits: Some(0.0) },
            HarvestModel::Bernoulli { p: 0.5, value_j: 3.0 },
        );
        let mut rng = Rng::new(8);
        for _ in 0..200 {
            let ev = generate_slot_events(&s, &mut rng);
            assert!(ev.harvest_j == 0.0 || ev.harvest_j == 3.0);
        }
    }

    #[test]
    fn draw_order_is_deterministic_given_seed() {
        let s = sensor(
            ArrivalModel::Poisson { lambda: 2.0 },
            HarvestModel::Gaussian { mean_j: 1.0, std_j: 0.5 },
        );
        let mut a = Rng::new(99);
        let mut b = Rng::new(99);
        let ev_a = generate_slot_events(&s, &mut a);
        let ev_b = generate_slot_events(&s, &mut b);
        assert_eq!(ev_a, ev_b);
    }
}
