//! Pluggable population-based stochastic optimizer (spec.md 4.5 / 9).
//!
//! `Optimizer` is the plug-point spec.md 9 calls for; [`GeneticOptimizer`]
//! is the generational GA spec.md 4.5 specifies in full, and
//! [`DifferentialEvolutionOptimizer`] is the drop-in alternative spec.md 9
//! documents, implemented behind the same trait since the trait makes it
//! cheap.

use offload_types::OptimizerLogEntry;

use crate::rng::Rng;

/// One gene's inclusive bounds.
#[derive(Debug, Clone, Copy)]
pub struct GeneBounds {
    pub min: f64,
    pub max: f64,
}

impl GeneBounds {
    pub fn clip(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }

    pub fn range(&self) -> f64 {
        self.max - self.min
    }
}

/// A candidate action: three normalized genes, spec.md 4.5 "Action space".
pub type Genome = Vec<f64>;

/// Anything that can score a candidate genome. The fitness function closes
/// over whatever per-sensor prediction state it needs; the optimizer only
/// ever sees genomes and scalar fitness values (lower is better).
pub trait FitnessFn: Fn(&Genome) -> f64 {}
impl<T: Fn(&Genome) -> f64> FitnessFn for T {}

/// Result of one optimizer run: the best genome found and its fitness.
#[derive(Debug, Clone)]
pub struct OptimizerResult {
    pub best_genome: Genome,
    pub best_fitness: f64,
    /// Telemetry records, one per generation (spec.md 4.5 "Telemetry").
    pub log: Vec<OptimizerLogEntry>,
}

/// Fitness threshold above which an individual is reported as "infeasible"
/// in telemetry (spec.md 4.5).
const INFEASIBLE_THRESHOLD: f64 = 1e5;

/// Common entry point all optimizer implementations expose.
pub trait Optimizer {
    /// Search `bounds.len()`-dimensional genome space for the genome that
    /// minimizes `fitness`. `sensor_id`/`slot` are carried only for
    /// telemetry labeling.
    #[allow(clippy::too_many_arguments)]
    fn optimize(
        &self,
        bounds: &[GeneBounds],
        fitness: &dyn Fn(&Genome) -> f64,
        rng: &mut Rng,
        sensor_id: &str,
        slot: usize,
        elapsed_ms: impl Fn() -> u64,
    ) -> OptimizerResult;
}

fn sample_genome(bounds: &[GeneBounds], rng: &mut Rng) -> Genome {
    bounds.iter().map(|b| rng.uniform(b.min, b.max)).collect()
}

/// Generational genetic algorithm with elitism, tournament selection,
/// uniform crossover and Gaussian mutation — spec.md 4.5's optimizer,
/// verbatim.
#[derive(Debug, Clone)]
pub struct GeneticOptimizer {
    pub population: usize,
    pub generations: usize,
    pub mutation_probability: f64,
    /// Number of additional random restarts (0 = single run).
    pub restarts: usize,
    /// Per-decision wall-clock budget in milliseconds, 0 = unbounded
    /// (spec.md 5 "Timeouts").
    pub budget_ms: u64,
}

impl GeneticOptimizer {
    fn tournament_select<'a>(&self, pop: &'a [(Genome, f64)], rng: &mut Rng) -> &'a Genome {
        let mut best: Option<&(Genome, f64)> = None;
        for _ in 0..3 {
            let idx = rng.int_in(0, pop.len() as i64 - 1) as usize;
            let candidate = &pop[idx];
            if best.map(|b| candidate.1 < b.1).unwrap_or(true) {
                best = Some(candidate);
            }
        }
        &best.expect("tournament of non-empty population always yields a winner").0
    }

    fn crossover(&self, a: &Genome, b: &Genome, rng: &mut Rng) -> Genome {
        a.iter().zip(b.iter()).map(|(&x, &y)| if rng.bernoulli(0.5) { x } else { y }).collect()
    }

    fn mutate(&self, genome: &mut Genome, bounds: &[GeneBounds], rng: &mut Rng) {
        for (g, b) in genome.iter_mut().zip(bounds) {
            if rng.bernoulli(self.mutation_probability) {
                let scale = 0.1 * b.range();
                *g = b.clip(*g + rng.gaussian(0.0, scale));
            }
        }
    }

    fn run_once(
        &self,
        bounds: &[GeneBounds],
        fitness: &dyn Fn(&Genome) -> f64,
        rng: &mut Rng,
        sensor_id: &str,
        slot: usize,
        elapsed_ms: &dyn Fn() -> u64,
        log: &mut Vec<OptimizerLogEntry>,
    ) -> (Genome, f64) {
        let mut population: Vec<(Genome, f64)> = (0..self.population)
            .map(|_| {
                let g = sample_genome(bounds, rng);
                let f = fitness(&g);
                (g, f)
            })
            .collect();
        population.sort_by(|a, b| a.1.total_cmp(&b.1));

        let elites = 2.max((0.1 * self.population as f64).floor() as usize);
        let mut best_ever = population[0].clone();
        let mut stale_generations = 0usize;
        let stop_after = ((self.generations as f64) / 2.0).ceil() as usize;

        for generation in 0..self.generations {
            let mut next: Vec<(Genome, f64)> = population[..elites.min(population.len())].to_vec();
            while next.len() < self.population {
                let parent_a = self.tournament_select(&population, rng).clone();
                let parent_b = self.tournament_select(&population, rng).clone();
                let mut child = self.crossover(&parent_a, &parent_b, rng);
                self.mutate(&mut child, bounds, rng);
                let f = fitness(&child);
                next.push((child, f));
            }
            next.sort_by(|a, b| a.1.total_cmp(&b.1));
            population = next;

            if population[0].1 < best_ever.1 {
                best_ever = population[0].clone();
                stale_generations = 0;
            } else {
                stale_generations += 1;
            }

            let avg_fitness = population.iter().map(|(_, f)| f).sum::<f64>() / population.len() as f64;
            let infeasible_count = population.iter().filter(|(_, f)| *f > INFEASIBLE_THRESHOLD).count();
            log.push(OptimizerLogEntry {
                sensor_id: sensor_id.to_string(),
                slot,
                generation,
                best_fitness: best_ever.1,
                avg_fitness,
                infeasible_count,
                elapsed_ms: elapsed_ms(),
            });

            if stale_generations >= stop_after {
                break;
            }
            if self.budget_ms > 0 && elapsed_ms() >= self.budget_ms {
                break;
            }
        }

        best_ever
    }
}

impl Optimizer for GeneticOptimizer {
    fn optimize(
        &self,
        bounds: &[GeneBounds],
        fitness: &dyn Fn(&Genome) -> f64,
        rng: &mut Rng,
        sensor_id: &str,
        slot: usize,
        elapsed_ms: impl Fn() -> u64,
    ) -> OptimizerResult {
        let mut log = Vec::new();
        let (mut best_genome, mut best_fitness) = self.run_once(bounds, fitness, rng, sensor_id, slot, &elapsed_ms, &mut log);

        for _ in 0..self.restarts {
            let (genome, f) = self.run_once(bounds, fitness, rng, sensor_id, slot, &elapsed_ms, &mut log);
            if f < best_fitness {
                best_genome = genome;
                best_fitness = f;
            }
        }

        OptimizerResult { best_genome, best_fitness, log }
    }
}

/// Differential Evolution, the alternative population-based search spec.md
/// 9 names as a drop-in. `mutant = x_a + F * (x_b - x_c)`, binomial
/// crossover with rate `cr`.
#[derive(Debug, Clone)]
pub struct DifferentialEvolutionOptimizer {
    pub population: usize,
    pub generations: usize,
    pub differential_weight: f64,
    pub crossover_rate: f64,
    pub restarts: usize,
    pub budget_ms: u64,
}

impl Default for DifferentialEvolutionOptimizer {
    fn default() -> Self {
        Self {
            population: 30,
            generations: 50,
            differential_weight: 0.8,
            crossover_rate: 0.9,
            restarts: 0,
            budget_ms: 0,
        }
    }
}

impl DifferentialEvolutionOptimizer {
    fn distinct_indices(&self, exclude: usize, n: usize, rng: &mut Rng) -> (usize, usize, usize) {
        let mut pick = || loop {
            let i = rng.int_in(0, n as i64 - 1) as usize;
            if i != exclude {
                return i;
            }
        };
        let a = pick();
        let b = loop {
            let i = pick();
            if i != a {
                break i;
            }
        };
        let c = loop {
            let i = pick();
            if i != a && i != b {
                break i;
            }
        };
        (a, b, c)
    }

    fn run_once(
        &self,
        bounds: &[GeneBounds],
        fitness: &dyn Fn(&Genome) -> f64,
        rng: &mut Rng,
        sensor_id: &str,
        slot: usize,
        elapsed_ms: &dyn Fn() -> u64,
        log: &mut Vec<OptimizerLogEntry>,
    ) -> (Genome, f64) {
        let mut population: Vec<(Genome, f64)> = (0..self.population)
            .map(|_| {
                let g = sample_genome(bounds, rng);
                let f = fitness(&g);
                (g, f)
            })
            .collect();

        let mut best_ever = population
            .iter()
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .cloned()
            .expect("non-empty population");
        let mut stale_generations = 0usize;
        let stop_after = ((self.generations as f64) / 2.0).ceil() as usize;

        for generation in 0..self.generations {
            let mut next = population.clone();
            for i in 0..population.len() {
                let (a, b, c) = self.distinct_indices(i, population.len(), rng);
                let base = &population[i].0;
                let mutant: Genome = population[a]
                    .0
                    .iter()
                    .zip(population[b].0.iter())
                    .zip(population[c].0.iter())
                    .zip(bounds.iter())
                    .map(|(((&xa, &xb), &xc), bound)| bound.clip(xa + self.differential_weight * (xb - xc)))
                    .collect();

                let trial: Genome = base
                    .iter()
                    .zip(mutant.iter())
                    .map(|(&x, &m)| if rng.bernoulli(self.crossover_rate) { m } else { x })
                    .collect();
                let trial_fitness = fitness(&trial);
                if trial_fitness <= population[i].1 {
                    next[i] = (trial, trial_fitness);
                }
            }
            population = next;

            let gen_best = population.iter().min_by(|a, b| a.1.total_cmp(&b.1)).cloned().unwrap();
            if gen_best.1 < best_ever.1 {
                best_ever = gen_best;
                stale_generations = 0;
            } else {
                stale_generations += 1;
            }

            let avg_fitness = population.iter().map(|(_, f)| f).sum::<f64>() / population.len() as f64;
            let infeasible_count = population.iter().filter(|(_, f)| *f > INFEASIBLE_THRESHOLD).count();
            log.push(OptimizerLogEntry {
                sensor_id: sensor_id.to_string(),
                slot,
                generation,
                best_fitness: best_ever.1,
                avg_fitness,
                infeasible_count,
                elapsed_ms: elapsed_ms(),
            });

            if stale_generations >= stop_after {
                break;
            }
            if self.budget_ms > 0 && elapsed_ms() >= self.budget_ms {
                break;
            }
        }

        (best_ever.0, best_ever.1)
    }
}

impl Optimizer for DifferentialEvolutionOptimizer {
    fn optimize(
        &self,
        bounds: &[GeneBounds],
        fitness: &dyn Fn(&Genome) -> f64,
        rng: &mut Rng,
        sensor_id: &str,
        slot: usize,
        elapsed_ms: impl Fn() -> u64,
    ) -> OptimizerResult {
        let mut log = Vec::new();
        let (mut best_genome, mut best_fitness) = self.run_once(bounds, fitness, rng, sensor_id, slot, &elapsed_ms, &mut log);

        for _ in 0..self.restarts {
            let (genome, f) = self.run_once(bounds, fitness, rng, sensor_id, slot, &elapsed_ms, &mut log);
            if f < best_fitness {
                best_genome = genome;
                best_fitness = f;
            }
        }

        OptimizerResult { best_genome, best_fitness, log }
    }
}

/// Runtime choice between optimizer implementations (the CLI's
/// `--optimizer` flag). `Optimizer::optimize` takes `impl Fn`, which is not
/// object-safe, so this enum dispatches by hand instead of boxing a
/// `dyn Optimizer`.
#[derive(Debug, Clone)]
pub enum AnyOptimizer {
    Genetic(GeneticOptimizer),
    DifferentialEvolution(DifferentialEvolutionOptimizer),
}

impl Optimizer for AnyOptimizer {
    fn optimize(
        &self,
        bounds: &[GeneBounds],
        fitness: &dyn Fn(&Genome) -> f64,
        rng: &mut Rng,
        sensor_id: &str,
        slot: usize,
        elapsed_ms: impl Fn() -> u64,
    ) -> OptimizerResult {
        match self {
            AnyOptimizer::Genetic(o) => o.optimize(bounds, fitness, rng, sensor_id, slot, elapsed_ms),
            AnyOptimizer::DifferentialEvolution(o) => o.optimize(bounds, fitness, rng, sensor_id, slot, elapsed_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sphere_bounds() -> Vec<GeneBounds> {
        vec![GeneBounds { min: -5.0, max: 5.0 }; 3]
    }

    fn sphere(g: &Genome) -> f64 {
        g.iter().map(|x| x * x).sum()
    }

    #[test]
    fn genetic_optimizer_improves_on_random_sampling() {
        let opt = GeneticOptimizer { population: 20, generations: 30, mutation_probability: 0.2, restarts: 0, budget_ms: 0 };
        let mut rng = Rng::new(1);
        let result = opt.optimize(&sphere_bounds(), &sphere, &mut rng, "s1", 0, || 0);
        assert!(result.best_fitness < 5.0);
        assert!(!result.log.is_empty());
    }

    #[test]
    fn genetic_optimizer_log_tracks_best_ever_monotonically() {
        let opt = GeneticOptimizer { population: 10, generations: 10, mutation_probability: 0.3, restarts: 0, budget_ms: 0 };
        let mut rng = Rng::new(7);
        let result = opt.optimize(&sphere_bounds(), &sphere, &mut rng, "s1", 0, || 0);
        let mut prev = f64::INFINITY;
        for entry in &result.log {
            assert!(entry.best_fitness <= prev + 1e-9);
            prev = entry.best_fitness;
        }
    }

    #[test]
    fn differential_evolution_improves_on_random_sampling() {
        let opt = DifferentialEvolutionOptimizer::default();
        let mut rng = Rng::new(3);
        let result = opt.optimize(&sphere_bounds(), &sphere, &mut rng, "s1", 0, || 0);
        assert!(result.best_fitness < 5.0);
    }

    #[test]
    fn restarts_never_make_the_best_worse() {
        let opt = GeneticOptimizer { population: 10, generations: 5, mutation_probability: 0.2, restarts: 3, budget_ms: 0 };
        let mut rng = Rng::new(11);
        let result = opt.optimize(&sphere_bounds(), &sphere, &mut rng, "s1", 0, || 0);
        assert!(result.best_fitness.is_finite());
    }
}
