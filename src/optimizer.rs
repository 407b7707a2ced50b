//! Order/subset search over filament sequences.
//!
//! Every search scores candidates with [`crate::scoring`]; they differ only in
//! how they walk the space. The [`Optimizer`] service adds a bounded result
//! cache for explicitly seeded requests.

use core::fmt;
use core::str::FromStr;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::annealing::simulated_annealing;
use crate::cache::{CacheKey, CachedSearch, ResultCache};
use crate::cluster::WeightedLabTarget;
use crate::error::PlanError;
use crate::filament::{Filament, validate_filaments};
use crate::genetic::genetic;
use crate::rng::{Lcg, entropy_seed};
use crate::scoring::Scorer;
use crate::search::{exhaustive, expand_with_repeats, greedy_build};
use crate::zones::ZoneSettings;

/// `auto` picks exhaustive search up to this many filaments.
pub const AUTO_EXHAUSTIVE_MAX: usize = 6;
/// `auto` picks simulated annealing up to this many filaments, genetic beyond.
pub const AUTO_ANNEALING_MAX: usize = 10;
/// Explicit exhaustive requests are refused above this many filaments.
pub const EXHAUSTIVE_LIMIT: usize = 8;

/// Requested search algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Algorithm {
    Exhaustive,
    SimulatedAnnealing,
    Genetic,
    /// Greedy sequence building from every possible seed filament.
    Greedy,
    /// Choose by filament count.
    #[default]
    Auto,
}

impl Algorithm {
    /// The concrete algorithm used for `n` filaments.
    ///
    /// Zero or one filament is always a trivial exhaustive evaluation.
    pub fn resolve(self, n: usize) -> ResolvedAlgorithm {
        if n <= 1 {
            return ResolvedAlgorithm::Exhaustive;
        }
        match self {
            Self::Exhaustive => ResolvedAlgorithm::Exhaustive,
            Self::SimulatedAnnealing => ResolvedAlgorithm::SimulatedAnnealing,
            Self::Genetic => ResolvedAlgorithm::Genetic,
            Self::Greedy => ResolvedAlgorithm::Greedy,
            Self::Auto if n <= AUTO_EXHAUSTIVE_MAX => ResolvedAlgorithm::Exhaustive,
            Self::Auto if n <= AUTO_ANNEALING_MAX => ResolvedAlgorithm::SimulatedAnnealing,
            Self::Auto => ResolvedAlgorithm::Genetic,
        }
    }
}

impl FromStr for Algorithm {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exhaustive" => Ok(Self::Exhaustive),
            "simulated-annealing" => Ok(Self::SimulatedAnnealing),
            "genetic" => Ok(Self::Genetic),
            "greedy" => Ok(Self::Greedy),
            "auto" => Ok(Self::Auto),
            other => Err(PlanError::UnknownAlgorithm(other.to_string())),
        }
    }
}

/// The algorithm that actually ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolvedAlgorithm {
    Exhaustive,
    SimulatedAnnealing,
    Genetic,
    Greedy,
}

impl fmt::Display for ResolvedAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Exhaustive => "exhaustive",
            Self::SimulatedAnnealing => "simulated-annealing",
            Self::Genetic => "genetic",
            Self::Greedy => "greedy",
        })
    }
}

/// Search configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OptimizerOptions {
    pub algorithm: Algorithm,
    /// Explicit seed. Only seeded requests are reproducible, and only they are cached.
    pub seed: Option<u32>,
    /// Simulated annealing iteration cap.
    pub max_iterations: usize,
    pub initial_temperature: f64,
    /// Geometric cooling factor per iteration, in (0, 1).
    pub cooling_rate: f64,
    /// Annealing stops once the temperature falls to this floor.
    pub min_temperature: f64,
    /// Genetic population; `None` means `max(50, 10 × n)`.
    pub population_size: Option<usize>,
    /// Genetic generation cap.
    pub generations: usize,
    pub mutation_rate: f64,
    /// Fraction of each generation carried over unchanged.
    pub elite_fraction: f64,
    pub tournament_size: usize,
    /// Generations without improvement before the genetic search stops.
    pub stagnation_limit: usize,
    /// Try inserting extra (repeated) filaments into the best sequence.
    pub allow_repeated_swaps: bool,
    pub max_repeated_swaps: usize,
    /// Score gain an insertion must reach to be kept.
    pub min_swap_improvement: f64,
}

impl Default for OptimizerOptions {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Auto,
            seed: None,
            max_iterations: 10_000,
            initial_temperature: 100.0,
            cooling_rate: 0.995,
            min_temperature: 0.01,
            population_size: None,
            generations: 100,
            mutation_rate: 0.1,
            elite_fraction: 0.1,
            tournament_size: 3,
            stagnation_limit: 20,
            allow_repeated_swaps: false,
            max_repeated_swaps: 4,
            min_swap_improvement: 2.0,
        }
    }
}

impl OptimizerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn seed(mut self, seed: u32) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = n;
        self
    }

    pub fn initial_temperature(mut self, t: f64) -> Self {
        self.initial_temperature = t;
        self
    }

    pub fn cooling_rate(mut self, rate: f64) -> Self {
        self.cooling_rate = rate;
        self
    }

    pub fn population_size(mut self, n: usize) -> Self {
        self.population_size = Some(n);
        self
    }

    pub fn generations(mut self, n: usize) -> Self {
        self.generations = n;
        self
    }

    pub fn mutation_rate(mut self, rate: f64) -> Self {
        self.mutation_rate = rate;
        self
    }

    pub fn stagnation_limit(mut self, n: usize) -> Self {
        self.stagnation_limit = n;
        self
    }

    pub fn allow_repeated_swaps(mut self, allow: bool) -> Self {
        self.allow_repeated_swaps = allow;
        self
    }

    pub fn max_repeated_swaps(mut self, n: usize) -> Self {
        self.max_repeated_swaps = n;
        self
    }

    pub fn min_swap_improvement(mut self, gain: f64) -> Self {
        self.min_swap_improvement = gain;
        self
    }

    pub fn validate(&self) -> Result<(), PlanError> {
        let check = |name: &'static str, value: f64, ok: bool| {
            if ok && value.is_finite() {
                Ok(())
            } else {
                Err(PlanError::InvalidOption { name, value })
            }
        };

        let c = self.cooling_rate;
        check("coolingRate", c, c > 0.0 && c < 1.0)?;
        let t = self.initial_temperature;
        check("initialTemperature", t, t > 0.0)?;
        let t = self.min_temperature;
        check("minTemperature", t, t >= 0.0)?;
        let m = self.mutation_rate;
        check("mutationRate", m, (0.0..=1.0).contains(&m))?;
        let e = self.elite_fraction;
        check("eliteFraction", e, (0.0..1.0).contains(&e))?;
        let k = self.tournament_size as f64;
        check("tournamentSize", k, self.tournament_size >= 1)?;
        if let Some(p) = self.population_size {
            check("populationSize", p as f64, p >= 2)?;
        }
        let g = self.min_swap_improvement;
        check("minSwapImprovement", g, g >= 0.0)?;
        Ok(())
    }

    /// Bit-exact fingerprint of every tunable that can change a search result.
    pub(crate) fn fingerprint(&self) -> Vec<u64> {
        vec![
            self.max_iterations as u64,
            self.initial_temperature.to_bits(),
            self.cooling_rate.to_bits(),
            self.min_temperature.to_bits(),
            self.population_size.map_or(0, |p| p as u64),
            self.generations as u64,
            self.mutation_rate.to_bits(),
            self.elite_fraction.to_bits(),
            self.tournament_size as u64,
            self.stagnation_limit as u64,
            self.allow_repeated_swaps as u64,
            self.max_repeated_swaps as u64,
            self.min_swap_improvement.to_bits(),
        ]
    }
}

/// Best sequence found by a search.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizerResult {
    /// Chosen sequence; may repeat filaments when repeated swaps are enabled.
    pub order: Vec<Filament>,
    /// Position of each `order` entry in the caller's filament slice.
    pub input_order: Vec<usize>,
    /// Lower is better. Zero for an empty filament set.
    pub score: f64,
    pub iterations: u64,
    pub converged: bool,
    pub cache_hit: bool,
    pub resolved_algorithm: ResolvedAlgorithm,
    /// Seed the stochastic searches ran with.
    pub seed: u32,
}

/// Raw outcome of one search, as indices into the canonical filament list.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SearchOutcome {
    pub(crate) order: Vec<usize>,
    pub(crate) score: f64,
    pub(crate) iterations: u64,
    pub(crate) converged: bool,
}

/// Filaments sorted by physical signature, so equal inputs search identically
/// whatever order the caller listed them in. The second list maps each
/// canonical position back to the caller's index.
fn canonical(filaments: &[Filament]) -> (Vec<Filament>, Vec<usize>) {
    let mut origin: Vec<usize> = (0..filaments.len()).collect();
    origin.sort_by_key(|&i| filaments[i].signature());
    let canon = origin.iter().map(|&i| filaments[i].clone()).collect();
    (canon, origin)
}

fn run_search(
    canon: &[Filament],
    targets: &[WeightedLabTarget],
    settings: &ZoneSettings,
    algorithm: ResolvedAlgorithm,
    seed: u32,
    options: &OptimizerOptions,
) -> SearchOutcome {
    let mut scorer = Scorer::new(canon, targets, settings);
    let mut rng = Lcg::new(seed);

    let mut outcome = match algorithm {
        ResolvedAlgorithm::Exhaustive => exhaustive(&mut scorer),
        ResolvedAlgorithm::Greedy => greedy_build(&mut scorer),
        ResolvedAlgorithm::SimulatedAnnealing => simulated_annealing(&mut scorer, &mut rng, options),
        ResolvedAlgorithm::Genetic => genetic(&mut scorer, &mut rng, options),
    };

    if options.allow_repeated_swaps {
        outcome = expand_with_repeats(&mut scorer, outcome, options);
    }

    debug!(
        %algorithm,
        seed,
        score = outcome.score,
        iterations = outcome.iterations,
        evaluations = scorer.evaluations(),
        "search finished"
    );
    outcome
}

fn optimize_with(
    filaments: &[Filament],
    targets: &[WeightedLabTarget],
    settings: &ZoneSettings,
    options: &OptimizerOptions,
    cache: Option<&Mutex<ResultCache>>,
) -> Result<OptimizerResult, PlanError> {
    options.validate()?;
    validate_filaments(filaments)?;

    let n = filaments.len();
    let algorithm = options.algorithm.resolve(n);
    if algorithm == ResolvedAlgorithm::Exhaustive && n > EXHAUSTIVE_LIMIT {
        return Err(PlanError::TooManyFilaments {
            algorithm: algorithm.to_string(),
            count: n,
            max: EXHAUSTIVE_LIMIT,
        });
    }

    let seed = options.seed.unwrap_or_else(entropy_seed);
    if n == 0 {
        return Ok(OptimizerResult {
            order: Vec::new(),
            input_order: Vec::new(),
            score: 0.0,
            iterations: 0,
            converged: true,
            cache_hit: false,
            resolved_algorithm: algorithm,
            seed,
        });
    }

    let (canon, origin) = canonical(filaments);
    let build = |found: &CachedSearch, cache_hit: bool| OptimizerResult {
        order: found.order.iter().map(|&i| canon[i].clone()).collect(),
        input_order: found.order.iter().map(|&i| origin[i]).collect(),
        score: found.score,
        iterations: found.iterations,
        converged: found.converged,
        cache_hit,
        resolved_algorithm: algorithm,
        seed,
    };

    // Only an explicit seed makes the request repeatable enough to cache.
    let key = match (cache, options.seed) {
        (Some(_), Some(seed)) => Some(CacheKey::new(&canon, targets, settings, algorithm, seed, options)),
        _ => None,
    };

    if let (Some(cache), Some(key)) = (cache, key.as_ref()) {
        if let Some(found) = cache.lock().get(key) {
            debug!(%algorithm, seed, "optimizer cache hit");
            return Ok(build(found, true));
        }
        debug!(%algorithm, seed, "optimizer cache miss");
    }

    let outcome = run_search(&canon, targets, settings, algorithm, seed, options);
    let found = CachedSearch {
        order: outcome.order,
        // A non-empty sequence always has a palette, so this stays finite.
        score: if outcome.score.is_finite() { outcome.score } else { f64::MAX },
        iterations: outcome.iterations,
        converged: outcome.converged,
    };
    let result = build(&found, false);

    if let (Some(cache), Some(key)) = (cache, key) {
        cache.lock().insert(key, found);
    }

    Ok(result)
}

/// Search for the best filament sequence. Never consults a cache.
pub fn optimize(
    filaments: &[Filament],
    targets: &[WeightedLabTarget],
    settings: &ZoneSettings,
    options: &OptimizerOptions,
) -> Result<OptimizerResult, PlanError> {
    optimize_with(filaments, targets, settings, options, None)
}

/// Long-lived optimizer that owns a result cache.
///
/// The cache sits behind a mutex, so one `Optimizer` can be shared between threads.
#[derive(Debug)]
pub struct Optimizer {
    cache: Mutex<ResultCache>,
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new(ResultCache::DEFAULT_CAPACITY)
    }
}

impl Optimizer {
    pub fn new(cache_capacity: usize) -> Self {
        Self {
            cache: Mutex::new(ResultCache::new(cache_capacity)),
        }
    }

    /// Like [`optimize`], but seeded requests are served from and stored in the cache.
    pub fn optimize(
        &self,
        filaments: &[Filament],
        targets: &[WeightedLabTarget],
        settings: &ZoneSettings,
        options: &OptimizerOptions,
    ) -> Result<OptimizerResult, PlanError> {
        optimize_with(filaments, targets, settings, options, Some(&self.cache))
    }

    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }

    pub fn cached_results(&self) -> usize {
        self.cache.lock().len()
    }
}
