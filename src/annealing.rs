use tracing::trace;

use crate::optimizer::{OptimizerOptions, SearchOutcome};
use crate::rng::SearchRng;
use crate::scoring::Scorer;

/// Simulated annealing over permutations of every filament.
///
/// Starts from a shuffled order and proposes two-position swaps. Better
/// neighbors are always taken; worse ones with probability `exp(-Δ / T)`.
/// Temperature cools geometrically until it reaches the floor or the
/// iteration cap is hit. The best order ever seen is returned, not the one the
/// walk ended on.
pub(crate) fn simulated_annealing<R: SearchRng>(
    scorer: &mut Scorer<'_>,
    rng: &mut R,
    options: &OptimizerOptions,
) -> SearchOutcome {
    let n = scorer.len();
    let mut current: Vec<usize> = (0..n).collect();
    rng.shuffle(&mut current);
    let mut current_score = scorer.score(&current);

    let mut best = current.clone();
    let mut best_score = current_score;

    let mut temperature = options.initial_temperature;
    let mut iterations = 0u64;

    if n >= 2 {
        while (iterations as usize) < options.max_iterations && temperature > options.min_temperature {
            let i = rng.next_int(n);
            let mut j = rng.next_int(n - 1);
            if j >= i {
                j += 1;
            }

            current.swap(i, j);
            let score = scorer.score(&current);
            let delta = score - current_score;

            if delta < 0.0 || rng.next_f64() < (-delta / temperature).exp() {
                current_score = score;
                if score < best_score {
                    best_score = score;
                    best.clone_from(&current);
                }
            } else {
                current.swap(i, j);
            }

            temperature *= options.cooling_rate;
            iterations += 1;
        }
    }

    trace!(iterations, temperature, best_score, "annealing finished");

    SearchOutcome {
        order: best,
        score: best_score,
        iterations,
        // Cooled all the way down rather than being cut off by the cap.
        converged: n < 2 || temperature <= options.min_temperature,
    }
}
