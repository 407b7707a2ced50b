use tracing::trace;

use crate::optimizer::{OptimizerOptions, SearchOutcome};
use crate::rng::SearchRng;
use crate::scoring::Scorer;

#[derive(Debug, Clone)]
struct Individual {
    genes: Vec<usize>,
    score: f64,
}

fn sort_population(population: &mut [Individual]) {
    population.sort_by(|a, b| a.score.total_cmp(&b.score));
}

/// Best of `k` uniformly drawn individuals.
fn tournament<'p, R: SearchRng>(population: &'p [Individual], k: usize, rng: &mut R) -> &'p Individual {
    let mut winner = &population[rng.next_int(population.len())];
    for _ in 1..k {
        let challenger = &population[rng.next_int(population.len())];
        if challenger.score < winner.score {
            winner = challenger;
        }
    }
    winner
}

/// Order crossover: keep a random slice of `a` in place and fill the other
/// positions with `b`'s remaining genes in `b`'s order.
fn order_crossover<R: SearchRng>(a: &[usize], b: &[usize], rng: &mut R) -> Vec<usize> {
    let n = a.len();
    let (mut lo, mut hi) = (rng.next_int(n), rng.next_int(n));
    if lo > hi {
        core::mem::swap(&mut lo, &mut hi);
    }

    let mut taken = vec![false; n];
    for &gene in &a[lo..=hi] {
        taken[gene] = true;
    }

    let mut fill = b.iter().copied().filter(|&g| !taken[g]);
    (0..n)
        .map(|i| {
            if (lo..=hi).contains(&i) {
                a[i]
            } else {
                fill.next().unwrap_or(a[i])
            }
        })
        .collect()
}

fn swap_mutation<R: SearchRng>(genes: &mut [usize], rate: f64, rng: &mut R) {
    if genes.len() >= 2 && rng.next_f64() < rate {
        let i = rng.next_int(genes.len());
        let j = rng.next_int(genes.len());
        genes.swap(i, j);
    }
}

/// Genetic search over permutations of every filament.
///
/// Each generation keeps the elite unchanged and breeds the rest by tournament
/// selection, order crossover and swap mutation. Stops at the generation cap or
/// after `stagnation_limit` generations without a better best.
pub(crate) fn genetic<R: SearchRng>(
    scorer: &mut Scorer<'_>,
    rng: &mut R,
    options: &OptimizerOptions,
) -> SearchOutcome {
    let n = scorer.len();
    let size = options.population_size.unwrap_or_else(|| (n * 10).max(50)).max(2);
    let elite = ((size as f64 * options.elite_fraction).round() as usize).clamp(1, size);

    let mut population: Vec<Individual> = (0..size)
        .map(|_| {
            let mut genes: Vec<usize> = (0..n).collect();
            rng.shuffle(&mut genes);
            let score = scorer.score(&genes);
            Individual { genes, score }
        })
        .collect();
    sort_population(&mut population);

    let mut best = population[0].clone();
    let mut stagnant = 0usize;
    let mut generations = 0u64;
    let mut converged = false;

    while (generations as usize) < options.generations {
        generations += 1;

        let mut next: Vec<Individual> = population[..elite].to_vec();
        while next.len() < size {
            let a = tournament(&population, options.tournament_size, rng);
            let b = tournament(&population, options.tournament_size, rng);
            let mut genes = order_crossover(&a.genes, &b.genes, rng);
            swap_mutation(&mut genes, options.mutation_rate, rng);
            let score = scorer.score(&genes);
            next.push(Individual { genes, score });
        }
        sort_population(&mut next);
        population = next;

        if population[0].score < best.score {
            best = population[0].clone();
            stagnant = 0;
        } else {
            stagnant += 1;
            if stagnant >= options.stagnation_limit {
                converged = true;
                break;
            }
        }
    }

    trace!(generations, best = best.score, converged, "genetic search finished");

    SearchOutcome {
        order: best.genes,
        score: best.score,
        iterations: generations,
        converged,
    }
}
