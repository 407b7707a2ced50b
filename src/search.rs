//! Deterministic searches: exhaustive enumeration, greedy building, and the
//! repeated-filament expansion pass.

use tracing::trace;

use crate::optimizer::{OptimizerOptions, SearchOutcome};
use crate::scoring::Scorer;

/// Smallest score gain that lets the greedy builder append another filament.
const GREEDY_EPSILON: f64 = 1e-3;

/// Advance `v` to its next lexicographic permutation. Returns false after the last one.
fn next_permutation(v: &mut [usize]) -> bool {
    let Some(i) = v.windows(2).rposition(|w| w[0] < w[1]) else {
        return false;
    };
    let j = v
        .iter()
        .rposition(|&x| x > v[i])
        .unwrap_or(i + 1);
    v.swap(i, j);
    v[i + 1..].reverse();
    true
}

/// Score every ordering of every non-empty subset and keep the minimum.
///
/// Ties keep the first candidate in enumeration order (subsets by bitmask,
/// then permutations lexicographically).
pub(crate) fn exhaustive(scorer: &mut Scorer<'_>) -> SearchOutcome {
    let n = scorer.len();
    let mut best = SearchOutcome {
        order: Vec::new(),
        score: f64::INFINITY,
        iterations: 0,
        converged: true,
    };

    for mask in 1u32..(1u32 << n) {
        let mut perm: Vec<usize> = (0..n).filter(|&i| mask & (1 << i) != 0).collect();
        loop {
            let score = scorer.score(&perm);
            best.iterations += 1;
            if score < best.score {
                best.score = score;
                best.order.clone_from(&perm);
            }
            if !next_permutation(&mut perm) {
                break;
            }
        }
    }

    best
}

/// Grow a sequence from every possible starting filament, always appending the
/// filament that lowers the score most, until no addition helps.
pub(crate) fn greedy_build(scorer: &mut Scorer<'_>) -> SearchOutcome {
    let n = scorer.len();
    let mut best = SearchOutcome {
        order: Vec::new(),
        score: f64::INFINITY,
        iterations: 0,
        converged: true,
    };

    for seed in 0..n {
        let mut sequence = vec![seed];
        let mut current = scorer.score(&sequence);
        best.iterations += 1;

        loop {
            let mut step: Option<(usize, f64)> = None;
            let remaining: Vec<usize> = (0..n).filter(|c| !sequence.contains(c)).collect();
            for candidate in remaining {
                sequence.push(candidate);
                let score = scorer.score(&sequence);
                sequence.pop();
                best.iterations += 1;
                if step.map_or(true, |(_, s)| score < s) {
                    step = Some((candidate, score));
                }
            }

            match step {
                Some((candidate, score)) if current - score >= GREEDY_EPSILON => {
                    sequence.push(candidate);
                    current = score;
                }
                _ => break,
            }
        }

        trace!(seed, score = current, len = sequence.len(), "greedy seed finished");
        if current < best.score {
            best.score = current;
            best.order = sequence;
        }
    }

    best
}

/// Insert extra copies of filaments into `base` while each insertion pays for
/// itself.
///
/// Candidates come from the full filament list, not only those already in the
/// sequence. An insertion may not sit next to the same filament.
pub(crate) fn expand_with_repeats(
    scorer: &mut Scorer<'_>,
    base: SearchOutcome,
    options: &OptimizerOptions,
) -> SearchOutcome {
    let n = scorer.len();
    let mut outcome = base;

    for _ in 0..options.max_repeated_swaps {
        outcome.iterations += 1;
        let len = outcome.order.len();
        let mut best: Option<(usize, usize, f64)> = None;

        for candidate in 0..n {
            for pos in 0..=len {
                let before = pos.checked_sub(1).map(|p| outcome.order[p]);
                let after = outcome.order.get(pos).copied();
                if before == Some(candidate) || after == Some(candidate) {
                    continue;
                }

                outcome.order.insert(pos, candidate);
                let score = scorer.score(&outcome.order);
                outcome.order.remove(pos);

                if best.map_or(true, |(_, _, s)| score < s) {
                    best = Some((candidate, pos, score));
                }
            }
        }

        match best {
            Some((candidate, pos, score)) if outcome.score - score >= options.min_swap_improvement => {
                trace!(candidate, pos, score, "repeated filament inserted");
                outcome.order.insert(pos, candidate);
                outcome.score = score;
            }
            _ => break,
        }
    }

    outcome
}
