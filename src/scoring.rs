//! Candidate scoring: how well can a filament sequence reproduce the image?
//!
//! A sequence is simulated into zones, sampled at every physical layer to get
//! its achievable colors, and those colors are matched against the clustered
//! image targets. Lower scores are better.

use rgb::RGB8;
use tracing::debug;

use crate::cluster::WeightedLabTarget;
use crate::color::{Lab, rgb_to_lab};
use crate::filament::Filament;
use crate::zones::{ZoneSettings, calculate_transition_zones, color_at_height, layer_tops};

/// Adjacent samples closer than this collapse into one palette step.
pub const DEDUP_DELTA_E: f64 = 3.0;
/// Penalty per target that shares its best-match height with another target.
pub const HEIGHT_SPREAD_PENALTY: f64 = 10.0;
/// Penalty per achievable palette step.
pub const LAYER_PENALTY: f64 = 0.5;
/// Penalty per palette step that is no target's best match.
pub const WASTED_PENALTY: f64 = 1.5;

/// One achievable color and the stack height that produces it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaletteSample {
    pub color: RGB8,
    pub lab: Lab,
    pub height: f64,
}

/// The distinct colors a sequence can show.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AchievablePalette {
    pub samples: Vec<PaletteSample>,
    /// True when the layer cap cut the sampling short.
    pub truncated: bool,
}

impl AchievablePalette {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Index and ΔE of the sample nearest to `lab`.
    pub fn nearest(&self, lab: Lab) -> Option<(usize, f64)> {
        self.samples
            .iter()
            .enumerate()
            .map(|(i, s)| (i, s.lab.delta_e(lab)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }
}

/// Collapse runs of adjacent near-identical samples to their midpoint sample.
pub fn dedupe_runs(samples: &[PaletteSample]) -> Vec<PaletteSample> {
    let mut out = Vec::new();
    let mut start = 0;
    while start < samples.len() {
        let mut end = start + 1;
        while end < samples.len() && samples[end].lab.delta_e(samples[end - 1].lab) < DEDUP_DELTA_E {
            end += 1;
        }
        out.push(samples[start + (end - start) / 2]);
        start = end;
    }
    out
}

/// Simulate `sequence` and sample its color at every physical layer.
pub fn achievable_palette(sequence: &[Filament], settings: &ZoneSettings) -> AchievablePalette {
    let zones = calculate_transition_zones(sequence, settings);
    let total = zones.last().map_or(0.0, |z| z.end_height);
    let (tops, truncated) = layer_tops(total, settings);
    if truncated {
        debug!(layers = tops.len(), total, "palette sampling hit the layer cap");
    }

    let raw: Vec<PaletteSample> = tops
        .into_iter()
        .filter_map(|height| {
            let color = color_at_height(&zones, height)?;
            Some(PaletteSample {
                color,
                lab: rgb_to_lab(color),
                height,
            })
        })
        .collect();

    AchievablePalette {
        samples: dedupe_runs(&raw),
        truncated,
    }
}

/// The individual terms of a score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBreakdown {
    /// Weighted mean ΔE to the nearest achievable color, times target count.
    pub accuracy: f64,
    pub height_spread: f64,
    pub layer_count: f64,
    pub wasted: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        self.accuracy + self.height_spread + self.layer_count + self.wasted
    }
}

/// Score an achievable palette against image targets.
///
/// Returns `None` for an empty palette, which cannot match anything.
pub fn score_palette(palette: &AchievablePalette, targets: &[WeightedLabTarget]) -> Option<ScoreBreakdown> {
    if palette.is_empty() {
        return None;
    }

    let mut matched = vec![false; palette.len()];
    let mut weighted_error = 0.0;
    for target in targets {
        let (best, distance) = palette.nearest(target.lab())?;
        weighted_error += distance * target.weight;
        matched[best] = true;
    }

    let target_count = targets.len() as f64;
    let unique_heights = matched.iter().filter(|&&m| m).count();

    let height_spread = if targets.is_empty() {
        0.0
    } else {
        let spread = unique_heights as f64 / target_count;
        (1.0 - spread) * target_count * HEIGHT_SPREAD_PENALTY
    };

    Some(ScoreBreakdown {
        accuracy: weighted_error * target_count,
        height_spread,
        layer_count: palette.len() as f64 * LAYER_PENALTY,
        wasted: (palette.len() - unique_heights) as f64 * WASTED_PENALTY,
    })
}

/// Total score of a candidate sequence; `f64::INFINITY` for an empty sequence.
pub fn score_sequence(sequence: &[Filament], targets: &[WeightedLabTarget], settings: &ZoneSettings) -> f64 {
    let palette = achievable_palette(sequence, settings);
    score_palette(&palette, targets).map_or(f64::INFINITY, |b| b.total())
}

/// Scores index sequences over a fixed filament list.
///
/// The search algorithms work on indices; this keeps the filament lookup and
/// evaluation count in one place.
#[derive(Debug)]
pub(crate) struct Scorer<'a> {
    filaments: &'a [Filament],
    targets: &'a [WeightedLabTarget],
    settings: &'a ZoneSettings,
    evaluations: u64,
}

impl<'a> Scorer<'a> {
    pub(crate) fn new(
        filaments: &'a [Filament],
        targets: &'a [WeightedLabTarget],
        settings: &'a ZoneSettings,
    ) -> Self {
        Self {
            filaments,
            targets,
            settings,
            evaluations: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.filaments.len()
    }

    pub(crate) fn score(&mut self, order: &[usize]) -> f64 {
        self.evaluations += 1;
        let sequence: Vec<Filament> = order.iter().map(|&i| self.filaments[i].clone()).collect();
        score_sequence(&sequence, self.targets, self.settings)
    }

    pub(crate) fn evaluations(&self) -> u64 {
        self.evaluations
    }
}
