//! The per-physical-layer view handed to mesh builders, and the swatch lists
//! derived from it.

use rgb::RGB8;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::color::{hex_color, rgb_to_lab};
use crate::filament::Filament;
use crate::optimizer::{OptimizerResult, ResolvedAlgorithm};
use crate::scoring::{PaletteSample, dedupe_runs};
use crate::zones::{TransitionZone, ZoneSettings, layer_tops};

/// One printed layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaintLayer {
    pub index: usize,
    pub top_height: f64,
    /// Filament printed at this layer.
    pub filament_id: String,
    #[serde(with = "hex_color")]
    pub filament_color: RGB8,
    /// Simulated color seen at this height.
    #[serde(with = "hex_color")]
    pub color: RGB8,
}

/// A color reachable at a given stack height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Swatch {
    #[serde(with = "hex_color")]
    pub color: RGB8,
    pub height: f64,
}

/// What the optimizer did, for the caller's confidence display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizerMetadata {
    pub algorithm: ResolvedAlgorithm,
    pub score: f64,
    pub iterations: u64,
    pub converged: bool,
    pub cache_hit: bool,
}

impl From<&OptimizerResult> for OptimizerMetadata {
    fn from(result: &OptimizerResult) -> Self {
        Self {
            algorithm: result.resolved_algorithm,
            score: result.score,
            iterations: result.iterations,
            converged: result.converged,
            cache_hit: result.cache_hit,
        }
    }
}

/// Complete layer plan for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoPaintResult {
    pub zones: Vec<TransitionZone>,
    pub layers: Vec<PaintLayer>,
    /// Height of the (possibly compressed) stack.
    pub total_height: f64,
    /// Uncompressed height.
    pub ideal_height: f64,
    /// Ideal height snapped up to the physical layer grid.
    pub auto_height: f64,
    pub compression_ratio: f64,
    pub filament_order: Vec<Filament>,
    /// Index into the request's filament list for each zone.
    pub color_order: Vec<usize>,
    /// Actual thickness of each zone.
    pub color_slice_heights: Vec<f64>,
    /// Pure color of each zone's filament.
    #[serde(with = "hex_list")]
    pub filament_swatches: Vec<RGB8>,
    /// Distinct blended colors the stack shows, bottom to top.
    pub virtual_swatches: Vec<Swatch>,
    pub optimizer: Option<OptimizerMetadata>,
    /// True when the layer view hit the layer cap and is incomplete.
    pub truncated: bool,
}

impl AutoPaintResult {
    /// The result for a request with nothing to print.
    pub fn empty() -> Self {
        Self {
            zones: Vec::new(),
            layers: Vec::new(),
            total_height: 0.0,
            ideal_height: 0.0,
            auto_height: 0.0,
            compression_ratio: 1.0,
            filament_order: Vec::new(),
            color_order: Vec::new(),
            color_slice_heights: Vec::new(),
            filament_swatches: Vec::new(),
            virtual_swatches: Vec::new(),
            optimizer: None,
            truncated: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}

mod hex_list {
    use rgb::RGB8;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::color::{hex_to_rgb, rgb_to_hex};

    pub fn serialize<S: Serializer>(colors: &[RGB8], serializer: S) -> Result<S::Ok, S::Error> {
        let hex: Vec<String> = colors.iter().map(|&c| rgb_to_hex(c)).collect();
        hex.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<RGB8>, D::Error> {
        let hex = Vec::<String>::deserialize(deserializer)?;
        Ok(hex.iter().map(|s| hex_to_rgb(s)).collect())
    }
}

/// Expand zones into physical layers. The flag is set when the layer cap was hit.
pub fn build_layers(zones: &[TransitionZone], settings: &ZoneSettings) -> (Vec<PaintLayer>, bool) {
    let total = zones.last().map_or(0.0, |z| z.end_height);
    let (tops, truncated) = layer_tops(total, settings);
    if truncated {
        warn!(
            layers = tops.len(),
            total_height = total,
            "layer view truncated at the layer cap"
        );
    }

    let layers = tops
        .into_iter()
        .enumerate()
        .filter_map(|(index, top)| {
            let zone = zones
                .iter()
                .find(|z| top <= z.end_height + 1e-9)
                .or_else(|| zones.last())?;
            Some(PaintLayer {
                index,
                top_height: top,
                filament_id: zone.filament_id.clone(),
                filament_color: zone.color,
                color: zone.color_at_height(top),
            })
        })
        .collect();

    (layers, truncated)
}

/// Distinct visible colors up the stack, near-duplicates collapsed.
pub fn virtual_swatches(layers: &[PaintLayer]) -> Vec<Swatch> {
    let samples: Vec<PaletteSample> = layers
        .iter()
        .map(|l| PaletteSample {
            color: l.color,
            lab: rgb_to_lab(l.color),
            height: l.top_height,
        })
        .collect();

    dedupe_runs(&samples)
        .into_iter()
        .map(|s| Swatch {
            color: s.color,
            height: s.height,
        })
        .collect()
}

/// Round `height` up to the next physical layer boundary.
pub fn snap_to_layers(height: f64, settings: &ZoneSettings) -> f64 {
    if height <= 0.0 || settings.layer_height <= 0.0 {
        return height.max(0.0);
    }
    let first = settings.first_layer_height.max(0.0);
    if height <= first {
        return first;
    }
    let steps = ((height - first) / settings.layer_height - 1e-9).ceil();
    first + steps * settings.layer_height
}
