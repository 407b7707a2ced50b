//! Transition-zone simulation and height compression.
//!
//! The stack is built bottom-up. Filament 0 forms an opaque foundation; every
//! following filament gets a zone just thick enough for its blend over the
//! previous filament to converge on its own color.

use rgb::RGB8;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::color::{Lab, blend_colors, hex_color, opacity, rgb_to_lab};
use crate::filament::Filament;

/// ΔE below which a blend is indistinguishable from the pure filament.
pub const CONVERGENCE_DELTA_E: f64 = 2.3;
/// Opacity at which a zone stops regardless of color convergence.
pub const OPACITY_LIMIT: f64 = 0.85;
/// Foundation thickness in TDs: 0.1^1.3 ≈ 5% transmission.
pub const FOUNDATION_TD_FACTOR: f64 = 1.3;
/// Upper bound on a transition zone in TDs.
pub const ZONE_CAP_TD_FACTOR: f64 = 0.7;

/// Physical print parameters the simulation needs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneSettings {
    /// Height of every layer after the first (mm).
    pub layer_height: f64,
    /// Height of the first printed layer (mm).
    pub first_layer_height: f64,
    /// Minimum foundation thickness (mm).
    pub base_thickness: f64,
}

impl Default for ZoneSettings {
    fn default() -> Self {
        Self {
            layer_height: 0.12,
            first_layer_height: 0.2,
            base_thickness: 0.2,
        }
    }
}

/// Why a zone stopped growing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ZoneTermination {
    /// The first zone; sized by TD, not simulated.
    Foundation,
    /// Blend came within [`CONVERGENCE_DELTA_E`] of the pure color.
    Converged,
    /// Opacity passed [`OPACITY_LIMIT`].
    Opaque,
    /// Hit `max(layer_height, 0.7 × td)`.
    Capped,
}

/// A vertical band of the stack given over to one filament.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionZone {
    pub filament_id: String,
    #[serde(with = "hex_color")]
    pub color: RGB8,
    pub td: f64,
    /// Pure color of the zone below; the blend background.
    #[serde(with = "hex_color")]
    pub background: RGB8,
    pub start_height: f64,
    pub end_height: f64,
    pub ideal_thickness: f64,
    pub actual_thickness: f64,
    pub termination: ZoneTermination,
}

impl TransitionZone {
    /// Visible color at `depth` mm into this zone, measured in uncompressed
    /// (ideal) thickness.
    pub fn color_at_depth(&self, depth: f64) -> RGB8 {
        match self.termination {
            ZoneTermination::Foundation => self.color,
            _ => blend_colors(self.background, self.color, self.td, depth.min(self.ideal_thickness)),
        }
    }

    /// Visible color at absolute `height`, accounting for compression.
    pub fn color_at_height(&self, height: f64) -> RGB8 {
        let scale = if self.actual_thickness > 0.0 {
            self.ideal_thickness / self.actual_thickness
        } else {
            1.0
        };
        self.color_at_depth((height - self.start_height).max(0.0) * scale)
    }
}

/// Ideal thickness of one transition zone and why it stopped.
fn simulate_zone(background: RGB8, filament: &Filament, layer_height: f64) -> (f64, ZoneTermination) {
    let td = filament.td();
    let cap = layer_height.max(td * ZONE_CAP_TD_FACTOR);
    if cap <= 0.0 || !cap.is_finite() {
        return (0.0, ZoneTermination::Capped);
    }

    // At most MAX_LAYERS steps per zone, whatever the TD or layer height.
    let step = (if layer_height > 0.0 { layer_height } else { cap }).max(cap / MAX_LAYERS as f64);
    let target: Lab = rgb_to_lab(filament.color);
    let mut thickness = 0.0f64;

    loop {
        thickness = (thickness + step).min(cap);
        let blended = blend_colors(background, filament.color, td, thickness);

        if rgb_to_lab(blended).delta_e(target) < CONVERGENCE_DELTA_E {
            return (thickness, ZoneTermination::Converged);
        }
        if opacity(td, thickness) > OPACITY_LIMIT {
            return (thickness, ZoneTermination::Opaque);
        }
        if thickness >= cap {
            return (thickness, ZoneTermination::Capped);
        }
    }
}

/// Simulate the zone stack for an ordered filament sequence.
///
/// Zero filaments yield no zones; one filament yields only the foundation.
/// Zones are contiguous: `zones[i].end_height == zones[i + 1].start_height`.
pub fn calculate_transition_zones(sequence: &[Filament], settings: &ZoneSettings) -> Vec<TransitionZone> {
    let Some(first) = sequence.first() else {
        return Vec::new();
    };

    let mut zones = Vec::with_capacity(sequence.len());
    let foundation = settings.base_thickness.max(first.td() * FOUNDATION_TD_FACTOR).max(0.0);
    zones.push(TransitionZone {
        filament_id: first.id.clone(),
        color: first.color,
        td: first.td(),
        background: first.color,
        start_height: 0.0,
        end_height: foundation,
        ideal_thickness: foundation,
        actual_thickness: foundation,
        termination: ZoneTermination::Foundation,
    });

    let mut height = foundation;
    for pair in sequence.windows(2) {
        let (prev, filament) = (&pair[0], &pair[1]);
        let (thickness, termination) = simulate_zone(prev.color, filament, settings.layer_height);
        trace!(
            filament = %filament.id,
            thickness,
            ?termination,
            "transition zone"
        );

        zones.push(TransitionZone {
            filament_id: filament.id.clone(),
            color: filament.color,
            td: filament.td(),
            background: prev.color,
            start_height: height,
            end_height: height + thickness,
            ideal_thickness: thickness,
            actual_thickness: thickness,
            termination,
        });
        height += thickness;
    }

    zones
}

/// Sum of ideal thicknesses.
pub fn ideal_height(zones: &[TransitionZone]) -> f64 {
    zones.iter().map(|z| z.ideal_thickness).sum()
}

/// Safety cap on how many physical layers are ever expanded from a stack.
pub const MAX_LAYERS: usize = 500;

/// Top heights of the physical layers of a stack `total_height` tall.
///
/// The first layer tops out at `first_layer_height`, later ones every
/// `layer_height`. A final partial layer is added so the last entry reaches the
/// top. The boolean is true when [`MAX_LAYERS`] cut the list short.
pub fn layer_tops(total_height: f64, settings: &ZoneSettings) -> (Vec<f64>, bool) {
    const EPS: f64 = 1e-9;
    if total_height <= 0.0 || !total_height.is_finite() {
        return (Vec::new(), false);
    }

    let mut tops = Vec::new();
    if settings.layer_height > 0.0 {
        let first = if settings.first_layer_height > 0.0 {
            settings.first_layer_height
        } else {
            settings.layer_height
        };
        let mut k = 0usize;
        loop {
            let h = first + k as f64 * settings.layer_height;
            if h > total_height + EPS {
                break;
            }
            if tops.len() == MAX_LAYERS {
                return (tops, true);
            }
            tops.push(h);
            k += 1;
        }
    }

    if tops.last().map_or(true, |&h| h < total_height - EPS) {
        if tops.len() == MAX_LAYERS {
            return (tops, true);
        }
        tops.push(total_height);
    }

    (tops, false)
}

/// Visible color at `height` in a zone stack. Heights past the top read the top.
pub fn color_at_height(zones: &[TransitionZone], height: f64) -> Option<RGB8> {
    let zone = zones
        .iter()
        .find(|z| height <= z.end_height + 1e-9)
        .or_else(|| zones.last())?;
    Some(zone.color_at_height(height.min(zone.end_height)))
}

/// Zones rescaled to a height budget.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressedZones {
    pub zones: Vec<TransitionZone>,
    pub ideal_height: f64,
    pub total_height: f64,
    /// Uniform scale factor in (0, 1]; 1 when no compression was needed.
    pub ratio: f64,
}

/// Scale every zone uniformly so the stack fits under `max_height`.
///
/// A missing or non-positive budget, or one the stack already fits under,
/// leaves the zones untouched with ratio 1. When compressing, the top of the
/// stack lands exactly on `max_height`.
pub fn compress_zones(zones: &[TransitionZone], max_height: Option<f64>) -> CompressedZones {
    let ideal = ideal_height(zones);
    let limit = max_height.filter(|&h| h > 0.0 && h.is_finite());

    let Some(limit) = limit.filter(|&h| ideal > h) else {
        return CompressedZones {
            zones: zones.to_vec(),
            ideal_height: ideal,
            total_height: zones.last().map_or(0.0, |z| z.end_height),
            ratio: 1.0,
        };
    };

    let ratio = limit / ideal;
    let mut height = 0.0;
    let mut out: Vec<TransitionZone> = zones
        .iter()
        .map(|z| {
            let actual = z.ideal_thickness * ratio;
            let zone = TransitionZone {
                start_height: height,
                end_height: height + actual,
                actual_thickness: actual,
                ..z.clone()
            };
            height += actual;
            zone
        })
        .collect();

    if let Some(last) = out.last_mut() {
        last.end_height = limit;
    }

    CompressedZones {
        zones: out,
        ideal_height: ideal,
        total_height: limit,
        ratio,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dark_white() -> Vec<Filament> {
        vec![
            Filament::from_hex("dark", "#000000", 1.0),
            Filament::from_hex("white", "#ffffff", 2.0),
        ]
    }

    fn settings() -> ZoneSettings {
        ZoneSettings {
            layer_height: 0.12,
            first_layer_height: 0.2,
            base_thickness: 0.2,
        }
    }

    #[test]
    fn no_filaments_no_zones() {
        assert!(calculate_transition_zones(&[], &settings()).is_empty());
    }

    #[test]
    fn single_filament_is_foundation_only() {
        let zones = calculate_transition_zones(&dark_white()[..1], &settings());
        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].termination, ZoneTermination::Foundation);
        assert!((zones[0].ideal_thickness - 1.3).abs() < 1e-12);
    }

    #[test]
    fn base_thickness_wins_when_larger() {
        let s = ZoneSettings {
            base_thickness: 2.0,
            ..settings()
        };
        let zones = calculate_transition_zones(&dark_white(), &s);
        assert_eq!(zones[0].ideal_thickness, 2.0);
    }

    #[test]
    fn dark_to_white_is_capped() {
        let zones = calculate_transition_zones(&dark_white(), &settings());
        assert_eq!(zones.len(), 2);
        assert!(zones[1].ideal_thickness <= 1.4 + 1e-12);
        assert_eq!(zones[1].termination, ZoneTermination::Capped);
        assert!((zones[1].ideal_thickness - 1.4).abs() < 1e-12);
    }

    #[test]
    fn similar_colors_converge_quickly() {
        let seq = vec![
            Filament::from_hex("a", "#808080", 1.0),
            Filament::from_hex("b", "#848484", 1.0),
        ];
        let zones = calculate_transition_zones(&seq, &settings());
        assert_eq!(zones[1].termination, ZoneTermination::Converged);
        assert!((zones[1].ideal_thickness - 0.12).abs() < 1e-12);
    }

    #[test]
    fn thin_td_goes_opaque() {
        // One 0.12 mm layer of td 0.1 blue blocks ~94% but still shows yellow.
        let seq = vec![
            Filament::from_hex("yellow", "#ffff00", 1.0),
            Filament::from_hex("blue", "#0000ff", 0.1),
        ];
        let zones = calculate_transition_zones(&seq, &settings());
        assert_eq!(zones[1].termination, ZoneTermination::Opaque);
        assert!((zones[1].ideal_thickness - 0.12).abs() < 1e-12);
    }

    #[test]
    fn zones_are_contiguous() {
        let seq = vec![
            Filament::from_hex("k", "#101010", 0.6),
            Filament::from_hex("r", "#c02020", 1.5),
            Filament::from_hex("y", "#f0e040", 3.0),
            Filament::from_hex("w", "#fafafa", 2.5),
        ];
        let zones = calculate_transition_zones(&seq, &settings());
        assert_eq!(zones.len(), 4);
        assert_eq!(zones[0].start_height, 0.0);
        for w in zones.windows(2) {
            assert_eq!(w[0].end_height, w[1].start_height);
            assert!(w[1].end_height >= w[1].start_height);
        }
    }

    #[test]
    fn degenerate_layer_height_terminates() {
        let s = ZoneSettings {
            layer_height: 0.0,
            ..settings()
        };
        let zones = calculate_transition_zones(&dark_white(), &s);
        assert_eq!(zones.len(), 2);
        assert!((zones[1].ideal_thickness - 1.4).abs() < 1e-12);

        let zero_td = vec![
            Filament::from_hex("a", "#000000", 1.0),
            Filament::from_hex("b", "#ffffff", 0.0),
        ];
        let zones = calculate_transition_zones(&zero_td, &s);
        assert_eq!(zones[1].ideal_thickness, 0.0);
    }

    #[test]
    fn huge_td_stops_at_cap() {
        // Nearly clear: never converges or goes opaque, so the zone runs to 0.7 × td.
        let seq = vec![
            Filament::from_hex("dark", "#000000", 1.0),
            Filament::from_hex("clear", "#ffffff", 1e9),
        ];
        let zones = calculate_transition_zones(&seq, &settings());
        assert_eq!(zones[1].termination, ZoneTermination::Capped);
        assert_eq!(zones[1].ideal_thickness, 0.7e9);
    }

    #[test]
    fn tiny_layer_height_is_bounded() {
        let s = ZoneSettings {
            layer_height: 1e-6,
            ..settings()
        };
        let zones = calculate_transition_zones(&dark_white(), &s);
        assert_eq!(zones[1].termination, ZoneTermination::Capped);
        assert!((zones[1].ideal_thickness - 1.4).abs() < 1e-12);
    }

    #[test]
    fn infinite_td_yields_empty_zone() {
        let seq = vec![
            Filament::from_hex("dark", "#000000", 1.0),
            Filament::from_hex("clear", "#ffffff", f64::INFINITY),
        ];
        let zones = calculate_transition_zones(&seq, &settings());
        assert_eq!(zones[1].ideal_thickness, 0.0);
        assert_eq!(zones[1].termination, ZoneTermination::Capped);
    }

    #[test]
    fn compress_noop_when_under_budget() {
        let zones = calculate_transition_zones(&dark_white(), &settings());
        let ideal = ideal_height(&zones);
        for budget in [None, Some(ideal), Some(ideal + 5.0), Some(0.0)] {
            let c = compress_zones(&zones, budget);
            assert_eq!(c.ratio, 1.0);
            for z in &c.zones {
                assert_eq!(z.actual_thickness, z.ideal_thickness);
            }
        }
    }

    #[test]
    fn compress_preserves_proportions() {
        let zones = calculate_transition_zones(&dark_white(), &settings());
        let c = compress_zones(&zones, Some(1.5));
        let expected = 1.5 / ideal_height(&zones);
        assert!((c.ratio - expected).abs() < 1e-12);
        assert!(c.ratio < 1.0);
        assert_eq!(c.total_height, 1.5);
        assert_eq!(c.zones.last().map(|z| z.end_height), Some(1.5));
        for (orig, z) in zones.iter().zip(&c.zones) {
            assert!((z.actual_thickness - orig.ideal_thickness * c.ratio).abs() < 1e-12);
        }
        for w in c.zones.windows(2) {
            assert_eq!(w[0].end_height, w[1].start_height);
        }
    }

    #[test]
    fn layer_tops_follow_first_layer_then_steps() {
        let (tops, truncated) = layer_tops(0.5, &settings());
        assert!(!truncated);
        assert_eq!(tops.len(), 4);
        assert!((tops[0] - 0.2).abs() < 1e-12);
        assert!((tops[1] - 0.32).abs() < 1e-12);
        assert!((tops[2] - 0.44).abs() < 1e-12);
        assert_eq!(tops[3], 0.5);
    }

    #[test]
    fn layer_tops_report_truncation() {
        let (tops, truncated) = layer_tops(1000.0, &settings());
        assert!(truncated);
        assert_eq!(tops.len(), MAX_LAYERS);

        let (empty, truncated) = layer_tops(0.0, &settings());
        assert!(empty.is_empty());
        assert!(!truncated);
    }

    #[test]
    fn color_at_height_walks_the_blend() {
        let zones = calculate_transition_zones(&dark_white(), &settings());
        let z = &zones[1];
        let low = z.color_at_height(z.start_height + 0.12);
        let high = z.color_at_height(z.end_height);
        assert!(high.r > low.r);
        assert_eq!(zones[0].color_at_height(0.5), RGB8::new(0, 0, 0));
    }
}
