use rgb::RGB8;
use serde::{Deserialize, Serialize};

use crate::color::{self, Lab, hex_color};
use crate::error::PlanError;

/// A print material: color plus its transmission distance (TD, mm).
///
/// `name` and `brand` ride along for the calling layer; nothing in this crate
/// reads them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filament {
    pub id: String,
    #[serde(with = "hex_color")]
    pub color: RGB8,
    pub transmission_distance: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
}

impl Filament {
    pub fn new(id: impl Into<String>, color: RGB8, transmission_distance: f64) -> Self {
        Self {
            id: id.into(),
            color,
            transmission_distance,
            name: None,
            brand: None,
        }
    }

    /// Build from a hex color string. Malformed channels read as 0.
    pub fn from_hex(id: impl Into<String>, hex: &str, transmission_distance: f64) -> Self {
        Self::new(id, color::hex_to_rgb(hex), transmission_distance)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = Some(brand.into());
        self
    }

    /// Alias for the transmission distance.
    #[inline]
    pub fn td(&self) -> f64 {
        self.transmission_distance
    }

    pub fn lab(&self) -> Lab {
        color::rgb_to_lab(self.color)
    }

    pub fn luminance(&self) -> f64 {
        color::luminance(self.color)
    }

    /// Copy with the TD multiplied by `scale` (front-lit correction).
    pub fn scaled_td(&self, scale: f64) -> Self {
        let mut f = self.clone();
        f.transmission_distance *= scale;
        f
    }

    /// Physical signature used for canonical ordering: packed color, then TD bits.
    pub(crate) fn signature(&self) -> (u32, u64) {
        let packed = (self.color.r as u32) << 16 | (self.color.g as u32) << 8 | self.color.b as u32;
        (packed, self.transmission_distance.to_bits())
    }
}

/// Indices of `filaments` ordered darkest-first, ties broken by id, then input position.
pub fn luminance_order(filaments: &[Filament]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..filaments.len()).collect();
    order.sort_by(|&a, &b| {
        let (fa, fb) = (&filaments[a], &filaments[b]);
        fa.luminance()
            .total_cmp(&fb.luminance())
            .then_with(|| fa.id.cmp(&fb.id))
    });
    order
}

/// Reject transmission distances the simulation cannot bound.
///
/// Zero and negative TDs are degenerate but well defined; NaN and infinity are not.
pub fn validate_filaments(filaments: &[Filament]) -> Result<(), PlanError> {
    match filaments.iter().find(|f| !f.transmission_distance.is_finite()) {
        Some(f) => Err(PlanError::InvalidOption {
            name: "transmissionDistance",
            value: f.transmission_distance,
        }),
        None => Ok(()),
    }
}
