use rgb::RGB8;

/// CIELab color (D65 reference white).
///
/// L: lightness [0, 100], a: green-red, b: blue-yellow.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Lab {
    pub l: f64,
    pub a: f64,
    pub b: f64,
}

impl Lab {
    pub const fn new(l: f64, a: f64, b: f64) -> Self {
        Self { l, a, b }
    }

    /// CIE76 color difference: Euclidean distance in Lab space.
    pub fn delta_e(self, other: Self) -> f64 {
        let dl = self.l - other.l;
        let da = self.a - other.a;
        let db = self.b - other.b;
        (dl * dl + da * da + db * db).sqrt()
    }
}

// --- sRGB → CIELab constants ---

const GAMMA_BREAKPOINT: f64 = 0.04045;
const COMPANDING_EXPONENT: f64 = 2.4;
const WHITE_X: f64 = 95.047;
const WHITE_Y: f64 = 100.0;
const WHITE_Z: f64 = 108.883;
const CIE_EPSILON: f64 = 0.008856;
const CIE_KAPPA: f64 = 903.3;

/// Parse `#rrggbb`, `rrggbb` or the `#rgb` shorthand.
///
/// Never fails: any channel that is missing or not valid hex reads as 0.
pub fn hex_to_rgb(hex: &str) -> RGB8 {
    let s = hex.trim();
    let s = s.strip_prefix('#').unwrap_or(s);

    let expanded;
    let s = if s.len() == 3 && s.is_ascii() {
        expanded = s.chars().flat_map(|c| [c, c]).collect::<String>();
        expanded.as_str()
    } else {
        s
    };

    let channel = |i: usize| {
        s.get(i * 2..i * 2 + 2)
            .and_then(|pair| u8::from_str_radix(pair, 16).ok())
            .unwrap_or(0)
    };

    RGB8::new(channel(0), channel(1), channel(2))
}

/// Format as lowercase `#rrggbb`.
pub fn rgb_to_hex(color: RGB8) -> String {
    format!("#{:02x}{:02x}{:02x}", color.r, color.g, color.b)
}

/// sRGB gamma → linear, single channel 0..255 → 0.0..1.0
#[inline]
fn srgb_to_linear(c: u8) -> f64 {
    let c = c as f64 / 255.0;
    if c > GAMMA_BREAKPOINT {
        ((c + 0.055) / 1.055).powf(COMPANDING_EXPONENT)
    } else {
        c / 12.92
    }
}

#[inline]
fn lab_f(t: f64) -> f64 {
    if t > CIE_EPSILON {
        t.cbrt()
    } else {
        (CIE_KAPPA * t + 16.0) / 116.0
    }
}

/// Convert sRGB to CIELab: sRGB → linear → XYZ (D65) → Lab.
#[allow(clippy::excessive_precision)]
pub fn rgb_to_lab(color: RGB8) -> Lab {
    let r = srgb_to_linear(color.r) * 100.0;
    let g = srgb_to_linear(color.g) * 100.0;
    let b = srgb_to_linear(color.b) * 100.0;

    let x = r * 0.4124564 + g * 0.3575761 + b * 0.1804375;
    let y = r * 0.2126729 + g * 0.7151522 + b * 0.0721750;
    let z = r * 0.0193339 + g * 0.1191920 + b * 0.9503041;

    let fx = lab_f(x / WHITE_X);
    let fy = lab_f(y / WHITE_Y);
    let fz = lab_f(z / WHITE_Z);

    Lab {
        l: 116.0 * fy - 16.0,
        a: 500.0 * (fx - fy),
        b: 200.0 * (fy - fz),
    }
}

/// CIE76 ΔE between two Lab colors.
#[inline]
pub fn delta_e(a: Lab, b: Lab) -> f64 {
    a.delta_e(b)
}

/// Perceived luminance in [0, 1] (Rec. 601 weights).
#[inline]
pub fn luminance(color: RGB8) -> f64 {
    (0.299 * color.r as f64 + 0.587 * color.g as f64 + 0.114 * color.b as f64) / 255.0
}

/// Fraction of backlight blocked by `thickness` mm of a filament with the given TD.
///
/// Beer-Lambert: transmission = 0.1^(thickness / td). Returns 0 for td ≤ 0 or
/// thickness ≤ 0.
#[inline]
pub fn opacity(td: f64, thickness: f64) -> f64 {
    if td <= 0.0 || thickness <= 0.0 {
        return 0.0;
    }
    1.0 - 0.1f64.powf(thickness / td)
}

/// Color seen through `thickness` mm of `filament` laid over `background`.
///
/// thickness ≤ 0 deposits nothing and returns the background; td ≤ 0 is treated
/// as a fully opaque filament.
pub fn blend_colors(background: RGB8, filament: RGB8, td: f64, thickness: f64) -> RGB8 {
    if thickness <= 0.0 {
        return background;
    }
    if td <= 0.0 {
        return filament;
    }

    let transmission = 0.1f64.powf(thickness / td);
    let opacity = 1.0 - transmission;
    let mix = |f: u8, bg: u8| {
        (f as f64 * opacity + bg as f64 * transmission)
            .round()
            .clamp(0.0, 255.0) as u8
    };

    RGB8::new(
        mix(filament.r, background.r),
        mix(filament.g, background.g),
        mix(filament.b, background.b),
    )
}

/// Serde adapter that carries an `RGB8` as a `#rrggbb` string.
pub mod hex_color {
    use rgb::RGB8;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(color: &RGB8, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::rgb_to_hex(*color))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<RGB8, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(super::hex_to_rgb(&s))
    }
}
