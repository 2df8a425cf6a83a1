use plotters::style::RGBColor;

use crate::error::RenderError;

/// Parse `#rrggbb` (the leading `#` is optional).
pub fn parse_hex(raw: &str) -> Result<RGBColor, RenderError> {
    let hex = raw.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return Err(RenderError::InvalidColor(raw.to_string()));
    }
    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&hex[range], 16).map_err(|_| RenderError::InvalidColor(raw.to_string()))
    };
    Ok(RGBColor(channel(0..2)?, channel(2..4)?, channel(4..6)?))
}

/// Sequential single-hue ramp from a near-white tint to a dark shade.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ramp {
    light: RGBColor,
    dark: RGBColor,
}

impl Ramp {
    pub const BLUES: Ramp = Ramp::new(RGBColor(0xf7, 0xfb, 0xff), RGBColor(0x08, 0x30, 0x6b));
    pub const REDS: Ramp = Ramp::new(RGBColor(0xff, 0xf5, 0xf0), RGBColor(0x67, 0x00, 0x0d));
    pub const GREENS: Ramp = Ramp::new(RGBColor(0xf7, 0xfc, 0xf5), RGBColor(0x00, 0x44, 0x1b));
    pub const PURPLES: Ramp = Ramp::new(RGBColor(0xfc, 0xfb, 0xfd), RGBColor(0x3f, 0x00, 0x7d));
    pub const ORANGES: Ramp = Ramp::new(RGBColor(0xff, 0xf5, 0xeb), RGBColor(0x7f, 0x27, 0x04));
    pub const GREYS: Ramp = Ramp::new(RGBColor(0xff, 0xff, 0xff), RGBColor(0x00, 0x00, 0x00));

    pub const fn new(light: RGBColor, dark: RGBColor) -> Self {
        Self { light, dark }
    }

    /// Colour at `t` in [0, 1]; values outside are clamped.
    pub fn at(&self, t: f64) -> RGBColor {
        let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
        let mix = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * t).round() as u8;
        RGBColor(
            mix(self.light.0, self.dark.0),
            mix(self.light.1, self.dark.1),
            mix(self.light.2, self.dark.2),
        )
    }
}

/// Hue ramp for a category label; unknown or missing labels shade grey.
pub fn category_ramp(label: Option<&str>) -> Ramp {
    match label {
        Some("Democratic") => Ramp::BLUES,
        Some("Republican") => Ramp::REDS,
        Some("White") => Ramp::GREENS,
        Some("Black") => Ramp::PURPLES,
        Some("Hispanic") => Ramp::ORANGES,
        Some("Low Income") => Ramp::REDS,
        Some("Lower-Mid") => Ramp::ORANGES,
        Some("Upper-Mid") => Ramp::GREENS,
        Some("High Income") => Ramp::BLUES,
        _ => Ramp::GREYS,
    }
}

/// Solid colour for a category in scatter and bar charts.
pub fn category_color(label: Option<&str>) -> RGBColor {
    match label {
        Some("Democratic") => RGBColor(0x00, 0xae, 0xf3),
        Some("Republican") => RGBColor(0xe8, 0x1b, 0x23),
        None => RGBColor(0x88, 0x88, 0x88),
        other => category_ramp(other).at(0.7),
    }
}
