//! Unit converter – parses free-text length strings (`25.4mm`, `2in`, `1.5cm`,
//! `96px`) into a canonical millimetre value and back to pixels.
//!
//! Margin fields are user-editable text, so parsing never fails: anything that
//! cannot be read resolves to the caller's fallback.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Millimetres per inch.
pub const MM_PER_INCH: f32 = 25.4;

/// Millimetres per centimetre.
pub const MM_PER_CM: f32 = 10.0;

/// CSS reference pixel density (96 px per inch) expressed per millimetre.
pub const CSS_PX_PER_MM: f32 = 96.0 / MM_PER_INCH;

/// Default margin: one inch.
pub const DEFAULT_MARGIN_MM: f32 = 25.4;

/// Unit suffix of a [`Length`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LengthUnit {
    Mm,
    Cm,
    In,
    Px,
}

impl LengthUnit {
    fn suffix(self) -> &'static str {
        match self {
            LengthUnit::Mm => "mm",
            LengthUnit::Cm => "cm",
            LengthUnit::In => "in",
            LengthUnit::Px => "px",
        }
    }
}

/// A parsed length. Always finite and non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Length {
    pub value: f32,
    pub unit: LengthUnit,
}

impl Length {
    pub const fn mm(value: f32) -> Self {
        Self {
            value,
            unit: LengthUnit::Mm,
        }
    }

    /// Convert to millimetres. `px_per_mm` is only consulted for `px` lengths.
    pub fn to_mm(&self, px_per_mm: f32) -> f32 {
        let mm = match self.unit {
            LengthUnit::Mm => self.value,
            LengthUnit::Cm => self.value * MM_PER_CM,
            LengthUnit::In => self.value * MM_PER_INCH,
            LengthUnit::Px => px_to_mm(self.value, px_per_mm),
        };
        if mm.is_finite() {
            mm.max(0.0)
        } else {
            0.0
        }
    }

    pub fn to_px(&self, px_per_mm: f32) -> f32 {
        mm_to_px(self.to_mm(px_per_mm), px_per_mm)
    }
}

impl Default for Length {
    fn default() -> Self {
        Self::mm(DEFAULT_MARGIN_MM)
    }
}

impl fmt::Display for Length {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, self.unit.suffix())
    }
}

pub fn mm_to_px(mm: f32, px_per_mm: f32) -> f32 {
    mm * sane_ratio(px_per_mm)
}

pub fn px_to_mm(px: f32, px_per_mm: f32) -> f32 {
    px / sane_ratio(px_per_mm)
}

/// Falls back to the CSS reference density for unusable ratios.
pub fn sane_ratio(px_per_mm: f32) -> f32 {
    if px_per_mm.is_finite() && px_per_mm > 0.0 {
        px_per_mm
    } else {
        CSS_PX_PER_MM
    }
}

/// Parse a length string. A bare number is millimetres.
///
/// Empty, unparsable, negative or non-finite input yields `fallback_mm`.
pub fn parse_length(input: &str, fallback_mm: f32) -> Length {
    let fallback = Length::mm(fallback_mm);
    let s = input.trim().to_ascii_lowercase();
    if s.is_empty() {
        return fallback;
    }

    let (number, unit) = [
        ("mm", LengthUnit::Mm),
        ("cm", LengthUnit::Cm),
        ("in", LengthUnit::In),
        ("px", LengthUnit::Px),
    ]
    .iter()
    .find_map(|(suffix, unit)| s.strip_suffix(suffix).map(|n| (n.trim(), *unit)))
    .unwrap_or((s.as_str(), LengthUnit::Mm));

    match number.parse::<f32>() {
        Ok(value) if value.is_finite() && value >= 0.0 => Length { value, unit },
        _ => {
            log::debug!("Unparsable length {input:?}, using {fallback_mm}mm");
            fallback
        }
    }
}
