//! Page geometry – paper size minus margins, plus the pixel density used to
//! move between millimetres and layout pixels.

use serde::{Deserialize, Serialize};

use crate::units::{self, parse_length, Length, CSS_PX_PER_MM, DEFAULT_MARGIN_MM};

/// Page orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageOrientation {
    /// Portrait mode: height > width (default).
    #[default]
    Portrait,
    /// Landscape mode: width and height swapped.
    Landscape,
}

/// Physical paper dimensions in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PaperSize {
    pub width_mm: f32,
    pub height_mm: f32,
}

impl PaperSize {
    pub const A4: Self = Self::new(210.0, 297.0);
    pub const A5: Self = Self::new(148.0, 210.0);
    pub const LETTER: Self = Self::new(215.9, 279.4);
    pub const LEGAL: Self = Self::new(215.9, 355.6);

    pub const fn new(width_mm: f32, height_mm: f32) -> Self {
        Self {
            width_mm,
            height_mm,
        }
    }

    /// Look up a preset by (case-insensitive) name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "a4" => Some(Self::A4),
            "a5" => Some(Self::A5),
            "letter" => Some(Self::LETTER),
            "legal" => Some(Self::LEGAL),
            _ => None,
        }
    }

    pub fn oriented(self, orientation: PageOrientation) -> Self {
        match orientation {
            PageOrientation::Portrait => self,
            PageOrientation::Landscape => Self::new(self.height_mm, self.width_mm),
        }
    }
}

impl Default for PaperSize {
    fn default() -> Self {
        Self::A4
    }
}

/// The four free-text margin fields as the user typed them.
///
/// `None` or empty strings mean "use the default".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarginSpec {
    pub top: Option<String>,
    pub bottom: Option<String>,
    pub left: Option<String>,
    pub right: Option<String>,
}

impl MarginSpec {
    /// The same value on every side.
    pub fn uniform(value: &str) -> Self {
        Self {
            top: Some(value.to_string()),
            bottom: Some(value.to_string()),
            left: Some(value.to_string()),
            right: Some(value.to_string()),
        }
    }
}

/// Page margins. Never partially missing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Margins {
    pub top: Length,
    pub bottom: Length,
    pub left: Length,
    pub right: Length,
}

impl Default for Margins {
    fn default() -> Self {
        Self::uniform(Length::default())
    }
}

impl Margins {
    pub fn uniform(length: Length) -> Self {
        Self {
            top: length,
            bottom: length,
            left: length,
            right: length,
        }
    }

    /// Parse the four margin strings; missing or malformed sides use the
    /// default margin.
    pub fn parse(spec: &MarginSpec) -> Self {
        let side = |s: &Option<String>| {
            s.as_deref()
                .map(|v| parse_length(v, DEFAULT_MARGIN_MM))
                .unwrap_or_default()
        };
        Self {
            top: side(&spec.top),
            bottom: side(&spec.bottom),
            left: side(&spec.left),
            right: side(&spec.right),
        }
    }
}

/// Page box dimensions with margins resolved to millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    pub paper_width_mm: f32,
    pub paper_height_mm: f32,
    pub margin_top_mm: f32,
    pub margin_bottom_mm: f32,
    pub margin_left_mm: f32,
    pub margin_right_mm: f32,
    /// Layout pixels per millimetre for this rendering context.
    pub px_per_mm: f32,
}

/// Resolve margins against a paper size.
///
/// `px_per_mm` should come from a live measurement; unusable values fall back
/// to [`CSS_PX_PER_MM`]. Margins are clamped to be non-negative.
pub fn compute_geometry(paper: PaperSize, margins: &Margins, px_per_mm: f32) -> PageGeometry {
    let px_per_mm = units::sane_ratio(px_per_mm);
    PageGeometry {
        paper_width_mm: paper.width_mm.max(0.0),
        paper_height_mm: paper.height_mm.max(0.0),
        margin_top_mm: margins.top.to_mm(px_per_mm),
        margin_bottom_mm: margins.bottom.to_mm(px_per_mm),
        margin_left_mm: margins.left.to_mm(px_per_mm),
        margin_right_mm: margins.right.to_mm(px_per_mm),
        px_per_mm,
    }
}

impl PageGeometry {
    /// A4 portrait with one-inch margins at CSS pixel density.
    pub fn a4() -> Self {
        compute_geometry(PaperSize::A4, &Margins::default(), CSS_PX_PER_MM)
    }

    pub fn inner_width_mm(&self) -> f32 {
        (self.paper_width_mm - self.margin_left_mm - self.margin_right_mm).max(0.0)
    }

    pub fn inner_height_mm(&self) -> f32 {
        (self.paper_height_mm - self.margin_top_mm - self.margin_bottom_mm).max(0.0)
    }

    pub fn inner_width_px(&self) -> f32 {
        units::mm_to_px(self.inner_width_mm(), self.px_per_mm)
    }

    pub fn inner_height_px(&self) -> f32 {
        units::mm_to_px(self.inner_height_mm(), self.px_per_mm)
    }

    /// True when margins swallow the whole page on either axis.
    pub fn is_degenerate(&self) -> bool {
        self.inner_width_mm() <= 0.0 || self.inner_height_mm() <= 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a4_inner_box() {
        let g = PageGeometry::a4();
        assert!((g.inner_height_mm() - 246.2).abs() < 1e-3);
        assert!((g.inner_width_mm() - 159.2).abs() < 1e-3);
        assert!(!g.is_degenerate());
    }

    #[test]
    fn oversized_margins_clamp_to_zero() {
        let margins = Margins::parse(&MarginSpec::uniform("20cm"));
        let g = compute_geometry(PaperSize::A4, &margins, CSS_PX_PER_MM);
        assert_eq!(g.inner_height_mm(), 0.0);
        assert_eq!(g.inner_width_mm(), 0.0);
        assert!(g.is_degenerate());
    }

    #[test]
    fn missing_sides_use_default() {
        let spec = MarginSpec {
            top: Some("1cm".into()),
            left: Some("".into()),
            ..MarginSpec::default()
        };
        let m = Margins::parse(&spec);
        assert_eq!(m.top.to_mm(1.0), 10.0);
        assert_eq!(m.left, Length::default());
        assert_eq!(m.bottom, Length::default());
    }

    #[test]
    fn invalid_ratio_falls_back() {
        let g = compute_geometry(PaperSize::A4, &Margins::default(), -1.0);
        assert_eq!(g.px_per_mm, CSS_PX_PER_MM);
    }

    #[test]
    fn landscape_swaps_axes() {
        let p = PaperSize::from_name("Letter").unwrap().oriented(PageOrientation::Landscape);
        assert_eq!(p.width_mm, 279.4);
        assert_eq!(p.height_mm, 215.9);
        assert!(PaperSize::from_name("tabloid").is_none());
    }
}
