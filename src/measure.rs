//! Measurement collaborator – the "how tall is this content?" capability the
//! fitter relies on.
//!
//! A [`MeasureBackend`] reports the live px-per-mm ratio and hands out one
//! [`Measure`] workspace per export. The workspace is an owned guard: it is
//! released when dropped, so every exit path (including `?` and panics) tears
//! it down.

use crate::dom::ContentNode;
use crate::error::{ExportError, Result};
use crate::geometry::PageGeometry;

/// A scoped measurement workspace sized to one page's inner width.
pub trait Measure {
    /// Rendered height in px of `nodes` stacked in block flow.
    fn height_px(&mut self, nodes: &[ContentNode]) -> Result<f32>;
}

/// Source of measurement workspaces.
pub trait MeasureBackend {
    /// Pixels per millimetre observed in this rendering context, if known.
    fn px_per_mm(&self) -> Option<f32>;

    /// Open a workspace laid out at `geometry`'s inner width.
    fn acquire(&self, geometry: &PageGeometry) -> Result<Box<dyn Measure + '_>>;
}

/// Measure and reject anything that is not a finite, non-negative height.
pub fn checked_height(measure: &mut dyn Measure, nodes: &[ContentNode]) -> Result<f32> {
    let h = measure.height_px(nodes)?;
    if h.is_finite() && h >= 0.0 {
        Ok(h)
    } else {
        Err(ExportError::InvalidMeasurement(h))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Deterministic measurer for fitter tests: every character of text is
    /// `px_per_char` tall, leaves carry an explicit `data-height`, and
    /// elements add `data-height` of their own (default 0).
    pub(crate) struct CharHeights {
        pub px_per_char: f32,
        pub calls: usize,
    }

    impl CharHeights {
        pub(crate) fn new(px_per_char: f32) -> Self {
            Self {
                px_per_char,
                calls: 0,
            }
        }

        fn node_height(&self, node: &ContentNode) -> f32 {
            match node {
                ContentNode::Text(t) => t.chars().count() as f32 * self.px_per_char,
                ContentNode::Leaf(e) => own_height(e),
                ContentNode::Element(e) => {
                    own_height(e) + e.children.iter().map(|c| self.node_height(c)).sum::<f32>()
                }
                ContentNode::Break => 0.0,
            }
        }
    }

    fn own_height(e: &crate::dom::ElementNode) -> f32 {
        e.attributes
            .get("data-height")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0.0)
    }

    impl Measure for CharHeights {
        fn height_px(&mut self, nodes: &[ContentNode]) -> Result<f32> {
            self.calls += 1;
            Ok(nodes.iter().map(|n| self.node_height(n)).sum())
        }
    }

    struct Broken(f32);

    impl Measure for Broken {
        fn height_px(&mut self, _: &[ContentNode]) -> Result<f32> {
            Ok(self.0)
        }
    }

    #[test]
    fn invalid_heights_are_rejected() {
        for bad in [f32::NAN, f32::INFINITY, -1.0] {
            let err = checked_height(&mut Broken(bad), &[]).unwrap_err();
            assert!(matches!(err, ExportError::InvalidMeasurement(_)));
        }
        assert_eq!(checked_height(&mut Broken(3.0), &[]).unwrap(), 3.0);
    }
}
