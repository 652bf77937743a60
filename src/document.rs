//! A document: the content tree plus the margins it is exported with.

use crate::dom::{self, ContentNode};
use crate::geometry::{MarginSpec, Margins};
use crate::units::{parse_length, DEFAULT_MARGIN_MM};

/// A partial margin edit. `None` leaves the side untouched.
#[derive(Debug, Clone, Default)]
pub struct MarginUpdate {
    pub top: Option<String>,
    pub bottom: Option<String>,
    pub left: Option<String>,
    pub right: Option<String>,
}

/// Content tree and margins. Margins only change through
/// [`Document::update_margins`].
#[derive(Debug, Clone)]
pub struct Document {
    content: ContentNode,
    margins: Margins,
}

impl Document {
    pub fn new(content: ContentNode) -> Self {
        Self {
            content,
            margins: Margins::default(),
        }
    }

    pub fn from_html(html: &str) -> Self {
        Self::new(dom::parse_document(html))
    }

    pub fn with_margins(mut self, spec: &MarginSpec) -> Self {
        self.margins = Margins::parse(spec);
        self
    }

    pub fn content(&self) -> &ContentNode {
        &self.content
    }

    pub fn margins(&self) -> &Margins {
        &self.margins
    }

    /// Apply a margin edit. Malformed values reset that side to the default.
    pub fn update_margins(&mut self, update: &MarginUpdate) {
        let apply = |current: &mut crate::units::Length, value: &Option<String>| {
            if let Some(v) = value {
                *current = parse_length(v, DEFAULT_MARGIN_MM);
            }
        };
        apply(&mut self.margins.top, &update.top);
        apply(&mut self.margins.bottom, &update.bottom);
        apply(&mut self.margins.left, &update.left);
        apply(&mut self.margins.right, &update.right);
        log::debug!(
            "Margins now top={} bottom={} left={} right={}",
            self.margins.top,
            self.margins.bottom,
            self.margins.left,
            self.margins.right
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::Length;

    #[test]
    fn update_touches_only_named_sides() {
        let mut doc = Document::from_html("<p>x</p>");
        doc.update_margins(&MarginUpdate {
            top: Some("2in".into()),
            right: Some("abc".into()),
            ..MarginUpdate::default()
        });
        assert!((doc.margins().top.to_mm(1.0) - 50.8).abs() < 1e-4);
        assert_eq!(doc.margins().right, Length::default());
        assert_eq!(doc.margins().bottom, Length::default());
    }
}
