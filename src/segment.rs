//! Break segmenter – splits a content tree into sections at explicit
//! page-break markers.

use crate::dom::{top_level, ContentNode, ElementNode};

/// Content between two page-break markers. Never contains a `Break`.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub index: usize,
    pub nodes: Vec<ContentNode>,
}

impl Section {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Split `tree` at its top-level `Break` markers.
///
/// Each marker closes the children accumulated so far into a section, so
/// consecutive markers produce an empty section (a blank page). Trailing
/// content after the last marker forms the final section; a trailing marker
/// does not add a blank one. Markers below the top level are dropped. The
/// result is never empty.
pub fn segment(tree: &ContentNode) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut current = Vec::new();
    for node in top_level(tree) {
        match node {
            ContentNode::Break => {
                sections.push(Section {
                    index: sections.len(),
                    nodes: std::mem::take(&mut current),
                });
            }
            other => {
                if let Some(clean) = strip_breaks(other) {
                    current.push(clean);
                }
            }
        }
    }
    if !current.is_empty() || sections.is_empty() {
        sections.push(Section {
            index: sections.len(),
            nodes: current,
        });
    }
    log::debug!("Segmented content into {} section(s)", sections.len());
    sections
}

/// Clone `node` without any nested `Break` markers.
fn strip_breaks(node: &ContentNode) -> Option<ContentNode> {
    let strip = |e: &ElementNode| ElementNode {
        children: e.children.iter().filter_map(strip_breaks).collect(),
        ..e.shallow_clone()
    };
    match node {
        ContentNode::Break => None,
        ContentNode::Text(t) => Some(ContentNode::Text(t.clone())),
        ContentNode::Element(e) => Some(ContentNode::Element(strip(e))),
        ContentNode::Leaf(e) => Some(ContentNode::Leaf(strip(e))),
    }
}

fn contains_break(nodes: &[ContentNode]) -> bool {
    nodes.iter().any(|n| match n {
        ContentNode::Break => true,
        other => contains_break(other.children()),
    })
}

/// True when no section holds a `Break` at any depth.
pub fn is_break_free(sections: &[Section]) -> bool {
    sections.iter().all(|s| !contains_break(&s.nodes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{parse_document, Tag};

    #[test]
    fn no_breaks_yields_one_section() {
        let doc = parse_document("<h1>A</h1><p>B</p>");
        let sections = segment(&doc);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].nodes.len(), 2);
    }

    #[test]
    fn title_break_body() {
        let sections = segment(&parse_document("<h1>Title</h1><break/><p>Body</p>"));
        assert_eq!(sections.len(), 2);
        assert_eq!(crate::dom::text_of(&sections[0].nodes), "Title");
        assert_eq!(crate::dom::text_of(&sections[1].nodes), "Body");
        assert_eq!(sections[1].index, 1);
    }

    #[test]
    fn consecutive_breaks_make_blank_section() {
        let sections = segment(&parse_document("<p>a</p><break/><break/><p>b</p><break/>"));
        let sizes: Vec<usize> = sections.iter().map(|s| s.nodes.len()).collect();
        assert_eq!(sizes, [1, 0, 1]);
    }

    #[test]
    fn nested_breaks_are_stripped() {
        let tree = ContentNode::element(
            Tag::Body,
            vec![ContentNode::element(
                Tag::Div,
                vec![ContentNode::text("x"), ContentNode::Break, ContentNode::text("y")],
            )],
        );
        let sections = segment(&tree);
        assert_eq!(sections.len(), 1);
        assert!(is_break_free(&sections));
        assert_eq!(crate::dom::text_of(&sections[0].nodes), "xy");
    }

    #[test]
    fn empty_tree_yields_one_empty_section() {
        let sections = segment(&parse_document(""));
        assert_eq!(sections.len(), 1);
        assert!(sections[0].is_empty());
        assert_eq!(segment(&ContentNode::Break).len(), 1);
    }

    #[test]
    fn non_element_root_is_its_own_section() {
        let sections = segment(&ContentNode::text("lonely"));
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].nodes, vec![ContentNode::text("lonely")]);
    }
}
