//! Content fitter – turns a section into pages by measuring candidate page
//! contents against the page's inner height.
//!
//! Per section:
//! 1. **Whole-section trial.** Top-level nodes are appended one at a time and
//!    the cumulative height checked. If everything fits, the section is one
//!    page.
//! 2. **Incremental fit.** Otherwise the nodes become a work queue and each is
//!    offered to [`try_append`]:
//!    - elements are placed as a childless shell, then filled child by child;
//!      children that do not fit continue on the next page inside a fresh
//!      shell of the same element,
//!    - text is split at the longest character prefix that fits (binary
//!      search); the remainder goes back to the front of the queue,
//!    - leaves are placed whole or not at all.
//!
//! A node that does not fit on an empty page is forced onto it (the page is
//! marked `overflow`) so pagination always terminates.

use std::collections::VecDeque;

use crate::dom::{ContentNode, ElementNode, Tag};
use crate::error::Result;
use crate::geometry::PageGeometry;
use crate::measure::{checked_height, Measure};
use crate::segment::{segment, Section};

/// Slack for float noise when comparing a height against the budget.
const FIT_EPSILON_PX: f32 = 0.01;

/// One output page of the tree path.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// Position in the exported document (0-based).
    pub index: usize,
    /// Section the page was cut from.
    pub section: usize,
    pub geometry: PageGeometry,
    pub nodes: Vec<ContentNode>,
    /// Content taller than the page was forced onto it.
    pub overflow: bool,
}

impl Page {
    pub fn text_content(&self) -> String {
        crate::dom::text_of(&self.nodes)
    }
}

/// Height still available on the page being built.
///
/// The remaining height never grows within a page; a new page starts with a
/// fresh budget.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitBudget {
    capacity_px: f32,
    used_px: f32,
}

impl FitBudget {
    pub fn new(capacity_px: f32) -> Self {
        Self {
            capacity_px: capacity_px.max(0.0),
            used_px: 0.0,
        }
    }

    pub fn capacity_px(&self) -> f32 {
        self.capacity_px
    }

    pub fn remaining_px(&self) -> f32 {
        (self.capacity_px - self.used_px).max(0.0)
    }

    /// Would a page of total height `page_height_px` fit?
    pub fn admits(&self, page_height_px: f32) -> bool {
        page_height_px <= self.capacity_px + FIT_EPSILON_PX
    }

    fn spend(&mut self, page_height_px: f32) {
        self.used_px = self.used_px.max(page_height_px);
    }
}

/// The page under construction, threaded by value through [`try_append`].
#[derive(Debug, Clone)]
pub struct PageState {
    nodes: Vec<ContentNode>,
    budget: FitBudget,
    overflow: bool,
}

impl PageState {
    pub fn new(budget: FitBudget) -> Self {
        Self {
            nodes: Vec::new(),
            budget,
            overflow: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[ContentNode] {
        &self.nodes
    }

    pub fn budget(&self) -> FitBudget {
        self.budget
    }

    /// Height of this page with `node` appended inside the open container
    /// at `depth`.
    fn measure_with(
        &self,
        depth: usize,
        node: &ContentNode,
        measure: &mut dyn Measure,
    ) -> Result<f32> {
        let mut candidate = self.nodes.clone();
        container_mut(&mut candidate, depth).push(node.clone());
        checked_height(measure, &candidate)
    }

    fn commit(mut self, depth: usize, node: ContentNode, height_px: f32) -> Self {
        container_mut(&mut self.nodes, depth).push(node);
        self.budget.spend(height_px);
        if !self.budget.admits(height_px) {
            self.overflow = true;
        }
        self
    }

    /// Remove the node most recently committed at `depth`.
    fn retract(&mut self, depth: usize, budget: FitBudget) {
        container_mut(&mut self.nodes, depth).pop();
        self.budget = budget;
    }
}

/// The children list that nodes at `depth` are appended to: depth 0 is the
/// page itself, depth `n` the children of the last element at depth `n - 1`.
fn container_mut(nodes: &mut Vec<ContentNode>, depth: usize) -> &mut Vec<ContentNode> {
    if depth == 0 {
        return nodes;
    }
    debug_assert!(
        matches!(nodes.last(), Some(ContentNode::Element(_))),
        "no open element at depth {depth}"
    );
    if !matches!(nodes.last(), Some(ContentNode::Element(_))) {
        log::error!("No open element at depth {depth}; appending at the enclosing level");
        return nodes;
    }
    match nodes.last_mut() {
        Some(ContentNode::Element(e)) => container_mut(&mut e.children, depth - 1),
        _ => unreachable!("last node checked to be an element"),
    }
}

/// Outcome of offering a node to a page.
#[derive(Debug, Clone, PartialEq)]
pub enum Placement {
    /// All or part of the node was placed. `remainder` continues on the next
    /// page.
    Placed { remainder: Option<ContentNode> },
    /// Nothing fit; the node is handed back unchanged.
    Rejected(ContentNode),
}

/// Whether a node may be placed even though it overflows the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overflow {
    Refuse,
    /// Force the first unit that does not fit; used on an empty page only.
    Force,
}

/// Offer `node` to `page` inside the open container at `depth`.
pub fn try_append(
    page: PageState,
    node: ContentNode,
    depth: usize,
    overflow: Overflow,
    measure: &mut dyn Measure,
) -> Result<(PageState, Placement)> {
    match node {
        ContentNode::Break => Ok((page, Placement::Placed { remainder: None })),
        ContentNode::Text(text) => place_text(page, text, depth, overflow, measure),
        ContentNode::Element(elem) if !elem.children.is_empty() => {
            place_element(page, elem, depth, overflow, measure)
        }
        whole => place_whole(page, whole, depth, overflow, measure),
    }
}

fn place_whole(
    page: PageState,
    node: ContentNode,
    depth: usize,
    overflow: Overflow,
    measure: &mut dyn Measure,
) -> Result<(PageState, Placement)> {
    let height = page.measure_with(depth, &node, measure)?;
    if page.budget.admits(height) || overflow == Overflow::Force {
        Ok((page.commit(depth, node, height), Placement::Placed { remainder: None }))
    } else {
        Ok((page, Placement::Rejected(node)))
    }
}

fn place_element(
    page: PageState,
    elem: ElementNode,
    depth: usize,
    overflow: Overflow,
    measure: &mut dyn Measure,
) -> Result<(PageState, Placement)> {
    let shell = ContentNode::Element(elem.shallow_clone());
    let height = page.measure_with(depth, &shell, measure)?;
    if !page.budget.admits(height) {
        return match overflow {
            Overflow::Force => {
                let node = ContentNode::Element(elem);
                let height = page.measure_with(depth, &node, measure)?;
                Ok((page.commit(depth, node, height), Placement::Placed { remainder: None }))
            }
            Overflow::Refuse => Ok((page, Placement::Rejected(ContentNode::Element(elem)))),
        };
    }

    let before = page.budget;
    let mut page = page.commit(depth, shell, height);
    let list_start = elem.list_start();
    let ElementNode {
        tag,
        mut attributes,
        children,
    } = elem;

    let mut children = children.into_iter();
    let mut rest = Vec::new();
    let mut placed_any = false;
    let mut items_done = 0i64;
    let mut child_overflow = overflow;
    for child in children.by_ref() {
        let is_item = matches!(&child, ContentNode::Element(e) | ContentNode::Leaf(e) if e.tag == Tag::Li);
        let (next, placement) = try_append(page, child, depth + 1, child_overflow, measure)?;
        page = next;
        child_overflow = Overflow::Refuse;
        match placement {
            Placement::Placed { remainder: None } => {
                placed_any = true;
                if is_item {
                    items_done += 1;
                }
            }
            Placement::Placed {
                remainder: Some(r),
            } => {
                placed_any = true;
                rest.push(r);
                break;
            }
            Placement::Rejected(child) => {
                rest.push(child);
                break;
            }
        }
    }
    rest.extend(children);

    // A split ordered list continues its numbering on the next page.
    if tag == Tag::Ol && items_done > 0 {
        attributes.insert("start".to_string(), (list_start + items_done).to_string());
    }

    let node_with = |children| ContentNode::Element(ElementNode {
        tag,
        attributes,
        children,
    });

    if !placed_any {
        // Nothing inside fit: the empty shell is not worth a page slot.
        page.retract(depth, before);
        return Ok((page, Placement::Rejected(node_with(rest))));
    }
    let remainder = (!rest.is_empty()).then(|| node_with(rest));
    Ok((page, Placement::Placed { remainder }))
}

fn place_text(
    page: PageState,
    text: String,
    depth: usize,
    overflow: Overflow,
    measure: &mut dyn Measure,
) -> Result<(PageState, Placement)> {
    let whole = ContentNode::Text(text);
    let height = page.measure_with(depth, &whole, measure)?;
    if page.budget.admits(height) {
        return Ok((page.commit(depth, whole, height), Placement::Placed { remainder: None }));
    }
    let ContentNode::Text(text) = whole else {
        unreachable!("constructed as text above")
    };

    // Byte offset of every char boundary after the first char.
    let cuts: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .skip(1)
        .chain(std::iter::once(text.len()))
        .collect();

    // Invariant: prefix of `lo` chars fits (0 trivially), `hi` chars does not.
    let (mut lo, mut hi) = (0usize, cuts.len());
    let mut lo_height = None;
    while hi - lo > 1 {
        let mid = lo + (hi - lo) / 2;
        let prefix = ContentNode::text(&text[..cuts[mid - 1]]);
        let h = page.measure_with(depth, &prefix, measure)?;
        if page.budget.admits(h) {
            lo = mid;
            lo_height = Some(h);
        } else {
            hi = mid;
        }
    }

    match lo_height {
        Some(h) => {
            let cut = cuts[lo - 1];
            let remainder = ContentNode::text(&text[cut..]);
            let prefix = ContentNode::text(&text[..cut]);
            Ok((
                page.commit(depth, prefix, h),
                Placement::Placed {
                    remainder: Some(remainder),
                },
            ))
        }
        None if overflow == Overflow::Force => {
            Ok((page.commit(depth, ContentNode::Text(text), height), Placement::Placed { remainder: None }))
        }
        None => Ok((page, Placement::Rejected(ContentNode::Text(text)))),
    }
}

/// Fit one section into pages. Always returns at least one page; indices
/// are local to the section.
pub fn fit(section: &Section, geometry: &PageGeometry, measure: &mut dyn Measure) -> Result<Vec<Page>> {
    let capacity = geometry.inner_height_px();
    let make_page = |index: usize, state: PageState| Page {
        index,
        section: section.index,
        geometry: *geometry,
        nodes: state.nodes,
        overflow: state.overflow,
    };

    if whole_section_fits(&section.nodes, capacity, measure)? {
        log::debug!("Section {} fits on one page", section.index);
        let state = PageState {
            nodes: section.nodes.clone(),
            budget: FitBudget::new(capacity),
            overflow: false,
        };
        return Ok(vec![make_page(0, state)]);
    }

    let mut queue: VecDeque<ContentNode> = section.nodes.iter().cloned().collect();
    let mut pages = Vec::new();
    let mut state = PageState::new(FitBudget::new(capacity));

    while let Some(node) = queue.pop_front() {
        let (next, placement) = try_append(state, node, 0, Overflow::Refuse, measure)?;
        state = next;
        match placement {
            Placement::Placed { remainder } => {
                if let Some(r) = remainder {
                    queue.push_front(r);
                }
            }
            Placement::Rejected(node) if state.is_empty() => {
                log::warn!(
                    "Content taller than a page in section {}; forcing it onto page {}",
                    section.index,
                    pages.len()
                );
                let (next, placement) = try_append(state, node, 0, Overflow::Force, measure)?;
                state = next;
                state.overflow = true;
                if let Placement::Placed {
                    remainder: Some(r),
                } = placement
                {
                    queue.push_front(r);
                }
            }
            Placement::Rejected(node) => {
                let full = std::mem::replace(&mut state, PageState::new(FitBudget::new(capacity)));
                pages.push(make_page(pages.len(), full));
                queue.push_front(node);
            }
        }
    }

    if !state.is_empty() || pages.is_empty() {
        pages.push(make_page(pages.len(), state));
    }
    log::debug!("Section {} split into {} page(s)", section.index, pages.len());
    Ok(pages)
}

/// Append top-level nodes one by one; stop at the first overflow.
fn whole_section_fits(
    nodes: &[ContentNode],
    capacity_px: f32,
    measure: &mut dyn Measure,
) -> Result<bool> {
    let budget = FitBudget::new(capacity_px);
    for end in 1..=nodes.len() {
        if !budget.admits(checked_height(measure, &nodes[..end])?) {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Segment `tree` at its break markers and fit every section. Each section
/// starts on a new page; page indices run across the whole document.
pub fn paginate(
    tree: &ContentNode,
    geometry: &PageGeometry,
    measure: &mut dyn Measure,
) -> Result<Vec<Page>> {
    let mut pages = Vec::new();
    for section in segment(tree) {
        for mut page in fit(&section, geometry, measure)? {
            page.index = pages.len();
            pages.push(page);
        }
    }
    Ok(pages)
}
