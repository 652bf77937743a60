//! Block-flow layout – stacks content nodes top to bottom at a fixed width
//! using Taffy, wrapping inline runs with the font metrics from [`fonts`].
//!
//! This is the headless stand-in for "measure this subtree's rendered
//! height": [`FlowMeasurer`] answers the fitter's height queries and
//! [`FlowEngine::layout`] produces positioned boxes for the painters.
//!
//! [`fonts`]: crate::fonts

use std::collections::HashMap;

use taffy::{
    AvailableSpace, LengthPercentage, LengthPercentageAuto, NodeId, Rect, Size, Style, TaffyTree,
};

use crate::assets::AssetStore;
use crate::dom::{ContentNode, ElementNode, Tag};
use crate::error::{ExportError, Result};
use crate::fonts::{wrap_text, FontKey, FontManager};
use crate::geometry::PageGeometry;
use crate::measure::{Measure, MeasureBackend};
use crate::style::{self, parse_css_px, ComputedStyle, Dimension, Display, TextAlign};
use crate::units::CSS_PX_PER_MM;

// ---------------------------------------------------------------------------
// Output boxes
// ---------------------------------------------------------------------------

/// A laid-out box in CSS px, relative to the top-left of the content area.
#[derive(Debug, Clone)]
pub struct FlowBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub style: ComputedStyle,
    pub content: BoxContent,
    pub children: Vec<FlowBox>,
}

#[derive(Debug, Clone)]
pub enum BoxContent {
    None,
    Text { lines: Vec<TextLine> },
    Image { src: String },
    /// Bullet or number drawn in the gutter left of the box.
    ListItem { marker: String },
}

#[derive(Debug, Clone)]
pub struct TextLine {
    pub text: String,
    /// Offset from the box's left edge (alignment).
    pub x_offset: f32,
    /// Offset from the box's top edge.
    pub y_offset: f32,
    pub width: f32,
}

/// The result of laying out a node sequence.
#[derive(Debug, Clone)]
pub struct FlowLayout {
    pub boxes: Vec<FlowBox>,
    pub width: f32,
    pub height: f32,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Lays out content in block flow. Cheap to construct; borrows fonts and
/// preloaded image assets.
pub struct FlowEngine<'a> {
    fonts: &'a FontManager,
    assets: &'a AssetStore,
}

impl<'a> FlowEngine<'a> {
    pub fn new(fonts: &'a FontManager, assets: &'a AssetStore) -> Self {
        Self { fonts, assets }
    }

    /// Total height in px of `nodes` stacked at `width` px.
    pub fn measure_height(&self, nodes: &[ContentNode], width: f32) -> Result<f32> {
        let (builder, root) = self.build(nodes, width)?;
        let layout = builder.taffy.layout(root).map_err(layout_err)?;
        Ok(layout.size.height)
    }

    /// Lay out `nodes` at `width` px and return positioned boxes.
    pub fn layout(&self, nodes: &[ContentNode], width: f32) -> Result<FlowLayout> {
        let (builder, root) = self.build(nodes, width)?;
        let root = builder.extract(root, 0.0, 0.0)?;
        Ok(FlowLayout {
            boxes: root.children,
            width: root.width,
            height: root.height,
        })
    }

    fn build(&self, nodes: &[ContentNode], width: f32) -> Result<(Builder<'a>, NodeId)> {
        let width = width.max(0.0);
        let mut builder = Builder {
            taffy: TaffyTree::new(),
            fonts: self.fonts,
            assets: self.assets,
            node_styles: HashMap::new(),
            node_content: HashMap::new(),
        };
        let root_style = ComputedStyle::default();
        let children = builder.build_children(nodes, &root_style, width, None)?;
        let root = builder
            .taffy
            .new_with_children(
                Style {
                    display: taffy::Display::Flex,
                    flex_direction: taffy::FlexDirection::Column,
                    size: Size {
                        width: taffy::Dimension::Length(width),
                        height: taffy::Dimension::Auto,
                    },
                    ..Default::default()
                },
                &children,
            )
            .map_err(layout_err)?;
        builder
            .taffy
            .compute_layout(
                root,
                Size {
                    width: AvailableSpace::Definite(width),
                    height: AvailableSpace::MaxContent,
                },
            )
            .map_err(layout_err)?;
        Ok((builder, root))
    }
}

fn layout_err(e: taffy::TaffyError) -> ExportError {
    ExportError::Layout(e.to_string())
}

struct Builder<'a> {
    taffy: TaffyTree<()>,
    fonts: &'a FontManager,
    assets: &'a AssetStore,
    node_styles: HashMap<NodeId, ComputedStyle>,
    node_content: HashMap<NodeId, BoxContent>,
}

impl Builder<'_> {
    /// Build taffy nodes for a child list. Consecutive inline nodes are merged
    /// into one anonymous text run. `ordered` holds the first marker number
    /// when `<li>` markers are numbered.
    fn build_children(
        &mut self,
        children: &[ContentNode],
        parent: &ComputedStyle,
        width: f32,
        ordered: Option<i64>,
    ) -> Result<Vec<NodeId>> {
        let mut ids = Vec::new();
        let mut run = String::new();
        let mut list_counter = ordered.map_or(0, |start| start - 1);

        for child in children {
            match child {
                ContentNode::Text(t) => run.push_str(t),
                ContentNode::Element(e) | ContentNode::Leaf(e) if e.tag.is_inline() => {
                    collect_inline_text(child, &mut run);
                }
                ContentNode::Element(e) | ContentNode::Leaf(e) => {
                    self.flush_run(&mut run, parent, width, &mut ids)?;
                    let marker = (e.tag == Tag::Li).then(|| {
                        list_counter += 1;
                        if ordered.is_some() {
                            format!("{list_counter}.")
                        } else {
                            "\u{2022}".to_string()
                        }
                    });
                    if let Some(id) = self.build_element(e, parent, width)? {
                        if let Some(marker) = marker {
                            self.node_content.insert(id, BoxContent::ListItem { marker });
                        }
                        ids.push(id);
                    }
                }
                ContentNode::Break => {}
            }
        }
        self.flush_run(&mut run, parent, width, &mut ids)?;
        Ok(ids)
    }

    fn flush_run(
        &mut self,
        run: &mut String,
        parent: &ComputedStyle,
        width: f32,
        ids: &mut Vec<NodeId>,
    ) -> Result<()> {
        let raw = std::mem::take(run);
        let text = if parent.preformatted {
            raw.trim_matches('\n').to_string()
        } else {
            collapse_whitespace(&raw)
        };
        if !text.is_empty() {
            ids.push(self.build_text(&text, &style::text_style(parent), width)?);
        }
        Ok(())
    }

    fn build_text(&mut self, text: &str, style: &ComputedStyle, width: f32) -> Result<NodeId> {
        let key = FontKey::for_style(style);
        let line_height = self.fonts.line_height_px(style.font_size, style.line_height);
        let raw_lines = if style.preformatted {
            text.split('\n').map(str::to_string).collect()
        } else {
            wrap_text(text, style.font_size, &key, width, self.fonts)
        };
        let lines: Vec<TextLine> = raw_lines
            .into_iter()
            .enumerate()
            .map(|(i, text)| {
                let w = self.fonts.measure_text_width(&text, style.font_size, &key);
                let x_offset = match style.text_align {
                    TextAlign::Left => 0.0,
                    TextAlign::Center => ((width - w) / 2.0).max(0.0),
                    TextAlign::Right => (width - w).max(0.0),
                };
                TextLine {
                    text,
                    x_offset,
                    y_offset: i as f32 * line_height,
                    width: w,
                }
            })
            .collect();

        let node = self
            .taffy
            .new_leaf(Style {
                size: Size {
                    width: taffy::Dimension::Length(width),
                    height: taffy::Dimension::Length(lines.len() as f32 * line_height),
                },
                flex_shrink: 0.0,
                ..Default::default()
            })
            .map_err(layout_err)?;
        self.node_styles.insert(node, style.clone());
        self.node_content.insert(node, BoxContent::Text { lines });
        Ok(node)
    }

    fn build_element(
        &mut self,
        elem: &ElementNode,
        parent: &ComputedStyle,
        container_width: f32,
    ) -> Result<Option<NodeId>> {
        let style = style::resolve_style(elem, Some(parent));
        if style.display == Display::None {
            return Ok(None);
        }

        if elem.tag == Tag::Img {
            return self.build_image(elem, &style, container_width).map(Some);
        }

        let outer = style
            .width
            .resolve(container_width)
            .unwrap_or(container_width - style.margin_left - style.margin_right);
        let inner = (outer
            - style.padding_left
            - style.padding_right
            - 2.0 * style.border_width)
            .max(0.0);

        let child_width = if elem.tag == Tag::Tr {
            let cells = elem
                .children
                .iter()
                .filter(|c| matches!(c, ContentNode::Element(_) | ContentNode::Leaf(_)))
                .count()
                .max(1);
            inner / cells as f32
        } else {
            inner
        };

        let ordered = (elem.tag == Tag::Ol).then(|| elem.list_start());
        let children = self.build_children(&elem.children, &style, child_width, ordered)?;
        let node = self
            .taffy
            .new_with_children(self.to_taffy(&style, &elem.tag, container_width), &children)
            .map_err(layout_err)?;
        self.node_styles.insert(node, style);
        Ok(Some(node))
    }

    /// Images get a fixed box: explicit size, else intrinsic size, scaled
    /// down to the container width keeping the aspect ratio.
    fn build_image(
        &mut self,
        elem: &ElementNode,
        style: &ComputedStyle,
        container_width: f32,
    ) -> Result<NodeId> {
        let src = elem.src().unwrap_or_default().to_string();
        let attr = |k: &str| {
            elem.attributes
                .get(k)
                .and_then(|v| parse_css_px(v, style.font_size))
        };
        let explicit_w = style.width.resolve(container_width).or_else(|| attr("width"));
        let explicit_h = match style.height {
            Dimension::Px(v) => Some(v),
            _ => attr("height"),
        };
        let intrinsic = self
            .assets
            .intrinsic_size(&src)
            .filter(|(w, h)| *w > 0 && *h > 0)
            .map(|(w, h)| (w as f32, h as f32));

        let (mut w, mut h) = match (explicit_w, explicit_h, intrinsic) {
            (Some(w), Some(h), _) => (w, h),
            (Some(w), None, Some((iw, ih))) => (w, w * ih / iw),
            (None, Some(h), Some((iw, ih))) => (h * iw / ih, h),
            (None, None, Some(size)) => size,
            (Some(w), None, None) => (w, 0.0),
            (None, Some(h), None) => (0.0, h),
            (None, None, None) => (0.0, 0.0),
        };
        if w > container_width && w > 0.0 {
            h *= container_width / w;
            w = container_width;
        }

        let mut ts = self.to_taffy(style, &Tag::Img, container_width);
        ts.size = Size {
            width: taffy::Dimension::Length(w.max(0.0)),
            height: taffy::Dimension::Length(h.max(0.0)),
        };
        let node = self.taffy.new_leaf(ts).map_err(layout_err)?;
        self.node_styles.insert(node, style.clone());
        self.node_content.insert(node, BoxContent::Image { src });
        Ok(node)
    }

    fn to_taffy(&self, s: &ComputedStyle, tag: &Tag, container_width: f32) -> Style {
        let mut ts = Style {
            display: taffy::Display::Flex,
            flex_direction: taffy::FlexDirection::Column,
            flex_shrink: 0.0,
            margin: Rect {
                top: LengthPercentageAuto::Length(s.margin_top),
                right: LengthPercentageAuto::Length(s.margin_right),
                bottom: LengthPercentageAuto::Length(s.margin_bottom),
                left: LengthPercentageAuto::Length(s.margin_left),
            },
            padding: Rect {
                top: LengthPercentage::Length(s.padding_top),
                right: LengthPercentage::Length(s.padding_right),
                bottom: LengthPercentage::Length(s.padding_bottom),
                left: LengthPercentage::Length(s.padding_left),
            },
            border: Rect {
                top: LengthPercentage::Length(s.border_width),
                right: LengthPercentage::Length(s.border_width),
                bottom: LengthPercentage::Length(s.border_width),
                left: LengthPercentage::Length(s.border_width),
            },
            ..Default::default()
        };

        if let Some(w) = s.width.resolve(container_width) {
            ts.size.width = taffy::Dimension::Length(w);
        }
        if let Dimension::Px(h) = s.height {
            ts.size.height = taffy::Dimension::Length(h);
        }

        match tag {
            Tag::Tr => {
                ts.flex_direction = taffy::FlexDirection::Row;
                ts.align_items = Some(taffy::AlignItems::Stretch);
            }
            Tag::Td | Tag::Th => {
                ts.flex_grow = 1.0;
                ts.flex_shrink = 1.0;
                ts.flex_basis = taffy::Dimension::Length(0.0);
                ts.min_size.width = taffy::Dimension::Length(0.0);
            }
            Tag::Img => {
                ts.align_self = Some(taffy::AlignItems::Start);
            }
            _ => {}
        }
        ts
    }

    /// Extract positioned boxes after layout computation.
    fn extract(&self, node: NodeId, offset_x: f32, offset_y: f32) -> Result<FlowBox> {
        let layout = self.taffy.layout(node).map_err(layout_err)?;
        let x = offset_x + layout.location.x;
        let y = offset_y + layout.location.y;

        let children = self
            .taffy
            .children(node)
            .map_err(layout_err)?
            .into_iter()
            .map(|child| self.extract(child, x, y))
            .collect::<Result<Vec<_>>>()?;

        Ok(FlowBox {
            x,
            y,
            width: layout.size.width,
            height: layout.size.height,
            style: self.node_styles.get(&node).cloned().unwrap_or_default(),
            content: self
                .node_content
                .get(&node)
                .cloned()
                .unwrap_or(BoxContent::None),
            children,
        })
    }
}

/// Collect the text of an inline subtree; `<br>` becomes a newline.
fn collect_inline_text(node: &ContentNode, out: &mut String) {
    match node {
        ContentNode::Text(t) => out.push_str(t),
        ContentNode::Element(e) | ContentNode::Leaf(e) => {
            if e.tag == Tag::Br {
                out.push('\n');
            }
            for child in &e.children {
                collect_inline_text(child, out);
            }
        }
        ContentNode::Break => {}
    }
}

/// Collapse runs of whitespace to single spaces, keeping explicit newlines.
fn collapse_whitespace(raw: &str) -> String {
    raw.split('\n')
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join("\n")
        .trim_matches('\n')
        .to_string()
}

// ---------------------------------------------------------------------------
// Measurement backend
// ---------------------------------------------------------------------------

/// Measurement backend built on [`FlowEngine`].
///
/// `zoom` models display scaling: at zoom 1 a layout pixel is a CSS pixel
/// (96 per inch).
pub struct FlowMeasurer<'a> {
    engine: FlowEngine<'a>,
    zoom: f32,
}

impl<'a> FlowMeasurer<'a> {
    pub fn new(fonts: &'a FontManager, assets: &'a AssetStore) -> Self {
        Self {
            engine: FlowEngine::new(fonts, assets),
            zoom: 1.0,
        }
    }

    pub fn with_zoom(mut self, zoom: f32) -> Self {
        if zoom.is_finite() && zoom > 0.0 {
            self.zoom = zoom;
        }
        self
    }
}

impl MeasureBackend for FlowMeasurer<'_> {
    fn px_per_mm(&self) -> Option<f32> {
        Some(CSS_PX_PER_MM * self.zoom)
    }

    fn acquire(&self, geometry: &PageGeometry) -> Result<Box<dyn Measure + '_>> {
        let zoom = geometry.px_per_mm / CSS_PX_PER_MM;
        let css_width = geometry.inner_width_px() / zoom;
        log::debug!("Acquired flow workspace ({css_width:.1} css px wide, zoom {zoom:.3})");
        Ok(Box::new(FlowWorkspace {
            engine: &self.engine,
            css_width,
            zoom,
            layouts: 0,
        }))
    }
}

/// One export's measurement workspace. Dropping it releases it.
struct FlowWorkspace<'e, 'a> {
    engine: &'e FlowEngine<'a>,
    css_width: f32,
    zoom: f32,
    layouts: usize,
}

impl Measure for FlowWorkspace<'_, '_> {
    fn height_px(&mut self, nodes: &[ContentNode]) -> Result<f32> {
        self.layouts += 1;
        Ok(self.engine.measure_height(nodes, self.css_width)? * self.zoom)
    }
}

impl Drop for FlowWorkspace<'_, '_> {
    fn drop(&mut self) {
        log::debug!("Released flow workspace after {} layouts", self.layouts);
    }
}
