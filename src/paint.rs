//! Built-in rendering collaborator: lays content out with [`FlowEngine`] and
//! paints the boxes into an RGBA surface.
//!
//! Text is drawn from real glyph outlines when a TTF/OTF face is loaded.
//! Heuristic faces have no outlines, so their lines are drawn as proof bars
//! of the measured width.

use image::{imageops, Rgba, RgbaImage};
use ttf_parser::OutlineBuilder;

use crate::assets::AssetStore;
use crate::dom::ContentNode;
use crate::error::{ExportError, Result};
use crate::flow::{BoxContent, FlowBox, FlowEngine, TextLine};
use crate::fonts::{FontKey, FontManager};
use crate::raster::{RasterRenderer, MAX_SURFACE_PIXELS};
use crate::style::{Color, ComputedStyle, TextDecoration};

/// Vertical samples per pixel row when filling glyphs.
const SUBSAMPLES: usize = 4;

/// Gutter between a list item and its marker, as in the PDF backend.
const MARKER_GUTTER_PX: f32 = 16.0;

pub struct FlowPainter<'a> {
    engine: FlowEngine<'a>,
    fonts: &'a FontManager,
    assets: &'a AssetStore,
}

impl<'a> FlowPainter<'a> {
    pub fn new(fonts: &'a FontManager, assets: &'a AssetStore) -> Self {
        Self {
            engine: FlowEngine::new(fonts, assets),
            fonts,
            assets,
        }
    }
}

impl RasterRenderer for FlowPainter<'_> {
    fn render(&mut self, nodes: &[ContentNode], width_px: u32, scale: f32) -> Result<RgbaImage> {
        let scale = if scale.is_finite() && scale > 0.0 { scale } else { 1.0 };
        let layout = self.engine.layout(nodes, width_px as f32 / scale)?;
        let height_px = (layout.height * scale).ceil().max(0.0) as u32;
        if u64::from(width_px) * u64::from(height_px) > MAX_SURFACE_PIXELS {
            return Err(ExportError::Render(format!(
                "surface of {width_px}x{height_px} px is too large"
            )));
        }

        let mut canvas = Canvas {
            image: RgbaImage::from_pixel(width_px, height_px, Rgba([255, 255, 255, 255])),
            scale,
            fonts: self.fonts,
            assets: self.assets,
        };
        for b in &layout.boxes {
            canvas.paint_box(b);
        }
        Ok(canvas.image)
    }
}

/// Paint target. Box coordinates are layout px; `scale` maps them to
/// surface pixels.
struct Canvas<'a> {
    image: RgbaImage,
    scale: f32,
    fonts: &'a FontManager,
    assets: &'a AssetStore,
}

impl Canvas<'_> {
    fn paint_box(&mut self, b: &FlowBox) {
        let s = &b.style;
        if !s.background_color.is_transparent() {
            self.fill_rect(b.x, b.y, b.width, b.height, s.background_color);
        }
        if s.border_width > 0.0 {
            let w = s.border_width;
            self.fill_rect(b.x, b.y, b.width, w, s.border_color);
            self.fill_rect(b.x, b.y + b.height - w, b.width, w, s.border_color);
            self.fill_rect(b.x, b.y, w, b.height, s.border_color);
            self.fill_rect(b.x + b.width - w, b.y, w, b.height, s.border_color);
        }

        match &b.content {
            BoxContent::Text { lines } => {
                for line in lines {
                    self.paint_line(b.x, b.y, line, s);
                }
            }
            BoxContent::Image { src } => self.paint_image(b, src),
            BoxContent::ListItem { marker } => {
                let line = TextLine {
                    text: marker.clone(),
                    x_offset: 0.0,
                    y_offset: 0.0,
                    width: self.fonts.measure_text_width(marker, s.font_size, &FontKey::for_style(s)),
                };
                self.paint_line(b.x - MARKER_GUTTER_PX, b.y + b.style.padding_top, &line, s);
            }
            BoxContent::None => {}
        }

        for child in &b.children {
            self.paint_box(child);
        }
    }

    fn paint_image(&mut self, b: &FlowBox, src: &str) {
        let Some(asset) = self.assets.get(src) else {
            return;
        };
        let w = (b.width * self.scale).round() as u32;
        let h = (b.height * self.scale).round() as u32;
        if w == 0 || h == 0 {
            return;
        }
        let resized = imageops::resize(&asset.pixels, w, h, imageops::FilterType::Triangle);
        let x = (b.x * self.scale).round() as i64;
        let y = (b.y * self.scale).round() as i64;
        imageops::overlay(&mut self.image, &resized, x, y);
    }

    fn paint_line(&mut self, box_x: f32, box_y: f32, line: &TextLine, style: &ComputedStyle) {
        if line.text.trim().is_empty() {
            return;
        }
        let key = FontKey::for_style(style);
        let size = style.font_size;
        let line_height = self.fonts.line_height_px(size, style.line_height);
        let x = box_x + line.x_offset;
        let baseline = box_y
            + line.y_offset
            + (line_height - size) / 2.0
            + self.fonts.ascender_px(size, &key);

        let drew_glyphs = self.paint_glyphs(&line.text, x, baseline, size, &key, style.color);
        if !drew_glyphs {
            // Proof bar over the x-height band.
            let faded = Color {
                a: style.color.a * 0.45,
                ..style.color
            };
            self.fill_rect(x, baseline - size * 0.5, line.width, size * 0.5, faded);
        }
        if style.text_decoration == TextDecoration::Underline {
            let thickness = (size * 0.06).max(1.0 / self.scale);
            self.fill_rect(x, baseline + size * 0.1, line.width, thickness, style.color);
        }
    }

    /// Fill glyph outlines for `text`. Returns false when the face has no
    /// outlines to draw.
    fn paint_glyphs(
        &mut self,
        text: &str,
        x: f32,
        baseline: f32,
        size: f32,
        key: &FontKey,
        color: Color,
    ) -> bool {
        let data = self.fonts.get(key);
        let Some(face) = data.face() else {
            return false;
        };
        let em = size / data.units_per_em;
        let mut pen = x;
        for ch in text.chars() {
            let Some(gid) = face.glyph_index(ch) else {
                pen += size * 0.5;
                continue;
            };
            let mut outline = Outline::new(pen * self.scale, baseline * self.scale, em * self.scale);
            if face.outline_glyph(gid, &mut outline).is_some() {
                outline.close();
                fill_nonzero(&mut self.image, &outline.edges, color);
            }
            pen += face
                .glyph_hor_advance(gid)
                .map(|adv| adv as f32 * em)
                .unwrap_or(size * 0.5);
        }
        true
    }

    fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Color) {
        if w <= 0.0 || h <= 0.0 || color.is_transparent() {
            return;
        }
        let (iw, ih) = self.image.dimensions();
        let clamp_x = |v: f32| (v * self.scale).round().clamp(0.0, iw as f32) as u32;
        let clamp_y = |v: f32| (v * self.scale).round().clamp(0.0, ih as f32) as u32;
        let (x0, x1) = (clamp_x(x), clamp_x(x + w).max(clamp_x(x) + 1).min(iw));
        let (y0, y1) = (clamp_y(y), clamp_y(y + h).max(clamp_y(y) + 1).min(ih));
        let rgba = color.to_rgba8();
        for py in y0..y1 {
            for px in x0..x1 {
                blend(&mut self.image, px, py, rgba, 1.0);
            }
        }
    }
}

fn blend(image: &mut RgbaImage, x: u32, y: u32, rgba: [u8; 4], coverage: f32) {
    let alpha = (rgba[3] as f32 / 255.0) * coverage.clamp(0.0, 1.0);
    if alpha <= 0.0 {
        return;
    }
    let dst = image.get_pixel_mut(x, y);
    for c in 0..3 {
        let mixed = rgba[c] as f32 * alpha + dst.0[c] as f32 * (1.0 - alpha);
        dst.0[c] = mixed.round() as u8;
    }
    dst.0[3] = 255;
}

/// A glyph outline flattened to line segments in surface pixels.
struct Outline {
    edges: Vec<[f32; 4]>,
    origin: (f32, f32),
    scale: f32,
    start: (f32, f32),
    last: (f32, f32),
}

impl Outline {
    fn new(origin_x: f32, baseline_y: f32, scale: f32) -> Self {
        Self {
            edges: Vec::new(),
            origin: (origin_x, baseline_y),
            scale,
            start: (origin_x, baseline_y),
            last: (origin_x, baseline_y),
        }
    }

    /// Font units (y up) to surface pixels (y down).
    fn map(&self, x: f32, y: f32) -> (f32, f32) {
        (self.origin.0 + x * self.scale, self.origin.1 - y * self.scale)
    }

    fn edge_to(&mut self, p: (f32, f32)) {
        if p != self.last {
            self.edges.push([self.last.0, self.last.1, p.0, p.1]);
        }
        self.last = p;
    }
}

impl OutlineBuilder for Outline {
    fn move_to(&mut self, x: f32, y: f32) {
        self.close();
        let p = self.map(x, y);
        self.start = p;
        self.last = p;
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let p = self.map(x, y);
        self.edge_to(p);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let (p0, p1, p2) = (self.last, self.map(x1, y1), self.map(x, y));
        const STEPS: usize = 8;
        for i in 1..=STEPS {
            let t = i as f32 / STEPS as f32;
            let mt = 1.0 - t;
            self.edge_to((
                mt * mt * p0.0 + 2.0 * mt * t * p1.0 + t * t * p2.0,
                mt * mt * p0.1 + 2.0 * mt * t * p1.1 + t * t * p2.1,
            ));
        }
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let (p0, p1, p2, p3) = (self.last, self.map(x1, y1), self.map(x2, y2), self.map(x, y));
        const STEPS: usize = 12;
        for i in 1..=STEPS {
            let t = i as f32 / STEPS as f32;
            let mt = 1.0 - t;
            let (a, b, c, d) = (mt * mt * mt, 3.0 * mt * mt * t, 3.0 * mt * t * t, t * t * t);
            self.edge_to((
                a * p0.0 + b * p1.0 + c * p2.0 + d * p3.0,
                a * p0.1 + b * p1.1 + c * p2.1 + d * p3.1,
            ));
        }
    }

    fn close(&mut self) {
        let start = self.start;
        self.edge_to(start);
    }
}

/// Scanline fill with the nonzero winding rule. Coverage is exact along x
/// and sampled `SUBSAMPLES` times along y.
fn fill_nonzero(image: &mut RgbaImage, edges: &[[f32; 4]], color: Color) {
    if edges.is_empty() {
        return;
    }
    let (iw, ih) = image.dimensions();
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (f32::MAX, f32::MAX, f32::MIN, f32::MIN);
    for e in edges {
        min_x = min_x.min(e[0]).min(e[2]);
        max_x = max_x.max(e[0]).max(e[2]);
        min_y = min_y.min(e[1]).min(e[3]);
        max_y = max_y.max(e[1]).max(e[3]);
    }
    let x0 = min_x.floor().clamp(0.0, iw as f32) as u32;
    let x1 = max_x.ceil().clamp(0.0, iw as f32) as u32;
    let y0 = min_y.floor().clamp(0.0, ih as f32) as u32;
    let y1 = max_y.ceil().clamp(0.0, ih as f32) as u32;
    if x0 >= x1 || y0 >= y1 {
        return;
    }

    let rgba = color.to_rgba8();
    let mut row = vec![0.0f32; (x1 - x0) as usize];
    let mut crossings: Vec<(f32, i32)> = Vec::new();
    for py in y0..y1 {
        row.iter_mut().for_each(|c| *c = 0.0);
        for sub in 0..SUBSAMPLES {
            let sy = py as f32 + (sub as f32 + 0.5) / SUBSAMPLES as f32;
            crossings.clear();
            for &[ax, ay, bx, by] in edges {
                if ay == by {
                    continue;
                }
                let (lo, hi) = if ay < by { (ay, by) } else { (by, ay) };
                if sy < lo || sy >= hi {
                    continue;
                }
                let x = ax + (sy - ay) * (bx - ax) / (by - ay);
                crossings.push((x, if by > ay { 1 } else { -1 }));
            }
            crossings.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut winding = 0;
            for pair in crossings.windows(2) {
                winding += pair[0].1;
                if winding != 0 {
                    add_span(&mut row, x0, pair[0].0, pair[1].0);
                }
            }
        }
        for (i, coverage) in row.iter().enumerate() {
            if *coverage > 0.0 {
                blend(image, x0 + i as u32, py, rgba, *coverage / SUBSAMPLES as f32);
            }
        }
    }
}

/// Add the horizontal coverage of `[from, to)` to a row starting at `x0`.
fn add_span(row: &mut [f32], x0: u32, from: f32, to: f32) {
    let start = (from - x0 as f32).max(0.0);
    let end = (to - x0 as f32).min(row.len() as f32);
    if end <= start {
        return;
    }
    let (first, last) = (start.floor() as usize, (end.ceil() as usize).min(row.len()));
    for (i, cell) in row.iter_mut().enumerate().take(last).skip(first) {
        let px = i as f32;
        *cell += (end.min(px + 1.0) - start.max(px)).max(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_html;

    fn render(html: &str, width_px: u32, scale: f32, assets: &AssetStore) -> RgbaImage {
        let fonts = FontManager::default();
        FlowPainter::new(&fonts, assets)
            .render(&parse_html(html), width_px, scale)
            .unwrap()
    }

    fn is_white(p: &Rgba<u8>) -> bool {
        p.0 == [255, 255, 255, 255]
    }

    #[test]
    fn surface_height_tracks_layout() {
        let assets = AssetStore::new();
        // 32.4 layout px per paragraph (see flow tests).
        let img = render("<p>Hello</p>", 500, 1.0, &assets);
        assert_eq!(img.dimensions(), (500, 33));
        let img = render("<p>Hello</p>", 1000, 2.0, &assets);
        assert_eq!(img.dimensions(), (1000, 65));
    }

    #[test]
    fn text_leaves_ink() {
        let assets = AssetStore::new();
        let img = render("<p>Hello world</p>", 400, 1.0, &assets);
        assert!(img.pixels().any(|p| !is_white(p)));
        // Nothing right of the measured line width.
        assert!((200..400).all(|x| (0..img.height()).all(|y| is_white(img.get_pixel(x, y)))));
    }

    #[test]
    fn empty_content_is_empty_surface() {
        let assets = AssetStore::new();
        let img = render("", 300, 2.0, &assets);
        assert_eq!(img.dimensions(), (300, 0));
    }

    #[test]
    fn images_are_painted() {
        let html = format!(r#"<img src="{}">"#, crate::assets::tests::png_data_uri(20, 10));
        let mut assets = AssetStore::new();
        assets.preload(&crate::dom::parse_document(&html));
        let img = render(&html, 100, 1.0, &assets);
        assert_eq!(img.dimensions(), (100, 10));
        assert_eq!(img.get_pixel(5, 5).0, [200, 30, 30, 255]);
        assert!(is_white(img.get_pixel(50, 5)));
    }

    #[test]
    fn nonzero_fill_covers_square() {
        let mut img = RgbaImage::from_pixel(10, 10, Rgba([255, 255, 255, 255]));
        let mut o = Outline::new(2.0, 8.0, 1.0);
        o.move_to(0.0, 0.0);
        o.line_to(4.0, 0.0);
        o.line_to(4.0, 4.0);
        o.line_to(0.0, 4.0);
        o.close();
        fill_nonzero(&mut img, &o.edges, Color::BLACK);
        assert_eq!(img.get_pixel(3, 5).0, [0, 0, 0, 255]);
        assert!(is_white(img.get_pixel(1, 5)));
        assert!(is_white(img.get_pixel(3, 8)));
        assert!(is_white(img.get_pixel(6, 5)));
    }
}
