//! PDF renderer – takes an [`AssembledDocument`] and produces PDF bytes using
//! `printpdf` (v0.8 ops-based API).
//!
//! Content sheets are laid out again at the page's inner width and drawn as
//! vector boxes and builtin-font text. Raster sheets are embedded as one
//! full-page image each.

use std::collections::HashMap;

use ::image::{codecs::png::PngEncoder, ExtendedColorType, ImageEncoder, RgbaImage};
use printpdf::*;

use crate::assemble::{AssembledDocument, Sheet, SheetBody};
use crate::assets::AssetStore;
use crate::error::{ExportError, Result};
use crate::flow::{BoxContent, FlowBox, FlowEngine};
use crate::fonts::{FontKey, FontManager};
use crate::style::{Color as StyleColor, ComputedStyle, TextDecoration};
use crate::units::{CSS_PX_PER_MM, MM_PER_INCH};

const PT_PER_MM: f32 = 72.0 / MM_PER_INCH;
const PT_PER_PX: f32 = 72.0 / 96.0;
const MARKER_GUTTER_PX: f32 = 16.0;

/// A printpdf XObject together with the pixel dimensions of the source image.
struct ImageResource {
    xobj_id: XObjectId,
    px_width: u32,
    px_height: u32,
}

/// Maps layout px inside a sheet to PDF points (origin bottom-left).
struct Frame {
    origin_x_pt: f32,
    origin_y_pt: f32,
    page_height_pt: f32,
}

impl Frame {
    fn new(sheet: &Sheet) -> Self {
        Self {
            origin_x_pt: sheet.origin_mm.0 * PT_PER_MM,
            origin_y_pt: sheet.origin_mm.1 * PT_PER_MM,
            page_height_pt: sheet.geometry.paper_height_mm * PT_PER_MM,
        }
    }

    fn x(&self, px: f32) -> f32 {
        self.origin_x_pt + px * PT_PER_PX
    }

    /// PDF y for a layout y measured down from the sheet origin.
    fn y(&self, px: f32) -> f32 {
        self.page_height_pt - self.origin_y_pt - px * PT_PER_PX
    }
}

/// Render an assembled document into PDF bytes.
///
/// Images that cannot be embedded are skipped with a warning; a raster page
/// that cannot be embedded fails the export.
pub fn render_pdf(
    doc: &AssembledDocument,
    title: &str,
    fonts: &FontManager,
    assets: &AssetStore,
) -> Result<Vec<u8>> {
    let mut pdf = PdfDocument::new(title);
    let engine = FlowEngine::new(fonts, assets);
    let mut images: HashMap<String, Option<ImageResource>> = HashMap::new();
    let mut warnings: Vec<PdfWarnMsg> = Vec::new();
    let mut pages = Vec::with_capacity(doc.len());

    for sheet in &doc.sheets {
        let frame = Frame::new(sheet);
        let ops = match &sheet.body {
            SheetBody::Content { nodes, .. } => {
                let width_px = sheet.geometry.inner_width_mm() * CSS_PX_PER_MM;
                let layout = engine.layout(nodes, width_px)?;
                register_images(&mut pdf, &layout.boxes, assets, &mut images, &mut warnings);
                let mut ops = Vec::new();
                for b in &layout.boxes {
                    render_box(&mut ops, b, &frame, fonts, &images);
                }
                ops
            }
            SheetBody::Raster { image, .. } => {
                raster_ops(&mut pdf, image, sheet, &frame, &mut warnings)?
            }
        };
        pages.push(PdfPage::new(
            Mm(sheet.geometry.paper_width_mm),
            Mm(sheet.geometry.paper_height_mm),
            ops,
        ));
    }

    // Ensure at least one page.
    if pages.is_empty() {
        pages.push(PdfPage::new(Mm(210.0), Mm(297.0), Vec::new()));
    }

    log::debug!("Writing PDF with {} page(s)", pages.len());
    pdf.with_pages(pages);
    Ok(pdf.save(&PdfSaveOptions::default(), &mut warnings))
}

/// Embed a full-page canvas. At dpi 72 printpdf draws 1 px as 1 pt, so the
/// scale is page size in pt over image size in px.
fn raster_ops(
    pdf: &mut PdfDocument,
    image: &RgbaImage,
    sheet: &Sheet,
    frame: &Frame,
    warnings: &mut Vec<PdfWarnMsg>,
) -> Result<Vec<Op>> {
    let (w, h) = image.dimensions();
    let mut png = Vec::new();
    PngEncoder::new(&mut png)
        .write_image(image.as_raw(), w, h, ExtendedColorType::Rgba8)
        .map_err(|e| ExportError::Pdf(format!("PNG encode of page {} failed: {e}", sheet.index)))?;
    let raw = RawImage::decode_from_bytes(&png, warnings)
        .map_err(|e| ExportError::Pdf(format!("embedding page {} failed: {e}", sheet.index)))?;
    let id = pdf.add_image(&raw);

    let width_pt = sheet.geometry.paper_width_mm * PT_PER_MM;
    let height_pt = sheet.geometry.paper_height_mm * PT_PER_MM;
    Ok(vec![Op::UseXobject {
        id,
        transform: XObjectTransform {
            translate_x: Some(Pt(frame.origin_x_pt)),
            translate_y: Some(Pt(frame.page_height_pt - frame.origin_y_pt - height_pt)),
            dpi: Some(72.0),
            scale_x: Some(width_pt / w.max(1) as f32),
            scale_y: Some(height_pt / h.max(1) as f32),
            rotate: None,
        },
    }])
}

/// Register every image referenced by `boxes` that is not registered yet.
fn register_images(
    pdf: &mut PdfDocument,
    boxes: &[FlowBox],
    assets: &AssetStore,
    images: &mut HashMap<String, Option<ImageResource>>,
    warnings: &mut Vec<PdfWarnMsg>,
) {
    for b in boxes {
        if let BoxContent::Image { src } = &b.content {
            if !images.contains_key(src) {
                let resource = assets.get(src).and_then(|asset| {
                    match RawImage::decode_from_bytes(&asset.bytes, warnings) {
                        Ok(raw) => {
                            let (px_width, px_height) = asset.size();
                            Some(ImageResource {
                                xobj_id: pdf.add_image(&raw),
                                px_width,
                                px_height,
                            })
                        }
                        Err(e) => {
                            log::warn!("Skipping image: PDF encode error: {e}");
                            None
                        }
                    }
                });
                images.insert(src.clone(), resource);
            }
        }
        register_images(pdf, &b.children, assets, images, warnings);
    }
}

/// Convert a UTF-8 string to raw Windows-1252 bytes then wrap in a String so
/// printpdf writes the bytes unchanged into the PDF stream (builtin fonts use
/// WinAnsiEncoding, so each glyph is one byte 0x00–0xFF).
fn to_winlatin(s: &str) -> String {
    let bytes: Vec<u8> = s
        .chars()
        .map(|c| match c {
            '\u{20AC}' => 0x80,
            '\u{2026}' => 0x85,
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201C}' => 0x93,
            '\u{201D}' => 0x94,
            '\u{2022}' => 0x95,
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            '\u{2122}' => 0x99,
            '\u{00A0}' => 0x20,
            c if (c as u32) < 256 => c as u8,
            _ => b'?',
        })
        .collect();
    // SAFETY: intentionally non-UTF-8 for 0x80-0xFF; printpdf passes these
    // bytes straight to the PDF stream, decoded by WinAnsiEncoding.
    #[allow(unsafe_code)]
    unsafe {
        String::from_utf8_unchecked(bytes)
    }
}

fn pdf_color(c: StyleColor) -> Color {
    Color::Rgb(Rgb {
        r: c.r,
        g: c.g,
        b: c.b,
        icc_profile: None,
    })
}

fn line_point(x: f32, y: f32) -> LinePoint {
    LinePoint {
        p: Point { x: Pt(x), y: Pt(y) },
        bezier: false,
    }
}

/// Corners of a rectangle in PDF space, counter-clockwise from bottom-left.
fn rect_points(x1: f32, y1: f32, x2: f32, y2: f32) -> Vec<LinePoint> {
    vec![
        line_point(x1, y1),
        line_point(x2, y1),
        line_point(x2, y2),
        line_point(x1, y2),
    ]
}

fn builtin_font(style: &ComputedStyle) -> BuiltinFont {
    let key = FontKey::for_style(style);
    match (key.bold, key.italic) {
        (true, true) => BuiltinFont::HelveticaBoldOblique,
        (true, false) => BuiltinFont::HelveticaBold,
        (false, true) => BuiltinFont::HelveticaOblique,
        (false, false) => BuiltinFont::Helvetica,
    }
}

fn write_text(ops: &mut Vec<Op>, text: &str, x: f32, y: f32, style: &ComputedStyle) {
    let font = builtin_font(style);
    ops.push(Op::StartTextSection);
    ops.push(Op::SetTextCursor {
        pos: Point { x: Pt(x), y: Pt(y) },
    });
    ops.push(Op::SetFontSizeBuiltinFont {
        size: Pt(style.font_size * PT_PER_PX),
        font,
    });
    ops.push(Op::SetLineHeight {
        lh: Pt(style.font_size * style.line_height * PT_PER_PX),
    });
    ops.push(Op::SetFillColor {
        col: pdf_color(style.color),
    });
    ops.push(Op::WriteTextBuiltinFont {
        items: vec![TextItem::Text(to_winlatin(text))],
        font,
    });
    ops.push(Op::EndTextSection);
}

/// Recursively render a flow box and its children into PDF ops.
fn render_box(
    ops: &mut Vec<Op>,
    b: &FlowBox,
    frame: &Frame,
    fonts: &FontManager,
    images: &HashMap<String, Option<ImageResource>>,
) {
    let s = &b.style;
    let (x1, x2) = (frame.x(b.x), frame.x(b.x + b.width));
    let (y_top, y_bottom) = (frame.y(b.y), frame.y(b.y + b.height));

    if !s.background_color.is_transparent() {
        ops.push(Op::SetFillColor {
            col: pdf_color(s.background_color),
        });
        ops.push(Op::DrawPolygon {
            polygon: Polygon {
                rings: vec![PolygonRing {
                    points: rect_points(x1, y_bottom, x2, y_top),
                }],
                mode: PaintMode::Fill,
                winding_order: WindingOrder::NonZero,
            },
        });
    }

    if s.border_width > 0.0 {
        ops.push(Op::SetOutlineColor {
            col: pdf_color(s.border_color),
        });
        ops.push(Op::SetOutlineThickness {
            pt: Pt(s.border_width * PT_PER_PX),
        });
        ops.push(Op::DrawLine {
            line: Line {
                points: rect_points(x1, y_bottom, x2, y_top),
                is_closed: true,
            },
        });
    }

    match &b.content {
        BoxContent::Text { lines } => {
            let key = FontKey::for_style(s);
            let line_height = fonts.line_height_px(s.font_size, s.line_height);
            let ascent = (line_height - s.font_size) / 2.0 + fonts.ascender_px(s.font_size, &key);
            for line in lines {
                if line.text.is_empty() {
                    continue;
                }
                let text_x = frame.x(b.x + line.x_offset);
                let baseline = frame.y(b.y + line.y_offset + ascent);
                write_text(ops, &line.text, text_x, baseline, s);

                if s.text_decoration == TextDecoration::Underline {
                    let underline_y = baseline - s.font_size * 0.1 * PT_PER_PX;
                    ops.push(Op::SetOutlineThickness { pt: Pt(0.5) });
                    ops.push(Op::SetOutlineColor {
                        col: pdf_color(s.color),
                    });
                    ops.push(Op::DrawLine {
                        line: Line {
                            points: vec![
                                line_point(text_x, underline_y),
                                line_point(text_x + line.width * PT_PER_PX, underline_y),
                            ],
                            is_closed: false,
                        },
                    });
                }
            }
        }
        BoxContent::ListItem { marker } => {
            let key = FontKey::for_style(s);
            let top = b.y + s.padding_top;
            let line_height = fonts.line_height_px(s.font_size, s.line_height);
            let ascent = (line_height - s.font_size) / 2.0 + fonts.ascender_px(s.font_size, &key);
            write_text(ops, marker, frame.x(b.x - MARKER_GUTTER_PX), frame.y(top + ascent), s);
        }
        BoxContent::Image { src } => {
            if let Some(Some(res)) = images.get(src) {
                let width_pt = b.width * PT_PER_PX;
                let height_pt = b.height * PT_PER_PX;
                let scale = |pt: f32, px: u32| if px > 0 { pt / px as f32 } else { 1.0 };
                ops.push(Op::UseXobject {
                    id: res.xobj_id.clone(),
                    transform: XObjectTransform {
                        translate_x: Some(Pt(x1)),
                        translate_y: Some(Pt(y_bottom)),
                        dpi: Some(72.0),
                        scale_x: Some(scale(width_pt, res.px_width)),
                        scale_y: Some(scale(height_pt, res.px_height)),
                        rotate: None,
                    },
                });
            }
        }
        BoxContent::None => {}
    }

    for child in &b.children {
        render_box(ops, child, frame, fonts, images);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::{assemble_pages, assemble_raster};
    use crate::dom::parse_html;
    use crate::fit::Page;
    use crate::geometry::PageGeometry;
    use crate::raster::slice_surface;

    #[test]
    fn render_empty_document() {
        let bytes = render_pdf(
            &AssembledDocument::default(),
            "Empty",
            &FontManager::default(),
            &AssetStore::new(),
        )
        .unwrap();
        assert!(bytes.len() > 100, "PDF should have content");
        assert_eq!(&bytes[0..5], b"%PDF-");
    }

    #[test]
    fn render_content_sheets() {
        let html = format!(
            r#"<h1>Title</h1><ul><li>one</li></ul><table><tr><th>A</th><td>B</td></tr></table><img src="{}">"#,
            crate::assets::tests::png_data_uri(8, 8)
        );
        let nodes = parse_html(&html);
        let mut assets = AssetStore::new();
        assets.preload(&crate::dom::parse_document(&html));
        let doc = assemble_pages(vec![Page {
            index: 0,
            section: 0,
            geometry: PageGeometry::a4(),
            nodes,
            overflow: false,
        }]);
        let bytes = render_pdf(&doc, "Doc", &FontManager::default(), &assets).unwrap();
        assert_eq!(&bytes[0..5], b"%PDF-");
    }

    #[test]
    fn render_raster_sheets() {
        let surface = RgbaImage::from_pixel(60, 90, ::image::Rgba([10, 20, 30, 255]));
        let doc = assemble_raster(slice_surface(&surface, &PageGeometry::a4(), 1.0));
        let bytes = render_pdf(&doc, "Raster", &FontManager::default(), &AssetStore::new()).unwrap();
        assert_eq!(&bytes[0..5], b"%PDF-");
    }

    #[test]
    fn frame_maps_top_left_to_pdf_space() {
        let doc = assemble_pages(vec![Page {
            index: 0,
            section: 0,
            geometry: PageGeometry::a4(),
            nodes: Vec::new(),
            overflow: false,
        }]);
        let frame = Frame::new(&doc.sheets[0]);
        // One-inch margin is 72pt from the left and top edges.
        assert!((frame.x(0.0) - 72.0).abs() < 0.01);
        assert!((frame.y(0.0) - (297.0 * PT_PER_MM - 72.0)).abs() < 0.01);
        assert!((frame.x(96.0) - 144.0).abs() < 0.01);
    }

    #[test]
    fn winlatin_maps_typographic_chars() {
        assert_eq!(to_winlatin("abc").as_bytes(), b"abc");
        assert_eq!(to_winlatin("\u{2022}").as_bytes(), [0x95]);
        assert_eq!(to_winlatin("\u{4e2d}").as_bytes(), b"?");
    }
}
