//! Raster slicer – the image-based export path.
//!
//! Content is rendered once into a single tall surface by a
//! [`RasterRenderer`], then cut into page-height strips. Each strip is copied
//! onto a white canvas the size of the full page, offset by the margins.

use image::{imageops, Rgba, RgbaImage};

use crate::dom::{top_level, ContentNode};
use crate::error::{ExportError, Result};
use crate::geometry::PageGeometry;
use crate::segment::segment;

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Largest surface or page canvas we are willing to allocate (4 bytes per
/// pixel).
pub const MAX_SURFACE_PIXELS: u64 = 1 << 28;

/// Renders content into one tall raster surface.
pub trait RasterRenderer {
    /// Render `nodes` in block flow into a surface `width_px` wide.
    /// `scale` is the device-pixel ratio relative to layout pixels.
    fn render(&mut self, nodes: &[ContentNode], width_px: u32, scale: f32) -> Result<RgbaImage>;
}

/// One page of the raster path: a full-page canvas holding one strip.
#[derive(Debug, Clone)]
pub struct RasterPage {
    pub index: usize,
    pub section: usize,
    pub geometry: PageGeometry,
    pub image: RgbaImage,
    /// Height of the strip taken from the surface.
    pub strip_height_px: u32,
    /// `strip_height_px` in millimetres.
    pub height_mm: f32,
    /// Surface pixels per millimetre.
    pub px_per_mm: f32,
}

/// Render the whole tree once and slice it into pages.
pub fn rasterize(
    tree: &ContentNode,
    geometry: &PageGeometry,
    scale: f32,
    renderer: &mut dyn RasterRenderer,
) -> Result<Vec<RasterPage>> {
    let fallback = geometry.px_per_mm * sane_scale(scale);
    let surface = render_surface(top_level(tree), geometry, scale, renderer)?;
    check_canvas(geometry, surface_density(&surface, geometry, fallback))?;
    Ok(slice_surface(&surface, geometry, fallback))
}

/// Like [`rasterize`], but every section between break markers is rendered
/// and sliced on its own, so each section starts on a fresh page.
pub fn rasterize_sections(
    tree: &ContentNode,
    geometry: &PageGeometry,
    scale: f32,
    renderer: &mut dyn RasterRenderer,
) -> Result<Vec<RasterPage>> {
    let fallback = geometry.px_per_mm * sane_scale(scale);
    let mut pages = Vec::new();
    for section in segment(tree) {
        let surface = render_surface(&section.nodes, geometry, scale, renderer)?;
        check_canvas(geometry, surface_density(&surface, geometry, fallback))?;
        for mut page in slice_surface(&surface, geometry, fallback) {
            page.index = pages.len();
            page.section = section.index;
            pages.push(page);
        }
    }
    Ok(pages)
}

fn sane_scale(scale: f32) -> f32 {
    if scale.is_finite() && scale > 0.0 {
        scale
    } else {
        1.0
    }
}

fn render_surface(
    nodes: &[ContentNode],
    geometry: &PageGeometry,
    scale: f32,
    renderer: &mut dyn RasterRenderer,
) -> Result<RgbaImage> {
    let scale = sane_scale(scale);
    check_canvas(geometry, geometry.px_per_mm * scale)?;
    let width_px = (geometry.inner_width_px() * scale).round().max(0.0) as u32;
    let surface = renderer.render(nodes, width_px, scale)?;
    if surface.width() != width_px {
        log::warn!(
            "Renderer returned a {}px wide surface, expected {width_px}px",
            surface.width()
        );
    }
    log::debug!(
        "Rendered surface {}x{} px at scale {scale}",
        surface.width(),
        surface.height()
    );
    Ok(surface)
}

/// Surface pixels per millimetre: `surface width / inner width in mm`, or the
/// fallback when that ratio is unusable.
fn surface_density(surface: &RgbaImage, geometry: &PageGeometry, fallback_px_per_mm: f32) -> f32 {
    let inner_w_mm = geometry.inner_width_mm();
    if surface.width() > 0 && inner_w_mm > 0.0 {
        surface.width() as f32 / inner_w_mm
    } else {
        crate::units::sane_ratio(fallback_px_per_mm)
    }
}

/// Full-page canvas dimensions at `px_per_mm`, at least 1×1.
fn canvas_size(geometry: &PageGeometry, px_per_mm: f32) -> (u32, u32) {
    let to_px = |mm: f32| (mm * px_per_mm).round().clamp(1.0, u32::MAX as f32) as u32;
    (to_px(geometry.paper_width_mm), to_px(geometry.paper_height_mm))
}

/// Refuse page canvases above [`MAX_SURFACE_PIXELS`].
fn check_canvas(geometry: &PageGeometry, px_per_mm: f32) -> Result<()> {
    let (w, h) = canvas_size(geometry, px_per_mm);
    if u64::from(w) * u64::from(h) > MAX_SURFACE_PIXELS {
        return Err(ExportError::Render(format!(
            "page canvas of {w}x{h} px is too large; lower the raster scale"
        )));
    }
    Ok(())
}

/// Cut `surface` into page strips and pad each onto a white page canvas.
///
/// The surface density is `surface width / inner width in mm`;
/// `fallback_px_per_mm` is used when that ratio is unusable (zero-width
/// surface or zero inner width). Strip heights sum to the surface height and
/// there is always at least one page.
pub fn slice_surface(
    surface: &RgbaImage,
    geometry: &PageGeometry,
    fallback_px_per_mm: f32,
) -> Vec<RasterPage> {
    let (surface_w, surface_h) = surface.dimensions();
    let px_per_mm = surface_density(surface, geometry, fallback_px_per_mm);
    let slice_h = ((geometry.inner_height_mm() * px_per_mm).round() as u32).max(1);

    let to_px = |mm: f32| (mm * px_per_mm).round().max(0.0) as u32;
    let (canvas_w, canvas_h) = canvas_size(geometry, px_per_mm);
    let (left, top) = (
        to_px(geometry.margin_left_mm) as i64,
        to_px(geometry.margin_top_mm) as i64,
    );

    let mut pages = Vec::new();
    let mut y = 0u32;
    loop {
        let strip_h = slice_h.min(surface_h - y);
        let mut canvas = RgbaImage::from_pixel(canvas_w, canvas_h, WHITE);
        if strip_h > 0 && surface_w > 0 {
            let strip = imageops::crop_imm(surface, 0, y, surface_w, strip_h).to_image();
            imageops::replace(&mut canvas, &strip, left, top);
        }
        pages.push(RasterPage {
            index: pages.len(),
            section: 0,
            geometry: *geometry,
            image: canvas,
            strip_height_px: strip_h,
            height_mm: strip_h as f32 / px_per_mm,
            px_per_mm,
        });
        y += strip_h;
        if y >= surface_h {
            break;
        }
    }
    log::debug!(
        "Sliced {surface_h}px surface into {} page(s) of {slice_h}px",
        pages.len()
    );
    pages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{compute_geometry, Margins, PaperSize};
    use crate::units::Length;

    /// 100×200 mm paper, 10 mm margins, 1 px per mm: 80×180 px inner box.
    fn small_page() -> PageGeometry {
        compute_geometry(
            PaperSize::new(100.0, 200.0),
            &Margins::uniform(Length::mm(10.0)),
            1.0,
        )
    }

    fn surface(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([0, 0, 0, 255]))
    }

    #[test]
    fn strips_cover_the_surface() {
        let g = small_page();
        let pages = slice_surface(&surface(80, 400), &g, 1.0);
        let strips: Vec<u32> = pages.iter().map(|p| p.strip_height_px).collect();
        assert_eq!(strips, [180, 180, 40]);
        assert_eq!(strips.iter().sum::<u32>(), 400);
        assert!((pages[2].height_mm - 40.0).abs() < 1e-4);
        assert_eq!(pages.iter().map(|p| p.index).collect::<Vec<_>>(), [0, 1, 2]);
    }

    #[test]
    fn canvas_is_full_page_with_margin_offset() {
        let g = small_page();
        let pages = slice_surface(&surface(80, 50), &g, 1.0);
        assert_eq!(pages.len(), 1);
        let img = &pages[0].image;
        assert_eq!(img.dimensions(), (100, 200));
        assert_eq!(*img.get_pixel(5, 5), WHITE);
        assert_eq!(*img.get_pixel(10, 10), Rgba([0, 0, 0, 255]));
        assert_eq!(*img.get_pixel(89, 59), Rgba([0, 0, 0, 255]));
        assert_eq!(*img.get_pixel(90, 10), WHITE);
        assert_eq!(*img.get_pixel(10, 60), WHITE);
    }

    #[test]
    fn density_follows_surface_width() {
        // A 2x surface doubles every canvas dimension.
        let pages = slice_surface(&surface(160, 360), &small_page(), 1.0);
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].px_per_mm, 2.0);
        assert_eq!(pages[0].image.dimensions(), (200, 400));
        assert!((pages[0].height_mm - 180.0).abs() < 1e-4);
    }

    #[test]
    fn empty_surface_yields_one_blank_page() {
        let pages = slice_surface(&RgbaImage::new(80, 0), &small_page(), 1.0);
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].strip_height_px, 0);
        assert!(pages[0].image.pixels().all(|p| *p == WHITE));
    }

    #[test]
    fn zero_inner_height_still_terminates() {
        let g = compute_geometry(
            PaperSize::new(100.0, 20.0),
            &Margins::uniform(Length::mm(10.0)),
            1.0,
        );
        let pages = slice_surface(&surface(80, 5), &g, 1.0);
        assert_eq!(pages.len(), 5);
        assert!(pages.iter().all(|p| p.strip_height_px == 1));
    }

    struct Striped {
        height: u32,
        calls: usize,
    }

    impl RasterRenderer for Striped {
        fn render(&mut self, _: &[ContentNode], width_px: u32, _: f32) -> Result<RgbaImage> {
            self.calls += 1;
            Ok(surface(width_px, self.height))
        }
    }

    #[test]
    fn sections_render_separately() {
        let doc = crate::dom::parse_document("<p>a</p><break/><p>b</p>");
        let mut r = Striped {
            height: 10,
            calls: 0,
        };
        let pages = rasterize_sections(&doc, &small_page(), 1.0, &mut r).unwrap();
        assert_eq!(r.calls, 2);
        assert_eq!(pages.len(), 2);
        assert_eq!((pages[1].index, pages[1].section), (1, 1));

        let mut r = Striped {
            height: 10,
            calls: 0,
        };
        assert_eq!(rasterize(&doc, &small_page(), 1.0, &mut r).unwrap().len(), 1);
        assert_eq!(r.calls, 1);
    }

    #[test]
    fn oversized_canvas_is_refused_before_rendering() {
        let doc = crate::dom::parse_document("<p>a</p>");
        let mut r = Striped {
            height: 10,
            calls: 0,
        };
        // A4 at 100x the CSS density is about 79k x 112k px per page.
        let g = PageGeometry::a4();
        let err = rasterize_sections(&doc, &g, 100.0, &mut r).unwrap_err();
        assert!(matches!(err, ExportError::Render(_)));
        assert_eq!(r.calls, 0);
        assert!(rasterize(&doc, &g, 100.0, &mut r).is_err());
        assert!(rasterize(&doc, &g, 2.0, &mut r).is_ok());
    }

    /// Ignores the requested width and returns a very wide surface.
    struct TooWide;

    impl RasterRenderer for TooWide {
        fn render(&mut self, _: &[ContentNode], _: u32, _: f32) -> Result<RgbaImage> {
            Ok(RgbaImage::new(60_000, 1))
        }
    }

    #[test]
    fn oversized_canvas_from_renderer_surface_is_refused() {
        let doc = crate::dom::parse_document("<p>a</p>");
        let err = rasterize(&doc, &PageGeometry::a4(), 1.0, &mut TooWide).unwrap_err();
        assert!(matches!(err, ExportError::Render(_)));
    }

    struct Broken;

    impl RasterRenderer for Broken {
        fn render(&mut self, _: &[ContentNode], _: u32, _: f32) -> Result<RgbaImage> {
            Err(ExportError::Render("surface lost".into()))
        }
    }

    #[test]
    fn renderer_failure_aborts() {
        let doc = crate::dom::parse_document("<p>a</p>");
        assert!(rasterize(&doc, &small_page(), 2.0, &mut Broken).is_err());
    }
}
