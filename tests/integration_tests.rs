//! Integration tests for the folio pipeline.
//!
//! These tests validate:
//! - Break segmentation and page fitting end to end
//! - Content is never lost, reordered or duplicated across pages
//! - Degenerate inputs (empty content, oversized nodes) still terminate
//! - Vector and raster exports produce valid PDFs

use folio::assemble::{assemble_pages, SheetBody};
use folio::assets::AssetStore;
use folio::document::{Document, MarginUpdate};
use folio::dom::{self, parse_document, ContentNode};
use folio::fit::{paginate, Page};
use folio::flow::{BoxContent, FlowEngine, FlowMeasurer};
use folio::fonts::FontManager;
use folio::geometry::{compute_geometry, Margins, PageGeometry, PageOrientation, PaperSize};
use folio::measure::{Measure, MeasureBackend};
use folio::paint::FlowPainter;
use folio::pipeline::{export, export_pdf, ExportConfig, ExportMode};
use folio::raster::{rasterize, RasterRenderer};
use folio::segment::segment;
use folio::templates;
use folio::units::{parse_length, CSS_PX_PER_MM, DEFAULT_MARGIN_MM};

// =====================================================================
// Helpers
// =====================================================================

fn assert_valid_pdf(bytes: &[u8]) {
    assert!(bytes.len() > 100, "PDF too small: {} bytes", bytes.len());
    assert_eq!(&bytes[0..5], b"%PDF-", "Missing PDF header");
}

fn all_text(pages: &[Page]) -> String {
    pages.iter().map(Page::text_content).collect()
}

/// Paginate with the built-in flow measurer on A4.
fn flow_pages(tree: &ContentNode) -> (Vec<Page>, PageGeometry) {
    let fonts = FontManager::default();
    let assets = AssetStore::new();
    let backend = FlowMeasurer::new(&fonts, &assets);
    let geometry = PageGeometry::a4();
    let mut workspace = backend.acquire(&geometry).unwrap();
    let pages = paginate(tree, &geometry, workspace.as_mut()).unwrap();
    (pages, geometry)
}

/// Every character of text is one millimetre tall.
struct MillimetrePerChar {
    px_per_mm: f32,
}

impl Measure for MillimetrePerChar {
    fn height_px(&mut self, nodes: &[ContentNode]) -> folio::Result<f32> {
        Ok(dom::text_of(nodes).chars().count() as f32 * self.px_per_mm)
    }
}

// =====================================================================
// Scenarios
// =====================================================================

#[test]
fn scenario_a_tall_paragraph_spans_two_pages() {
    let geometry = compute_geometry(PaperSize::A4, &Margins::default(), CSS_PX_PER_MM);
    let tree = parse_document(&format!("<p>{}</p>", "x".repeat(400)));
    let mut measure = MillimetrePerChar {
        px_per_mm: geometry.px_per_mm,
    };
    let pages = paginate(&tree, &geometry, &mut measure).unwrap();

    assert_eq!(pages.len(), 2);
    let first = pages[0].text_content().len() as f32;
    assert!((first - geometry.inner_height_mm()).abs() <= 1.0, "first page held {first}mm");
    assert_eq!(all_text(&pages), tree.text_content());
}

#[test]
fn scenario_b_break_gives_two_single_page_sections() {
    let tree = parse_document("<h1>Title</h1><break/><p>Body</p>");
    assert_eq!(segment(&tree).len(), 2);

    let (pages, _) = flow_pages(&tree);
    assert_eq!(pages.len(), 2);
    assert_eq!(pages[0].text_content(), "Title");
    assert_eq!(pages[1].text_content(), "Body");
    assert_eq!((pages[0].section, pages[1].section), (0, 1));
}

#[test]
fn scenario_c_margin_strings() {
    assert!((parse_length("2in", DEFAULT_MARGIN_MM).to_mm(CSS_PX_PER_MM) - 50.8).abs() < 1e-4);
    assert_eq!(parse_length("abc", DEFAULT_MARGIN_MM).to_mm(CSS_PX_PER_MM), 25.4);

    let mut doc = Document::from_html("<p>x</p>");
    doc.update_margins(&MarginUpdate {
        left: Some("2in".into()),
        top: Some("abc".into()),
        ..MarginUpdate::default()
    });
    let g = compute_geometry(PaperSize::A4, doc.margins(), CSS_PX_PER_MM);
    assert!((g.margin_left_mm - 50.8).abs() < 1e-4);
    assert_eq!(g.margin_top_mm, 25.4);
    assert_eq!(g.margin_right_mm, 25.4);
}

#[test]
fn scenario_d_empty_content_is_one_empty_page() {
    let (pages, _) = flow_pages(&parse_document(""));
    assert_eq!(pages.len(), 1);
    assert!(pages[0].nodes.is_empty());
    assert!(!pages[0].overflow);

    let bytes = folio::export_pdf_from_html("").unwrap();
    assert_valid_pdf(&bytes);
}

#[test]
fn scenario_e_oversized_leaf_gets_its_own_page() {
    let tree = parse_document(
        r#"<p>before</p><img src="missing.png" width="200" height="2000"><p>after</p>"#,
    );
    let (pages, _) = flow_pages(&tree);
    assert_eq!(pages.len(), 3);
    assert!(matches!(pages[1].nodes.as_slice(), [ContentNode::Leaf(_)]));
    assert!(pages[1].overflow);
    assert!(!pages[0].overflow && !pages[2].overflow);
}

// =====================================================================
// Fitting properties
// =====================================================================

#[test]
fn long_article_keeps_every_character_in_order() {
    let tree = parse_document(&templates::long_article(40));
    let (pages, geometry) = flow_pages(&tree);
    assert!(pages.len() > 2, "expected several pages, got {}", pages.len());
    assert_eq!(all_text(&pages), tree.text_content());

    // Pages that did not overflow really fit.
    let fonts = FontManager::default();
    let assets = AssetStore::new();
    let backend = FlowMeasurer::new(&fonts, &assets);
    let mut workspace = backend.acquire(&geometry).unwrap();
    for page in pages.iter().filter(|p| !p.overflow) {
        let h = workspace.height_px(&page.nodes).unwrap();
        assert!(h <= geometry.inner_height_px() + 0.01, "page {} is {h}px", page.index);
    }
}

#[test]
fn split_elements_keep_their_wrapper() {
    let mut html = String::from("<ol>");
    for i in 0..80 {
        html.push_str(&format!("<li>Entry number {i}</li>"));
    }
    html.push_str("</ol>");
    let tree = parse_document(&html);
    let (pages, _) = flow_pages(&tree);
    assert!(pages.len() >= 2);
    for page in &pages {
        assert!(
            matches!(&page.nodes[0], ContentNode::Element(e) if e.tag == dom::Tag::Ol),
            "page {} does not start inside the list",
            page.index
        );
    }
    assert_eq!(all_text(&pages), tree.text_content());
}

#[test]
fn split_ordered_list_markers_match_their_items() {
    let mut html = String::from("<ol>");
    for i in 0..80 {
        html.push_str(&format!("<li>Entry number {i}</li>"));
    }
    html.push_str("</ol>");
    let (pages, geometry) = flow_pages(&parse_document(&html));
    assert!(pages.len() >= 2);

    let fonts = FontManager::default();
    let assets = AssetStore::new();
    let engine = FlowEngine::new(&fonts, &assets);
    for page in &pages {
        let layout = engine.layout(&page.nodes, geometry.inner_width_px()).unwrap();
        let marker = layout.boxes[0]
            .children
            .iter()
            .find_map(|b| match &b.content {
                BoxContent::ListItem { marker } => Some(marker.clone()),
                _ => None,
            })
            .unwrap();
        let first_item: usize = page.text_content()
            .trim_start_matches("Entry number ")
            .split(|c: char| !c.is_ascii_digit())
            .next()
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(marker, format!("{}.", first_item + 1), "page {}", page.index);
    }
}

#[test]
fn inline_colour_with_non_ascii_digits_is_ignored() {
    let bytes = folio::export_pdf_from_html(
        r#"<p style="color:#éa">x</p><p style="background:#€€€;border:1px solid #é">y</p>"#,
    )
    .unwrap();
    assert_valid_pdf(&bytes);
}

#[test]
fn tables_are_never_split() {
    let mut html = String::from("<p>intro</p><table>");
    for i in 0..10 {
        html.push_str(&format!("<tr><td>row {i}</td><td>value</td></tr>"));
    }
    html.push_str("</table>");
    let (pages, _) = flow_pages(&parse_document(&html));
    let tables: usize = pages
        .iter()
        .flat_map(|p| p.nodes.iter())
        .filter(|n| matches!(n, ContentNode::Leaf(e) if e.tag == dom::Tag::Table))
        .count();
    assert_eq!(tables, 1);
}

#[test]
fn nested_break_markers_are_dropped() {
    let tree = parse_document("<div><p>a</p><break/><p>b</p></div>");
    let (pages, _) = flow_pages(&tree);
    assert_eq!(segment(&tree).len(), 1);
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].text_content(), "ab");
}

#[test]
fn chaptered_template_starts_each_chapter_on_a_new_page() {
    let (pages, _) = flow_pages(&parse_document(templates::chaptered_template()));
    assert_eq!(pages.len(), 3);
    assert!(pages[1].text_content().starts_with("Chapter 1"));
    assert!(pages[2].text_content().starts_with("Chapter 2"));

    let doc = assemble_pages(pages);
    assert!(!doc.sheets[0].new_page);
    assert!(doc.sheets[1..].iter().all(|s| s.new_page));
}

#[test]
fn zero_inner_height_still_terminates() {
    let fonts = FontManager::default();
    let assets = AssetStore::new();
    let backend = FlowMeasurer::new(&fonts, &assets);
    let geometry = compute_geometry(
        PaperSize::A4,
        &Margins::parse(&folio::geometry::MarginSpec::uniform("160mm")),
        CSS_PX_PER_MM,
    );
    assert!(geometry.is_degenerate());
    let tree = parse_document("<p>one</p><p>two</p>");
    let mut workspace = backend.acquire(&geometry).unwrap();
    let pages = paginate(&tree, &geometry, workspace.as_mut()).unwrap();
    assert_eq!(pages.len(), 2);
    assert!(pages.iter().all(|p| p.overflow));
    assert_eq!(all_text(&pages), "onetwo");
}

// =====================================================================
// Raster path
// =====================================================================

#[test]
fn raster_strips_cover_the_rendered_surface() {
    let fonts = FontManager::default();
    let assets = AssetStore::new();
    let geometry = PageGeometry::a4();
    let tree = parse_document(&templates::long_article(30));

    let mut painter = FlowPainter::new(&fonts, &assets);
    let width = geometry.inner_width_px().round() as u32;
    let surface = painter.render(dom::top_level(&tree), width, 1.0).unwrap();

    let pages = rasterize(&tree, &geometry, 1.0, &mut painter).unwrap();
    let slice = (geometry.inner_height_mm() * pages[0].px_per_mm).round() as u32;
    assert_eq!(
        pages.iter().map(|p| p.strip_height_px).sum::<u32>(),
        surface.height()
    );
    assert_eq!(pages.len() as u32, surface.height().div_ceil(slice).max(1));

    let expected_w = (geometry.paper_width_mm * pages[0].px_per_mm).round() as u32;
    assert!(pages.iter().all(|p| p.image.width() == expected_w));
}

#[test]
fn raster_export_of_empty_content_is_one_blank_page() {
    let fonts = FontManager::default();
    let assets = AssetStore::new();
    let config = ExportConfig {
        mode: ExportMode::Raster,
        ..ExportConfig::default()
    };
    let doc = Document::new(parse_document(""));
    let out = export(
        &doc,
        &config,
        &FlowMeasurer::new(&fonts, &assets),
        &mut FlowPainter::new(&fonts, &assets),
    )
    .unwrap();
    assert_eq!(out.len(), 1);
    match &out.sheets[0].body {
        SheetBody::Raster { image, .. } => {
            assert!(image.pixels().all(|p| p.0 == [255, 255, 255, 255]))
        }
        other => panic!("expected a raster sheet, got {other:?}"),
    }
}

// =====================================================================
// Full exports
// =====================================================================

#[test]
fn vector_export_writes_pdf_and_manifest() {
    let config = ExportConfig {
        title: "Invoice".into(),
        ..ExportConfig::default()
    };
    let out = export_pdf(
        parse_document(templates::invoice_template()),
        &config,
        &FontManager::default(),
        AssetStore::new(),
    )
    .unwrap();
    assert_valid_pdf(&out.pdf);
    assert_eq!(out.manifest.page_count, 1);
    assert_eq!(out.manifest.title, "Invoice");

    let json: serde_json::Value = serde_json::from_str(&out.manifest.to_json()).unwrap();
    assert_eq!(json["pages"][0]["kind"], "content");
    let left = json["pages"][0]["origin_mm"][0].as_f64().unwrap();
    assert!((left - 25.4).abs() < 1e-4);
}

#[test]
fn raster_export_writes_pdf() {
    let config = ExportConfig {
        mode: ExportMode::Raster,
        scale: 1.0,
        ..ExportConfig::default()
    };
    let out = export_pdf(
        parse_document(templates::chaptered_template()),
        &config,
        &FontManager::default(),
        AssetStore::new(),
    )
    .unwrap();
    assert_valid_pdf(&out.pdf);
    assert_eq!(out.manifest.page_count, 3);
}

#[test]
fn landscape_pages_are_wider_than_tall() {
    let config = ExportConfig {
        orientation: PageOrientation::Landscape,
        paper: PaperSize::LETTER,
        ..ExportConfig::default()
    };
    let out = export_pdf(
        parse_document(templates::minimal_template()),
        &config,
        &FontManager::default(),
        AssetStore::new(),
    )
    .unwrap();
    let page = &out.manifest.pages[0];
    assert!(page.width_mm > page.height_mm);
}

#[test]
fn images_are_preloaded_from_base_dir() {
    let dir = std::env::temp_dir().join(format!("folio-assets-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let img = image::RgbaImage::from_pixel(30, 20, image::Rgba([0, 128, 255, 255]));
    img.save(dir.join("chart.png")).unwrap();

    let html = templates::figure_template("chart.png");
    let out = export_pdf(
        parse_document(&html),
        &ExportConfig::default(),
        &FontManager::default(),
        AssetStore::with_base_dir(&dir),
    )
    .unwrap();
    assert_valid_pdf(&out.pdf);
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn json_content_trees_round_trip() {
    let tree = parse_document(templates::chaptered_template());
    let json = dom::to_json(&tree);
    let back = dom::from_json(&json).unwrap();
    assert_eq!(back, tree);
    assert!(dom::from_json("{not json").is_err());
}
