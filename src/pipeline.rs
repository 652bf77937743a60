//! Pipeline – ties together segmentation, fitting or rasterization, assembly,
//! and PDF rendering into a single call.

use serde::{de::Error as _, Deserialize, Deserializer};

use crate::assemble::{assemble_pages, assemble_raster, AssembledDocument, PageManifest};
use crate::assets::AssetStore;
use crate::document::Document;
use crate::dom::ContentNode;
use crate::error::Result;
use crate::fit::paginate;
use crate::flow::FlowMeasurer;
use crate::fonts::FontManager;
use crate::geometry::{compute_geometry, MarginSpec, PageGeometry, PageOrientation, PaperSize};
use crate::measure::MeasureBackend;
use crate::paint::FlowPainter;
use crate::raster::{rasterize_sections, RasterRenderer};
use crate::render::render_pdf;
use crate::units::CSS_PX_PER_MM;

/// Which export path to take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportMode {
    /// Fit content nodes into pages and draw them as vector content.
    #[default]
    Vector,
    /// Render to a tall image and slice it into page images.
    Raster,
}

/// Configuration for an export. Deserialisable from JSON; every field is
/// optional there.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Document title embedded in the PDF metadata.
    pub title: String,
    /// Paper size, by preset name (`"A4"`) or `{ "width_mm", "height_mm" }`.
    #[serde(deserialize_with = "deserialize_paper")]
    pub paper: PaperSize,
    pub orientation: PageOrientation,
    /// Free-text margins; missing or malformed sides use 25.4mm.
    pub margins: MarginSpec,
    pub mode: ExportMode,
    /// Device-pixel ratio of the raster surface.
    pub scale: f32,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            title: "folio output".to_string(),
            paper: PaperSize::A4,
            orientation: PageOrientation::Portrait,
            margins: MarginSpec::default(),
            mode: ExportMode::Vector,
            scale: 2.0,
        }
    }
}

impl ExportConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Paper size after applying orientation.
    pub fn effective_paper(&self) -> PaperSize {
        self.paper.oriented(self.orientation)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PaperField {
    Name(String),
    Size(PaperSize),
}

fn deserialize_paper<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<PaperSize, D::Error> {
    match PaperField::deserialize(d)? {
        PaperField::Name(name) => PaperSize::from_name(&name)
            .ok_or_else(|| D::Error::custom(format!("unknown paper size `{name}`"))),
        PaperField::Size(size) => Ok(size),
    }
}

/// Geometry for `document` on the configured paper, at the backend's live
/// pixel density.
pub fn resolve_geometry(
    document: &Document,
    config: &ExportConfig,
    backend: &dyn MeasureBackend,
) -> PageGeometry {
    let px_per_mm = backend.px_per_mm().unwrap_or(CSS_PX_PER_MM);
    compute_geometry(config.effective_paper(), document.margins(), px_per_mm)
}

/// Paginate `document` with the given collaborators.
///
/// The measurement workspace lives for the vector fit only and is released
/// on every exit path. Any failure discards all pages.
pub fn export(
    document: &Document,
    config: &ExportConfig,
    backend: &dyn MeasureBackend,
    renderer: &mut dyn RasterRenderer,
) -> Result<AssembledDocument> {
    let geometry = resolve_geometry(document, config, backend);
    log::debug!(
        "Exporting ({:?}) on {}x{}mm, inner {:.1}x{:.1}mm at {:.3} px/mm",
        config.mode,
        geometry.paper_width_mm,
        geometry.paper_height_mm,
        geometry.inner_width_mm(),
        geometry.inner_height_mm(),
        geometry.px_per_mm
    );

    let assembled = match config.mode {
        ExportMode::Vector => {
            let mut workspace = backend.acquire(&geometry)?;
            assemble_pages(paginate(document.content(), &geometry, workspace.as_mut())?)
        }
        ExportMode::Raster => assemble_raster(rasterize_sections(
            document.content(),
            &geometry,
            config.scale,
            renderer,
        )?),
    };
    log::info!("Assembled {} page(s)", assembled.len());
    Ok(assembled)
}

/// The result of a full export.
pub struct ExportOutput {
    pub pdf: Vec<u8>,
    pub manifest: PageManifest,
}

/// Full pipeline: content tree → PDF bytes, using the built-in flow
/// measurer and painter.
///
/// Images are loaded before any measurement; relative paths resolve against
/// `assets`' base directory.
pub fn export_pdf(
    content: ContentNode,
    config: &ExportConfig,
    fonts: &FontManager,
    mut assets: AssetStore,
) -> Result<ExportOutput> {
    let loaded = assets.preload(&content);
    log::debug!("Preloaded {loaded} image(s)");

    let document = Document::new(content).with_margins(&config.margins);
    let backend = FlowMeasurer::new(fonts, &assets);
    let mut painter = FlowPainter::new(fonts, &assets);
    let assembled = export(&document, config, &backend, &mut painter)?;

    let pdf = render_pdf(&assembled, &config.title, fonts, &assets)?;
    Ok(ExportOutput {
        manifest: assembled.manifest(&config.title),
        pdf,
    })
}

/// Convenience: HTML string → PDF bytes with the default config.
pub fn export_pdf_from_html(html: &str) -> Result<Vec<u8>> {
    let out = export_pdf(
        crate::dom::parse_document(html),
        &ExportConfig::default(),
        &FontManager::default(),
        AssetStore::new(),
    )?;
    Ok(out.pdf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::SheetBody;
    use crate::dom::parse_document;

    #[test]
    fn pipeline_basic() {
        let bytes = export_pdf_from_html("<h1>Hello</h1><p>World</p>").unwrap();
        assert!(!bytes.is_empty());
        assert_eq!(&bytes[0..5], b"%PDF-");
    }

    #[test]
    fn config_defaults_and_json() {
        let c = ExportConfig::default();
        assert_eq!(c.paper, PaperSize::A4);
        assert_eq!(c.mode, ExportMode::Vector);
        assert_eq!(c.scale, 2.0);

        let c = ExportConfig::from_json(
            r#"{"paper": "letter", "orientation": "landscape", "mode": "raster",
                "margins": {"top": "1cm"}}"#,
        )
        .unwrap();
        assert_eq!(c.effective_paper(), PaperSize::new(279.4, 215.9));
        assert_eq!(c.mode, ExportMode::Raster);
        assert_eq!(c.margins.top.as_deref(), Some("1cm"));
        assert_eq!(c.title, "folio output");

        let c = ExportConfig::from_json(r#"{"paper": {"width_mm": 100, "height_mm": 150}}"#)
            .unwrap();
        assert_eq!(c.paper, PaperSize::new(100.0, 150.0));
        assert!(ExportConfig::from_json(r#"{"paper": "tabloid"}"#).is_err());
    }

    #[test]
    fn geometry_uses_backend_density() {
        let fonts = FontManager::default();
        let assets = AssetStore::new();
        let doc = Document::new(parse_document("<p>x</p>"));
        let backend = FlowMeasurer::new(&fonts, &assets).with_zoom(1.5);
        let g = resolve_geometry(&doc, &ExportConfig::default(), &backend);
        assert!((g.px_per_mm - CSS_PX_PER_MM * 1.5).abs() < 1e-4);
    }

    #[test]
    fn raster_mode_produces_canvases() {
        let fonts = FontManager::default();
        let assets = AssetStore::new();
        let doc = Document::new(parse_document("<p>one</p><break/><p>two</p>"));
        let config = ExportConfig {
            mode: ExportMode::Raster,
            scale: 1.0,
            ..ExportConfig::default()
        };
        let out = export(
            &doc,
            &config,
            &FlowMeasurer::new(&fonts, &assets),
            &mut FlowPainter::new(&fonts, &assets),
        )
        .unwrap();
        assert_eq!(out.len(), 2);
        assert!(out
            .sheets
            .iter()
            .all(|s| matches!(s.body, SheetBody::Raster { .. }) && s.origin_mm == (0.0, 0.0)));
    }
}
