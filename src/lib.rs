//! # folio – document pagination and PDF export
//!
//! Takes a rich-content tree (headings, paragraphs, lists, tables, images,
//! explicit page-break markers) and lays it out onto fixed-size pages that
//! respect the page margins. Two export paths share one page geometry:
//!
//! 1. **Vector** – split the tree at break markers ([`segment`]), fit each
//!    section into pages by measuring candidate content ([`fit`]), and draw
//!    the pages with `printpdf` ([`render`]).
//! 2. **Raster** – render each section once into a tall image ([`paint`])
//!    and slice it into page-sized canvases ([`raster`]).
//!
//! Both end in [`assemble`], which orders the pages for the PDF backend.
//! [`pipeline`] wires everything together.

pub mod assemble;
pub mod assets;
pub mod document;
pub mod dom;
pub mod error;
pub mod fit;
pub mod flow;
pub mod fonts;
pub mod geometry;
pub mod measure;
pub mod paint;
pub mod pipeline;
pub mod raster;
pub mod render;
pub mod segment;
pub mod style;
pub mod templates;
pub mod units;

// Re-exports for convenience
pub use document::Document;
pub use error::{ExportError, Result};
pub use geometry::{compute_geometry, PageGeometry};
pub use pipeline::{export, export_pdf, export_pdf_from_html, ExportConfig, ExportMode};
pub use units::parse_length;
