//! Page assembler – turns fitted pages or raster pages into the ordered
//! sheet list handed to the PDF backend.

use image::RgbaImage;
use serde::Serialize;

use crate::dom::ContentNode;
use crate::fit::Page;
use crate::geometry::PageGeometry;
use crate::raster::RasterPage;

/// What a sheet carries.
#[derive(Debug, Clone)]
pub enum SheetBody {
    /// Content nodes laid out inside the margin box.
    Content {
        nodes: Vec<ContentNode>,
        overflow: bool,
    },
    /// A full-page canvas from the raster path.
    Raster {
        image: RgbaImage,
        strip_height_px: u32,
        px_per_mm: f32,
    },
}

/// One output page, in document order.
#[derive(Debug, Clone)]
pub struct Sheet {
    pub index: usize,
    pub section: usize,
    /// False only for the first sheet, which is drawn on the initial page.
    pub new_page: bool,
    /// Where the body's top-left corner goes, in mm from the page's top-left.
    pub origin_mm: (f32, f32),
    pub geometry: PageGeometry,
    pub body: SheetBody,
}

#[derive(Debug, Clone, Default)]
pub struct AssembledDocument {
    pub sheets: Vec<Sheet>,
}

impl AssembledDocument {
    pub fn len(&self) -> usize {
        self.sheets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }

    pub fn manifest(&self, title: &str) -> PageManifest {
        PageManifest {
            title: title.to_string(),
            page_count: self.sheets.len(),
            pages: self.sheets.iter().map(PageEntry::from).collect(),
        }
    }
}

/// Content pages sit inside the margin box.
pub fn assemble_pages(pages: Vec<Page>) -> AssembledDocument {
    let sheets = pages
        .into_iter()
        .enumerate()
        .map(|(i, page)| Sheet {
            index: i,
            section: page.section,
            new_page: i > 0,
            origin_mm: (page.geometry.margin_left_mm, page.geometry.margin_top_mm),
            geometry: page.geometry,
            body: SheetBody::Content {
                nodes: page.nodes,
                overflow: page.overflow,
            },
        })
        .collect();
    AssembledDocument { sheets }
}

/// Raster canvases already include the margins and go at the page origin.
pub fn assemble_raster(pages: Vec<RasterPage>) -> AssembledDocument {
    let sheets = pages
        .into_iter()
        .enumerate()
        .map(|(i, page)| Sheet {
            index: i,
            section: page.section,
            new_page: i > 0,
            origin_mm: (0.0, 0.0),
            geometry: page.geometry,
            body: SheetBody::Raster {
                image: page.image,
                strip_height_px: page.strip_height_px,
                px_per_mm: page.px_per_mm,
            },
        })
        .collect();
    AssembledDocument { sheets }
}

/// Serialisable summary of an assembled document.
#[derive(Debug, Clone, Serialize)]
pub struct PageManifest {
    pub title: String,
    pub page_count: usize,
    pub pages: Vec<PageEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PageEntry {
    pub index: usize,
    pub section: usize,
    pub new_page: bool,
    pub origin_mm: [f32; 2],
    pub width_mm: f32,
    pub height_mm: f32,
    #[serde(flatten)]
    pub body: EntryBody,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EntryBody {
    Content {
        top_level_nodes: usize,
        text_chars: usize,
        overflow: bool,
    },
    Raster {
        width_px: u32,
        height_px: u32,
        strip_height_px: u32,
        content_height_mm: f32,
    },
}

impl From<&Sheet> for PageEntry {
    fn from(sheet: &Sheet) -> Self {
        let body = match &sheet.body {
            SheetBody::Content { nodes, overflow } => EntryBody::Content {
                top_level_nodes: nodes.len(),
                text_chars: crate::dom::text_of(nodes).chars().count(),
                overflow: *overflow,
            },
            SheetBody::Raster {
                image,
                strip_height_px,
                px_per_mm,
            } => EntryBody::Raster {
                width_px: image.width(),
                height_px: image.height(),
                strip_height_px: *strip_height_px,
                content_height_mm: *strip_height_px as f32 / px_per_mm,
            },
        };
        PageEntry {
            index: sheet.index,
            section: sheet.section,
            new_page: sheet.new_page,
            origin_mm: [sheet.origin_mm.0, sheet.origin_mm.1],
            width_mm: sheet.geometry.paper_width_mm,
            height_mm: sheet.geometry.paper_height_mm,
            body,
        }
    }
}

impl PageManifest {
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::slice_surface;

    fn page(index: usize, text: &str) -> Page {
        Page {
            index,
            section: index,
            geometry: PageGeometry::a4(),
            nodes: vec![ContentNode::text(text)],
            overflow: false,
        }
    }

    #[test]
    fn only_first_sheet_skips_page_advance() {
        let doc = assemble_pages(vec![page(0, "a"), page(1, "b"), page(2, "c")]);
        let advances: Vec<bool> = doc.sheets.iter().map(|s| s.new_page).collect();
        assert_eq!(advances, [false, true, true]);
        assert_eq!(doc.sheets[0].origin_mm, (25.4, 25.4));
    }

    #[test]
    fn raster_sheets_sit_at_origin() {
        let surface = RgbaImage::new(10, 30);
        let pages = slice_surface(&surface, &PageGeometry::a4(), 1.0);
        let doc = assemble_raster(pages);
        assert_eq!(doc.len(), 1);
        assert_eq!(doc.sheets[0].origin_mm, (0.0, 0.0));
        assert!(!doc.sheets[0].new_page);
    }

    #[test]
    fn manifest_serialises_pages() {
        let doc = assemble_pages(vec![page(0, "héllo")]);
        let json = doc.manifest("Report").to_json();
        let v: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["title"], "Report");
        assert_eq!(v["page_count"], 1);
        assert_eq!(v["pages"][0]["kind"], "content");
        assert_eq!(v["pages"][0]["text_chars"], 5);
        assert_eq!(v["pages"][0]["new_page"], false);
    }

    #[test]
    fn empty_input_assembles_nothing() {
        assert!(assemble_pages(Vec::new()).is_empty());
    }
}
