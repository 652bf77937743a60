//! Font metrics and word wrapping.
//!
//! Real TTF/OTF faces are measured with `ttf-parser`. Without one, a
//! Helvetica-like heuristic keeps measurement deterministic (0.5 em average
//! advance, 0.55 em for bold).

use std::collections::HashMap;

use crate::style::{ComputedStyle, FontStyle, FontWeight};

/// A loaded font face with metrics. `bytes` is empty for heuristic faces.
#[derive(Clone)]
pub struct FontData {
    pub bytes: Vec<u8>,
    pub units_per_em: f32,
    pub ascender: f32,
    pub descender: f32,
}

impl FontData {
    fn heuristic() -> Self {
        HEURISTIC.clone()
    }

    pub fn is_heuristic(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Parse the face on demand; ttf-parser borrows the bytes.
    pub fn face(&self) -> Option<ttf_parser::Face<'_>> {
        if self.bytes.is_empty() {
            return None;
        }
        ttf_parser::Face::parse(&self.bytes, 0).ok()
    }
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct FontKey {
    pub family: String,
    pub bold: bool,
    pub italic: bool,
}

impl FontKey {
    pub fn for_style(style: &ComputedStyle) -> Self {
        Self {
            family: style.font_family.clone(),
            bold: style.font_weight == FontWeight::Bold,
            italic: style.font_style == FontStyle::Italic,
        }
    }
}

/// Registry of font faces keyed by family and variant.
pub struct FontManager {
    fonts: HashMap<FontKey, FontData>,
    default_key: FontKey,
}

impl FontManager {
    /// A manager holding only the heuristic Helvetica faces.
    pub fn new() -> Self {
        let default_key = FontKey {
            family: "Helvetica".to_string(),
            bold: false,
            italic: false,
        };
        let mut fonts = HashMap::new();
        for (bold, italic) in [(false, false), (true, false), (false, true), (true, true)] {
            fonts.insert(
                FontKey {
                    bold,
                    italic,
                    ..default_key.clone()
                },
                FontData::heuristic(),
            );
        }
        Self { fonts, default_key }
    }

    /// Load a TTF/OTF face from bytes. The first real face loaded becomes the
    /// fallback for unknown families.
    pub fn load_font(
        &mut self,
        family: &str,
        bold: bool,
        italic: bool,
        bytes: Vec<u8>,
    ) -> Result<(), String> {
        let (units_per_em, ascender, descender) = {
            let face = ttf_parser::Face::parse(&bytes, 0)
                .map_err(|e| format!("Failed to parse font: {e}"))?;
            (
                face.units_per_em() as f32,
                face.ascender() as f32,
                face.descender() as f32,
            )
        };
        let key = FontKey {
            family: family.to_string(),
            bold,
            italic,
        };
        if !self.has_real_fonts() {
            self.default_key = key.clone();
        }
        log::debug!("Loaded font {family} (bold={bold}, italic={italic})");
        self.fonts.insert(
            key,
            FontData {
                bytes,
                units_per_em,
                ascender,
                descender,
            },
        );
        Ok(())
    }

    /// Font data for a key. Falls back to the same variant of the default
    /// family, then to the default face itself.
    pub fn get(&self, key: &FontKey) -> &FontData {
        self.fonts
            .get(key)
            .or_else(|| {
                self.fonts.get(&FontKey {
                    family: self.default_key.family.clone(),
                    ..key.clone()
                })
            })
            .or_else(|| self.fonts.get(&self.default_key))
            .unwrap_or(&HEURISTIC)
    }

    /// Width of `text` in px at `font_size`.
    pub fn measure_text_width(&self, text: &str, font_size: f32, key: &FontKey) -> f32 {
        let data = self.get(key);
        match data.face() {
            Some(face) => {
                let scale = font_size / data.units_per_em;
                text.chars()
                    .map(|ch| {
                        face.glyph_index(ch)
                            .and_then(|gid| face.glyph_hor_advance(gid))
                            .map(|adv| adv as f32 * scale)
                            .unwrap_or(font_size * 0.5)
                    })
                    .sum()
            }
            None => {
                let avg = if key.bold { 0.55 } else { 0.5 };
                text.chars().count() as f32 * font_size * avg
            }
        }
    }

    pub fn line_height_px(&self, font_size: f32, line_height_factor: f32) -> f32 {
        font_size * line_height_factor
    }

    /// Distance from the top of a line box to the baseline, in px.
    pub fn ascender_px(&self, font_size: f32, key: &FontKey) -> f32 {
        let data = self.get(key);
        data.ascender * font_size / data.units_per_em
    }

    pub fn has_real_fonts(&self) -> bool {
        self.fonts.values().any(|d| !d.is_heuristic())
    }
}

static HEURISTIC: FontData = FontData {
    bytes: Vec::new(),
    units_per_em: 1000.0,
    ascender: 750.0,
    descender: -250.0,
};

impl Default for FontManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Word-wrap text to fit within `max_width` pixels. Returns a vec of lines.
///
/// Existing newlines are hard breaks. A single word wider than the line is
/// left on its own line.
pub fn wrap_text(
    text: &str,
    font_size: f32,
    key: &FontKey,
    max_width: f32,
    fonts: &FontManager,
) -> Vec<String> {
    if text.is_empty() {
        return vec![String::new()];
    }
    if max_width <= 0.0 {
        return text.split('\n').map(str::to_string).collect();
    }

    let mut lines: Vec<String> = Vec::new();
    for paragraph in text.split('\n') {
        let words: Vec<&str> = paragraph.split_whitespace().collect();
        if words.is_empty() {
            lines.push(String::new());
            continue;
        }

        let mut current_line = String::new();
        for word in &words {
            let candidate = if current_line.is_empty() {
                word.to_string()
            } else {
                format!("{current_line} {word}")
            };
            let w = fonts.measure_text_width(&candidate, font_size, key);
            if w > max_width && !current_line.is_empty() {
                lines.push(std::mem::replace(&mut current_line, word.to_string()));
            } else {
                current_line = candidate;
            }
        }
        if !current_line.is_empty() {
            lines.push(current_line);
        }
    }

    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}
