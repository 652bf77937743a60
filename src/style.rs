//! Style resolver – maps per-tag defaults, a handful of utility classes, and
//! the inline CSS subset to a flat [`ComputedStyle`] consumed by the flow
//! layout. All lengths are CSS pixels.

use crate::dom::{ElementNode, Tag};
use crate::units::{self, CSS_PX_PER_MM};

/// Fully resolved style for a single element.
#[derive(Debug, Clone)]
pub struct ComputedStyle {
    pub display: Display,

    // Sizing
    pub width: Dimension,
    pub height: Dimension,

    // Spacing (px)
    pub margin_top: f32,
    pub margin_right: f32,
    pub margin_bottom: f32,
    pub margin_left: f32,
    pub padding_top: f32,
    pub padding_right: f32,
    pub padding_bottom: f32,
    pub padding_left: f32,

    // Border
    pub border_width: f32,
    pub border_color: Color,

    // Typography
    pub font_size: f32,
    pub font_weight: FontWeight,
    pub font_style: FontStyle,
    pub font_family: String,
    pub color: Color,
    pub text_align: TextAlign,
    pub line_height: f32,
    pub text_decoration: TextDecoration,
    /// Preserve line breaks and runs of spaces (`<pre>`).
    pub preformatted: bool,

    pub background_color: Color,
}

impl Default for ComputedStyle {
    fn default() -> Self {
        Self {
            display: Display::Block,
            width: Dimension::Auto,
            height: Dimension::Auto,
            margin_top: 0.0,
            margin_right: 0.0,
            margin_bottom: 0.0,
            margin_left: 0.0,
            padding_top: 0.0,
            padding_right: 0.0,
            padding_bottom: 0.0,
            padding_left: 0.0,
            border_width: 0.0,
            border_color: Color::BLACK,
            font_size: 16.0,
            font_weight: FontWeight::Normal,
            font_style: FontStyle::Normal,
            font_family: "Helvetica".to_string(),
            color: Color::BLACK,
            text_align: TextAlign::Left,
            line_height: 1.4,
            text_decoration: TextDecoration::None,
            preformatted: false,
            background_color: Color::TRANSPARENT,
        }
    }
}

// ---------------------------------------------------------------------------
// Supporting enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Display {
    Block,
    Inline,
    ListItem,
    TableRow,
    TableCell,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontWeight {
    Normal,
    Bold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontStyle {
    Normal,
    Italic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextDecoration {
    None,
    Underline,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Dimension {
    Auto,
    Px(f32),
    Percent(f32),
}

impl Dimension {
    /// Resolve against the containing block's width.
    pub fn resolve(self, container: f32) -> Option<f32> {
        match self {
            Dimension::Auto => None,
            Dimension::Px(v) => Some(v),
            Dimension::Percent(p) => Some(container * p / 100.0),
        }
    }
}

/// RGBA colour (0.0 – 1.0).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const BLACK: Self = Self::rgb(0.0, 0.0, 0.0);
    pub const WHITE: Self = Self::rgb(1.0, 1.0, 1.0);
    pub const TRANSPARENT: Self = Self {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 0.0,
    };

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub fn is_transparent(&self) -> bool {
        self.a < 0.001
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim().trim_start_matches('#');
        if !hex.is_ascii() {
            return None;
        }
        let channel = |s: &str| u8::from_str_radix(s, 16).ok().map(|v| v as f32 / 255.0);
        match hex.len() {
            6 => Some(Self::rgb(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
            )),
            3 => Some(Self::rgb(
                channel(&hex[0..1].repeat(2))?,
                channel(&hex[1..2].repeat(2))?,
                channel(&hex[2..3].repeat(2))?,
            )),
            _ => None,
        }
    }

    pub fn to_rgba8(self) -> [u8; 4] {
        let q = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        [q(self.r), q(self.g), q(self.b), q(self.a)]
    }
}

// ---------------------------------------------------------------------------
// Style resolution
// ---------------------------------------------------------------------------

/// Resolve the style for an element, inheriting text properties from its parent.
pub fn resolve_style(element: &ElementNode, parent: Option<&ComputedStyle>) -> ComputedStyle {
    let mut style = base_style_for_tag(&element.tag);

    if let Some(p) = parent {
        inherit_text(&mut style, p, &element.tag);
    }

    for class in element.classes() {
        apply_utility_class(&mut style, class);
    }

    if let Some(inline) = element.inline_style() {
        apply_inline_style(&mut style, inline);
    }

    style
}

/// Style for a bare text run inside `parent`: inherited typography, no box.
pub fn text_style(parent: &ComputedStyle) -> ComputedStyle {
    ComputedStyle {
        display: Display::Inline,
        font_size: parent.font_size,
        font_weight: parent.font_weight,
        font_style: parent.font_style,
        font_family: parent.font_family.clone(),
        color: parent.color,
        text_align: parent.text_align,
        line_height: parent.line_height,
        text_decoration: parent.text_decoration,
        preformatted: parent.preformatted,
        ..ComputedStyle::default()
    }
}

fn inherit_text(style: &mut ComputedStyle, parent: &ComputedStyle, tag: &Tag) {
    // Headings keep their own size and weight.
    let own_size = matches!(tag, Tag::H1 | Tag::H2 | Tag::H3 | Tag::H4 | Tag::H5 | Tag::H6);
    if !own_size {
        style.font_size = if *tag == Tag::Code || *tag == Tag::Pre {
            parent.font_size * 0.9
        } else {
            parent.font_size
        };
        if style.font_weight == FontWeight::Normal {
            style.font_weight = parent.font_weight;
        }
    }
    if style.font_style == FontStyle::Normal {
        style.font_style = parent.font_style;
    }
    if style.text_decoration == TextDecoration::None {
        style.text_decoration = parent.text_decoration;
    }
    style.font_family = parent.font_family.clone();
    style.color = parent.color;
    style.text_align = parent.text_align;
    style.line_height = parent.line_height;
    style.preformatted |= parent.preformatted;
}

/// Default styles based on tag semantics.
fn base_style_for_tag(tag: &Tag) -> ComputedStyle {
    let mut s = ComputedStyle::default();
    let heading = |s: &mut ComputedStyle, size: f32, margin: f32| {
        s.font_size = size;
        s.font_weight = FontWeight::Bold;
        s.margin_top = margin;
        s.margin_bottom = margin * 0.75;
        s.line_height = 1.2;
    };
    match tag {
        Tag::H1 => heading(&mut s, 32.0, 16.0),
        Tag::H2 => heading(&mut s, 24.0, 14.0),
        Tag::H3 => heading(&mut s, 20.0, 12.0),
        Tag::H4 => heading(&mut s, 18.0, 10.0),
        Tag::H5 => heading(&mut s, 16.0, 10.0),
        Tag::H6 => heading(&mut s, 14.0, 10.0),
        Tag::P => {
            s.margin_bottom = 10.0;
        }
        Tag::Ul | Tag::Ol => {
            s.margin_bottom = 10.0;
            s.padding_left = 24.0;
        }
        Tag::Li => {
            s.display = Display::ListItem;
            s.margin_bottom = 4.0;
        }
        Tag::Blockquote => {
            s.margin_left = 24.0;
            s.margin_bottom = 10.0;
            s.font_style = FontStyle::Italic;
        }
        Tag::Table => {
            s.border_width = 1.0;
            s.margin_bottom = 10.0;
        }
        Tag::Tr => {
            s.display = Display::TableRow;
        }
        Tag::Td | Tag::Th => {
            s.display = Display::TableCell;
            s.padding_top = 4.0;
            s.padding_right = 8.0;
            s.padding_bottom = 4.0;
            s.padding_left = 8.0;
            s.border_width = 1.0;
            if *tag == Tag::Th {
                s.font_weight = FontWeight::Bold;
                s.background_color = Color::rgb(0.93, 0.93, 0.93);
            }
        }
        Tag::Pre => {
            s.preformatted = true;
            s.padding_top = 6.0;
            s.padding_bottom = 6.0;
            s.padding_left = 8.0;
            s.padding_right = 8.0;
            s.margin_bottom = 10.0;
            s.background_color = Color::rgb(0.96, 0.96, 0.96);
        }
        Tag::Hr => {
            s.height = Dimension::Px(1.0);
            s.margin_top = 8.0;
            s.margin_bottom = 8.0;
            s.background_color = Color::rgb(0.6, 0.6, 0.6);
        }
        Tag::Strong => {
            s.display = Display::Inline;
            s.font_weight = FontWeight::Bold;
        }
        Tag::Em => {
            s.display = Display::Inline;
            s.font_style = FontStyle::Italic;
        }
        Tag::Underline | Tag::Anchor => {
            s.display = Display::Inline;
            s.text_decoration = TextDecoration::Underline;
        }
        Tag::Span | Tag::Code | Tag::Br => {
            s.display = Display::Inline;
        }
        Tag::Head | Tag::Break => {
            s.display = Display::None;
        }
        Tag::Img
        | Tag::Div
        | Tag::Thead
        | Tag::Tbody
        | Tag::Body
        | Tag::Html
        | Tag::Unknown(_) => {}
    }
    s
}

/// Apply a single utility class.
fn apply_utility_class(s: &mut ComputedStyle, class: &str) {
    match class {
        "hidden" => s.display = Display::None,
        "font-bold" => s.font_weight = FontWeight::Bold,
        "font-normal" => s.font_weight = FontWeight::Normal,
        "italic" => s.font_style = FontStyle::Italic,
        "underline" => s.text_decoration = TextDecoration::Underline,
        "text-left" => s.text_align = TextAlign::Left,
        "text-center" => s.text_align = TextAlign::Center,
        "text-right" => s.text_align = TextAlign::Right,
        "text-sm" => s.font_size = 14.0,
        "text-lg" => s.font_size = 18.0,
        "text-xl" => s.font_size = 20.0,
        "text-2xl" => s.font_size = 24.0,
        "w-full" => s.width = Dimension::Percent(100.0),
        _ => {}
    }
}

fn apply_inline_style(s: &mut ComputedStyle, style_str: &str) {
    for decl in style_str.split(';') {
        let Some((prop, val)) = decl.split_once(':') else {
            continue;
        };
        apply_css_property(s, &prop.trim().to_ascii_lowercase(), val.trim());
    }
}

fn apply_css_property(s: &mut ComputedStyle, prop: &str, val: &str) {
    let font_size = s.font_size;
    let px = |v: &str| parse_css_px(v, font_size);
    match prop {
        "display" => {
            s.display = match val {
                "block" | "flex" | "grid" => Display::Block,
                "inline" | "inline-block" => Display::Inline,
                "none" => Display::None,
                _ => s.display,
            }
        }
        "font-size" => {
            if let Some(v) = px(val) {
                s.font_size = v;
            }
        }
        "font-weight" => {
            s.font_weight = match val {
                "bold" | "bolder" | "600" | "700" | "800" | "900" => FontWeight::Bold,
                _ => FontWeight::Normal,
            }
        }
        "font-style" => {
            s.font_style = match val {
                "italic" | "oblique" => FontStyle::Italic,
                _ => FontStyle::Normal,
            }
        }
        "font-family" => {
            if let Some(first) = val.split(',').next() {
                s.font_family = first.trim().trim_matches(|c| c == '"' || c == '\'').to_string();
            }
        }
        "text-decoration" => {
            s.text_decoration = if val.contains("underline") {
                TextDecoration::Underline
            } else {
                TextDecoration::None
            }
        }
        "color" => {
            if let Some(c) = Color::from_hex(val) {
                s.color = c;
            }
        }
        "background-color" | "background" => {
            if let Some(c) = Color::from_hex(val) {
                s.background_color = c;
            }
        }
        "text-align" => {
            s.text_align = match val {
                "center" => TextAlign::Center,
                "right" => TextAlign::Right,
                _ => TextAlign::Left,
            }
        }
        "width" => s.width = parse_dimension(val, font_size),
        "height" => s.height = parse_dimension(val, font_size),
        "margin" => apply_shorthand_spacing(
            val,
            font_size,
            [
                &mut s.margin_top,
                &mut s.margin_right,
                &mut s.margin_bottom,
                &mut s.margin_left,
            ],
        ),
        "margin-top" => set_px(&mut s.margin_top, px(val)),
        "margin-right" => set_px(&mut s.margin_right, px(val)),
        "margin-bottom" => set_px(&mut s.margin_bottom, px(val)),
        "margin-left" => set_px(&mut s.margin_left, px(val)),
        "padding" => apply_shorthand_spacing(
            val,
            font_size,
            [
                &mut s.padding_top,
                &mut s.padding_right,
                &mut s.padding_bottom,
                &mut s.padding_left,
            ],
        ),
        "padding-top" => set_px(&mut s.padding_top, px(val)),
        "padding-right" => set_px(&mut s.padding_right, px(val)),
        "padding-bottom" => set_px(&mut s.padding_bottom, px(val)),
        "padding-left" => set_px(&mut s.padding_left, px(val)),
        "border-width" => set_px(&mut s.border_width, px(val)),
        "border" => {
            // `1px solid #333`
            for part in val.split_whitespace() {
                if let Some(w) = px(part) {
                    s.border_width = w;
                } else if let Some(c) = Color::from_hex(part) {
                    s.border_color = c;
                }
            }
        }
        "border-color" => {
            if let Some(c) = Color::from_hex(val) {
                s.border_color = c;
            }
        }
        "line-height" => {
            if let Ok(v) = val.parse::<f32>() {
                s.line_height = v;
            } else if let Some(v) = px(val) {
                if s.font_size > 0.0 {
                    s.line_height = v / s.font_size;
                }
            }
        }
        _ => {}
    }
}

fn set_px(target: &mut f32, value: Option<f32>) {
    if let Some(v) = value {
        *target = v;
    }
}

/// Parse a CSS length into pixels. Physical units use the CSS reference
/// density; `em` is relative to `font_size`.
pub fn parse_css_px(s: &str, font_size: f32) -> Option<f32> {
    let s = s.trim().to_ascii_lowercase();
    let (num, scale) = if let Some(n) = s.strip_suffix("px") {
        (n, 1.0)
    } else if let Some(n) = s.strip_suffix("pt") {
        (n, 96.0 / 72.0)
    } else if let Some(n) = s.strip_suffix("em") {
        (n, font_size)
    } else if let Some(n) = s.strip_suffix("mm") {
        (n, CSS_PX_PER_MM)
    } else if let Some(n) = s.strip_suffix("cm") {
        (n, units::MM_PER_CM * CSS_PX_PER_MM)
    } else if let Some(n) = s.strip_suffix("in") {
        (n, 96.0)
    } else {
        (s.as_str(), 1.0)
    };
    let v: f32 = num.trim().parse().ok()?;
    let v = v * scale;
    v.is_finite().then_some(v)
}

fn parse_dimension(s: &str, font_size: f32) -> Dimension {
    let s = s.trim();
    if s == "auto" {
        Dimension::Auto
    } else if let Some(p) = s.strip_suffix('%') {
        p.trim()
            .parse::<f32>()
            .map(Dimension::Percent)
            .unwrap_or(Dimension::Auto)
    } else {
        parse_css_px(s, font_size)
            .map(Dimension::Px)
            .unwrap_or(Dimension::Auto)
    }
}

fn apply_shorthand_spacing(val: &str, font_size: f32, sides: [&mut f32; 4]) {
    let parts: Vec<f32> = val
        .split_whitespace()
        .filter_map(|p| parse_css_px(p, font_size))
        .collect();
    let [top, right, bottom, left] = sides;
    let (t, r, b, l) = match parts.as_slice() {
        [a] => (*a, *a, *a, *a),
        [v, h] => (*v, *h, *v, *h),
        [t, h, b] => (*t, *h, *b, *h),
        [t, r, b, l] => (*t, *r, *b, *l),
        _ => return,
    };
    *top = t;
    *right = r;
    *bottom = b;
    *left = l;
}
