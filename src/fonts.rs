use std::collections::HashMap;
use std::sync::Arc;

use egui::text::Galley;
use egui::{Color32, Context, FontDefinitions, FontFamily, FontId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Weight {
    Normal,
    Bold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slant {
    Roman,
    Italic,
}

/// A font resolved from computed style, ready to be turned into an egui
/// `FontId` against the families installed by [`install`].
#[derive(Debug, Clone, PartialEq)]
pub struct FontSpec {
    pub weight: Weight,
    pub slant: Slant,
    pub size: f32,
    pub mono: bool,
}

impl FontSpec {
    pub fn from_style(style: &HashMap<String, String>, mono: bool) -> FontSpec {
        let weight = parse_font_weight(style.get("font-weight").map(String::as_str).unwrap_or(""));
        let slant = if style.get("font-style").map(String::as_str) == Some("italic") {
            Slant::Italic
        } else {
            Slant::Roman
        };
        let size = parse_font_size(style.get("font-size").map(String::as_str).unwrap_or("16px"));
        FontSpec { weight, slant, size, mono }
    }

    pub fn font_id(&self) -> FontId {
        let family = if self.mono {
            FontFamily::Monospace
        } else {
            let name = match (self.weight, self.slant) {
                (Weight::Normal, Slant::Roman) => "sans",
                (Weight::Bold, Slant::Roman) => "sansbold",
                (Weight::Normal, Slant::Italic) => "sansitalic",
                (Weight::Bold, Slant::Italic) => "sansbolditalic",
            };
            FontFamily::Name(Arc::from(name))
        };
        FontId::new(self.size.max(1.0), family)
    }
}

/// Registers the named weight/slant families the layout engine asks for.
/// No variant faces are bundled, so each name maps onto the default
/// proportional stack.
pub fn install(ctx: &Context) {
    let mut fonts = FontDefinitions::default();
    let stack = fonts
        .families
        .get(&FontFamily::Proportional)
        .cloned()
        .unwrap_or_default();
    for name in ["sans", "sansbold", "sansitalic", "sansbolditalic"] {
        fonts.families.insert(FontFamily::Name(Arc::from(name)), stack.clone());
    }
    ctx.set_fonts(fonts);
}

/// Lays out a single run with no wrapping; the color placeholder is
/// substituted at paint time.
pub fn layout_text(ctx: &Context, text: &str, font_id: &FontId) -> Arc<Galley> {
    ctx.fonts_mut(|fonts| {
        fonts.layout_no_wrap(text.to_string(), font_id.clone(), Color32::PLACEHOLDER)
    })
}

pub fn measure(ctx: &Context, text: &str, font_id: &FontId) -> f32 {
    layout_text(ctx, text, font_id).size().x
}

/// Ascent and descent of a laid-out run, taken from its first glyph. An
/// empty galley falls back to a split of the galley height.
pub fn galley_metrics(galley: &Galley) -> (f32, f32) {
    if let Some(glyph) = galley.rows.first().and_then(|row| row.row.glyphs.first()) {
        (glyph.font_ascent, glyph.font_height - glyph.font_ascent)
    } else {
        let height = galley.size().y;
        (height * 0.8, height * 0.2)
    }
}

pub fn linespace(galley: &Galley) -> f32 {
    galley.size().y
}

/// Maps a CSS `font-weight` keyword or numeric value onto the two weights
/// the font stack carries.
pub fn parse_font_weight(weight: &str) -> Weight {
    match weight {
        "bold" | "bolder" | "600" | "700" | "800" | "900" => Weight::Bold,
        _ => Weight::Normal,
    }
}

/// Parses a CSS font size into surface points: `px` values scale by 0.75,
/// `em`/`rem` resolve against a 16px base, `pt` passes through.
pub fn parse_font_size(size: &str) -> f32 {
    let size = size.trim();
    let (digits, unit) = match size.find(|c: char| !c.is_ascii_digit() && c != '.') {
        Some(split) => size.split_at(split),
        None => (size, "px"),
    };
    let Ok(value) = digits.parse::<f32>() else {
        return 12.0;
    };
    match unit {
        "px" => value * 0.75,
        "em" | "rem" => value * 16.0 * 0.75,
        "pt" => value,
        _ => 12.0,
    }
}
