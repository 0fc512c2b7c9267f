//! Annotation records placed on template attachments
//!
//! Each annotation is positioned independently through the fractional
//! coordinate model and carries either a single line of text or a small
//! raster image.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::coords::Position;
use crate::metrics::StandardFont;

pub const DEFAULT_TEXT: &str = "New text";
pub const DEFAULT_FONT_SIZE: u32 = 12;
pub const MIN_FONT_SIZE: u32 = 6;
pub const MAX_FONT_SIZE: u32 = 96;
pub const DEFAULT_COLOR: &str = "#000000";

pub type AnnotationId = String;

/// RGB color with components in the 0-1 range
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb {
        r: 0.0,
        g: 0.0,
        b: 0.0,
    };
    pub const WHITE: Rgb = Rgb {
        r: 1.0,
        g: 1.0,
        b: 1.0,
    };

    /// Parse "#RRGGBB" or "RRGGBB"
    pub fn from_hex(color: &str) -> Option<Rgb> {
        let hex = color.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16)
                .ok()
                .map(|v| v as f32 / 255.0)
        };
        Some(Rgb {
            r: channel(0..2)?,
            g: channel(2..4)?,
            b: channel(4..6)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextStyle {
    pub font_size: u32,
    /// CSS-style family name, mapped onto the PDF standard fonts at export
    #[serde(default)]
    pub font_family: Option<String>,
    #[serde(default = "default_color")]
    pub font_color: String,
}

fn default_color() -> String {
    DEFAULT_COLOR.to_string()
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_size: DEFAULT_FONT_SIZE,
            font_family: None,
            font_color: default_color(),
        }
    }
}

impl TextStyle {
    pub fn clamp_font_size(size: u32) -> u32 {
        size.clamp(MIN_FONT_SIZE, MAX_FONT_SIZE)
    }

    pub fn standard_font(&self) -> StandardFont {
        match &self.font_family {
            Some(name) => StandardFont::from_family(name),
            None => StandardFont::Helvetica,
        }
    }

    /// Text color, falling back to black for malformed values
    pub fn color(&self) -> Rgb {
        Rgb::from_hex(&self.font_color).unwrap_or(Rgb::BLACK)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum AnnotationContent {
    Text {
        text: String,
    },
    /// Base64-encoded PNG drawn at `width` x `height` points
    Image {
        data: String,
        width: f64,
        height: f64,
    },
}

/// Stored annotations are normalized on load: fractions clamped to [0, 1]
/// and font size to the supported range.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(from = "StoredAnnotation")]
pub struct Annotation {
    pub id: AnnotationId,
    pub page_index: u32,
    pub x_fraction: f64,
    pub y_fraction: f64,
    pub content: AnnotationContent,
    #[serde(default)]
    pub style: TextStyle,
}

#[derive(Deserialize)]
struct StoredAnnotation {
    id: AnnotationId,
    page_index: u32,
    x_fraction: f64,
    y_fraction: f64,
    content: AnnotationContent,
    #[serde(default)]
    style: TextStyle,
}

impl From<StoredAnnotation> for Annotation {
    fn from(stored: StoredAnnotation) -> Self {
        let position = Position::new(stored.page_index, stored.x_fraction, stored.y_fraction);
        let mut style = stored.style;
        style.font_size = TextStyle::clamp_font_size(style.font_size);
        Self {
            id: stored.id,
            page_index: position.page_index,
            x_fraction: position.x_fraction,
            y_fraction: position.y_fraction,
            content: stored.content,
            style,
        }
    }
}

impl Annotation {
    /// New text annotation with default content and style
    pub fn at(position: Position) -> Self {
        Self::text(position, DEFAULT_TEXT, TextStyle::default())
    }

    pub fn text(position: Position, text: impl Into<String>, style: TextStyle) -> Self {
        Self::with_content(
            position,
            AnnotationContent::Text { text: text.into() },
            style,
        )
    }

    pub fn image(position: Position, data: impl Into<String>, width: f64, height: f64) -> Self {
        Self::with_content(
            position,
            AnnotationContent::Image {
                data: data.into(),
                width,
                height,
            },
            TextStyle::default(),
        )
    }

    fn with_content(position: Position, content: AnnotationContent, mut style: TextStyle) -> Self {
        let position = Position::new(position.page_index, position.x_fraction, position.y_fraction);
        style.font_size = TextStyle::clamp_font_size(style.font_size);
        Self {
            id: Uuid::new_v4().to_string(),
            page_index: position.page_index,
            x_fraction: position.x_fraction,
            y_fraction: position.y_fraction,
            content,
            style,
        }
    }

    pub fn position(&self) -> Position {
        Position::new(self.page_index, self.x_fraction, self.y_fraction)
    }

    pub fn set_position(&mut self, position: Position) {
        let position = Position::new(position.page_index, position.x_fraction, position.y_fraction);
        self.page_index = position.page_index;
        self.x_fraction = position.x_fraction;
        self.y_fraction = position.y_fraction;
    }

    /// Text content, if this is a text annotation
    pub fn text_content(&self) -> Option<&str> {
        match &self.content {
            AnnotationContent::Text { text } => Some(text),
            AnnotationContent::Image { .. } => None,
        }
    }

    /// Label shown on the overlay marker
    pub fn label(&self) -> &str {
        match &self.content {
            AnnotationContent::Text { text } => text,
            AnnotationContent::Image { .. } => "[image]",
        }
    }
}
