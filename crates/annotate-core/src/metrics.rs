//! Standard-14 font selection and glyph metrics
//!
//! Annotations are drawn with the PDF base fonts so nothing has to be
//! embedded as a font program. Widths come from the Adobe AFM files for the
//! printable ASCII range; the upper WinAnsi half uses a per-font average.

use serde::{Deserialize, Serialize};

use crate::error::AnnotationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StandardFont {
    Helvetica,
    HelveticaBold,
    TimesRoman,
    Courier,
}

#[rustfmt::skip]
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556,
    278, 278, 584, 584, 584, 556, 1015,
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833,
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611,
    278, 278, 278, 469, 556, 333,
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833,
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500,
    334, 260, 334, 584,
];

#[rustfmt::skip]
const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556,
    333, 333, 584, 584, 584, 611, 975,
    722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833,
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611,
    333, 278, 333, 584, 556, 333,
    556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889,
    611, 611, 611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500,
    389, 280, 389, 584,
];

#[rustfmt::skip]
const TIMES_ROMAN_WIDTHS: [u16; 95] = [
    250, 333, 408, 500, 500, 833, 778, 180, 333, 333, 500, 564, 250, 333, 250, 278,
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500,
    278, 278, 564, 564, 564, 444, 921,
    722, 667, 667, 722, 611, 556, 722, 722, 333, 389, 722, 611, 889,
    722, 722, 556, 722, 667, 556, 611, 722, 722, 944, 722, 722, 611,
    333, 278, 333, 469, 500, 333,
    444, 500, 444, 500, 444, 333, 500, 500, 278, 278, 500, 278, 778,
    500, 500, 500, 500, 333, 389, 278, 500, 500, 722, 500, 500, 444,
    480, 200, 480, 541,
];

/// WinAnsi code points in 0x80..=0x9F that differ from Latin-1
const WIN_ANSI_HIGH: [(char, u8); 27] = [
    ('\u{20AC}', 0x80),
    ('\u{201A}', 0x82),
    ('\u{0192}', 0x83),
    ('\u{201E}', 0x84),
    ('\u{2026}', 0x85),
    ('\u{2020}', 0x86),
    ('\u{2021}', 0x87),
    ('\u{02C6}', 0x88),
    ('\u{2030}', 0x89),
    ('\u{0160}', 0x8A),
    ('\u{2039}', 0x8B),
    ('\u{0152}', 0x8C),
    ('\u{017D}', 0x8E),
    ('\u{2018}', 0x91),
    ('\u{2019}', 0x92),
    ('\u{201C}', 0x93),
    ('\u{201D}', 0x94),
    ('\u{2022}', 0x95),
    ('\u{2013}', 0x96),
    ('\u{2014}', 0x97),
    ('\u{02DC}', 0x98),
    ('\u{2122}', 0x99),
    ('\u{0161}', 0x9A),
    ('\u{203A}', 0x9B),
    ('\u{0153}', 0x9C),
    ('\u{017E}', 0x9E),
    ('\u{0178}', 0x9F),
];

impl StandardFont {
    /// Map a CSS-like family name onto a base font.
    /// Unknown names fall back to Helvetica.
    pub fn from_family(name: &str) -> Self {
        let lower = name.to_lowercase();

        match lower.as_str() {
            "serif" => return StandardFont::TimesRoman,
            "sans-serif" | "cursive" | "fantasy" => return StandardFont::Helvetica,
            "monospace" => return StandardFont::Courier,
            _ => {}
        }

        if lower.contains("times") || lower.contains("georgia") || lower.contains("garamond") {
            return StandardFont::TimesRoman;
        }

        if lower.contains("courier")
            || lower.contains("mono")
            || lower.contains("consolas")
            || lower.contains("monaco")
        {
            return StandardFont::Courier;
        }

        if lower.contains("bold") {
            return StandardFont::HelveticaBold;
        }

        StandardFont::Helvetica
    }

    /// PostScript name written as the font's /BaseFont
    pub fn base_font(&self) -> &'static str {
        match self {
            StandardFont::Helvetica => "Helvetica",
            StandardFont::HelveticaBold => "Helvetica-Bold",
            StandardFont::TimesRoman => "Times-Roman",
            StandardFont::Courier => "Courier",
        }
    }

    /// Glyph width in 1/1000 em for a WinAnsi byte
    pub fn glyph_width(&self, code: u8) -> u16 {
        let table = match self {
            StandardFont::Courier => return 600,
            StandardFont::Helvetica => &HELVETICA_WIDTHS,
            StandardFont::HelveticaBold => &HELVETICA_BOLD_WIDTHS,
            StandardFont::TimesRoman => &TIMES_ROMAN_WIDTHS,
        };
        match code {
            32..=126 => table[(code - 32) as usize],
            // no-break space renders like a space
            0xA0 => table[0],
            _ => match self {
                StandardFont::Helvetica => 556,
                StandardFont::HelveticaBold => 611,
                StandardFont::TimesRoman => 500,
                StandardFont::Courier => 600,
            },
        }
    }

    /// Rendered width of `text` in points
    pub fn text_width(&self, text: &str, font_size: f64) -> Result<f64, AnnotationError> {
        if !(font_size.is_finite() && font_size > 0.0) {
            return Err(AnnotationError::AnnotationDraw(format!(
                "invalid font size {}",
                font_size
            )));
        }
        let encoded = encode_win_ansi(text)?;
        let units: u32 = encoded.iter().map(|&b| self.glyph_width(b) as u32).sum();
        Ok(units as f64 * font_size / 1000.0)
    }
}

/// Encode text for a simple font with /WinAnsiEncoding.
///
/// Fails on characters the base fonts have no glyph for, including control
/// characters, since annotations are single-line.
pub fn encode_win_ansi(text: &str) -> Result<Vec<u8>, AnnotationError> {
    text.chars()
        .map(|c| match c {
            ' '..='~' => Ok(c as u8),
            '\u{A0}'..='\u{FF}' => Ok(c as u32 as u8),
            _ => WIN_ANSI_HIGH
                .iter()
                .find(|(ch, _)| *ch == c)
                .map(|(_, code)| *code)
                .ok_or_else(|| {
                    AnnotationError::AnnotationDraw(format!(
                        "character {:?} has no glyph in the standard fonts",
                        c
                    ))
                }),
        })
        .collect()
}
