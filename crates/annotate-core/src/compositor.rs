//! Burn annotations into a copy of the source PDF
//!
//! The algorithm:
//! 1. Parse the source and create a new output document
//! 2. Copy every page, preserving order and dimensions
//! 3. Embed the default font once; other families are embedded on first use
//! 4. For each annotation, resolve its page and project its fractional
//!    position into PDF space (bottom-left origin)
//! 5. Draw an opaque background patch sized to the measured text, then the text
//! 6. Serialize
//!
//! Failures of a single annotation are recorded and skipped; only source
//! parsing and serialization abort the export.

use std::collections::HashMap;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::annotation::{Annotation, AnnotationContent, AnnotationId, Rgb, TextStyle};
use crate::backend::{DocumentBackend, TextRun};
use crate::coords::{PageBox, PdfRect};
use crate::error::{AnnotationError, ExportError};
use crate::metrics::StandardFont;

/// Share of the font size drawn below the baseline by the background patch
const DESCENT_FACTOR: f64 = 0.25;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// Fill behind each text annotation
    pub background_color: String,
    pub draw_background: bool,
    /// Padding around the measured text, in points
    pub padding: f64,
    /// Family used when an annotation does not name one
    pub default_font_family: Option<String>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            background_color: "#FFFFFF".to_string(),
            draw_background: true,
            padding: 2.0,
            default_font_family: None,
        }
    }
}

impl ExportOptions {
    fn default_font(&self) -> StandardFont {
        self.default_font_family
            .as_deref()
            .map(StandardFont::from_family)
            .unwrap_or(StandardFont::Helvetica)
    }

    fn background(&self) -> Rgb {
        Rgb::from_hex(&self.background_color).unwrap_or(Rgb::WHITE)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationFailure {
    pub id: AnnotationId,
    pub error: AnnotationError,
}

#[derive(Debug, Clone)]
pub struct Composition {
    pub bytes: Vec<u8>,
    pub page_count: u32,
    pub drawn: usize,
    pub failures: Vec<AnnotationFailure>,
}

impl Composition {
    pub fn skipped(&self) -> usize {
        self.failures.len()
    }

    pub fn total(&self) -> usize {
        self.drawn + self.failures.len()
    }

    /// "N of M annotations failed to render", or `None` when all were drawn
    pub fn summary(&self) -> Option<String> {
        if self.failures.is_empty() {
            None
        } else {
            Some(format!(
                "{} of {} annotations failed to render",
                self.skipped(),
                self.total()
            ))
        }
    }
}

pub struct Compositor<B: DocumentBackend> {
    backend: B,
    options: ExportOptions,
}

impl<B: DocumentBackend> Compositor<B> {
    pub fn new(backend: B) -> Self {
        Self::with_options(backend, ExportOptions::default())
    }

    pub fn with_options(backend: B, options: ExportOptions) -> Self {
        Self { backend, options }
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    /// Compose `annotations` onto a copy of `source`.
    ///
    /// The annotation slice is read once; callers pass a snapshot.
    pub fn compose(
        &self,
        source: &[u8],
        annotations: &[Annotation],
    ) -> Result<Composition, ExportError> {
        let parsed = self.backend.parse(source)?;
        let mut output = self.backend.create_output();
        let pages = self.backend.copy_pages(&parsed, &mut output)?;
        drop(parsed);

        let default_font = self.options.default_font();
        let mut fonts: HashMap<StandardFont, B::Font> = HashMap::new();
        fonts.insert(
            default_font,
            self.backend.embed_font(&mut output, default_font)?,
        );

        let mut drawn = 0;
        let mut failures = Vec::new();

        for annotation in annotations {
            match self.draw_annotation(&mut output, &pages, &mut fonts, annotation) {
                Ok(()) => drawn += 1,
                Err(error) => {
                    warn!("Skipping annotation {}: {}", annotation.id, error);
                    failures.push(AnnotationFailure {
                        id: annotation.id.clone(),
                        error,
                    });
                }
            }
        }

        let bytes = self.backend.serialize(output)?;

        let composition = Composition {
            bytes,
            page_count: pages.len() as u32,
            drawn,
            failures,
        };
        info!(
            "Composed {} pages with {} of {} annotations",
            composition.page_count,
            composition.drawn,
            composition.total()
        );
        Ok(composition)
    }

    fn draw_annotation(
        &self,
        output: &mut B::Output,
        pages: &[PageBox],
        fonts: &mut HashMap<StandardFont, B::Font>,
        annotation: &Annotation,
    ) -> Result<(), AnnotationError> {
        let page_count = pages.len() as u32;
        let page = pages.get(annotation.page_index as usize).ok_or(
            AnnotationError::PageIndexOutOfRange {
                page_index: annotation.page_index,
                page_count,
            },
        )?;
        let (x, y) = annotation.position().to_pdf(page);

        match &annotation.content {
            AnnotationContent::Text { text } => {
                let font = self.font_for(output, fonts, &annotation.style)?;
                self.draw_text(output, annotation.page_index, &font, text, &annotation.style, x, y)
            }
            AnnotationContent::Image {
                data,
                width,
                height,
            } => {
                let png = decode_image_data(data)?;
                // Images hang down from the clicked point
                let rect = PdfRect {
                    x,
                    y: y - height,
                    width: *width,
                    height: *height,
                };
                self.backend
                    .draw_image(output, annotation.page_index, &png, rect)
            }
        }
    }

    fn font_for(
        &self,
        output: &mut B::Output,
        fonts: &mut HashMap<StandardFont, B::Font>,
        style: &TextStyle,
    ) -> Result<B::Font, AnnotationError> {
        let family = match &style.font_family {
            Some(name) => StandardFont::from_family(name),
            None => self.options.default_font(),
        };
        if let Some(font) = fonts.get(&family) {
            return Ok(font.clone());
        }
        let font = self
            .backend
            .embed_font(output, family)
            .map_err(|e| AnnotationError::AnnotationDraw(e.to_string()))?;
        fonts.insert(family, font.clone());
        Ok(font)
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_text(
        &self,
        output: &mut B::Output,
        page_index: u32,
        font: &B::Font,
        text: &str,
        style: &TextStyle,
        x: f64,
        y: f64,
    ) -> Result<(), AnnotationError> {
        if text.trim().is_empty() {
            return Err(AnnotationError::AnnotationDraw("text is empty".into()));
        }
        let font_size = TextStyle::clamp_font_size(style.font_size) as f64;
        let width = self.backend.measure_text(font, text, font_size)?;
        if !(width.is_finite() && width > 0.0) {
            return Err(AnnotationError::AnnotationDraw(format!(
                "degenerate text width {}",
                width
            )));
        }

        if self.options.draw_background {
            let pad = self.options.padding.max(0.0);
            let rect = PdfRect {
                x: x - pad,
                y: y - font_size * DESCENT_FACTOR - pad,
                width: width + 2.0 * pad,
                height: font_size + 2.0 * pad,
            };
            self.backend
                .draw_rect(output, page_index, rect, self.options.background())?;
        }

        self.backend.draw_text(
            output,
            page_index,
            font,
            &TextRun {
                text,
                x,
                y,
                font_size,
                color: style.color(),
            },
        )
    }
}

/// Accepts raw base64 or a `data:image/png;base64,` URL
fn decode_image_data(data: &str) -> Result<Vec<u8>, AnnotationError> {
    let payload = match data.split_once(";base64,") {
        Some((_, rest)) => rest,
        None => data,
    };
    BASE64
        .decode(payload.trim())
        .map_err(|e| AnnotationError::AnnotationDraw(format!("invalid image data: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::Position;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;

    /// Records every backend call instead of producing a PDF
    #[derive(Default)]
    struct FakeBackend {
        pages: Vec<PageBox>,
        fail_parse: bool,
        zero_width: bool,
        embedded: RefCell<Vec<StandardFont>>,
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Rect(u32, PdfRect),
        Text(u32, StandardFont, String, f64, f64, f64),
        Image(u32, usize, PdfRect),
    }

    impl DocumentBackend for FakeBackend {
        type Source = ();
        type Output = Vec<Call>;
        type Font = StandardFont;

        fn parse(&self, _bytes: &[u8]) -> Result<(), ExportError> {
            if self.fail_parse {
                Err(ExportError::DocumentParse("bad header".into()))
            } else {
                Ok(())
            }
        }

        fn create_output(&self) -> Vec<Call> {
            Vec::new()
        }

        fn copy_pages(&self, _: &(), _: &mut Vec<Call>) -> Result<Vec<PageBox>, ExportError> {
            Ok(self.pages.clone())
        }

        fn embed_font(
            &self,
            _: &mut Vec<Call>,
            font: StandardFont,
        ) -> Result<StandardFont, ExportError> {
            self.embedded.borrow_mut().push(font);
            Ok(font)
        }

        fn measure_text(
            &self,
            font: &StandardFont,
            text: &str,
            size: f64,
        ) -> Result<f64, AnnotationError> {
            if self.zero_width {
                Ok(0.0)
            } else {
                font.text_width(text, size)
            }
        }

        fn draw_rect(
            &self,
            out: &mut Vec<Call>,
            page: u32,
            rect: PdfRect,
            _fill: Rgb,
        ) -> Result<(), AnnotationError> {
            out.push(Call::Rect(page, rect));
            Ok(())
        }

        fn draw_text(
            &self,
            out: &mut Vec<Call>,
            page: u32,
            font: &StandardFont,
            run: &TextRun<'_>,
        ) -> Result<(), AnnotationError> {
            out.push(Call::Text(
                page,
                *font,
                run.text.to_string(),
                run.x,
                run.y,
                run.font_size,
            ));
            Ok(())
        }

        fn draw_image(
            &self,
            out: &mut Vec<Call>,
            page: u32,
            png: &[u8],
            rect: PdfRect,
        ) -> Result<(), AnnotationError> {
            out.push(Call::Image(page, png.len(), rect));
            Ok(())
        }

        fn serialize(&self, out: Vec<Call>) -> Result<Vec<u8>, ExportError> {
            Ok(format!("{:?}", out).into_bytes())
        }
    }

    fn letter_pages(n: usize) -> FakeBackend {
        FakeBackend {
            pages: vec![PageBox::LETTER; n],
            ..FakeBackend::default()
        }
    }

    fn draft() -> Annotation {
        Annotation::text(Position::new(0, 0.5, 0.1), "Draft", TextStyle::default())
    }

    fn calls(composition: &Composition) -> String {
        String::from_utf8(composition.bytes.clone()).unwrap()
    }

    #[test]
    fn test_draft_is_drawn_at_projected_point() {
        let compositor = Compositor::new(letter_pages(1));
        let result = compositor.compose(b"%PDF", &[draft()]).unwrap();

        assert_eq!(result.drawn, 1);
        assert_eq!(result.skipped(), 0);
        assert_eq!(result.summary(), None);

        let expected_text = Call::Text(
            0,
            StandardFont::Helvetica,
            "Draft".into(),
            306.0,
            (1.0 - 0.1) * 792.0,
            12.0,
        );
        assert!(calls(&result).contains(&format!("{:?}", expected_text)));
    }

    #[test]
    fn test_background_is_sized_to_measured_text() {
        let compositor = Compositor::new(letter_pages(1));
        let result = compositor.compose(b"%PDF", &[draft()]).unwrap();

        let width = StandardFont::Helvetica.text_width("Draft", 12.0).unwrap();
        let y = (1.0 - 0.1) * 792.0;
        let expected_rect = Call::Rect(
            0,
            PdfRect {
                x: 304.0,
                y: y - 3.0 - 2.0,
                width: width + 4.0,
                height: 16.0,
            },
        );
        let recorded = calls(&result);
        let rect_at = recorded.find(&format!("{:?}", expected_rect)).unwrap();
        let text_at = recorded.find("Text(").unwrap();
        assert!(rect_at < text_at, "background must be drawn before text");
    }

    #[test]
    fn test_out_of_range_page_is_skipped_not_fatal() {
        let compositor = Compositor::new(letter_pages(2));
        let bad = Annotation::text(Position::new(5, 0.1, 0.1), "Gone", TextStyle::default());
        let bad_id = bad.id.clone();
        let annotations = vec![draft(), bad, draft()];

        let result = compositor.compose(b"%PDF", &annotations).unwrap();
        assert_eq!(result.drawn, 2);
        assert_eq!(result.skipped(), 1);
        assert_eq!(
            result.failures[0],
            AnnotationFailure {
                id: bad_id,
                error: AnnotationError::PageIndexOutOfRange {
                    page_index: 5,
                    page_count: 2
                },
            }
        );
        assert_eq!(
            result.summary().as_deref(),
            Some("1 of 3 annotations failed to render")
        );
    }

    #[test]
    fn test_degenerate_metrics_skip_annotation() {
        let backend = FakeBackend {
            zero_width: true,
            ..letter_pages(1)
        };
        let result = Compositor::new(backend).compose(b"%PDF", &[draft()]).unwrap();
        assert_eq!(result.drawn, 0);
        assert!(matches!(
            result.failures[0].error,
            AnnotationError::AnnotationDraw(_)
        ));
    }

    #[test]
    fn test_parse_failure_aborts() {
        let backend = FakeBackend {
            fail_parse: true,
            ..letter_pages(1)
        };
        let result = Compositor::new(backend).compose(b"junk", &[draft()]);
        assert!(matches!(result, Err(ExportError::DocumentParse(_))));
    }

    #[test]
    fn test_fonts_are_embedded_once_per_family() {
        let backend = letter_pages(1);
        let serif = TextStyle {
            font_family: Some("serif".into()),
            ..TextStyle::default()
        };
        let annotations = vec![
            draft(),
            Annotation::text(Position::new(0, 0.1, 0.2), "A", serif.clone()),
            Annotation::text(Position::new(0, 0.1, 0.3), "B", serif),
            draft(),
        ];
        let compositor = Compositor::new(backend);
        compositor.compose(b"%PDF", &annotations).unwrap();
        assert_eq!(
            *compositor.backend.embedded.borrow(),
            vec![StandardFont::Helvetica, StandardFont::TimesRoman]
        );
    }

    #[test]
    fn test_image_hangs_from_click_point() {
        let compositor = Compositor::new(letter_pages(1));
        let image = Annotation::image(
            Position::new(0, 0.0, 0.0),
            "data:image/png;base64,AAEC",
            50.0,
            20.0,
        );
        let result = compositor.compose(b"%PDF", &[image]).unwrap();
        let expected = Call::Image(
            0,
            3,
            PdfRect {
                x: 0.0,
                y: 772.0,
                width: 50.0,
                height: 20.0,
            },
        );
        assert!(calls(&result).contains(&format!("{:?}", expected)));
    }

    #[test]
    fn test_bad_image_data_is_skipped() {
        let compositor = Compositor::new(letter_pages(1));
        let image = Annotation::image(Position::new(0, 0.5, 0.5), "***", 10.0, 10.0);
        let result = compositor.compose(b"%PDF", &[image, draft()]).unwrap();
        assert_eq!(result.drawn, 1);
        assert_eq!(result.skipped(), 1);
    }

    #[test]
    fn test_background_can_be_disabled() {
        let options = ExportOptions {
            draw_background: false,
            ..ExportOptions::default()
        };
        let compositor = Compositor::with_options(letter_pages(1), options);
        let result = compositor.compose(b"%PDF", &[draft()]).unwrap();
        assert!(!calls(&result).contains("Rect("));
    }

    #[test]
    fn test_empty_text_is_a_draw_error() {
        let compositor = Compositor::new(letter_pages(1));
        let blank = Annotation::text(Position::new(0, 0.5, 0.5), "   ", TextStyle::default());
        let result = compositor.compose(b"%PDF", &[blank]).unwrap();
        assert_eq!(result.skipped(), 1);
    }
}
