//! lopdf implementation of [`DocumentBackend`]
//!
//! Pages are copied into a fresh document by importing the source objects
//! under an ID offset and rebuilding a flat page tree. Drawing is buffered per
//! page and flushed into one appended content stream at serialization, with
//! the original content wrapped in `q`/`Q` so its graphics state cannot leak
//! into the annotations.

use std::collections::BTreeMap;
use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use tracing::debug;

use crate::annotation::Rgb;
use crate::backend::{DocumentBackend, TextRun};
use crate::coords::{PageBox, PdfRect};
use crate::error::{AnnotationError, ExportError};
use crate::metrics::{encode_win_ansi, StandardFont};

/// Page attributes a page may inherit from its ancestors in the page tree
const INHERITABLE: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

/// Guard against cyclic /Parent chains in malformed files
const MAX_TREE_DEPTH: usize = 32;

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfBackend;

impl LopdfBackend {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Debug, Clone)]
pub struct LopdfFont {
    font: StandardFont,
    resource_name: String,
    id: ObjectId,
}

struct OutputPage {
    id: ObjectId,
    page_box: PageBox,
    operations: Vec<Operation>,
    fonts: BTreeMap<String, ObjectId>,
    images: BTreeMap<String, ObjectId>,
}

pub struct LopdfOutput {
    doc: Document,
    pages: Vec<OutputPage>,
    font_count: usize,
    image_count: usize,
}

impl LopdfOutput {
    fn page_mut(&mut self, page_index: u32) -> Result<&mut OutputPage, AnnotationError> {
        let page_count = self.pages.len() as u32;
        self.pages
            .get_mut(page_index as usize)
            .ok_or(AnnotationError::PageIndexOutOfRange {
                page_index,
                page_count,
            })
    }
}

fn draw_error(e: impl std::fmt::Display) -> AnnotationError {
    AnnotationError::AnnotationDraw(e.to_string())
}

fn ensure_finite(values: &[f64]) -> Result<(), AnnotationError> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(AnnotationError::AnnotationDraw(
            "non-finite drawing coordinates".into(),
        ))
    }
}

fn real(v: f64) -> Object {
    Object::Real(v as f32)
}

fn fill_color(color: Rgb) -> Operation {
    Operation::new(
        "rg",
        vec![
            Object::Real(color.r),
            Object::Real(color.g),
            Object::Real(color.b),
        ],
    )
}

/// Recursively remap object references by `offset`
fn remap_object_refs(obj: Object, offset: u32) -> Object {
    match obj {
        Object::Reference(id) => Object::Reference((id.0 + offset, id.1)),
        Object::Array(arr) => Object::Array(
            arr.into_iter()
                .map(|o| remap_object_refs(o, offset))
                .collect(),
        ),
        Object::Dictionary(mut dict) => {
            for (_, value) in dict.iter_mut() {
                *value = remap_object_refs(value.clone(), offset);
            }
            Object::Dictionary(dict)
        }
        Object::Stream(mut stream) => {
            for (_, value) in stream.dict.iter_mut() {
                *value = remap_object_refs(value.clone(), offset);
            }
            Object::Stream(stream)
        }
        other => other,
    }
}

/// Follow a single indirect reference
fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

/// Look up a page attribute, walking up the page tree when it is inherited
fn inherited_attribute(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut current = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = current.get(key) {
            return Some(value.clone());
        }
        let parent = current.get(b"Parent").ok()?.as_reference().ok()?;
        current = doc.get_dictionary(parent).ok()?;
    }
    None
}

fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

fn read_media_box(doc: &Document, page: &Dictionary) -> PageBox {
    let values: Option<Vec<f64>> = page
        .get(b"MediaBox")
        .ok()
        .and_then(|obj| resolve(doc, obj))
        .and_then(|obj| obj.as_array().ok())
        .map(|arr| {
            arr.iter()
                .filter_map(|o| resolve(doc, o).and_then(number))
                .collect()
        });

    match values.as_deref() {
        Some([x0, y0, x1, y1]) => {
            let page_box = PageBox::from_media_box([*x0, *y0, *x1, *y1]);
            if page_box.width > 0.0 && page_box.height > 0.0 {
                page_box
            } else {
                PageBox::LETTER
            }
        }
        _ => PageBox::LETTER,
    }
}

/// Clone a dictionary that may be stored inline or behind a reference
fn owned_dictionary(doc: &Document, obj: Option<&Object>) -> Dictionary {
    obj.and_then(|o| resolve(doc, o))
        .and_then(|o| o.as_dict().ok())
        .cloned()
        .unwrap_or_default()
}

fn compress(data: &[u8]) -> Result<Vec<u8>, AnnotationError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).map_err(draw_error)?;
    encoder.finish().map_err(draw_error)
}

struct DecodedImage {
    width: u32,
    height: u32,
    color_space: &'static [u8],
    color: Vec<u8>,
    alpha: Option<Vec<u8>>,
}

fn decode_png(data: &[u8]) -> Result<DecodedImage, AnnotationError> {
    let mut decoder = png::Decoder::new(std::io::Cursor::new(data));
    decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
    let mut reader = decoder.read_info().map_err(draw_error)?;
    let mut buf = vec![0; reader.output_buffer_size()];
    let info = reader.next_frame(&mut buf).map_err(draw_error)?;
    let pixels = &buf[..info.buffer_size()];

    let (channels, color_space, has_alpha): (usize, &'static [u8], bool) = match info.color_type {
        png::ColorType::Grayscale => (1, b"DeviceGray", false),
        png::ColorType::GrayscaleAlpha => (2, b"DeviceGray", true),
        png::ColorType::Rgb => (3, b"DeviceRGB", false),
        png::ColorType::Rgba => (4, b"DeviceRGB", true),
        png::ColorType::Indexed => {
            return Err(AnnotationError::AnnotationDraw(
                "indexed PNG was not expanded".into(),
            ))
        }
    };

    if !has_alpha {
        return Ok(DecodedImage {
            width: info.width,
            height: info.height,
            color_space,
            color: pixels.to_vec(),
            alpha: None,
        });
    }

    let color_channels = channels - 1;
    let pixel_count = pixels.len() / channels;
    let mut color = Vec::with_capacity(pixel_count * color_channels);
    let mut alpha = Vec::with_capacity(pixel_count);
    for px in pixels.chunks_exact(channels) {
        color.extend_from_slice(&px[..color_channels]);
        alpha.push(px[color_channels]);
    }

    Ok(DecodedImage {
        width: info.width,
        height: info.height,
        color_space,
        color,
        alpha: Some(alpha),
    })
}

fn image_stream(
    width: u32,
    height: u32,
    color_space: &[u8],
    data: &[u8],
) -> Result<Stream, AnnotationError> {
    let mut dict = Dictionary::new();
    dict.set("Type", Object::Name(b"XObject".to_vec()));
    dict.set("Subtype", Object::Name(b"Image".to_vec()));
    dict.set("Width", Object::Integer(width as i64));
    dict.set("Height", Object::Integer(height as i64));
    dict.set("ColorSpace", Object::Name(color_space.to_vec()));
    dict.set("BitsPerComponent", Object::Integer(8));
    dict.set("Filter", Object::Name(b"FlateDecode".to_vec()));
    let mut stream = Stream::new(dict, compress(data)?);
    // Already deflated; keep Document::compress from touching it again
    stream.allows_compression = false;
    Ok(stream)
}

impl DocumentBackend for LopdfBackend {
    type Source = Document;
    type Output = LopdfOutput;
    type Font = LopdfFont;

    fn parse(&self, bytes: &[u8]) -> Result<Document, ExportError> {
        let doc =
            Document::load_mem(bytes).map_err(|e| ExportError::DocumentParse(e.to_string()))?;
        if doc.get_pages().is_empty() {
            return Err(ExportError::DocumentParse("document has no pages".into()));
        }
        Ok(doc)
    }

    fn create_output(&self) -> LopdfOutput {
        LopdfOutput {
            doc: Document::with_version("1.7"),
            pages: Vec::new(),
            font_count: 0,
            image_count: 0,
        }
    }

    fn copy_pages(
        &self,
        source: &Document,
        output: &mut LopdfOutput,
    ) -> Result<Vec<PageBox>, ExportError> {
        let source_pages: Vec<ObjectId> = source.get_pages().into_values().collect();

        // Materialize inherited attributes before the source tree is discarded
        let mut inherited: Vec<Vec<(&[u8], Object)>> = Vec::with_capacity(source_pages.len());
        for page_id in &source_pages {
            let attrs = INHERITABLE
                .iter()
                .filter_map(|key| {
                    inherited_attribute(source, *page_id, key).map(|value| (*key, value))
                })
                .collect();
            inherited.push(attrs);
        }

        let dest = &mut output.doc;
        if source.version > dest.version {
            dest.version = source.version.clone();
        }

        let id_offset = dest.max_id;
        for (old_id, object) in source.objects.iter() {
            let new_id = (old_id.0 + id_offset, old_id.1);
            dest.objects
                .insert(new_id, remap_object_refs(object.clone(), id_offset));
        }
        dest.max_id = source.max_id + id_offset;

        let pages_id = dest.new_object_id();
        let mut kids = Vec::with_capacity(source_pages.len());
        let mut boxes = Vec::with_capacity(source_pages.len());

        for (old_id, attrs) in source_pages.iter().zip(inherited) {
            let page_id = (old_id.0 + id_offset, old_id.1);
            let mut page = dest
                .get_dictionary(page_id)
                .map_err(|e| ExportError::Compose(format!("page {:?}: {}", old_id, e)))?
                .clone();

            for (key, value) in attrs {
                if !page.has(key) {
                    page.set(key.to_vec(), remap_object_refs(value, id_offset));
                }
            }
            page.set("Parent", Object::Reference(pages_id));

            let page_box = read_media_box(dest, &page);
            dest.objects.insert(page_id, Object::Dictionary(page));

            kids.push(Object::Reference(page_id));
            boxes.push(page_box);
            output.pages.push(OutputPage {
                id: page_id,
                page_box,
                operations: Vec::new(),
                fonts: BTreeMap::new(),
                images: BTreeMap::new(),
            });
        }

        let mut pages = Dictionary::new();
        pages.set("Type", Object::Name(b"Pages".to_vec()));
        pages.set("Count", Object::Integer(kids.len() as i64));
        pages.set("Kids", Object::Array(kids));
        dest.objects.insert(pages_id, Object::Dictionary(pages));

        let mut catalog = Dictionary::new();
        catalog.set("Type", Object::Name(b"Catalog".to_vec()));
        catalog.set("Pages", Object::Reference(pages_id));
        let catalog_id = dest.add_object(Object::Dictionary(catalog));
        dest.trailer.set("Root", Object::Reference(catalog_id));

        debug!("Copied {} pages into output document", boxes.len());
        Ok(boxes)
    }

    fn embed_font(
        &self,
        output: &mut LopdfOutput,
        font: StandardFont,
    ) -> Result<LopdfFont, ExportError> {
        let mut dict = Dictionary::new();
        dict.set("Type", Object::Name(b"Font".to_vec()));
        dict.set("Subtype", Object::Name(b"Type1".to_vec()));
        dict.set("BaseFont", Object::Name(font.base_font().as_bytes().to_vec()));
        dict.set("Encoding", Object::Name(b"WinAnsiEncoding".to_vec()));
        let id = output.doc.add_object(Object::Dictionary(dict));

        let resource_name = format!("FAnn{}", output.font_count);
        output.font_count += 1;

        Ok(LopdfFont {
            font,
            resource_name,
            id,
        })
    }

    fn measure_text(
        &self,
        font: &LopdfFont,
        text: &str,
        font_size: f64,
    ) -> Result<f64, AnnotationError> {
        font.font.text_width(text, font_size)
    }

    fn draw_rect(
        &self,
        output: &mut LopdfOutput,
        page_index: u32,
        rect: PdfRect,
        fill: Rgb,
    ) -> Result<(), AnnotationError> {
        ensure_finite(&[rect.x, rect.y, rect.width, rect.height])?;
        let page = output.page_mut(page_index)?;
        page.operations.extend([
            Operation::new("q", vec![]),
            fill_color(fill),
            Operation::new(
                "re",
                vec![real(rect.x), real(rect.y), real(rect.width), real(rect.height)],
            ),
            Operation::new("f", vec![]),
            Operation::new("Q", vec![]),
        ]);
        Ok(())
    }

    fn draw_text(
        &self,
        output: &mut LopdfOutput,
        page_index: u32,
        font: &LopdfFont,
        run: &TextRun<'_>,
    ) -> Result<(), AnnotationError> {
        ensure_finite(&[run.x, run.y, run.font_size])?;
        let encoded = encode_win_ansi(run.text)?;
        let page = output.page_mut(page_index)?;
        page.fonts.insert(font.resource_name.clone(), font.id);
        page.operations.extend([
            Operation::new("q", vec![]),
            fill_color(run.color),
            Operation::new("BT", vec![]),
            Operation::new(
                "Tf",
                vec![
                    Object::Name(font.resource_name.as_bytes().to_vec()),
                    real(run.font_size),
                ],
            ),
            Operation::new("Td", vec![real(run.x), real(run.y)]),
            Operation::new("Tj", vec![Object::String(encoded, StringFormat::Literal)]),
            Operation::new("ET", vec![]),
            Operation::new("Q", vec![]),
        ]);
        Ok(())
    }

    fn draw_image(
        &self,
        output: &mut LopdfOutput,
        page_index: u32,
        png: &[u8],
        rect: PdfRect,
    ) -> Result<(), AnnotationError> {
        ensure_finite(&[rect.x, rect.y, rect.width, rect.height])?;
        if rect.width <= 0.0 || rect.height <= 0.0 {
            return Err(AnnotationError::AnnotationDraw(
                "image size must be positive".into(),
            ));
        }
        // Fail on a bad page before doing any decoding work
        output.page_mut(page_index)?;

        let image = decode_png(png)?;
        let mut stream = image_stream(image.width, image.height, image.color_space, &image.color)?;
        if let Some(alpha) = &image.alpha {
            let mask = image_stream(image.width, image.height, b"DeviceGray", alpha)?;
            let mask_id = output.doc.add_object(Object::Stream(mask));
            stream.dict.set("SMask", Object::Reference(mask_id));
        }
        let image_id = output.doc.add_object(Object::Stream(stream));

        let name = format!("IAnn{}", output.image_count);
        output.image_count += 1;

        let page = output.page_mut(page_index)?;
        page.images.insert(name.clone(), image_id);
        page.operations.extend([
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    real(rect.width),
                    real(0.0),
                    real(0.0),
                    real(rect.height),
                    real(rect.x),
                    real(rect.y),
                ],
            ),
            Operation::new("Do", vec![Object::Name(name.into_bytes())]),
            Operation::new("Q", vec![]),
        ]);
        Ok(())
    }

    fn serialize(&self, output: LopdfOutput) -> Result<Vec<u8>, ExportError> {
        let LopdfOutput {
            mut doc, pages, ..
        } = output;

        for page in pages {
            if page.operations.is_empty() {
                continue;
            }
            append_page_content(&mut doc, page)?;
        }

        doc.prune_objects();
        doc.compress();

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer)
            .map_err(|e| ExportError::Serialize(e.to_string()))?;
        Ok(buffer)
    }
}

/// Flush buffered drawing operations into the page's content and resources
fn append_page_content(doc: &mut Document, page: OutputPage) -> Result<(), ExportError> {
    let mut operations = Vec::with_capacity(page.operations.len() + 1);
    operations.push(Operation::new("Q", vec![]));
    operations.extend(page.operations);
    let content = Content { operations }
        .encode()
        .map_err(|e| ExportError::Serialize(e.to_string()))?;

    let open_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    let content_id = doc.add_object(Stream::new(Dictionary::new(), content));

    let page_dict = doc
        .get_dictionary(page.id)
        .map_err(|e| ExportError::Compose(e.to_string()))?;

    let mut contents = vec![Object::Reference(open_id)];
    match page_dict.get(b"Contents").ok() {
        Some(Object::Reference(id)) => match doc.get_object(*id) {
            // Contents may point at an array of streams
            Ok(Object::Array(arr)) => contents.extend(arr.iter().cloned()),
            _ => contents.push(Object::Reference(*id)),
        },
        Some(Object::Array(arr)) => contents.extend(arr.iter().cloned()),
        _ => {}
    }
    contents.push(Object::Reference(content_id));

    let mut resources = owned_dictionary(doc, page_dict.get(b"Resources").ok());
    let mut fonts = owned_dictionary(doc, resources.get(b"Font").ok());
    for (name, id) in &page.fonts {
        fonts.set(name.as_bytes().to_vec(), Object::Reference(*id));
    }
    if !page.fonts.is_empty() {
        resources.set("Font", Object::Dictionary(fonts));
    }
    let mut xobjects = owned_dictionary(doc, resources.get(b"XObject").ok());
    for (name, id) in &page.images {
        xobjects.set(name.as_bytes().to_vec(), Object::Reference(*id));
    }
    if !page.images.is_empty() {
        resources.set("XObject", Object::Dictionary(xobjects));
    }

    let page_dict = doc
        .get_object_mut(page.id)
        .and_then(Object::as_dict_mut)
        .map_err(|e| ExportError::Compose(e.to_string()))?;
    page_dict.set("Contents", Object::Array(contents));
    page_dict.set("Resources", Object::Dictionary(resources));

    debug!(
        "Appended annotation content to page {:?} ({}x{})",
        page.id, page.page_box.width, page.page_box.height
    );
    Ok(())
}
