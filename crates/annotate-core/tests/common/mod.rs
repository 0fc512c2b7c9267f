//! Fixtures shared by the integration tests

#![allow(dead_code)]

use annotate_core::{Attachment, MemoryStorage, Storage, Template, TemplateEditor};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, Stream};

pub const SOURCE_PATH: &str = "uploads/timesheet.pdf";

/// Letter-size pages, each showing "Page N" in Helvetica
pub fn create_test_pdf(num_pages: u32) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Font".to_vec())),
        ("Subtype", Object::Name(b"Type1".to_vec())),
        ("BaseFont", Object::Name(b"Helvetica".to_vec())),
    ]));

    let mut page_ids = Vec::new();
    for i in 0..num_pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), Object::Integer(18)]),
                Operation::new("Td", vec![Object::Integer(72), Object::Integer(720)]),
                Operation::new(
                    "Tj",
                    vec![Object::string_literal(format!("Page {}", i + 1))],
                ),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            Dictionary::new(),
            content.encode().expect("encode content"),
        ));

        let mut fonts = Dictionary::new();
        fonts.set("F1", Object::Reference(font_id));
        let mut resources = Dictionary::new();
        resources.set("Font", Object::Dictionary(fonts));

        let page = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(pages_id)),
            ("Contents", Object::Reference(content_id)),
            ("Resources", Object::Dictionary(resources)),
            (
                "MediaBox",
                Object::Array(vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(612),
                    Object::Integer(792),
                ]),
            ),
        ]);
        page_ids.push(doc.add_object(page));
    }

    let pages = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Pages".to_vec())),
        ("Count", Object::Integer(num_pages as i64)),
        (
            "Kids",
            Object::Array(page_ids.iter().map(|id| Object::Reference(*id)).collect()),
        ),
    ]);
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]));
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).expect("save test pdf");
    buffer
}

/// 1x1 opaque blue PNG
pub fn create_test_png() -> Vec<u8> {
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, 1, 1);
        encoder.set_color(png::ColorType::Rgb);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header().expect("png header");
        writer.write_image_data(&[0, 0, 255]).expect("png data");
    }
    out
}

/// Upload a source PDF and return an editor with it attached
pub async fn editor_with_pdf(storage: &MemoryStorage, num_pages: u32) -> TemplateEditor {
    let storage_path = storage
        .upload(SOURCE_PATH, create_test_pdf(num_pages), "application/pdf")
        .await
        .expect("upload source");
    let url = storage.public_url(&storage_path).await.expect("public url");

    let mut editor = TemplateEditor::new(Template::new("Weekly Timesheet"));
    editor.set_attachment(Attachment::Pdf { url, storage_path });
    editor
}

/// All text shown on a page, concatenated from its content streams
pub fn page_text(bytes: &[u8], page_number: u32) -> String {
    let doc = Document::load_mem(bytes).expect("load output");
    let page_id = doc.get_pages()[&page_number];
    let content = doc.get_page_content(page_id).expect("page content");
    String::from_utf8_lossy(&content).into_owned()
}
