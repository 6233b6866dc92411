//! Fixtures shared by the unit tests.

use std::path::Path;

use lopdf::{
    Object,
    Stream,
    content::{Content, Operation},
    dictionary,
};

use crate::{
    error::{Error, Result},
    extract::PdfBackend,
};

/// Treats a file as form-feed separated pages. A file starting with
/// `!corrupt` fails to open, a page reading `!fault` fails to extract and
/// a page reading `!panic` panics.
pub struct TextBackend;

impl PdfBackend for TextBackend {
    type Handle = Vec<String>;

    fn open(&self, path: &Path) -> Result<Vec<String>> {
        let content = std::fs::read_to_string(path)?;
        if content.starts_with("!corrupt") {
            return Err(Error::Pdf("not a PDF".into()));
        }
        Ok(content.split('\x0c').map(str::to_string).collect())
    }

    fn page_count(&self, handle: &Vec<String>) -> usize {
        handle.len()
    }

    fn page_text(&self, handle: &Vec<String>, index: usize) -> Result<String> {
        match handle[index].trim() {
            "!fault" => Err(Error::Pdf("bad content stream".into())),
            "!panic" => panic!("malformed page"),
            text => Ok(text.to_string()),
        }
    }
}

/// Write `pages` in the format read by [`TextBackend`].
pub fn write_pages(path: &Path, pages: &[&str]) {
    std::fs::write(path, pages.join("\x0c")).unwrap();
}

/// Write a real PDF with one line of Courier text per page.
pub fn write_pdf(path: &Path, pages: &[&str]) {
    let mut doc = lopdf::Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let kids: Vec<Object> = pages
        .iter()
        .map(|text| {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id = doc.add_object(Stream::new(
                dictionary! {},
                content.encode().unwrap(),
            ));
            doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            })
            .into()
        })
        .collect();

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).unwrap();
}
