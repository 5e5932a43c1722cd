use std::path::Path;

use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, ObjectId, Stream, dictionary};

const TOP_MARGIN: i64 = 780;
const LINE_HEIGHT: i64 = 16;

/// Content stream drawing each line at its own absolute baseline in 12pt Courier.
fn page_operations(lines: &[&str]) -> Vec<Operation> {
    let mut operations = Vec::with_capacity(lines.len() * 4);
    for (row, line) in (0_i64..).zip(lines) {
        operations.extend([
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![50.into(), (TOP_MARGIN - row * LINE_HEIGHT).into()]),
            Operation::new("Tj", vec![Object::string_literal(*line)]),
            Operation::new("ET", vec![]),
        ]);
    }
    operations
}

fn add_page(
    doc: &mut Document,
    parent: ObjectId,
    lines: &[&str],
) -> Result<ObjectId, Box<dyn std::error::Error>> {
    let content = Content {
        operations: page_operations(lines),
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
    Ok(doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => parent,
        "Contents" => content_id,
    }))
}

/// In-memory PDF with one page per entry of `pages`.
pub fn pdf_bytes(pages: &[Vec<&str>]) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let courier = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => courier },
    });

    let kids = pages
        .iter()
        .map(|lines| add_page(&mut doc, pages_id, lines).map(Object::from))
        .collect::<Result<Vec<_>, _>>()?;
    let count = i64::try_from(kids.len())?;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );

    let catalog = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog);
    doc.compress();

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)?;
    Ok(bytes)
}

#[allow(dead_code)]
pub fn write_pdf(path: &Path, pages: &[Vec<&str>]) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::write(path, pdf_bytes(pages)?)?;
    Ok(())
}
