use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use lopdf::{Dictionary, Document, Object, ObjectId};
use thiserror::Error;

mod layout;

pub use layout::{Glyph, page_glyphs, text_in_rect};

#[derive(Error, Debug)]
pub enum PdfError {
    #[error("failed to open PDF: {0}")]
    Open(String),
    #[error("malformed PDF: {0}")]
    Malformed(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Axis-aligned rectangle in PDF user space, normalized so `x1 <= x2` and `y1 <= y2`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl Rect {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            x1: x1.min(x2),
            y1: y1.min(y2),
            x2: x1.max(x2),
            y2: y1.max(y2),
        }
    }

    /// Strict overlap on both axes; touching edges do not count.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x1 < other.x2 && self.x2 > other.x1 && self.y1 < other.y2 && self.y2 > other.y1
    }
}

/// Text markup annotation types whose text is collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkupKind {
    Highlight,
    Underline,
}

/// A highlight or underline annotation.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub page: u32,
    pub kind: MarkupKind,
    /// The annotation's own text, `None` when absent or blank.
    pub contents: Option<String>,
    pub rect: Option<Rect>,
}

/// Collect the unique texts of every highlight and underline annotation,
/// sorted.
///
/// Annotations without their own text fall back to the page text found under
/// the annotation's rectangle.
pub fn extract_annotated_words(path: &Path) -> Result<Vec<String>, PdfError> {
    std::fs::metadata(path)?;
    let doc = Document::load(path)
        .map_err(|e| PdfError::Open(format!("{}: {}", path.display(), e)))?;
    let pages = doc.get_pages();
    log::info!("{}: {} pages", path.display(), pages.len());

    let annotations = markup_annotations(&doc)?;
    let mut glyph_cache: HashMap<u32, Vec<Glyph>> = HashMap::new();
    let mut words = BTreeSet::new();

    for annot in &annotations {
        let text = match (&annot.contents, annot.rect) {
            (Some(text), _) => text.clone(),
            (None, Some(rect)) => {
                let Some(&page_id) = pages.get(&annot.page) else {
                    continue;
                };
                if !glyph_cache.contains_key(&annot.page) {
                    glyph_cache.insert(annot.page, page_glyphs(&doc, page_id)?);
                }
                text_in_rect(&glyph_cache[&annot.page], &rect)
            }
            (None, None) => continue,
        };

        let text = text.trim();
        log::debug!("page {}: {:?} '{}'", annot.page, annot.kind, text);
        if !text.is_empty() {
            words.insert(text.to_string());
        }
    }

    Ok(words.into_iter().collect())
}

/// Every highlight and underline annotation in page order.
pub fn markup_annotations(doc: &Document) -> Result<Vec<Annotation>, PdfError> {
    let mut found = Vec::new();
    for (page_number, page_id) in doc.get_pages() {
        let page = page_dictionary(doc, page_id)?;
        let Ok(annots) = page.get(b"Annots") else {
            log::debug!("page {}: no annotations", page_number);
            continue;
        };
        let Object::Array(items) = resolve(doc, annots)? else {
            log::warn!("page {}: /Annots is not an array", page_number);
            continue;
        };

        let before = found.len();
        for (idx, item) in items.iter().enumerate() {
            let Object::Dictionary(dict) = resolve(doc, item)? else {
                log::warn!("page {}: annotation {} is not a dictionary", page_number, idx + 1);
                continue;
            };
            if let Some(annot) = read_annotation(doc, page_number, dict)? {
                found.push(annot);
            }
        }
        log::debug!(
            "page {}: {} of {} annotations are markup",
            page_number,
            found.len() - before,
            items.len()
        );
    }
    Ok(found)
}

fn read_annotation(
    doc: &Document,
    page: u32,
    dict: &Dictionary,
) -> Result<Option<Annotation>, PdfError> {
    let kind = match dict.get(b"Subtype").map(|o| resolve(doc, o)) {
        Ok(Ok(Object::Name(name))) => match name.as_slice() {
            b"Highlight" => MarkupKind::Highlight,
            b"Underline" => MarkupKind::Underline,
            _ => return Ok(None),
        },
        Ok(Err(e)) => return Err(e),
        _ => {
            log::warn!("page {}: annotation without /Subtype", page);
            return Ok(None);
        }
    };

    let contents = match dict.get(b"Contents") {
        Ok(obj) => match resolve(doc, obj)? {
            Object::String(bytes, _) => Some(decode_text(bytes)),
            _ => None,
        },
        Err(_) => None,
    }
    .map(|s| s.trim().to_string())
    .filter(|s| !s.is_empty());

    let rect = match dict.get(b"Rect") {
        Ok(obj) => match resolve(doc, obj)? {
            Object::Array(values) if values.len() == 4 => {
                let n: Vec<f32> = values.iter().filter_map(number).collect();
                (n.len() == 4).then(|| Rect::new(n[0], n[1], n[2], n[3]))
            }
            _ => None,
        },
        Err(_) => None,
    };

    Ok(Some(Annotation {
        page,
        kind,
        contents,
        rect,
    }))
}

fn page_dictionary(doc: &Document, page_id: ObjectId) -> Result<&Dictionary, PdfError> {
    match doc.get_object(page_id) {
        Ok(Object::Dictionary(dict)) => Ok(dict),
        Ok(_) => Err(PdfError::Malformed(format!(
            "page object {:?} is not a dictionary",
            page_id
        ))),
        Err(e) => Err(PdfError::Malformed(format!("page object {:?}: {}", page_id, e))),
    }
}

pub(crate) fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Result<&'a Object, PdfError> {
    match obj {
        Object::Reference(id) => doc
            .get_object(*id)
            .map_err(|e| PdfError::Malformed(format!("reference {:?}: {}", id, e))),
        other => Ok(other),
    }
}

pub(crate) fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

/// Decode a PDF string: UTF-16BE with BOM, then UTF-8, then Latin-1.
pub(crate) fn decode_text(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

#[cfg(test)]
pub(crate) mod fixture {
    use lopdf::content::{Content, Operation};
    use lopdf::{Document, Object, Stream, StringFormat, dictionary};
    use std::path::Path;

    fn utf16(text: &str) -> Object {
        let mut bytes = vec![0xFE, 0xFF];
        for unit in text.encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        Object::String(bytes, StringFormat::Hexadecimal)
    }

    fn rect(x1: i64, y1: i64, x2: i64, y2: i64) -> Object {
        vec![x1.into(), y1.into(), x2.into(), y2.into()].into()
    }

    fn highlight(doc: &mut Document, rect: Object) -> Object {
        doc.add_object(dictionary! {
            "Type" => "Annot",
            "Subtype" => "Highlight",
            "Rect" => rect,
        })
        .into()
    }

    /// A single-page document with a Courier `F1` font resource.
    fn write_page(
        path: &Path,
        operations: Vec<Operation>,
        annots: impl FnOnce(&mut Document) -> Vec<Object>,
    ) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let annots = annots(&mut doc);

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Annots" => annots,
        });
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path).unwrap();
    }

    /// One page with the given content and no annotations.
    pub(crate) fn write_page_content(path: &Path, operations: Vec<Operation>) {
        write_page(path, operations, |_| Vec::new());
    }

    /// One page: "house" at (100, 700) and "garden" at (100, 600), 12pt.
    pub(crate) fn write_sample(path: &Path) {
        let operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![100.into(), 700.into()]),
            Operation::new("Tj", vec![Object::string_literal("house")]),
            Operation::new("Td", vec![0.into(), (-100).into()]),
            Operation::new("Tj", vec![Object::string_literal("garden")]),
            Operation::new("ET", vec![]),
        ];
        write_page(path, operations, |doc| {
            vec![
                doc.add_object(dictionary! {
                    "Type" => "Annot",
                    "Subtype" => "Highlight",
                    "Rect" => rect(10, 10, 50, 20),
                    "Contents" => Object::string_literal("Keep in mind"),
                })
                .into(),
                // Blank contents: text comes from the page under the rectangle.
                doc.add_object(dictionary! {
                    "Type" => "Annot",
                    "Subtype" => "Highlight",
                    "Rect" => rect(140, 715, 95, 695),
                    "Contents" => Object::string_literal("  "),
                })
                .into(),
                doc.add_object(dictionary! {
                    "Type" => "Annot",
                    "Subtype" => "Underline",
                    "Rect" => rect(99, 598, 137, 610),
                })
                .into(),
                doc.add_object(dictionary! {
                    "Type" => "Annot",
                    "Subtype" => "Text",
                    "Rect" => rect(0, 0, 10, 10),
                    "Contents" => Object::string_literal("sticky note"),
                })
                .into(),
                doc.add_object(dictionary! {
                    "Type" => "Annot",
                    "Subtype" => "Highlight",
                    "Rect" => rect(0, 0, 10, 10),
                    "Contents" => utf16("Дом"),
                })
                .into(),
                doc.add_object(dictionary! {
                    "Type" => "Annot",
                    "Subtype" => "Underline",
                    "Rect" => rect(0, 0, 10, 10),
                    "Contents" => Object::string_literal("house"),
                })
                .into(),
            ]
        });
    }

    /// Text drawn under transformed coordinate systems:
    /// - "house" at page (100, 700), via a `cm` translation of 50 inside `q`/`Q`
    /// - "cat" at page (100, 600), 6pt effective, via a `cm` scale of 0.5
    /// - "dog" at page (300, 500) after both states are popped
    ///
    /// A single highlight without contents covers "house".
    pub(crate) fn write_transformed(path: &Path) {
        let operations = vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![1.into(), 0.into(), 0.into(), 1.into(), 50.into(), 0.into()],
            ),
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![50.into(), 700.into()]),
            Operation::new("Tj", vec![Object::string_literal("house")]),
            Operation::new("ET", vec![]),
            Operation::new("Q", vec![]),
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    Object::Real(0.5),
                    0.into(),
                    0.into(),
                    Object::Real(0.5),
                    0.into(),
                    0.into(),
                ],
            ),
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![200.into(), 1200.into()]),
            Operation::new("Tj", vec![Object::string_literal("cat")]),
            Operation::new("ET", vec![]),
            Operation::new("Q", vec![]),
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![300.into(), 500.into()]),
            Operation::new("Tj", vec![Object::string_literal("dog")]),
            Operation::new("ET", vec![]),
        ];
        write_page(path, operations, |doc| vec![highlight(doc, rect(98, 698, 132, 714))]);
    }
}
