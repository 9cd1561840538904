//! PDF certificates.
//!
//! The name is drawn on a standalone one-page overlay document which is then
//! composited onto the first page of the template. Only that first page is
//! kept in the output.

use std::path::Path;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};

use super::{CertificateRenderer, Placement, RenderError};

/// US Letter, in points.
pub const REFERENCE_PAGE_SIZE: (f32, f32) = (612.0, 792.0);

/// Resource name of the overlay font. Chosen to stay clear of the `F1`-style
/// names most generators use in templates.
const OVERLAY_FONT: &str = "CertF1";

/// Upper bound when walking `/Parent` links looking for inherited resources.
const MAX_TREE_DEPTH: usize = 32;

pub struct DocumentRenderer {
    template: Document,
    placement: Placement,
}

impl DocumentRenderer {
    /// Parses the template once. Each render works on a clone of it.
    pub fn load(template_path: &Path, placement: Placement) -> Result<Self, RenderError> {
        let template = Document::load(template_path)?;
        if template.get_pages().is_empty() {
            return Err(RenderError::EmptyDocument);
        }
        Ok(Self {
            template,
            placement,
        })
    }
}

impl CertificateRenderer for DocumentRenderer {
    fn extension(&self) -> &str {
        "pdf"
    }

    fn render(&self, text: &str) -> Result<Vec<u8>, RenderError> {
        let overlay = render_overlay(text, &self.placement)?;
        merge(self.template.clone(), &overlay)
    }
}

/// Builds a blank reference-size page holding only `text`, with its origin at
/// the placement offset measured from the bottom-left corner.
pub fn render_overlay(text: &str, placement: &Placement) -> Result<Vec<u8>, RenderError> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();

    let (r, g, b) = placement.color.unit();
    let content = Content {
        operations: vec![
            Operation::new("rg", vec![r.into(), g.into(), b.into()]),
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![OVERLAY_FONT.into(), placement.font_size.into()]),
            Operation::new(
                "Td",
                vec![i64::from(placement.x).into(), i64::from(placement.y).into()],
            ),
            Operation::new(
                "Tj",
                vec![Object::String(win_ansi_bytes(text), StringFormat::Literal)],
            ),
            Operation::new("ET", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));

    let (width, height) = REFERENCE_PAGE_SIZE;
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
        "Contents" => content_id,
        "Resources" => dictionary! {
            "Font" => dictionary! {
                OVERLAY_FONT => dictionary! {
                    "Type" => "Font",
                    "Subtype" => "Type1",
                    "BaseFont" => "Helvetica",
                    "Encoding" => "WinAnsiEncoding",
                },
            },
        },
    });

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)?;
    Ok(bytes)
}

/// Composites the first page of `overlay` onto the first page of `template`
/// and returns the result as a one-page document.
pub fn merge(mut template: Document, overlay: &[u8]) -> Result<Vec<u8>, RenderError> {
    let overlay_doc = Document::load_mem(overlay)?;
    let overlay_page = first_page(&overlay_doc)?;
    let overlay_content = overlay_doc.get_page_content(overlay_page)?;
    let overlay_fonts = page_fonts(&overlay_doc, overlay_page)?;

    let page_id = keep_first_page(&mut template)?;

    let fonts = page_font_dict_mut(&mut template, page_id)?;
    for (name, font) in overlay_fonts {
        fonts.set(name, font);
    }
    append_isolated_content(&mut template, page_id, overlay_content)?;

    let mut bytes = Vec::new();
    template.save_to(&mut bytes)?;
    Ok(bytes)
}

fn first_page(doc: &Document) -> Result<ObjectId, RenderError> {
    doc.get_pages()
        .values()
        .next()
        .copied()
        .ok_or(RenderError::EmptyDocument)
}

fn keep_first_page(doc: &mut Document) -> Result<ObjectId, RenderError> {
    let pages = doc.get_pages();
    let (&first_number, &page_id) = pages.iter().next().ok_or(RenderError::EmptyDocument)?;

    let extra: Vec<u32> = pages.keys().copied().filter(|n| *n != first_number).collect();
    if !extra.is_empty() {
        tracing::debug!("Dropping {} template pages after the first", extra.len());
        doc.delete_pages(&extra);
        doc.prune_objects();
    }
    Ok(page_id)
}

fn deref<'a>(doc: &'a Document, obj: &'a Object) -> Result<&'a Object, RenderError> {
    match obj {
        Object::Reference(id) => Ok(doc.get_object(*id)?),
        other => Ok(other),
    }
}

/// The page's own resources, or the nearest ones inherited through `/Parent`.
fn effective_resources(doc: &Document, page_id: ObjectId) -> Result<Option<Dictionary>, RenderError> {
    let mut node = doc.get_object(page_id)?.as_dict()?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(resources) = node.get(b"Resources") {
            return Ok(Some(deref(doc, resources)?.as_dict()?.clone()));
        }
        match node.get(b"Parent") {
            Ok(parent) => node = doc.get_object(parent.as_reference()?)?.as_dict()?,
            Err(_) => break,
        }
    }
    Ok(None)
}

fn page_fonts(doc: &Document, page_id: ObjectId) -> Result<Vec<(Vec<u8>, Object)>, RenderError> {
    let Some(resources) = effective_resources(doc, page_id)? else {
        return Ok(Vec::new());
    };
    let Ok(fonts) = resources.get(b"Font") else {
        return Ok(Vec::new());
    };

    let mut out = Vec::new();
    for (name, font) in deref(doc, fonts)?.as_dict()?.iter() {
        out.push((name.clone(), deref(doc, font)?.clone()));
    }
    Ok(out)
}

/// Mutable access to the `/Font` dictionary used by `page_id`, creating the
/// page's own resources (copied from any inherited ones) when needed.
fn page_font_dict_mut(doc: &mut Document, page_id: ObjectId) -> Result<&mut Dictionary, RenderError> {
    let (resources_ref, has_own) = match doc.get_object(page_id)?.as_dict()?.get(b"Resources") {
        Ok(Object::Reference(id)) => (Some(*id), true),
        Ok(_) => (None, true),
        Err(_) => (None, false),
    };
    if !has_own {
        let inherited = effective_resources(doc, page_id)?.unwrap_or_default();
        doc.get_object_mut(page_id)?
            .as_dict_mut()?
            .set("Resources", inherited);
    }

    let font_ref = {
        let resources = match resources_ref {
            Some(id) => doc.get_object(id)?.as_dict()?,
            None => doc.get_object(page_id)?.as_dict()?.get(b"Resources")?.as_dict()?,
        };
        match resources.get(b"Font") {
            Ok(Object::Reference(id)) => Some(*id),
            _ => None,
        }
    };
    if let Some(id) = font_ref {
        return Ok(doc.get_object_mut(id)?.as_dict_mut()?);
    }

    let resources = match resources_ref {
        Some(id) => doc.get_object_mut(id)?.as_dict_mut()?,
        None => doc
            .get_object_mut(page_id)?
            .as_dict_mut()?
            .get_mut(b"Resources")?
            .as_dict_mut()?,
    };
    if !matches!(resources.get(b"Font"), Ok(Object::Dictionary(_))) {
        resources.set("Font", Dictionary::new());
    }
    Ok(resources.get_mut(b"Font")?.as_dict_mut()?)
}

/// Wraps the page's existing content in `q`/`Q` so its graphics state cannot
/// leak into the overlay, then appends the overlay content on top.
fn append_isolated_content(
    doc: &mut Document,
    page_id: ObjectId,
    overlay_content: Vec<u8>,
) -> Result<(), RenderError> {
    let existing: Vec<Object> = {
        let page = doc.get_object(page_id)?.as_dict()?;
        match page.get(b"Contents") {
            Ok(Object::Array(items)) => items.clone(),
            Ok(Object::Reference(id)) => match doc.get_object(*id)? {
                Object::Array(items) => items.clone(),
                _ => vec![Object::Reference(*id)],
            },
            _ => Vec::new(),
        }
    };

    let open_id = doc.add_object(Stream::new(dictionary! {}, b"q\n".to_vec()));
    let mut closing = b"\nQ\n".to_vec();
    closing.extend(overlay_content);
    let close_id = doc.add_object(Stream::new(dictionary! {}, closing));

    let mut contents = Vec::with_capacity(existing.len() + 2);
    contents.push(Object::Reference(open_id));
    contents.extend(existing);
    contents.push(Object::Reference(close_id));

    doc.get_object_mut(page_id)?
        .as_dict_mut()?
        .set("Contents", Object::Array(contents));
    Ok(())
}

/// Encodes text for a WinAnsi-encoded standard font. Characters outside
/// Latin-1 become `?`.
fn win_ansi_bytes(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match u32::from(c) {
            code @ (0x20..=0x7E | 0xA0..=0xFF) => code as u8,
            _ => b'?',
        })
        .collect()
}
