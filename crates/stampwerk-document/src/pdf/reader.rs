// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF reader: parse uploaded bytes into a read-only source document and
// provide the page-tree helpers the compositor and assembler share (inherited
// attributes, media boxes, cross-document page cloning) using `lopdf`.

use lopdf::{Dictionary, Document, Object, ObjectId};
use stampwerk_core::PaperSize;
use stampwerk_core::error::{Result, StampwerkError};
use tracing::{debug, instrument, warn};

/// Page-tree depth beyond which inherited-attribute lookups give up.
const MAX_TREE_DEPTH: usize = 64;

/// A parsed upload. Never mutated; the assembler works on a clone.
pub struct SourceDocument {
    document: Document,
}

impl SourceDocument {
    /// Parse raw PDF bytes.
    ///
    /// Fails with `StampwerkError::MalformedDocument` when the bytes are not a
    /// readable PDF.
    #[instrument(skip_all, fields(bytes_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let document = Document::load_mem(data).map_err(|err| {
            StampwerkError::MalformedDocument(format!("failed to load PDF from memory: {err}"))
        })?;

        // A document without a page tree cannot be stamped or extended.
        document
            .catalog()
            .and_then(|catalog| catalog.get(b"Pages"))
            .map_err(|err| StampwerkError::MalformedDocument(format!("no page tree: {err}")))?;

        debug!(pages = document.get_pages().len(), "PDF loaded from bytes");
        Ok(Self { document })
    }

    /// Number of pages in the document.
    pub fn page_count(&self) -> usize {
        self.document.get_pages().len()
    }

    /// Page numbers (1-indexed) and object ids in page order.
    pub fn pages(&self) -> Vec<(u32, ObjectId)> {
        // `get_pages` is a BTreeMap keyed by page number, so this is ordered.
        self.document.get_pages().into_iter().collect()
    }

    pub fn document(&self) -> &Document {
        &self.document
    }
}

// -- Page-tree helpers ---------------------------------------------------------

/// Look up `key` on a page, walking up `/Parent` links for inheritable
/// attributes (`/Resources`, `/MediaBox`, `/Rotate`, ...).
pub fn inherited_attribute(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut current = page_id;
    for _ in 0..MAX_TREE_DEPTH {
        let dict = doc.get_dictionary(current).ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(value.clone());
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok()?;
    }
    warn!(?page_id, "page tree too deep while resolving inherited attribute");
    None
}

/// Follow a reference (if any) to the object it points at.
pub fn resolve<'a>(doc: &'a Document, object: &'a Object) -> &'a Object {
    match object {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(object),
        other => other,
    }
}

fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

/// The page's media box as `[left, bottom, right, top]`, normalised so that
/// left < right and bottom < top. Falls back to A4 when absent or malformed.
pub fn media_box(doc: &Document, page_id: ObjectId) -> [f32; 4] {
    let parsed = inherited_attribute(doc, page_id, b"MediaBox").and_then(|object| {
        let values: Vec<f32> = resolve(doc, &object)
            .as_array()
            .ok()?
            .iter()
            .filter_map(|v| number(resolve(doc, v)))
            .collect();
        (values.len() == 4).then(|| {
            [
                values[0].min(values[2]),
                values[1].min(values[3]),
                values[0].max(values[2]),
                values[1].max(values[3]),
            ]
        })
    });

    parsed.unwrap_or_else(|| {
        warn!(?page_id, "page has no usable MediaBox, assuming A4");
        let (w, h) = PaperSize::A4.dimensions_pt();
        [0.0, 0.0, w, h]
    })
}

/// A private copy of the page's effective resource dictionary, with the
/// `/XObject` and `/Font` sub-dictionaries resolved inline so entries can be
/// added without touching resources shared with other pages.
pub fn owned_resources(doc: &Document, page_id: ObjectId) -> Dictionary {
    let mut resources = match inherited_attribute(doc, page_id, b"Resources") {
        Some(object) => match resolve(doc, &object) {
            Object::Dictionary(dict) => dict.clone(),
            _ => Dictionary::new(),
        },
        None => Dictionary::new(),
    };

    for key in ["XObject", "Font"] {
        let reference = resources
            .get(key.as_bytes())
            .and_then(Object::as_reference)
            .ok();
        if let Some(id) = reference {
            let inner = doc.get_dictionary(id).cloned().unwrap_or_default();
            resources.set(key, Object::Dictionary(inner));
        }
    }
    resources
}

/// The page's content stream references, in drawing order.
pub fn content_references(doc: &Document, page_id: ObjectId) -> Vec<Object> {
    let contents = doc
        .get_dictionary(page_id)
        .ok()
        .and_then(|dict| dict.get(b"Contents").ok().cloned());
    match contents {
        Some(Object::Reference(id)) => match doc.get_object(id) {
            // An indirect array of streams.
            Ok(Object::Array(items)) => items.clone(),
            _ => vec![Object::Reference(id)],
        },
        Some(Object::Array(items)) => items,
        _ => Vec::new(),
    }
}

// -- Cross-document page cloning ---------------------------------------------

/// Clone a single page object (and its referenced resources) from `source` into
/// `target`, appending it as the last page. Returns the new page's id.
pub fn append_page(source: &Document, target: &mut Document, page_id: ObjectId) -> Result<ObjectId> {
    let page_object = source.get_object(page_id).map_err(|err| {
        StampwerkError::Serialization(format!("cannot read page object {page_id:?}: {err}"))
    })?;

    // Carry inherited attributes onto the copy before the /Parent link is cut.
    let mut page_object = page_object.clone();
    if let Object::Dictionary(dict) = &mut page_object {
        for key in ["MediaBox", "Resources"] {
            if !dict.has(key.as_bytes()) {
                if let Some(value) = inherited_attribute(source, page_id, key.as_bytes()) {
                    dict.set(key, value);
                }
            }
        }
    }

    let cloned = deep_clone_object(source, target, &page_object)?;
    let cloned_id = target.add_object(cloned);

    let pages_id = target
        .catalog()
        .map_err(|err| StampwerkError::Serialization(format!("no catalog: {err}")))
        .and_then(|catalog| {
            catalog
                .get(b"Pages")
                .and_then(Object::as_reference)
                .map_err(|err| StampwerkError::Serialization(format!("no /Pages reference: {err}")))
        })?;

    let pages_dict = target.get_dictionary_mut(pages_id).map_err(|err| {
        StampwerkError::Serialization(format!("page tree root unreadable: {err}"))
    })?;
    let mut kids = match pages_dict.get(b"Kids") {
        Ok(Object::Array(kids)) => kids.clone(),
        _ => Vec::new(),
    };
    kids.push(Object::Reference(cloned_id));
    pages_dict.set("Kids", kids);
    let count = pages_dict
        .get(b"Count")
        .and_then(Object::as_i64)
        .unwrap_or(0);
    pages_dict.set("Count", count + 1);

    if let Ok(page_dict) = target.get_dictionary_mut(cloned_id) {
        page_dict.set("Parent", Object::Reference(pages_id));
    }

    Ok(cloned_id)
}

/// Deep-clone a single lopdf Object, recursively resolving references (except
/// /Parent which is deliberately skipped to avoid circular cloning).
fn deep_clone_object(source: &Document, target: &mut Document, object: &Object) -> Result<Object> {
    match object {
        Object::Dictionary(dict) => Ok(Object::Dictionary(clone_dictionary(source, target, dict)?)),
        Object::Array(arr) => {
            let mut new_arr = Vec::with_capacity(arr.len());
            for item in arr {
                new_arr.push(deep_clone_object(source, target, item)?);
            }
            Ok(Object::Array(new_arr))
        }
        Object::Reference(ref_id) => match source.get_object(*ref_id) {
            Ok(referenced) => {
                let cloned = deep_clone_object(source, target, referenced)?;
                Ok(Object::Reference(target.add_object(cloned)))
            }
            Err(err) => {
                warn!(?ref_id, %err, "Cannot resolve reference, using Null");
                Ok(Object::Null)
            }
        },
        Object::Stream(stream) => {
            let dict = clone_dictionary(source, target, &stream.dict)?;
            Ok(Object::Stream(lopdf::Stream::new(dict, stream.content.clone())))
        }
        other => Ok(other.clone()),
    }
}

fn clone_dictionary(source: &Document, target: &mut Document, dict: &Dictionary) -> Result<Dictionary> {
    let mut new_dict = Dictionary::new();
    for (key, value) in dict.iter() {
        if key == b"Parent" {
            continue;
        }
        new_dict.set(key.clone(), deep_clone_object(source, target, value)?);
    }
    Ok(new_dict)
}
