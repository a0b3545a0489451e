//! PDF text layer.
//!
//! lopdf-based per-page text reading plus the embedded-image probe
//! feeding the image-dominated heuristic. Rasterization for the OCR
//! path lives in `render`.

use lopdf::{Dictionary, Document, Object};

use crate::error::PipelineError;

/// Direct text-layer reading of one page.
#[derive(Debug, Clone)]
pub struct PageAnalysis {
    /// Raw extracted text, untrimmed.
    pub text: String,
    /// Page resources carry at least one raster image XObject.
    pub has_image: bool,
}

/// Read every page's text layer and image signal, in page order.
pub fn analyze_pages(pdf_bytes: &[u8]) -> Result<Vec<PageAnalysis>, PipelineError> {
    let doc = Document::load_mem(pdf_bytes)
        .map_err(|err| PipelineError::DocumentFormat(format!("unreadable PDF: {err}")))?;

    let pages = doc.get_pages();
    let mut page_numbers: Vec<u32> = pages.keys().cloned().collect();
    page_numbers.sort();

    let mut analyses = Vec::with_capacity(page_numbers.len());
    for number in page_numbers {
        // A page that refuses text extraction reads as empty, which the
        // caller's char floor routes to OCR anyway.
        let text = doc.extract_text(&[number]).unwrap_or_default();
        let has_image = pages
            .get(&number)
            .map(|id| page_has_image(&doc, *id))
            .unwrap_or(false);
        analyses.push(PageAnalysis { text, has_image });
    }

    Ok(analyses)
}

/// Walk Resources -> XObject looking for a stream with Subtype /Image.
fn page_has_image(doc: &Document, page_id: lopdf::ObjectId) -> bool {
    let Ok(page) = doc.get_dictionary(page_id) else {
        return false;
    };
    let Some(resources) = resolve_dict(doc, page.get(b"Resources").ok()) else {
        return false;
    };
    let Some(xobjects) = resolve_dict(doc, resources.get(b"XObject").ok()) else {
        return false;
    };

    xobjects.iter().any(|(_name, entry)| {
        let stream = match entry {
            Object::Reference(id) => match doc.get_object(*id) {
                Ok(Object::Stream(stream)) => stream,
                _ => return false,
            },
            Object::Stream(stream) => stream,
            _ => return false,
        };
        matches!(stream.dict.get(b"Subtype"), Ok(Object::Name(name)) if name == b"Image")
    })
}

fn resolve_dict<'a>(doc: &'a Document, object: Option<&'a Object>) -> Option<&'a Dictionary> {
    match object? {
        Object::Reference(id) => match doc.get_object(*id) {
            Ok(Object::Dictionary(dict)) => Some(dict),
            _ => None,
        },
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}
