//! Document content extraction.
//!
//! Two tiers of text recovery: the embedded text layer where a page
//! carries a usable one, and rasterize-then-OCR for pages that look
//! like scans. A page goes to OCR when it is image-dominated (fewer
//! than the configured floor of visible characters, or at least one
//! embedded raster image) or when its direct text is shorter than the
//! minimum viable length. Single-image uploads skip the text layer and
//! go straight to the OCR gate.

pub(crate) mod extractor;
mod render;

use bytes::Bytes;

use tracing::{debug, warn};

use crate::config::ExtractConfig;
use crate::error::PipelineError;
use crate::ocr::OcrEngine;

/// Declared kind of an uploaded document, guessed from its reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Pdf,
    Image,
    Text,
    Unknown,
}

impl MediaKind {
    /// Guess from the file extension of a storage reference.
    pub fn guess(reference: &str) -> Self {
        let lower = reference.to_lowercase();
        if lower.ends_with(".pdf") {
            MediaKind::Pdf
        } else if lower.ends_with(".png") || lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
            MediaKind::Image
        } else if lower.ends_with(".txt") || lower.ends_with(".md") {
            MediaKind::Text
        } else {
            MediaKind::Unknown
        }
    }
}

/// Where a page's text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSource {
    TextLayer,
    Ocr,
}

/// One page's recovered text with provenance.
#[derive(Debug, Clone)]
pub struct PageText {
    pub index: usize,
    pub text: String,
    pub source: PageSource,
    /// The page looked like a scan: almost no visible characters, or
    /// an embedded raster image.
    pub image_heavy: bool,
}

/// All pages of a document plus their joined text.
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub pages: Vec<PageText>,
    /// Page texts joined with a paragraph break; empty pages dropped.
    pub text: String,
}

impl ExtractedDocument {
    fn from_pages(pages: Vec<PageText>) -> Self {
        let text = pages
            .iter()
            .map(|page| page.text.trim())
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
        Self { pages, text }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Recover text from raw document bytes.
///
/// OCR soft failures leave the affected pages empty; only unreadable
/// input for the declared kind is an error.
pub async fn extract(
    bytes: &[u8],
    kind: MediaKind,
    ocr: &dyn OcrEngine,
    config: &ExtractConfig,
    language: &str,
) -> Result<ExtractedDocument, PipelineError> {
    match kind {
        MediaKind::Pdf => extract_pdf(bytes, ocr, config, language).await,
        MediaKind::Image => {
            let outcome = ocr.recognize(bytes, false, language).await?;
            let text = outcome.into_text();
            debug!(chars = text.len(), "image recognized through OCR");
            Ok(ExtractedDocument::from_pages(vec![PageText {
                index: 0,
                text,
                source: PageSource::Ocr,
                image_heavy: true,
            }]))
        }
        MediaKind::Text => {
            let text = String::from_utf8_lossy(bytes).trim().to_string();
            Ok(ExtractedDocument::from_pages(vec![PageText {
                index: 0,
                text,
                source: PageSource::TextLayer,
                image_heavy: false,
            }]))
        }
        MediaKind::Unknown => {
            warn!("unknown media kind, no text recovered");
            Ok(ExtractedDocument::from_pages(Vec::new()))
        }
    }
}

async fn extract_pdf(
    bytes: &[u8],
    ocr: &dyn OcrEngine,
    config: &ExtractConfig,
    language: &str,
) -> Result<ExtractedDocument, PipelineError> {
    let analyses = extractor::analyze_pages(bytes)?;
    let shared = Bytes::copy_from_slice(bytes);

    let mut pages = Vec::with_capacity(analyses.len());
    for (index, analysis) in analyses.into_iter().enumerate() {
        let trimmed = analysis.text.trim();
        let visible = trimmed.chars().filter(|c| !c.is_whitespace()).count();
        let image_heavy = analysis.has_image || visible < config.image_char_floor;

        if image_heavy || trimmed.chars().count() < config.min_viable_text {
            let text = ocr_page(&shared, index, ocr, config, language).await?;
            debug!(
                page = index + 1,
                chars = text.len(),
                "page text recovered through OCR"
            );
            pages.push(PageText {
                index,
                text,
                source: PageSource::Ocr,
                image_heavy,
            });
        } else {
            debug!(
                page = index + 1,
                chars = trimmed.len(),
                "page text taken from the text layer"
            );
            pages.push(PageText {
                index,
                text: trimmed.to_string(),
                source: PageSource::TextLayer,
                image_heavy,
            });
        }
    }

    Ok(ExtractedDocument::from_pages(pages))
}

/// Rasterize one page and push it through the OCR gate. The raster
/// library is synchronous, so rendering runs on the blocking pool.
async fn ocr_page(
    pdf: &Bytes,
    index: usize,
    ocr: &dyn OcrEngine,
    config: &ExtractConfig,
    language: &str,
) -> Result<String, PipelineError> {
    let owned = pdf.clone();
    let dpi = config.raster_dpi;
    let png = tokio::task::spawn_blocking(move || render::render_page_png(&owned, index, dpi))
        .await
        .map_err(|err| PipelineError::Job(format!("render task failed: {err}")))?
        .map_err(|err| PipelineError::DocumentFormat(err.to_string()))?;

    let outcome = ocr.recognize(&png, false, language).await?;
    Ok(outcome.into_text())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::chunker::chunk_text;
    use crate::ocr::{OcrOutcome, UnavailableReason};

    struct ScriptedOcr {
        outcome: OcrOutcome,
        calls: AtomicUsize,
        saw_multi_page: AtomicBool,
    }

    impl ScriptedOcr {
        fn recognizing(text: &str, confidence: f64) -> Self {
            Self {
                outcome: OcrOutcome::Recognized {
                    text: text.to_string(),
                    confidence,
                },
                calls: AtomicUsize::new(0),
                saw_multi_page: AtomicBool::new(false),
            }
        }

        fn unavailable(reason: UnavailableReason) -> Self {
            Self {
                outcome: OcrOutcome::Unavailable(reason),
                calls: AtomicUsize::new(0),
                saw_multi_page: AtomicBool::new(false),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl OcrEngine for ScriptedOcr {
        async fn recognize(
            &self,
            _bytes: &[u8],
            multi_page: bool,
            _language: &str,
        ) -> Result<OcrOutcome, PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.saw_multi_page.store(multi_page, Ordering::SeqCst);
            Ok(self.outcome.clone())
        }
    }

    #[tokio::test]
    async fn text_rich_page_never_touches_ocr() {
        let body = "Bonjour, je m'appelle Marie. ".repeat(4);
        let pdf = extractor::fixtures::text_pdf(body.trim());
        let ocr = ScriptedOcr::recognizing("should not be used", 1.0);

        let doc = extract(&pdf, MediaKind::Pdf, &ocr, &ExtractConfig::default(), "French")
            .await
            .unwrap();

        assert_eq!(ocr.calls(), 0);
        assert_eq!(doc.pages.len(), 1);
        assert_eq!(doc.pages[0].source, PageSource::TextLayer);
        assert!(!doc.pages[0].image_heavy);
        assert!(doc.text.contains("Marie"));
        assert!(!chunk_text(&doc.text, 30, 200).is_empty());
    }

    #[tokio::test]
    async fn image_page_with_rejected_ocr_degrades_to_empty() {
        let pdf = extractor::fixtures::image_page_pdf("Voir");
        let ocr = ScriptedOcr::unavailable(UnavailableReason::LowConfidence);

        let doc = extract(&pdf, MediaKind::Pdf, &ocr, &ExtractConfig::default(), "French")
            .await
            .unwrap();

        assert_eq!(ocr.calls(), 1);
        assert_eq!(doc.pages.len(), 1);
        assert_eq!(doc.pages[0].source, PageSource::Ocr);
        assert!(doc.pages[0].image_heavy);
        assert!(doc.is_empty());
    }

    #[tokio::test]
    async fn embedded_image_forces_ocr_even_with_long_text() {
        let caption = "Une legende assez longue pour depasser le plancher de caracteres \
                       visibles du detecteur de pages dominees par l'image.";
        let pdf = extractor::fixtures::image_page_pdf(caption);
        let ocr = ScriptedOcr::recognizing("Texte reconnu.", 0.95);

        let doc = extract(&pdf, MediaKind::Pdf, &ocr, &ExtractConfig::default(), "French")
            .await
            .unwrap();

        assert_eq!(ocr.calls(), 1);
        assert_eq!(doc.pages[0].source, PageSource::Ocr);
        assert_eq!(doc.text, "Texte reconnu.");
    }

    #[tokio::test]
    async fn empty_pages_are_dropped_from_the_joined_text() {
        let body = "Cette page contient suffisamment de texte direct pour rester sur \
                    la couche texte sans jamais passer par la reconnaissance optique.";
        let pdf = extractor::fixtures::multipage_pdf(&[body, "x"]);
        let ocr = ScriptedOcr::unavailable(UnavailableReason::NotConfigured);

        let doc = extract(&pdf, MediaKind::Pdf, &ocr, &ExtractConfig::default(), "French")
            .await
            .unwrap();

        assert_eq!(doc.pages.len(), 2);
        assert_eq!(ocr.calls(), 1);
        assert!(doc.text.contains("couche texte"));
        assert!(!doc.text.contains("\n\n"), "empty page left a separator behind");
    }

    #[tokio::test]
    async fn single_image_bytes_go_straight_to_the_gate() {
        let ocr = ScriptedOcr::recognizing("Le chat dort.", 0.92);

        let doc = extract(
            b"fake png bytes",
            MediaKind::Image,
            &ocr,
            &ExtractConfig::default(),
            "French",
        )
        .await
        .unwrap();

        assert_eq!(ocr.calls(), 1);
        assert!(!ocr.saw_multi_page.load(Ordering::SeqCst));
        assert_eq!(doc.pages.len(), 1);
        assert_eq!(doc.pages[0].source, PageSource::Ocr);
        assert_eq!(doc.text, "Le chat dort.");
    }

    #[tokio::test]
    async fn text_kind_is_decoded_without_ocr() {
        let ocr = ScriptedOcr::recognizing("unused", 1.0);

        let doc = extract(
            "  Bonjour le monde.\n".as_bytes(),
            MediaKind::Text,
            &ocr,
            &ExtractConfig::default(),
            "French",
        )
        .await
        .unwrap();

        assert_eq!(ocr.calls(), 0);
        assert_eq!(doc.text, "Bonjour le monde.");
        assert_eq!(doc.pages[0].source, PageSource::TextLayer);
    }

    #[tokio::test]
    async fn unknown_kind_yields_an_empty_document() {
        let ocr = ScriptedOcr::recognizing("unused", 1.0);

        let doc = extract(
            b"\x00\x01\x02",
            MediaKind::Unknown,
            &ocr,
            &ExtractConfig::default(),
            "French",
        )
        .await
        .unwrap();

        assert_eq!(ocr.calls(), 0);
        assert!(doc.pages.is_empty());
        assert!(doc.is_empty());
    }

    #[tokio::test]
    async fn unreadable_pdf_is_a_format_error() {
        let ocr = ScriptedOcr::recognizing("unused", 1.0);

        let result = extract(
            b"junk bytes",
            MediaKind::Pdf,
            &ocr,
            &ExtractConfig::default(),
            "French",
        )
        .await;

        assert!(matches!(result, Err(PipelineError::DocumentFormat(_))));
    }

    #[test]
    fn media_kind_guessing_is_extension_based() {
        assert_eq!(MediaKind::guess("uploads/book.pdf"), MediaKind::Pdf);
        assert_eq!(MediaKind::guess("uploads/BOOK.PDF"), MediaKind::Pdf);
        assert_eq!(MediaKind::guess("scan.png"), MediaKind::Image);
        assert_eq!(MediaKind::guess("photo.JPG"), MediaKind::Image);
        assert_eq!(MediaKind::guess("page.jpeg"), MediaKind::Image);
        assert_eq!(MediaKind::guess("notes.txt"), MediaKind::Text);
        assert_eq!(MediaKind::guess("archive.zip"), MediaKind::Unknown);
        assert_eq!(MediaKind::guess("no-extension"), MediaKind::Unknown);
    }
}
