//! Format-aware text recovery.
//!
//! Dispatches on lower-cased extension/content-type to a per-format strategy
//! and demotes every structured-parser failure to a best-effort byte decode.
//! Nothing here propagates an error — the pipeline always receives *some*
//! normalized text, possibly empty.

use crate::config::PipelineConfig;
use crate::pipeline::heuristics;
use crate::pipeline::ocr;
use crate::pipeline::office;
use crate::pipeline::pdf;
use crate::pipeline::types::{ExtractedText, RawDocument};

/// Minimum alphabetic characters before text is trusted at all.
const MIN_ALPHABETIC_CHARS: usize = 120;
/// Minimum printable-to-total ratio before text is trusted.
const MIN_PRINTABLE_RATIO: f64 = 0.35;

/// Shared garbage-text heuristic, reused by every OCR decision.
///
/// Text is garbage when it has fewer than 120 alphabetic characters or its
/// printable-to-total ratio is below 0.35.
pub fn is_garbage_text(text: &str) -> bool {
    let total = text.chars().count();
    if total == 0 {
        return true;
    }
    let alphabetic = text.chars().filter(|c| c.is_alphabetic()).count();
    if alphabetic < MIN_ALPHABETIC_CHARS {
        return true;
    }
    let printable = text
        .chars()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .count();
    (printable as f64 / total as f64) < MIN_PRINTABLE_RATIO
}

/// Best-effort byte decode: lossy UTF-8 with non-printables spaced out.
fn fallback_decode(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .chars()
        .map(|c| {
            if c.is_control() && c != '\n' && c != '\t' {
                ' '
            } else {
                c
            }
        })
        .collect()
}

fn is_image_extension(ext: &str) -> bool {
    matches!(
        ext,
        "png" | "jpg" | "jpeg" | "gif" | "bmp" | "tif" | "tiff" | "webp" | "heic"
    )
}

/// Recover normalized text from a document, applying the OCR fallback engine
/// where the format or the recovered text quality demands it.
pub async fn extract_text(doc: &RawDocument, cfg: &PipelineConfig) -> ExtractedText {
    let extension = doc.extension();
    let content_type = doc
        .content_type
        .as_deref()
        .unwrap_or_default()
        .to_lowercase();

    let (raw, page_label) = if extension == "pdf" || content_type.contains("pdf") {
        extract_pdf(doc, cfg).await
    } else if extension == "docx" {
        (extract_word(doc, cfg).await, None)
    } else if extension == "xlsx" {
        let text = office::extract_xlsx_text(&doc.bytes).unwrap_or_else(|e| {
            tracing::debug!(file = %doc.file_name, error = %e, "xlsx parse failed, raw decode");
            fallback_decode(&doc.bytes)
        });
        (text, None)
    } else if is_image_extension(&extension) || content_type.starts_with("image/") {
        (ocr::recognize(&doc.bytes, &doc.file_name, cfg).await, None)
    } else if matches!(extension.as_str(), "txt" | "md" | "csv" | "tsv")
        || content_type.starts_with("text/")
    {
        (String::from_utf8_lossy(&doc.bytes).into_owned(), None)
    } else {
        (fallback_decode(&doc.bytes), None)
    };

    ExtractedText::normalized(&raw, cfg.max_pipeline_chars).with_page_range(page_label)
}

/// PDF text layer with page-range selection; OCR when the layer is garbage.
async fn extract_pdf(doc: &RawDocument, cfg: &PipelineConfig) -> (String, Option<String>) {
    let (layer_text, label) = match pdf::extract_pages(&doc.bytes) {
        Ok(pages) => pdf::select_pages(&pages, cfg.page_range.as_deref()),
        Err(e) => {
            tracing::debug!(file = %doc.file_name, error = %e, "PDF parse failed, raw decode");
            (fallback_decode(&doc.bytes), None)
        }
    };

    if layer_text.trim().is_empty() || is_garbage_text(&layer_text) {
        let ocr_text = ocr::recognize(&doc.bytes, &doc.file_name, cfg).await;
        if ocr_text.chars().count() > layer_text.chars().count() {
            return (ocr_text, label);
        }
    }
    (layer_text, label)
}

/// Word-processor recovery; embedded-image OCR when the body text is empty,
/// garbage, or yields too few heuristic pairs.
async fn extract_word(doc: &RawDocument, cfg: &PipelineConfig) -> String {
    let body = match office::extract_docx_text(&doc.bytes) {
        Ok(text) => text,
        Err(e) => {
            tracing::debug!(file = %doc.file_name, error = %e, "docx parse failed, raw decode");
            fallback_decode(&doc.bytes)
        }
    };

    let pair_yield = heuristics::extract_pairs(&body).len();
    let needs_ocr =
        body.trim().is_empty() || is_garbage_text(&body) || pair_yield < cfg.min_pairs_before_ocr;
    if !needs_ocr {
        return body;
    }

    let images = office::docx_embedded_images(&doc.bytes);
    if images.is_empty() {
        return body;
    }
    tracing::debug!(
        file = %doc.file_name,
        images = images.len(),
        pair_yield,
        "running embedded-image OCR"
    );
    let recognized = ocr::recognize_batch(&images, cfg).await;
    let mut combined = body;
    for text in recognized {
        if !text.trim().is_empty() {
            combined.push('\n');
            combined.push_str(&text);
        }
    }
    combined
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_cfg() -> PipelineConfig {
        PipelineConfig {
            ocr_api_key: None,
            disable_local_ocr: true,
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn short_alphabetic_text_is_garbage() {
        // 40 alphabetic characters — under the 120 minimum.
        let text = "abcdefghij".repeat(4);
        assert_eq!(text.chars().filter(|c| c.is_alphabetic()).count(), 40);
        assert!(is_garbage_text(&text));
    }

    #[test]
    fn readable_paragraph_is_not_garbage() {
        let text = "Photosynthesis is the process by which green plants convert light \
                    energy into chemical energy stored in glucose molecules over time."
            .repeat(2);
        assert!(!is_garbage_text(&text));
    }

    #[test]
    fn empty_text_is_garbage() {
        assert!(is_garbage_text(""));
    }

    #[test]
    fn control_heavy_text_is_garbage() {
        let mut text = "abcdefghijklmnopqrstuvwxyz".repeat(5);
        text.push_str(&"\u{0001}\u{0002}\u{0003}".repeat(120));
        assert!(is_garbage_text(&text));
    }

    #[test]
    fn fallback_decode_spaces_out_non_printables() {
        let decoded = fallback_decode(b"ok\x00\x01here\tkeep\nlines");
        assert_eq!(decoded, "ok  here\tkeep\nlines");
    }

    #[tokio::test]
    async fn plain_text_decoded_directly() {
        let doc = RawDocument::new(b"alpha: first letter".to_vec(), "notes.txt", None);
        let text = extract_text(&doc, &offline_cfg()).await;
        assert_eq!(text.text, "alpha: first letter");
        assert!(text.page_range_applied.is_none());
    }

    #[tokio::test]
    async fn content_type_text_wins_over_unknown_extension() {
        let doc = RawDocument::new(
            b"beta: second letter".to_vec(),
            "export.dat",
            Some("text/plain".into()),
        );
        let text = extract_text(&doc, &offline_cfg()).await;
        assert_eq!(text.text, "beta: second letter");
    }

    #[tokio::test]
    async fn broken_pdf_demotes_to_raw_decode() {
        let doc = RawDocument::new(b"%PDF-not really\x00binary".to_vec(), "broken.pdf", None);
        let text = extract_text(&doc, &offline_cfg()).await;
        // No panic, no error — best-effort text comes back.
        assert!(text.text.contains("PDF-not really"));
    }

    #[tokio::test]
    async fn unknown_binary_demotes_to_spaced_decode() {
        let doc = RawDocument::new(vec![0x4D, 0x5A, 0x00, 0x41, 0x42], "tool.exe", None);
        let text = extract_text(&doc, &offline_cfg()).await;
        assert!(text.text.contains("AB"));
    }

    #[tokio::test]
    async fn image_without_ocr_config_yields_empty() {
        let doc = RawDocument::new(vec![0x89, 0x50, 0x4E, 0x47], "scan.png", None);
        let text = extract_text(&doc, &offline_cfg()).await;
        assert!(text.text.is_empty());
    }
}
