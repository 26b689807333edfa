//! PDF text-layer recovery.
//!
//! Pure-Rust page-indexed extraction via lopdf. Scanned PDFs yield empty or
//! garbage text here and fall through to the OCR engine in `format.rs`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PdfError {
    #[error("PDF parsing failed: {0}")]
    Parse(String),
}

/// Extract the text layer of every page, in page order.
///
/// Pages whose content streams fail to decode contribute an empty string
/// rather than failing the whole document.
pub fn extract_pages(bytes: &[u8]) -> Result<Vec<String>, PdfError> {
    let doc = lopdf::Document::load_mem(bytes).map_err(|e| PdfError::Parse(e.to_string()))?;
    let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();

    let mut pages = Vec::with_capacity(page_numbers.len());
    for number in page_numbers {
        let text = doc.extract_text(&[number]).unwrap_or_default();
        pages.push(text);
    }
    Ok(pages)
}

/// Parse a free-text page selector ("3-7", "4", "all") against a known page
/// count. Returns the 1-based inclusive range to keep, or None for "all
/// pages". Out-of-range bounds are clamped, inverted ranges rejected.
pub fn parse_page_range(raw: &str, page_count: usize) -> Option<(usize, usize)> {
    let raw = raw.trim().to_lowercase();
    if raw.is_empty() || raw == "all" || page_count == 0 {
        return None;
    }

    if let Some((start, end)) = raw.split_once('-') {
        let start: usize = start.trim().parse().ok()?;
        let end: usize = end.trim().parse().ok()?;
        if start == 0 || start > end {
            return None;
        }
        let start = start.min(page_count);
        let end = end.min(page_count);
        return Some((start, end));
    }

    let single: usize = raw.parse().ok()?;
    if single == 0 {
        return None;
    }
    let single = single.min(page_count);
    Some((single, single))
}

/// Join the selected pages into one text blob, returning the applied-range
/// label for the diagnostic result.
pub fn select_pages(pages: &[String], selector: Option<&str>) -> (String, Option<String>) {
    let range = selector.and_then(|s| parse_page_range(s, pages.len()));
    match range {
        None => {
            let label = selector.map(|_| "all".to_string());
            (pages.join("\n"), label)
        }
        Some((start, end)) => {
            let joined = pages[start - 1..end].join("\n");
            let label = if start == end {
                format!("{start}")
            } else {
                format!("{start}-{end}")
            };
            (joined, Some(label))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("page {i}")).collect()
    }

    #[test]
    fn range_parses_span() {
        assert_eq!(parse_page_range("3-7", 10), Some((3, 7)));
        assert_eq!(parse_page_range(" 2 - 4 ", 10), Some((2, 4)));
    }

    #[test]
    fn range_parses_single_page() {
        assert_eq!(parse_page_range("4", 10), Some((4, 4)));
    }

    #[test]
    fn range_all_and_blank_select_everything() {
        assert_eq!(parse_page_range("all", 10), None);
        assert_eq!(parse_page_range("", 10), None);
        assert_eq!(parse_page_range("ALL", 10), None);
    }

    #[test]
    fn range_clamped_to_page_count() {
        assert_eq!(parse_page_range("3-50", 5), Some((3, 5)));
        assert_eq!(parse_page_range("9", 5), Some((5, 5)));
    }

    #[test]
    fn inverted_or_zero_range_rejected() {
        assert_eq!(parse_page_range("7-3", 10), None);
        assert_eq!(parse_page_range("0-3", 10), None);
        assert_eq!(parse_page_range("0", 10), None);
    }

    #[test]
    fn garbage_selector_selects_everything() {
        assert_eq!(parse_page_range("first few", 10), None);
    }

    #[test]
    fn select_pages_applies_label() {
        let (text, label) = select_pages(&pages(5), Some("2-3"));
        assert_eq!(text, "page 2\npage 3");
        assert_eq!(label.as_deref(), Some("2-3"));
    }

    #[test]
    fn select_pages_single_label() {
        let (text, label) = select_pages(&pages(5), Some("4"));
        assert_eq!(text, "page 4");
        assert_eq!(label.as_deref(), Some("4"));
    }

    #[test]
    fn select_pages_without_selector_has_no_label() {
        let (text, label) = select_pages(&pages(2), None);
        assert_eq!(text, "page 1\npage 2");
        assert!(label.is_none());
    }

    #[test]
    fn invalid_pdf_bytes_error() {
        let result = extract_pages(b"not a pdf at all");
        assert!(matches!(result, Err(PdfError::Parse(_))));
    }
}
