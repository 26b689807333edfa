//! Word-processor and spreadsheet text recovery.
//!
//! Both .docx and .xlsx are ZIP containers of XML parts. We flatten them with
//! lightweight tag stripping rather than a full XML stack — the downstream
//! heuristics only need line-oriented text.

use std::io::Read;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OfficeError {
    #[error("archive error: {0}")]
    Archive(String),
    #[error("missing part: {0}")]
    MissingPart(&'static str),
}

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));
static SHARED_STRING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<si>.*?</si>").expect("valid regex"));
static CELL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<c\b([^>]*)>(.*?)</c>").expect("valid regex"));
static VALUE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<v>(.*?)</v>").expect("valid regex"));
static ROW_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<row[^>]*>.*?</row>").expect("valid regex"));

fn open_zip(bytes: &[u8]) -> Result<zip::ZipArchive<std::io::Cursor<&[u8]>>, OfficeError> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| OfficeError::Archive(e.to_string()))
}

fn read_part(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
) -> Option<String> {
    let mut file = archive.by_name(name).ok()?;
    let mut content = String::new();
    file.read_to_string(&mut content).ok()?;
    Some(content)
}

/// Decode the XML entities .docx/.xlsx text actually contains.
fn decode_entities(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
}

/// Extract the document body text of a .docx file.
///
/// Paragraph and tab markers become newlines/tabs before tags are stripped,
/// so line-oriented pair extraction sees the original layout.
pub fn extract_docx_text(bytes: &[u8]) -> Result<String, OfficeError> {
    let mut archive = open_zip(bytes)?;
    let xml = read_part(&mut archive, "word/document.xml")
        .ok_or(OfficeError::MissingPart("word/document.xml"))?;

    let with_breaks = xml
        .replace("</w:p>", "\n")
        .replace("<w:tab/>", "\t")
        .replace("<w:br/>", "\n");
    let stripped = TAG_RE.replace_all(&with_breaks, "");
    Ok(decode_entities(stripped.trim()))
}

/// Embedded images of a .docx file (word/media/*), for OCR fallback.
pub fn docx_embedded_images(bytes: &[u8]) -> Vec<Vec<u8>> {
    let mut archive = match open_zip(bytes) {
        Ok(a) => a,
        Err(_) => return Vec::new(),
    };

    let names: Vec<String> = (0..archive.len())
        .filter_map(|i| archive.by_index(i).ok().map(|f| f.name().to_string()))
        .filter(|n| n.starts_with("word/media/"))
        .collect();

    let mut images = Vec::new();
    for name in names {
        if let Ok(mut file) = archive.by_name(&name) {
            let mut buf = Vec::new();
            if file.read_to_end(&mut buf).is_ok() && !buf.is_empty() {
                images.push(buf);
            }
        }
    }
    images
}

/// Flatten every sheet of a .xlsx file into tab-delimited rows.
pub fn extract_xlsx_text(bytes: &[u8]) -> Result<String, OfficeError> {
    let mut archive = open_zip(bytes)?;

    // Shared strings are referenced by index from the sheets.
    let shared: Vec<String> = read_part(&mut archive, "xl/sharedStrings.xml")
        .map(|xml| {
            SHARED_STRING_RE
                .find_iter(&xml)
                .map(|m| decode_entities(TAG_RE.replace_all(m.as_str(), "").trim()))
                .collect()
        })
        .unwrap_or_default();

    let sheet_names: Vec<String> = (0..archive.len())
        .filter_map(|i| archive.by_index(i).ok().map(|f| f.name().to_string()))
        .filter(|n| n.starts_with("xl/worksheets/") && n.ends_with(".xml"))
        .collect();
    if sheet_names.is_empty() {
        return Err(OfficeError::MissingPart("xl/worksheets"));
    }

    let mut out = String::new();
    for name in sheet_names {
        let Some(xml) = read_part(&mut archive, &name) else {
            continue;
        };
        for row in ROW_RE.find_iter(&xml) {
            let cells: Vec<String> = CELL_RE
                .captures_iter(row.as_str())
                .map(|cap| {
                    let is_shared = cap
                        .get(1)
                        .is_some_and(|attrs| attrs.as_str().contains(r#"t="s""#));
                    let raw = VALUE_RE
                        .captures(cap.get(2).map_or("", |m| m.as_str()))
                        .and_then(|v| v.get(1))
                        .map(|v| v.as_str().trim().to_string())
                        .unwrap_or_default();
                    if is_shared {
                        raw.parse::<usize>()
                            .ok()
                            .and_then(|idx| shared.get(idx).cloned())
                            .unwrap_or(raw)
                    } else {
                        decode_entities(&raw)
                    }
                })
                .collect();
            let line = cells.join("\t");
            if !line.trim().is_empty() {
                out.push_str(&line);
                out.push('\n');
            }
        }
    }
    Ok(out.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn build_zip(parts: &[(&str, &[u8])]) -> Vec<u8> {
        let mut buf = std::io::Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buf);
            let options = zip::write::SimpleFileOptions::default();
            for (name, content) in parts {
                writer.start_file(*name, options).unwrap();
                writer.write_all(content).unwrap();
            }
            writer.finish().unwrap();
        }
        buf.into_inner()
    }

    #[test]
    fn docx_text_preserves_paragraph_breaks() {
        let xml = "<w:document><w:body>\
            <w:p><w:r><w:t>Photosynthesis - light to energy</w:t></w:r></w:p>\
            <w:p><w:r><w:t>Mitosis: cell division</w:t></w:r></w:p>\
            </w:body></w:document>";
        let bytes = build_zip(&[("word/document.xml", xml.as_bytes())]);
        let text = extract_docx_text(&bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Photosynthesis - light to energy");
        assert_eq!(lines[1], "Mitosis: cell division");
    }

    #[test]
    fn docx_decodes_entities() {
        let xml = "<w:document><w:p><w:t>salt &amp; pepper</w:t></w:p></w:document>";
        let bytes = build_zip(&[("word/document.xml", xml.as_bytes())]);
        assert_eq!(extract_docx_text(&bytes).unwrap(), "salt & pepper");
    }

    #[test]
    fn docx_missing_body_part_errors() {
        let bytes = build_zip(&[("other.xml", b"<a/>")]);
        assert!(matches!(
            extract_docx_text(&bytes),
            Err(OfficeError::MissingPart(_))
        ));
    }

    #[test]
    fn docx_embedded_images_found() {
        let bytes = build_zip(&[
            ("word/document.xml", b"<w:document/>" as &[u8]),
            ("word/media/image1.png", &[0x89, 0x50, 0x4E, 0x47]),
            ("word/media/image2.jpg", &[0xFF, 0xD8, 0xFF]),
        ]);
        let images = docx_embedded_images(&bytes);
        assert_eq!(images.len(), 2);
    }

    #[test]
    fn docx_embedded_images_tolerates_bad_archive() {
        assert!(docx_embedded_images(b"not a zip").is_empty());
    }

    #[test]
    fn xlsx_flattens_shared_strings() {
        let shared = "<sst><si><t>Term</t></si><si><t>Meaning</t></si></sst>";
        let sheet = r#"<worksheet><sheetData>
            <row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c></row>
            <row r="2"><c r="A2"><v>42</v></c></row>
        </sheetData></worksheet>"#;
        let bytes = build_zip(&[
            ("xl/sharedStrings.xml", shared.as_bytes()),
            ("xl/worksheets/sheet1.xml", sheet.as_bytes()),
        ]);
        let text = extract_xlsx_text(&bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Term\tMeaning");
        assert_eq!(lines[1], "42");
    }

    #[test]
    fn xlsx_without_sheets_errors() {
        let bytes = build_zip(&[("xl/sharedStrings.xml", b"<sst/>")]);
        assert!(matches!(
            extract_xlsx_text(&bytes),
            Err(OfficeError::MissingPart(_))
        ));
    }

    #[test]
    fn non_zip_bytes_error() {
        assert!(extract_docx_text(b"plain text").is_err());
        assert!(extract_xlsx_text(b"plain text").is_err());
    }
}
