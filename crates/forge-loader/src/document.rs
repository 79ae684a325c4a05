//! Plain-text extraction for PDF, DOCX and TXT documents.

use std::io::{Cursor, Read};
use std::panic;

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::warn;
use zip::ZipArchive;

use crate::error::IngestError;

const FORM_FEED: char = '\u{c}';

/// Extract the text of every page, pages separated by a blank line.
///
/// pdf-extract can panic on some embedded fonts; that is reported as a
/// malformed file rather than unwinding into the caller.
pub fn read_pdf(bytes: &[u8]) -> Result<String, IngestError> {
    let extraction = panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes));

    let text = match extraction {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => return Err(IngestError::malformed("pdf", e)),
        Err(_) => {
            warn!("pdf-extract panicked while reading document");
            return Err(IngestError::malformed("pdf", "text extraction failed"));
        }
    };

    let pages: Vec<&str> = text
        .split(FORM_FEED)
        .map(str::trim)
        .filter(|page| !page.is_empty())
        .collect();
    Ok(pages.join("\n\n"))
}

/// Extract the non-blank paragraphs of a DOCX body, one per line.
pub fn read_docx(bytes: &[u8]) -> Result<String, IngestError> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|e| IngestError::malformed("docx", e))?;

    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| IngestError::malformed("docx", e))?
        .read_to_string(&mut xml)
        .map_err(|e| IngestError::malformed("docx", e))?;

    let paragraphs = docx_paragraphs(&xml)?;
    Ok(paragraphs
        .into_iter()
        .filter(|p| !p.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n"))
}

fn docx_paragraphs(xml: &str) -> Result<Vec<String>, IngestError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"p" => current.clear(),
                b"t" => in_text = true,
                _ => {}
            },
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"p" => paragraphs.push(std::mem::take(&mut current)),
                b"t" => in_text = false,
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => current.push('\t'),
                b"br" | b"cr" => current.push('\n'),
                _ => {}
            },
            Ok(Event::Text(e)) if in_text => {
                let text = e.unescape().map_err(|e| IngestError::malformed("docx", e))?;
                current.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(IngestError::malformed("docx", e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(paragraphs)
}

/// Decode a UTF-8 text file, dropping a leading byte-order mark.
pub fn read_text(bytes: &[u8]) -> Result<String, IngestError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| IngestError::malformed("text", format!("not valid UTF-8: {}", e)))?;
    Ok(text.strip_prefix('\u{feff}').unwrap_or(text).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn build_docx(body: &str) -> Vec<u8> {
        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}</w:body></w:document>"#,
            body
        );
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("word/document.xml", SimpleFileOptions::default())
            .unwrap();
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn test_read_docx_paragraphs() {
        let bytes = build_docx(
            "<w:p><w:r><w:t>Quarterly</w:t></w:r><w:r><w:t xml:space=\"preserve\"> report</w:t></w:r></w:p>\
             <w:p></w:p>\
             <w:p><w:r><w:t>Revenue &amp; costs</w:t><w:tab/><w:t>up</w:t></w:r></w:p>",
        );
        let text = read_docx(&bytes).unwrap();
        assert_eq!(text, "Quarterly report\nRevenue & costs\tup");
    }

    #[test]
    fn test_read_docx_without_body_is_malformed() {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("other.xml", SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"<x/>").unwrap();
        let bytes = zip.finish().unwrap().into_inner();
        assert!(matches!(
            read_docx(&bytes),
            Err(IngestError::Malformed { .. })
        ));
    }

    #[test]
    fn test_read_docx_not_a_zip() {
        assert!(matches!(
            read_docx(b"plain text"),
            Err(IngestError::Malformed { .. })
        ));
    }

    #[test]
    fn test_read_pdf_garbage_is_malformed() {
        assert!(matches!(
            read_pdf(b"%PDF-1.4 truncated"),
            Err(IngestError::Malformed { .. })
        ));
    }

    #[test]
    fn test_read_text() {
        assert_eq!(read_text("\u{feff}hello".as_bytes()).unwrap(), "hello");
        assert!(matches!(
            read_text(&[0xff, 0xfe, 0x00]),
            Err(IngestError::Malformed { .. })
        ));
    }
}
