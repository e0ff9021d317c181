//! Upload media-type detection, content hashing, and best-effort PDF text
//! extraction.

use anyhow::Result;
use sha2::{Digest, Sha256};

/// Detect the media type of an upload from its bytes, falling back to the
/// filename extension. Only the formats the service accepts are recognized.
pub fn detect_mime(filename: &str, data: &[u8]) -> Option<&'static str> {
    if data.starts_with(b"%PDF") {
        return Some("application/pdf");
    }
    if let Ok(format) = image::guess_format(data) {
        return match format {
            image::ImageFormat::Png => Some("image/png"),
            image::ImageFormat::Jpeg => Some("image/jpeg"),
            _ => None,
        };
    }

    let lower = filename.to_lowercase();
    if lower.ends_with(".pdf") {
        Some("application/pdf")
    } else if lower.ends_with(".png") {
        Some("image/png")
    } else if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
        Some("image/jpeg")
    } else {
        None
    }
}

/// SHA-256 hex digest of the uploaded content.
pub fn content_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Extract text from a PDF file using lopdf.
///
/// Enrichment only: pages that fail to decode are skipped, and callers treat
/// a failure here as a missing hint, not an error.
pub fn extract_pdf_text(data: &[u8]) -> Result<String> {
    use lopdf::Document;
    use std::io::Cursor;

    let doc = Document::load_from(Cursor::new(data))
        .map_err(|e| anyhow::anyhow!("Failed to load PDF: {}", e))?;

    let mut text = String::new();
    for (page_num, _) in doc.get_pages() {
        if let Ok(content) = doc.extract_text(&[page_num]) {
            if !content.trim().is_empty() {
                text.push_str(&content);
                text.push('\n');
            }
        }
    }

    Ok(text)
}
