//! Plain-text extraction for uploaded documents.
//!
//! PDF is the primary format; UTF-8 text and markdown are accepted as-is. The format is taken
//! from the declared content type, then the file extension, then the leading magic bytes.

use super::types::{Document, IngestError};

const MIME_PDF: &str = "application/pdf";
const MIME_TEXT: &str = "text/plain";
const MIME_MARKDOWN: &str = "text/markdown";
const MIME_OCTET_STREAM: &str = "application/octet-stream";
const PDF_MAGIC: &[u8] = b"%PDF-";

/// Formats the ingestor can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// Portable Document Format.
    Pdf,
    /// UTF-8 text, including markdown.
    Text,
}

/// Text pulled out of a document.
#[derive(Debug, Clone)]
pub struct ExtractedText {
    /// Detected source format.
    pub format: DocumentFormat,
    /// Extracted text.
    pub text: String,
}

/// Work out the document format, or report the hint that could not be matched.
pub fn detect_format(document: &Document) -> Result<DocumentFormat, IngestError> {
    let declared = document
        .content_type
        .as_deref()
        .map(|value| {
            value
                .split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        })
        .filter(|value| !value.is_empty() && value != MIME_OCTET_STREAM);

    if let Some(content_type) = declared.as_deref() {
        match content_type {
            MIME_PDF => return Ok(DocumentFormat::Pdf),
            MIME_TEXT | MIME_MARKDOWN => return Ok(DocumentFormat::Text),
            _ => {}
        }
    }

    let extension = document
        .name
        .rsplit_once('.')
        .map(|(_, extension)| extension.to_ascii_lowercase());
    match extension.as_deref() {
        Some("pdf") => return Ok(DocumentFormat::Pdf),
        Some("txt" | "md" | "markdown") => return Ok(DocumentFormat::Text),
        _ => {}
    }

    if document.bytes.starts_with(PDF_MAGIC) {
        return Ok(DocumentFormat::Pdf);
    }

    Err(IngestError::UnsupportedFormat(
        declared
            .or(extension.map(|extension| format!(".{extension}")))
            .unwrap_or_else(|| "unknown".to_string()),
    ))
}

/// Extract plain text from a document.
///
/// PDF parsing is CPU-bound; async callers should run this on a blocking thread.
pub fn extract_text(document: &Document) -> Result<ExtractedText, IngestError> {
    let format = detect_format(document)?;
    let text = match format {
        DocumentFormat::Pdf => pdf_extract::extract_text_from_mem(&document.bytes)
            .map_err(|error| IngestError::Extraction(error.to_string()))?,
        DocumentFormat::Text => String::from_utf8(document.bytes.clone())
            .map_err(|error| IngestError::Extraction(format!("invalid UTF-8: {error}")))?,
    };

    if text.trim().is_empty() {
        return Err(IngestError::EmptyDocument);
    }

    tracing::debug!(
        document = %document.name,
        ?format,
        bytes = document.bytes.len(),
        chars = text.chars().count(),
        "Extracted document text"
    );
    Ok(ExtractedText { format, text })
}
