pub mod docx;
pub mod pdf;
pub mod text;
pub mod tokenizer;
pub mod xlsx;

use common::{error::AppError, storage::types::document_chunk::DocumentChunk};

/// Format detected from a document's mime type (falling back to magic bytes),
/// dispatching to the matching chunker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Xlsx,
    Docx,
    PlainText,
}

impl DocumentFormat {
    /// Detects format from mime type, falling back to magic-byte sniffing
    /// when the mime type is generic or absent.
    pub fn detect(mime_type: &str, bytes: &[u8]) -> Result<Self, AppError> {
        match mime_type {
            "application/pdf" => return Ok(Self::Pdf),
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            | "application/vnd.ms-excel" => return Ok(Self::Xlsx),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            | "application/msword" => return Ok(Self::Docx),
            "text/plain" | "text/markdown" => return Ok(Self::PlainText),
            _ => {}
        }

        match bytes {
            [b'%', b'P', b'D', b'F', ..] => Ok(Self::Pdf),
            // Both XLSX and DOCX are zip containers; their magic bytes alone
            // don't distinguish them, so an unrecognized mime falls through
            // to an unsupported-format error rather than guessing.
            [0x50, 0x4b, 0x03, 0x04, ..] => Err(AppError::ParseError(format!(
                "unsupported: zip-based document with unrecognized mime type {mime_type}"
            ))),
            _ => Ok(Self::PlainText),
        }
    }
}

/// The result of chunking a document: ordered `DocumentChunk` rows ready for
/// `DocumentChunk::replace_for_document`, plus any non-fatal notes (e.g.
/// skipped hidden sheets) worth recording in the document's processing log.
pub struct ChunkingOutput {
    pub chunks: Vec<DocumentChunk>,
    pub notes: Vec<String>,
}

impl ChunkingOutput {
    pub fn new(chunks: Vec<DocumentChunk>) -> Self {
        Self {
            chunks,
            notes: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_pdf_by_mime() {
        assert_eq!(
            DocumentFormat::detect("application/pdf", b"").unwrap(),
            DocumentFormat::Pdf
        );
    }

    #[test]
    fn detects_pdf_by_magic_bytes() {
        assert_eq!(
            DocumentFormat::detect("application/octet-stream", b"%PDF-1.7").unwrap(),
            DocumentFormat::Pdf
        );
    }

    #[test]
    fn rejects_unrecognized_zip_container() {
        let result = DocumentFormat::detect("application/octet-stream", &[0x50, 0x4b, 0x03, 0x04]);
        assert!(result.is_err());
    }

    #[test]
    fn falls_back_to_plain_text() {
        assert_eq!(
            DocumentFormat::detect("application/octet-stream", b"hello world").unwrap(),
            DocumentFormat::PlainText
        );
    }
}
