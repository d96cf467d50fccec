//! Source documents handed to the generator
//!
//! Uploaded statements are opaque here: a name, a MIME type and the raw
//! bytes. The only conversion is into an inline, base64-encoded model part.

use crate::error::OrchestrationError;
use crate::Result;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// MIME types the model accepts as inline document parts.
const SUPPORTED_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "image/png",
    "image/jpeg",
    "image/webp",
    "text/plain",
    "text/csv",
];

#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Base64 payload as it travels over the HTTP API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedDocument {
    pub file_name: String,
    pub mime_type: String,
    pub data: String,
}

/// Inline data part understood by the Gemini API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

impl SourceDocument {
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// Read a document from disk, guessing the MIME type from its extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mime_type = match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .as_deref()
        {
            Some("pdf") => "application/pdf",
            Some("png") => "image/png",
            Some("jpg") | Some("jpeg") => "image/jpeg",
            Some("webp") => "image/webp",
            Some("csv") => "text/csv",
            _ => "text/plain",
        };

        Ok(Self::new(file_name, mime_type, bytes))
    }

    pub fn to_inline_data(&self) -> Result<InlineData> {
        if self.bytes.is_empty() {
            return Err(OrchestrationError::InvalidDocument(format!(
                "Document '{}' is empty",
                self.file_name
            )));
        }

        if !SUPPORTED_MIME_TYPES.contains(&self.mime_type.as_str()) {
            return Err(OrchestrationError::InvalidDocument(format!(
                "Unsupported document type '{}' for '{}'",
                self.mime_type, self.file_name
            )));
        }

        Ok(InlineData {
            mime_type: self.mime_type.clone(),
            data: STANDARD.encode(&self.bytes),
        })
    }
}

impl TryFrom<EncodedDocument> for SourceDocument {
    type Error = OrchestrationError;

    fn try_from(encoded: EncodedDocument) -> Result<Self> {
        let bytes = STANDARD.decode(encoded.data.trim()).map_err(|e| {
            OrchestrationError::InvalidDocument(format!(
                "Document '{}' is not valid base64: {}",
                encoded.file_name, e
            ))
        })?;

        Ok(Self::new(encoded.file_name, encoded.mime_type, bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoded_document_decodes() {
        let encoded = EncodedDocument {
            file_name: "fy2025.txt".into(),
            mime_type: "text/plain".into(),
            data: STANDARD.encode("Revenue 1000"),
        };

        let doc = SourceDocument::try_from(encoded).unwrap();
        assert_eq!(doc.bytes, b"Revenue 1000");

        let inline = doc.to_inline_data().unwrap();
        assert_eq!(inline.mime_type, "text/plain");
        assert_eq!(inline.data, STANDARD.encode("Revenue 1000"));
    }

    #[test]
    fn test_rejects_unsupported_type() {
        let doc = SourceDocument::new("book.xlsx", "application/vnd.ms-excel", vec![1, 2, 3]);
        assert!(matches!(
            doc.to_inline_data(),
            Err(OrchestrationError::InvalidDocument(_))
        ));
    }

    #[test]
    fn test_from_path_guesses_mime_type() {
        let path = std::env::temp_dir().join(format!("statement-{}.PDF", uuid::Uuid::new_v4()));
        std::fs::write(&path, b"%PDF-1.7").unwrap();

        let doc = SourceDocument::from_path(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(doc.mime_type, "application/pdf");
        assert_eq!(doc.bytes, b"%PDF-1.7");
        assert!(doc.file_name.ends_with(".PDF"));
    }

    #[test]
    fn test_rejects_bad_base64() {
        let encoded = EncodedDocument {
            file_name: "x.pdf".into(),
            mime_type: "application/pdf".into(),
            data: "@@not-base64@@".into(),
        };
        let err = SourceDocument::try_from(encoded).unwrap_err();
        assert!(matches!(err, OrchestrationError::InvalidDocument(_)));
        assert!(err.to_string().starts_with("Invalid document: Document 'x.pdf'"));
    }
}
