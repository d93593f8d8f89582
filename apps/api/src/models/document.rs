use bytes::Bytes;

/// A PDF as received from the client. Discarded once its text is extracted.
#[derive(Debug, Clone)]
pub struct UploadedDocument {
    pub bytes: Bytes,
    /// Size as received; equals `bytes.len()` for fully buffered uploads.
    pub declared_size: usize,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
}

impl UploadedDocument {
    pub fn new(bytes: Bytes, file_name: Option<String>, content_type: Option<String>) -> Self {
        Self {
            declared_size: bytes.len(),
            bytes,
            file_name,
            content_type,
        }
    }

    /// Two uploads are the same file when their contents match byte for byte.
    pub fn same_content(&self, other: &UploadedDocument) -> bool {
        self.declared_size == other.declared_size && self.bytes == other.bytes
    }
}

/// Plain text recovered from a document: non-empty page blocks joined by `\n`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedText {
    pub text: String,
    /// Pages in the source document, including pages with no text.
    pub page_count: usize,
    pub pages_with_text: usize,
}

impl ExtractedText {
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}
