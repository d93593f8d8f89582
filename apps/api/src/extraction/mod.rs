//! Text Extractor — turns uploaded PDF bytes into plain resume text.
//!
//! `pdf_extract` can panic on malformed input instead of returning an error,
//! so every parse runs behind `catch_unwind` on the blocking pool.

use std::panic::{self, AssertUnwindSafe};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::errors::AppError;
use crate::models::document::ExtractedText;

/// Reads a document into one string per page.
///
/// Carried in `AppState` as `Arc<dyn DocumentReader>` so the pipeline can be
/// driven without real PDFs.
#[async_trait]
pub trait DocumentReader: Send + Sync {
    async fn read_pages(&self, bytes: Bytes) -> Result<Vec<String>, AppError>;
}

/// Production reader backed by `pdf_extract`.
pub struct PdfTextReader;

#[async_trait]
impl DocumentReader for PdfTextReader {
    async fn read_pages(&self, bytes: Bytes) -> Result<Vec<String>, AppError> {
        tokio::task::spawn_blocking(move || extract_pages(&bytes))
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("PDF extraction task failed: {e}")))?
    }
}

fn extract_pages(data: &[u8]) -> Result<Vec<String>, AppError> {
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem_by_pages(data)
    }));
    match result {
        Ok(Ok(pages)) => Ok(pages),
        Ok(Err(e)) => Err(AppError::UnreadableDocument(format!("PDF parsing failed: {e}"))),
        Err(_) => Err(AppError::UnreadableDocument(
            "the PDF parser rejected the file as malformed".into(),
        )),
    }
}

/// Joins the non-empty pages into an [`ExtractedText`].
///
/// Pages with no extractable text are skipped. A document with no pages at all
/// is unreadable; one whose pages are all empty comes back blank and is
/// rejected by the validation gate.
pub fn extract_text(pages: &[String]) -> Result<ExtractedText, AppError> {
    if pages.is_empty() {
        return Err(AppError::UnreadableDocument(
            "the document contains no pages".into(),
        ));
    }

    let cleaned: Vec<String> = pages.iter().map(|p| clean_page(p)).collect();
    let nonempty: Vec<&str> = cleaned
        .iter()
        .map(String::as_str)
        .filter(|s| !s.is_empty())
        .collect();

    debug!(
        "Extracted text from {}/{} pages",
        nonempty.len(),
        pages.len()
    );

    Ok(ExtractedText {
        text: nonempty.join("\n"),
        page_count: pages.len(),
        pages_with_text: nonempty.len(),
    })
}

/// Trims trailing whitespace per line, collapses runs of 3+ blank lines down
/// to 2, and drops leading/trailing blank lines. No trailing newline.
fn clean_page(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut blank_run = 0_u32;
    for line in raw.lines().map(str::trim_end) {
        if line.is_empty() {
            blank_run += 1;
            if blank_run <= 2 {
                out.push('\n');
            }
        } else {
            blank_run = 0;
            out.push_str(line);
            out.push('\n');
        }
    }

    out.trim_matches('\n').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_clean_page_trims_trailing_whitespace() {
        assert_eq!(clean_page("hello   \nworld  \n"), "hello\nworld");
    }

    #[test]
    fn test_clean_page_collapses_blank_lines() {
        assert_eq!(clean_page("a\n\n\n\n\nb\n"), "a\n\n\nb");
    }

    #[test]
    fn test_clean_page_whitespace_only_is_empty() {
        assert_eq!(clean_page(""), "");
        assert_eq!(clean_page(" \n\t\n  \n"), "");
    }

    #[test]
    fn test_empty_pages_are_skipped() {
        let text = extract_text(&pages(&["Experience\n", "   \n", "Education\n"])).unwrap();
        assert_eq!(text.text, "Experience\nEducation");
        assert_eq!(text.page_count, 3);
        assert_eq!(text.pages_with_text, 2);
    }

    #[test]
    fn test_all_empty_pages_yield_blank_text() {
        let text = extract_text(&pages(&["", "  \n"])).unwrap();
        assert!(text.is_blank());
        assert_eq!(text.page_count, 2);
        assert_eq!(text.pages_with_text, 0);
    }

    #[test]
    fn test_zero_pages_is_unreadable() {
        assert!(matches!(
            extract_text(&[]),
            Err(AppError::UnreadableDocument(_))
        ));
    }

    /// Two-page PDF: page one carries a line of Helvetica text, page two is blank.
    fn text_then_blank_pdf() -> Vec<u8> {
        let content = b"BT /F1 12 Tf 72 720 Td (Jane Doe Engineer) Tj ET";
        let objects: Vec<Vec<u8>> = vec![
            b"<< /Type /Catalog /Pages 2 0 R >>".to_vec(),
            b"<< /Type /Pages /Kids [3 0 R 5 0 R] /Count 2 >>".to_vec(),
            b"<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
/Resources << /Font << /F1 6 0 R >> >> /Contents 4 0 R >>"
                .to_vec(),
            [
                format!("<< /Length {} >>\nstream\n", content.len()).into_bytes(),
                content.to_vec(),
                b"\nendstream".to_vec(),
            ]
            .concat(),
            b"<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Resources << >> /Contents 7 0 R >>"
                .to_vec(),
            b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
                .to_vec(),
            b"<< /Length 0 >>\nstream\n\nendstream".to_vec(),
        ];

        let mut pdf = b"%PDF-1.4\n".to_vec();
        let mut offsets = Vec::with_capacity(objects.len());
        for (i, body) in objects.iter().enumerate() {
            offsets.push(pdf.len());
            pdf.extend_from_slice(format!("{} 0 obj\n", i + 1).as_bytes());
            pdf.extend_from_slice(body);
            pdf.extend_from_slice(b"\nendobj\n");
        }

        let xref_start = pdf.len();
        pdf.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
        pdf.extend_from_slice(b"0000000000 65535 f \n");
        for offset in offsets {
            pdf.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
        }
        pdf.extend_from_slice(
            format!(
                "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_start}\n%%EOF\n",
                objects.len() + 1
            )
            .as_bytes(),
        );
        pdf
    }

    #[tokio::test]
    async fn test_real_pdf_text_page_kept_and_blank_page_skipped() {
        let pages = PdfTextReader
            .read_pages(Bytes::from(text_then_blank_pdf()))
            .await
            .unwrap();
        assert_eq!(pages.len(), 2);

        let text = extract_text(&pages).unwrap();
        assert_eq!(text.text, "Jane Doe Engineer");
        assert_eq!(text.page_count, 2);
        assert_eq!(text.pages_with_text, 1);
    }

    #[tokio::test]
    async fn test_garbage_bytes_are_unreadable() {
        let result = PdfTextReader
            .read_pages(Bytes::from_static(b"not a pdf at all"))
            .await;
        assert!(matches!(result, Err(AppError::UnreadableDocument(_))));
    }

    #[tokio::test]
    async fn test_bare_pdf_header_is_unreadable() {
        let result = PdfTextReader
            .read_pages(Bytes::from_static(b"%PDF-1.4\n%%EOF\n"))
            .await;
        assert!(matches!(result, Err(AppError::UnreadableDocument(_))));
    }
}
