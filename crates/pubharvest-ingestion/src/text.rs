//! Bounded PDF text extraction.

use std::path::{Path, PathBuf};

use tracing::warn;

/// Return text from the first `max_pages` pages of the PDF.
///
/// Unreadable files or pages degrade to an empty/partial string with a
/// warning; extraction problems never fail the pipeline.
pub fn extract_pdf_text(path: &Path, max_pages: usize) -> String {
    let pdf = match lopdf::Document::load(path) {
        Ok(doc) => doc,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not read PDF");
            return String::new();
        }
    };

    let mut parts = Vec::new();
    for (page_number, _) in pdf.get_pages().into_iter().take(max_pages) {
        match pdf.extract_text(&[page_number]) {
            Ok(text) => parts.push(text),
            Err(e) => {
                warn!(
                    path = %path.display(),
                    page = page_number,
                    error = %e,
                    "Could not extract page text"
                );
            }
        }
    }

    parts.join("\n").trim().to_string()
}

/// Async wrapper: lopdf is synchronous, so extraction runs on the blocking
/// pool.
pub async fn extract_pdf_text_blocking(path: PathBuf, max_pages: usize) -> String {
    tokio::task::spawn_blocking(move || extract_pdf_text(&path, max_pages))
        .await
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_empty_text() {
        let out = extract_pdf_text(Path::new("does/not/exist.pdf"), 2);
        assert_eq!(out, "");
    }

    #[test]
    fn garbage_file_yields_empty_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"not a pdf at all").unwrap();
        assert_eq!(extract_pdf_text(&path, 2), "");
    }
}
