use crate::error::IngestError;
use lopdf::Document;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

/// Turns raw PDF bytes into the text of each page that has a text layer.
///
/// An empty `Ok` means the file parsed but nothing on it is text (a scanned
/// document); `Err` is reserved for files that cannot be read as PDFs at all.
pub trait PdfExtractor: Send + Sync {
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<PageText>, IngestError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<PageText>, IngestError> {
        let document =
            Document::load_mem(bytes).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        if document.is_encrypted() {
            return Err(IngestError::PdfParse(
                "encrypted pdfs are not supported".to_string(),
            ));
        }

        let page_numbers = document.get_pages().into_keys().collect::<Vec<_>>();
        if page_numbers.is_empty() {
            return Err(IngestError::PdfParse("pdf has no pages".to_string()));
        }

        let mut pages = Vec::new();
        for page_no in page_numbers {
            let text = match document.extract_text(&[page_no]) {
                Ok(text) => text,
                Err(error) => {
                    warn!(page = page_no, %error, "skipping page without decodable text");
                    continue;
                }
            };

            if !text.trim().is_empty() {
                pages.push(PageText {
                    number: page_no,
                    text: trim_line_ends(&text),
                });
            }
        }

        Ok(pages)
    }
}

pub fn extract_page_texts(bytes: &[u8]) -> Result<Vec<PageText>, IngestError> {
    LopdfExtractor.extract_pages(bytes)
}

fn trim_line_ends(text: &str) -> String {
    text.lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim_matches('\n')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{text_pdf, textless_pdf};

    #[test]
    fn text_pages_are_extracted_in_order() {
        let pdf = text_pdf(&[
            &["First page heading", "alpha beta"],
            &["Second page gamma"],
        ]);

        let pages = extract_page_texts(&pdf).expect("fixture pdf should parse");

        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].number, 1);
        assert!(pages[0].text.contains("alpha beta"));
        assert!(pages[0].text.contains('\n'), "line structure is kept");
        assert_eq!(pages[1].number, 2);
        assert!(pages[1].text.contains("gamma"));
    }

    #[test]
    fn textless_pdf_yields_no_pages_rather_than_error() {
        let pdf = textless_pdf(2);
        let pages = extract_page_texts(&pdf).expect("image-only pdf should still parse");
        assert!(pages.is_empty());
    }

    #[test]
    fn blank_pages_are_skipped_but_numbers_are_kept() {
        let pdf = text_pdf(&[&[], &["only text on page two"]]);
        let pages = extract_page_texts(&pdf).expect("fixture pdf should parse");
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].number, 2);
    }

    #[test]
    fn garbage_bytes_are_a_parse_error() {
        let result = extract_page_texts(b"%PDF-1.4\n%broken");
        assert!(matches!(result, Err(IngestError::PdfParse(_))));
    }

    #[test]
    fn trims_trailing_spaces_and_outer_newlines() {
        assert_eq!(trim_line_ends("\nline one   \nline two \n\n"), "line one\nline two");
    }
}
