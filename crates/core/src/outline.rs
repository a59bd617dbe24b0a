//! Heading detection and section breadcrumbs.
//!
//! Reference documents such as coding manuals are organised by numbered
//! headings (`8`, `8.4`, `8.4.1`) or keyword headings (`Chapter 3 ...`). The
//! [`HeadingDetector`] recognises both, [`Breadcrumb`] keeps the current
//! heading per level while text is read in order, and [`chapter_context`]
//! answers "where in the document is this match" for a page and query.

use crate::error::IngestError;
use crate::extractor::PageText;
use crate::highlight::{count_occurrences, find_char_position, lowercase_chars, mark_terms};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const MAX_HEADING_CHARS: usize = 150;
const MAX_LEVEL: u8 = 3;
const NUMERIC_HEADING: &str = r"^(\d+(?:\.\d+)*)\s+([A-Z\x{00C0}-\x{017E}].{1,100})$";
const KEYWORD_HEADING: &str =
    r"(?i)^(hoofdstuk|sectie|afdeling|chapitre|section|chapter|part|deel)\s+.{1,80}$";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    pub level: u8,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct HeadingDetector {
    numeric: Regex,
    keyword: Regex,
}

impl HeadingDetector {
    pub fn new() -> Result<Self, IngestError> {
        Ok(Self {
            numeric: Regex::new(NUMERIC_HEADING)?,
            keyword: Regex::new(KEYWORD_HEADING)?,
        })
    }

    pub fn detect(&self, line: &str) -> Option<Heading> {
        let line = line.trim();
        if line.is_empty() || line.chars().count() > MAX_HEADING_CHARS {
            return None;
        }

        if let Some(captures) = self.numeric.captures(line) {
            let depth = captures
                .get(1)
                .map_or(1, |number| number.as_str().split('.').count());
            let level = u8::try_from(depth).unwrap_or(MAX_LEVEL).min(MAX_LEVEL);
            return Some(Heading {
                level,
                text: line.to_string(),
            });
        }

        if self.keyword.is_match(line) {
            return Some(Heading {
                level: 1,
                text: line.to_string(),
            });
        }

        None
    }

    pub fn is_heading(&self, line: &str) -> bool {
        self.detect(line).is_some()
    }
}

/// Current heading at each level; a heading clears every deeper level.
#[derive(Debug, Clone, Default)]
pub struct Breadcrumb {
    by_level: BTreeMap<u8, String>,
}

impl Breadcrumb {
    pub fn observe(&mut self, heading: Heading) {
        self.by_level.retain(|level, _| *level < heading.level);
        self.by_level.insert(heading.level, heading.text);
    }

    pub fn trail(&self) -> Vec<String> {
        self.by_level.values().cloned().collect()
    }

    pub fn path(&self) -> Option<String> {
        if self.by_level.is_empty() {
            None
        } else {
            Some(self.trail().join(" > "))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChapterContext {
    pub breadcrumb: Vec<String>,
    pub paragraph: String,
    pub page: u32,
}

/// Breadcrumb and best paragraph for a match on `match_page`.
///
/// Pages before the match contribute all their headings. On the matched page
/// headings count only until the first line that contains a query term, so a
/// heading printed below the match never ends up in its breadcrumb.
pub fn chapter_context(
    detector: &HeadingDetector,
    pages: &[PageText],
    match_page: u32,
    query: &str,
) -> ChapterContext {
    let terms = query_terms(query);
    let mut breadcrumb = Breadcrumb::default();

    for page in pages.iter().filter(|page| page.number <= match_page) {
        for line in page.text.lines() {
            if page.number == match_page {
                let lowered = line.to_lowercase();
                if terms.iter().any(|term| lowered.contains(term.as_str())) {
                    break;
                }
            }
            if let Some(heading) = detector.detect(line) {
                breadcrumb.observe(heading);
            }
        }
    }

    let page_text = pages
        .iter()
        .find(|page| page.number == match_page)
        .map(|page| page.text.as_str())
        .unwrap_or_default();

    let paragraph = extract_paragraph(detector, page_text, &terms);

    ChapterContext {
        breadcrumb: breadcrumb.trail(),
        paragraph: mark_terms(&paragraph, &terms),
        page: match_page,
    }
}

/// Picks the block of `page_text` that best matches `terms`.
///
/// Blocks are separated by blank lines and headings; headings form blocks of
/// their own. The winning block is preceded by the block before it unless
/// that one is a heading.
pub fn extract_paragraph(detector: &HeadingDetector, page_text: &str, terms: &[String]) -> String {
    if page_text.is_empty() || terms.is_empty() {
        return page_text.chars().take(500).collect();
    }

    let mut blocks: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in page_text.lines() {
        let stripped = line.trim();
        let is_heading = detector.is_heading(stripped);
        if is_heading || stripped.is_empty() {
            if !current.is_empty() {
                blocks.push(current.join("\n"));
                current.clear();
            }
            if is_heading {
                blocks.push(stripped.to_string());
            }
        } else {
            current.push(stripped);
        }
    }
    if !current.is_empty() {
        blocks.push(current.join("\n"));
    }

    let mut best: Option<(usize, usize)> = None;
    for (index, block) in blocks.iter().enumerate() {
        let score = count_occurrences(block, terms);
        if score > 0 && best.map_or(true, |(_, top)| score > top) {
            best = Some((index, score));
        }
    }

    if let Some((index, _)) = best {
        let mut context = Vec::new();
        if index > 0 && !detector.is_heading(&blocks[index - 1]) {
            context.push(blocks[index - 1].as_str());
        }
        context.push(blocks[index].as_str());
        return context.join("\n\n");
    }

    window_around_first_match(page_text, terms)
}

fn window_around_first_match(page_text: &str, terms: &[String]) -> String {
    let chars: Vec<char> = page_text.chars().collect();
    let lowered = lowercase_chars(&chars);

    let Some(position) = terms
        .iter()
        .find_map(|term| find_char_position(&lowered, term))
    else {
        return chars.iter().take(500).collect();
    };

    let start = position.saturating_sub(200);
    let end = (position + 400).min(chars.len());
    let mut out = String::new();
    if start > 0 {
        out.push_str("...");
    }
    out.extend(&chars[start..end]);
    if end < chars.len() {
        out.push_str("...");
    }
    out
}

fn query_terms(query: &str) -> Vec<String> {
    query.split_whitespace().map(str::to_lowercase).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> HeadingDetector {
        HeadingDetector::new().expect("heading patterns compile")
    }

    fn page(number: u32, text: &str) -> PageText {
        PageText {
            number,
            text: text.to_string(),
        }
    }

    #[test]
    fn numeric_headings_get_levels_from_depth() {
        let detector = detector();
        assert_eq!(detector.detect("8  Respiratory system").map(|h| h.level), Some(1));
        assert_eq!(detector.detect("8.4 Asthma").map(|h| h.level), Some(2));
        assert_eq!(detector.detect("8.4.1 Acute attacks").map(|h| h.level), Some(3));
        assert_eq!(detector.detect("8.4.1.2 Status asthmaticus").map(|h| h.level), Some(3));
    }

    #[test]
    fn keyword_headings_are_level_one() {
        let detector = detector();
        let heading = detector.detect("CHAPTER 12 Injuries").expect("keyword heading");
        assert_eq!(heading.level, 1);
        assert!(detector.detect("Hoofdstuk 8 Ademhalingsstelsel").is_some());
    }

    #[test]
    fn ordinary_lines_are_not_headings() {
        let detector = detector();
        assert!(detector.detect("12 patients were seen").is_none());
        assert!(detector.detect("The chapter ends here.").is_none());
        assert!(detector.detect("").is_none());
        let long = format!("1 A{}", "x".repeat(200));
        assert!(detector.detect(&long).is_none());
    }

    #[test]
    fn breadcrumb_clears_deeper_levels() {
        let detector = detector();
        let mut crumb = Breadcrumb::default();
        for line in ["8 Respiratory", "8.4 Asthma", "8.4.1 Acute", "9 Digestive"] {
            if let Some(heading) = detector.detect(line) {
                crumb.observe(heading);
            }
        }
        assert_eq!(crumb.trail(), vec!["9 Digestive".to_string()]);

        crumb.observe(detector.detect("9.1 Stomach").expect("heading"));
        assert_eq!(crumb.path().as_deref(), Some("9 Digestive > 9.1 Stomach"));
    }

    #[test]
    fn chapter_breadcrumb_stops_at_matching_line() {
        let detector = detector();
        let pages = vec![
            page(1, "8 Respiratory system\nintro text"),
            page(
                2,
                "8.4 Asthma\nJ45.9 asthma, unspecified\n8.5 Bronchiectasis\nJ47 bronchiectasis",
            ),
        ];

        let context = chapter_context(&detector, &pages, 2, "J45.9");

        assert_eq!(
            context.breadcrumb,
            vec!["8 Respiratory system".to_string(), "8.4 Asthma".to_string()]
        );
        assert_eq!(context.page, 2);
        assert!(context.paragraph.contains("<mark>J45.9</mark>"));
        assert!(!context.paragraph.contains("J47"));
    }

    #[test]
    fn paragraph_includes_previous_block_for_context() {
        let detector = detector();
        let text = "lead in line\n\nasthma detail here\n\nunrelated tail";
        let terms = vec!["asthma".to_string()];
        let paragraph = extract_paragraph(&detector, text, &terms);
        assert_eq!(paragraph, "lead in line\n\nasthma detail here");
    }

    #[test]
    fn paragraph_falls_back_to_leading_text_without_match() {
        let detector = detector();
        let text = "a".repeat(600);
        let terms = vec!["zzz".to_string()];
        assert_eq!(extract_paragraph(&detector, &text, &terms).len(), 500);
    }
}
