use regex::RegexBuilder;

pub const DEFAULT_SNIPPET_CHARS: usize = 250;

/// Total non-overlapping, case-insensitive occurrences of every term in `text`.
pub fn count_occurrences(text: &str, terms: &[String]) -> usize {
    let lowered = text.to_lowercase();
    terms
        .iter()
        .filter(|term| !term.is_empty())
        .map(|term| lowered.matches(term.to_lowercase().as_str()).count())
        .sum()
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// HTML-escapes `text` and wraps each term occurrence in `<mark>` tags.
pub fn mark_terms(text: &str, terms: &[String]) -> String {
    let escaped = escape_html(text);

    let mut needles = terms
        .iter()
        .filter(|term| !term.is_empty())
        .map(|term| regex::escape(&escape_html(term)))
        .collect::<Vec<_>>();
    if needles.is_empty() {
        return escaped;
    }
    needles.sort_by(|left, right| right.len().cmp(&left.len()));

    match RegexBuilder::new(&needles.join("|"))
        .case_insensitive(true)
        .build()
    {
        Ok(pattern) => pattern.replace_all(&escaped, "<mark>$0</mark>").into_owned(),
        Err(_) => escaped,
    }
}

/// A window of about `window` chars centred on the earliest term occurrence.
pub fn highlight_snippet(text: &str, terms: &[String], window: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    let lowered = lowercase_chars(&chars);

    let earliest = terms
        .iter()
        .filter_map(|term| find_char_position(&lowered, term))
        .min();

    let snippet = match earliest {
        None => chars.iter().take(window).collect::<String>(),
        Some(position) => {
            let start = position.saturating_sub(window / 2);
            let end = (position + window / 2).min(chars.len());
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
    };

    mark_terms(&snippet, terms)
}

/// Lowercases char by char so positions line up with the original text.
pub(crate) fn lowercase_chars(chars: &[char]) -> Vec<char> {
    chars
        .iter()
        .map(|c| c.to_lowercase().next().unwrap_or(*c))
        .collect()
}

pub(crate) fn find_char_position(lowered: &[char], term: &str) -> Option<usize> {
    let needle: Vec<char> = term.to_lowercase().chars().collect();
    if needle.is_empty() || needle.len() > lowered.len() {
        return None;
    }
    lowered
        .windows(needle.len())
        .position(|window| window == needle.as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn occurrences_are_case_insensitive_substrings() {
        let text = "J45.9 Asthma; asthma, unspecified (J45)";
        assert_eq!(count_occurrences(text, &terms(&["asthma"])), 2);
        assert_eq!(count_occurrences(text, &terms(&["j45"])), 2);
        assert_eq!(count_occurrences(text, &terms(&["asthma", "j45"])), 4);
        assert_eq!(count_occurrences(text, &terms(&["copd"])), 0);
    }

    #[test]
    fn marks_preserve_original_case() {
        let marked = mark_terms("Asthma and ASTHMA", &terms(&["asthma"]));
        assert_eq!(marked, "<mark>Asthma</mark> and <mark>ASTHMA</mark>");
    }

    #[test]
    fn marking_escapes_html_first() {
        let marked = mark_terms("<b>dose</b> & more", &terms(&["dose"]));
        assert_eq!(marked, "&lt;b&gt;<mark>dose</mark>&lt;/b&gt; &amp; more");
    }

    #[test]
    fn overlapping_terms_do_not_nest_marks() {
        let marked = mark_terms("bronchitis", &terms(&["bronch", "bronchitis"]));
        assert_eq!(marked, "<mark>bronchitis</mark>");
    }

    #[test]
    fn snippet_centres_on_earliest_match() {
        let text = format!("{}needle{}", "a".repeat(300), "b".repeat(300));
        let snippet = highlight_snippet(&text, &terms(&["needle"]), 100);
        assert!(snippet.starts_with("..."));
        assert!(snippet.ends_with("..."));
        assert!(snippet.contains("<mark>needle</mark>"));
        assert!(snippet.chars().count() < 130);
    }

    #[test]
    fn snippet_without_match_is_leading_text() {
        let snippet = highlight_snippet("short text", &terms(&["missing"]), 5);
        assert_eq!(snippet, "short");
    }

    #[test]
    fn char_positions_survive_multibyte_text() {
        let chars: Vec<char> = "Ünïcode café".chars().collect();
        let lowered = lowercase_chars(&chars);
        assert_eq!(find_char_position(&lowered, "CAFÉ"), Some(8));
    }
}
