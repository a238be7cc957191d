// src/utils/html_debug.rs
use std::fs;
use std::path::Path;
use crate::utils::error::{AppError, ExtractError};

/// Longest raw-document excerpt attached to a record in debug mode.
pub const DEBUG_EXCERPT_CHARS: usize = 16_000;

/// Returns at most `max_chars` characters from the start of `html`, cut on a char boundary.
pub fn capped_excerpt(html: &str, max_chars: usize) -> String {
    match html.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => html[..byte_idx].to_string(),
        None => html.to_string(),
    }
}

/// Renders `html` with the given byte ranges wrapped in highlight spans.
/// Overlapping ranges are dropped after the first one that claims the bytes.
pub fn annotate_html(html: &str, highlights: &[(usize, usize, &str)]) -> String {
    let mut debug_html = String::from("<!DOCTYPE html>\n<html>\n<head>\n<style>\n");

    // CSS for highlight colors
    debug_html.push_str(".highlight-date { background-color: #90EE90; }\n");
    debug_html.push_str(".highlight-section { background-color: #ADD8E6; }\n");
    debug_html.push_str(".highlight-custom { background-color: #FFC0CB; }\n");
    debug_html.push_str("</style>\n</head>\n<body>\n");

    let mut last_pos = 0;
    let mut sorted_highlights = highlights.to_vec();
    sorted_highlights.sort_by_key(|h| h.0);

    for (start, end, highlight_type) in sorted_highlights {
        if start < last_pos || end > html.len() || start >= end {
            continue;
        }
        debug_html.push_str(&html[last_pos..start]);

        let css_class = match highlight_type {
            "date" => "highlight-date",
            "section" => "highlight-section",
            _ => "highlight-custom",
        };

        debug_html.push_str(&format!("<span class=\"{}\" title=\"Position: {}-{}, Type: {}\">",
            css_class, start, end, highlight_type));
        debug_html.push_str(&html[start..end]);
        debug_html.push_str("</span>");

        last_pos = end;
    }

    if last_pos < html.len() {
        debug_html.push_str(&html[last_pos..]);
    }

    debug_html.push_str("\n</body>\n</html>");
    debug_html
}

/// Writes an annotated copy of `html` where every match of the given regex patterns is highlighted.
pub fn create_debug_html(html: &str, path: &Path, patterns: &[(String, &str)]) -> Result<(), AppError> {
    use regex::Regex;

    let mut highlights = Vec::new();

    for (pattern, highlight_type) in patterns {
        let re = Regex::new(pattern).map_err(|e| {
            ExtractError::InvalidPattern(format!("'{}': {}", pattern, e))
        })?;

        for mat in re.find_iter(html) {
            highlights.push((mat.start(), mat.end(), *highlight_type));
        }
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, annotate_html(html, &highlights))?;

    tracing::info!("Saved debug HTML to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excerpt_respects_char_boundaries() {
        let html = "ابجد<p>";
        assert_eq!(capped_excerpt(html, 2), "اب");
        assert_eq!(capped_excerpt(html, 100), html);
        assert_eq!(capped_excerpt("", 5), "");
    }

    #[test]
    fn annotate_skips_overlapping_ranges() {
        let html = "<td>2024-05-01</td>";
        let out = annotate_html(html, &[(4, 14, "date"), (6, 10, "custom")]);
        assert!(out.contains("<span class=\"highlight-date\" title=\"Position: 4-14, Type: date\">2024-05-01</span>"));
        assert!(!out.contains("highlight-custom\" title"));
        assert!(out.ends_with("</td>\n</body>\n</html>"));
    }

    #[test]
    fn create_debug_html_rejects_bad_pattern() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("debug").join("page.html");
        let err = create_debug_html("<p>x</p>", &path, &[("(".to_string(), "custom")]);
        assert!(matches!(err, Err(AppError::Extraction(ExtractError::InvalidPattern(_)))));

        create_debug_html("<p>x</p>", &path, &[("x".to_string(), "custom")]).unwrap();
        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("highlight-custom"));
    }
}
