//! Normalisation: deterministic cleanup of extracted text and model replies.
//!
//! Two independent entry points:
//!
//! * [`clean_document_text`] runs on text pulled out of PDF and DOCX files.
//!   Text layers carry CRLF endings, padded lines, zero-width characters and
//!   long runs of blank lines between pages. None of that is essay content.
//! * [`strip_json_fences`] runs on model replies before parsing, because
//!   providers without schema enforcement often wrap JSON in a code fence.
//!
//! Pasted text and plain-text uploads are not passed through here; they are
//! only trimmed, so the model sees exactly what the student wrote.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all document cleanup rules, in order:
///
/// 1. Normalise line endings (CRLF/CR → LF)
/// 2. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 3. Trim trailing whitespace per line
/// 4. Collapse 3+ consecutive newlines down to one blank line
/// 5. Trim the whole text
pub fn clean_document_text(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    s.trim().to_string()
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 3: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 4: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}

// ── Model replies ────────────────────────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:json|JSON)?[ \t]*\n(.*)\n```\s*$").unwrap());

/// Remove one outer ```` ``` ```` / ```` ```json ```` fence around a reply.
pub fn strip_json_fences(input: &str) -> &str {
    let trimmed = input.trim();
    match RE_OUTER_FENCES.captures(trimmed) {
        Some(caps) => caps.get(1).map_or(trimmed, |m| m.as_str()),
        None => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalise_line_endings() {
        assert_eq!(normalise_line_endings("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn test_trim_trailing_whitespace() {
        assert_eq!(
            trim_trailing_whitespace("  hello   \nworld  "),
            "  hello\nworld"
        );
    }

    #[test]
    fn test_collapse_blank_lines() {
        assert_eq!(collapse_blank_lines("a\n\n\n\n\n\nb"), "a\n\nb");
        assert_eq!(collapse_blank_lines("a\n\nb"), "a\n\nb");
    }

    #[test]
    fn test_remove_invisible() {
        assert_eq!(remove_invisible_chars("a\u{200B}b\u{FEFF}c"), "abc");
    }

    #[test]
    fn test_clean_document_text_full_pipeline() {
        let input = "\u{FEFF}  Title  \r\n\r\n\r\n\r\nFirst para.   \r\nSecond\u{00AD}line.\r\n\r\n";
        assert_eq!(clean_document_text(input), "Title\n\nFirst para.\nSecondline.");
    }

    #[test]
    fn test_whitespace_only_document_is_empty() {
        assert_eq!(clean_document_text(" \r\n\t\n\u{200B}\n"), "");
    }

    #[test]
    fn test_strip_json_fences() {
        assert_eq!(strip_json_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_json_fences("```\n{\"a\":1}\n```\n"), "{\"a\":1}");
    }

    #[test]
    fn test_unfenced_reply_passthrough() {
        assert_eq!(strip_json_fences("  {\"a\":1}\n"), "{\"a\":1}");
    }
}
