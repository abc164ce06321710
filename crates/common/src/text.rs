//! Text cleanup helpers shared by the execution ledger and session output
//! handling: ANSI stripping, truncation, line splitting.

use std::sync::LazyLock;

use regex::Regex;

#[allow(clippy::expect_used)]
static ANSI_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1B\[[0-?]*[ -/]*[@-~]").expect("ANSI escape pattern is valid")
});

/// Remove CSI terminal control sequences from backend output.
#[must_use]
pub fn strip_ansi(text: &str) -> String {
    ANSI_PATTERN.replace_all(text, "").into_owned()
}

/// Truncate to at most `max` characters, replacing the tail with `...`.
#[must_use]
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}

/// Split a raw output fragment into non-empty lines: ANSI stripped, carriage
/// returns removed, trailing whitespace trimmed, blank lines dropped.
#[must_use]
pub fn clean_lines(text: &str) -> Vec<String> {
    strip_ansi(text)
        .split('\n')
        .map(|line| line.replace('\r', "").trim_end().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn strips_color_codes() {
        assert_eq!(strip_ansi("\x1b[31mred\x1b[0m plain"), "red plain");
    }

    #[test]
    fn strip_is_noop_on_plain_text() {
        assert_eq!(strip_ansi("hello world"), "hello world");
    }

    #[test]
    fn truncate_short_text_unchanged() {
        assert_eq!(truncate("short", 10), "short");
    }

    #[test]
    fn truncate_adds_ellipsis() {
        assert_eq!(truncate("abcdefghij", 8), "abcde...");
    }

    #[test]
    fn clean_lines_drops_blanks_and_cr() {
        let lines = clean_lines("one\r\n\ntwo  \n\r\nthree");
        assert_eq!(lines, vec!["one", "two", "three"]);
    }

    #[test]
    fn clean_lines_strips_escapes() {
        let lines = clean_lines("\x1b[1mbold\x1b[0m\nplain");
        assert_eq!(lines, vec!["bold", "plain"]);
    }
}
