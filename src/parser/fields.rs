use std::sync::LazyLock;

use regex::Regex;

static TITLE_EN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Title\s*\(English\)[:\s]*([^\n]+)").unwrap());
static LATIN_LINE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z\s]+$").unwrap());
static COMPOSER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Composer[:\s]*([^\n]+)").unwrap());
static COMPOSER_YEARS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Z][a-zA-Z\s]+)\s*\([0-9]{4}-[0-9]{4}\)").unwrap());

/// Substrings that disqualify a line from being the English title.
const TITLE_NOISE: &[&str] = &[
    "Acknowledgement",
    "Composer",
    "Myanmar Hymn",
    "All rights reserved",
];

pub const SCRIPTURES_LABEL: &str = "Scriptures:";
pub const CATEGORY_LABEL: &str = "Category:";

/// English title: the labelled "Title (English): …" value, else the first
/// line made only of Latin letters and spaces that isn't page chrome.
pub fn translated_title(text: &str) -> String {
    if let Some(caps) = TITLE_EN_RE.captures(text) {
        return caps[1].trim().to_string();
    }

    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .find(|l| {
            LATIN_LINE_RE.is_match(l)
                && l.chars().count() > 3
                && !TITLE_NOISE.iter().any(|n| l.contains(n))
        })
        .map(str::to_string)
        .unwrap_or_default()
}

/// Composer: the labelled "Composer: …" value, else a "Name (1813-1879)" pattern.
pub fn composer(text: &str) -> Option<String> {
    COMPOSER_RE
        .captures(text)
        .or_else(|| COMPOSER_YEARS_RE.captures(text))
        .map(|caps| caps[1].trim().to_string())
        .filter(|c| !c.is_empty())
}

/// Value of a "Label:" block whose value sits on the following line(s).
/// A first line that is itself a label (ends with ':') is skipped once.
pub fn labeled_value(text: &str, label: &str) -> Option<String> {
    let idx = text.find(label)?;
    let after = text[idx + label.len()..].trim();
    let mut lines = after.lines().map(str::trim).filter(|l| !l.is_empty());

    let first = lines.next()?;
    let value = if first.ends_with(':') {
        lines.next()?
    } else {
        first
    };
    Some(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labelled_english_title() {
        let text = "ဘုရား\nTitle (English): Amazing Grace\nComposer: John Newton";
        assert_eq!(translated_title(text), "Amazing Grace");
    }

    #[test]
    fn labelled_english_title_case_insensitive() {
        assert_eq!(translated_title("title (english)\n  Be Thou My Vision \n"), "Be Thou My Vision");
    }

    #[test]
    fn fallback_english_title_skips_noise() {
        let text = "Myanmar Hymn\nAll rights reserved\nAcknowledgement\nဘုရား\nHow Great Thou Art\nAbide";
        assert_eq!(translated_title(text), "How Great Thou Art");
    }

    #[test]
    fn fallback_title_needs_four_chars() {
        assert_eq!(translated_title("Joy\nထပ်ဆို"), "");
    }

    #[test]
    fn composer_label() {
        assert_eq!(composer("x\nComposer: Henry Smart\ny").as_deref(), Some("Henry Smart"));
    }

    #[test]
    fn composer_years_fallback() {
        assert_eq!(
            composer("Words by Henry Smart (1813-1879)").as_deref(),
            Some("Words by Henry Smart")
        );
        assert_eq!(composer("no attribution here"), None);
    }

    #[test]
    fn composer_years_must_be_ascii() {
        assert_eq!(composer("Henry Smart (၁၈၁၃-၁၈၇၉)"), None);
    }

    #[test]
    fn scriptures_next_line() {
        let text = "Scriptures:\n\n  Psalm 23:1 \nCategory:\nPraise";
        assert_eq!(labeled_value(text, SCRIPTURES_LABEL).as_deref(), Some("Psalm 23:1"));
        assert_eq!(labeled_value(text, CATEGORY_LABEL).as_deref(), Some("Praise"));
    }

    #[test]
    fn empty_label_skips_to_following_line() {
        let text = "Scriptures:\nCategory:\nPraise";
        assert_eq!(labeled_value(text, SCRIPTURES_LABEL).as_deref(), Some("Praise"));
    }

    #[test]
    fn missing_label() {
        assert_eq!(labeled_value("nothing", CATEGORY_LABEL), None);
        assert_eq!(labeled_value("Category:   ", CATEGORY_LABEL), None);
    }
}
