pub mod digits;
pub mod document;
pub mod fields;
pub mod lyrics;

use crate::model::VerseSegment;

/// Everything a hymn page yields before attachments are fetched.
/// Absent fields are empty, never errors.
#[derive(Debug, Default)]
pub struct PageFields {
    pub hymn_number: Option<i64>,
    pub title_native: String,
    pub title_translated: String,
    pub composer: Option<String>,
    pub scripture_reference: Option<String>,
    pub category: Option<String>,
    pub verses: Vec<VerseSegment>,
    pub pdf_href: Option<String>,
    pub slides_href: Option<String>,
}

/// Two-stage pipeline: HTML → (title, plain text, links) → fields.
pub fn extract(html: &str) -> PageFields {
    let doc = document::read_document(html);
    let text = doc.plain_text.as_str();

    PageFields {
        hymn_number: doc.hymn_number,
        title_native: doc.title.clone(),
        title_translated: fields::translated_title(text),
        composer: fields::composer(text),
        scripture_reference: fields::labeled_value(text, fields::SCRIPTURES_LABEL),
        category: fields::labeled_value(text, fields::CATEGORY_LABEL),
        verses: lyrics::segment(text),
        pdf_href: doc.pdf_href,
        slides_href: doc.slides_href,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VerseKind;

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap()
    }

    #[test]
    fn composer_and_fallback_title() {
        let f = extract(&fixture("great_thou_art"));
        assert_eq!(f.composer.as_deref(), Some("Henry Smart"));
        assert_eq!(f.title_translated, "How Great Thou Art");
        assert_eq!(f.title_native, "ကိုယ်တော်ကြီးမြတ်ပုံ");
    }

    #[test]
    fn full_page() {
        let f = extract(&fixture("great_thou_art"));
        assert_eq!(f.hymn_number, Some(27));
        assert_eq!(f.scripture_reference.as_deref(), Some("Psalm 8:1"));
        assert_eq!(f.category.as_deref(), Some("Praise and Worship"));
        assert_eq!(f.slides_href.as_deref(), Some("hymn.php?id=12&download=pptx"));
        assert_eq!(f.pdf_href.as_deref(), Some("hymn.php?id=12&download=pdf"));

        let shape: Vec<_> = f.verses.iter().map(|v| (v.number, v.kind)).collect();
        assert_eq!(
            shape,
            vec![
                (Some(1), VerseKind::Verse),
                (None, VerseKind::Chorus),
                (Some(2), VerseKind::Verse),
                (Some(3), VerseKind::Verse),
            ]
        );
        assert_eq!(f.verses[0].text, "အို ထာဝရဘုရား\nကိုယ်တော်၏လက်ရာများကို");
        assert!(f.verses.iter().all(|v| !v.text.contains("Hymn Number")));
    }

    #[test]
    fn labelled_title_page() {
        let f = extract(&fixture("labelled_title"));
        assert_eq!(f.title_translated, "Amazing Grace");
        assert_eq!(f.composer.as_deref(), Some("John Newton"));
        assert_eq!(f.hymn_number, None);
        assert!(f.pdf_href.is_none());
        assert!(f.slides_href.is_none());
        assert_eq!(f.verses.len(), 2);
    }

    #[test]
    fn empty_page_fails_soft() {
        let f = extract("<html><body></body></html>");
        assert!(f.title_native.is_empty());
        assert!(f.title_translated.is_empty());
        assert!(f.composer.is_none());
        assert!(f.verses.is_empty());
    }
}
