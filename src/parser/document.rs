use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

static TITLE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());
static BODY_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body").unwrap());
static LABEL_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("strong.text-primary").unwrap());
static PPTX_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"a[href*="download=pptx"]"#).unwrap());
static PDF_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"a[href*="download=pdf"]"#).unwrap());

const TITLE_SUFFIX: &str = " - Myanmar Hymn";
const HYMN_NUMBER_LABEL: &str = "Hymn Number:";

/// The markup-dependent half of extraction. Everything downstream works on
/// `plain_text` only.
#[derive(Debug, Default)]
pub struct PageDocument {
    pub title: String,
    pub plain_text: String,
    pub hymn_number: Option<i64>,
    pub pdf_href: Option<String>,
    pub slides_href: Option<String>,
}

pub fn read_document(html: &str) -> PageDocument {
    let doc = Html::parse_document(html);

    let title = doc
        .select(&TITLE_SEL)
        .next()
        .map(|t| t.text().collect::<String>().trim().replace(TITLE_SUFFIX, ""))
        .unwrap_or_default();

    // Body text as the concatenation of its text nodes, newlines included
    let plain_text = match doc.select(&BODY_SEL).next() {
        Some(body) => body.text().collect::<String>(),
        None => doc.root_element().text().collect::<String>(),
    };

    PageDocument {
        title,
        plain_text,
        hymn_number: printed_hymn_number(&doc),
        pdf_href: first_href(&doc, &PDF_SEL),
        slides_href: first_href(&doc, &PPTX_SEL),
    }
}

/// `<strong class="text-primary">Hymn Number:</strong> <span>12</span>` → 12
fn printed_hymn_number(doc: &Html) -> Option<i64> {
    let label = doc
        .select(&LABEL_SEL)
        .find(|el| el.text().collect::<String>().contains(HYMN_NUMBER_LABEL))?;
    let value = label.next_siblings().find_map(ElementRef::wrap)?;
    parse_leading_int(value.text().collect::<String>().trim())
}

fn first_href(doc: &Html, sel: &Selector) -> Option<String> {
    doc.select(sel)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
}

/// Leading integer of a string ("12 (Revised)" → 12), like a lenient parseInt.
fn parse_leading_int(s: &str) -> Option<i64> {
    let (sign, rest) = match s.strip_prefix('-') {
        Some(r) => (-1, r),
        None => (1, s.strip_prefix('+').unwrap_or(s)),
    };
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse::<i64>().ok().map(|n| sign * n)
}
