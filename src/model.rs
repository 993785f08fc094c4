use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Extraction ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerseKind {
    Verse,
    Chorus,
}

/// One contiguous block of lyrics. Choruses carry no number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerseSegment {
    pub number: Option<u32>,
    pub kind: VerseKind,
    pub text: String,
}

impl VerseSegment {
    /// Heading used in flattened lyric text: `[Chorus]` or `[Verse N]`.
    pub fn heading(&self) -> String {
        match (self.kind, self.number) {
            (VerseKind::Chorus, _) => "[Chorus]".to_string(),
            (VerseKind::Verse, Some(n)) => format!("[Verse {}]", n),
            (VerseKind::Verse, None) => "[Verse]".to_string(),
        }
    }
}

/// Local paths (relative to the output dir) of downloaded attachments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachments {
    pub pdf_path: Option<String>,
    pub slides_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HymnRecord {
    pub source_id: i64,
    pub hymn_number: i64,
    pub title_native: String,
    pub title_translated: String,
    pub composer: Option<String>,
    pub scripture_reference: Option<String>,
    pub category: Option<String>,
    pub verses: Vec<VerseSegment>,
    pub attachments: Attachments,
    pub source_url: String,
    pub scraped_at: DateTime<Utc>,
}

impl HymnRecord {
    /// Lyrics flattened into one block: segment headings followed by their text,
    /// segments separated by a blank line.
    pub fn lyrics_text(&self) -> String {
        self.verses
            .iter()
            .map(|v| format!("{}\n{}", v.heading(), v.text))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

// ── Runs ──

/// Accepted/skipped partition of one run, both in processing order.
#[derive(Debug, Default)]
pub struct RunResult {
    pub accepted: Vec<HymnRecord>,
    pub skipped: Vec<i64>,
}

/// What a run covered, used for file naming and output metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunScope {
    Range { start: i64, end: i64 },
    Custom,
}

impl RunScope {
    pub fn label(&self) -> String {
        match self {
            RunScope::Range { start, end } => format!("{}-{}", start, end),
            RunScope::Custom => "custom".to_string(),
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_record(source_id: i64, verses: Vec<VerseSegment>) -> HymnRecord {
    HymnRecord {
        source_id,
        hymn_number: source_id,
        title_native: "ဘုရားသခင်".to_string(),
        title_translated: "How Great Thou Art".to_string(),
        composer: Some("Henry Smart".to_string()),
        scripture_reference: None,
        category: Some("Praise".to_string()),
        verses,
        attachments: Attachments::default(),
        source_url: format!("https://example.com/hymn.php?id={}", source_id),
        scraped_at: Utc::now(),
    }
}
