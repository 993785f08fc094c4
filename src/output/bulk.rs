use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{HymnRecord, VerseKind};

const DEFAULT_HYMN_BOOK_ID: i64 = 1;

/// Import document: hymns with their verse segments nested as child rows.
#[derive(Debug, Serialize)]
pub struct BulkDocument {
    pub hymn_book_id: i64,
    pub hymns: Vec<BulkHymn>,
}

#[derive(Debug, Serialize)]
pub struct BulkHymn {
    pub reference_id: i64,
    pub hymn_number: i64,
    pub title_mm: String,
    pub title_en: String,
    pub composer: Option<String>,
    pub category: Option<String>,
    pub scriptures: Option<String>,
    pub pdf_file: Option<String>,
    pub pptx_file: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub details: Vec<BulkVerse>,
}

#[derive(Debug, Serialize)]
pub struct BulkVerse {
    pub verse_number: Option<u32>,
    pub verse_type: VerseKind,
    pub content_mm: String,
    /// Equal to the verse number; choruses have none.
    pub sort_order: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BulkDocument {
    pub fn from_records(records: &[HymnRecord], now: DateTime<Utc>) -> Self {
        let hymns = records
            .iter()
            .map(|r| BulkHymn {
                reference_id: r.source_id,
                hymn_number: r.hymn_number,
                title_mm: r.title_native.clone(),
                title_en: r.title_translated.clone(),
                composer: r.composer.clone(),
                category: r.category.clone(),
                scriptures: r.scripture_reference.clone(),
                pdf_file: r.attachments.pdf_path.clone(),
                pptx_file: r.attachments.slides_path.clone(),
                created_at: now,
                updated_at: now,
                details: r
                    .verses
                    .iter()
                    .map(|v| BulkVerse {
                        verse_number: v.number,
                        verse_type: v.kind,
                        content_mm: v.text.clone(),
                        sort_order: match v.kind {
                            VerseKind::Chorus => None,
                            VerseKind::Verse => v.number,
                        },
                        created_at: now,
                        updated_at: now,
                    })
                    .collect(),
            })
            .collect();

        BulkDocument {
            hymn_book_id: DEFAULT_HYMN_BOOK_ID,
            hymns,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{sample_record, VerseSegment};

    #[test]
    fn verses_nest_under_hymn_with_sort_keys() {
        let rec = sample_record(
            3,
            vec![
                VerseSegment { number: Some(1), kind: VerseKind::Verse, text: "a".into() },
                VerseSegment { number: None, kind: VerseKind::Chorus, text: "b".into() },
                VerseSegment { number: Some(2), kind: VerseKind::Verse, text: "c".into() },
            ],
        );
        let doc = BulkDocument::from_records(&[rec], Utc::now());
        let json = serde_json::to_value(&doc).unwrap();

        assert_eq!(json["hymn_book_id"], 1);
        let details = json["hymns"][0]["details"].as_array().unwrap();
        assert_eq!(details.len(), 3);
        assert_eq!(details[0]["sort_order"], 1);
        assert_eq!(details[1]["verse_type"], "chorus");
        assert!(details[1]["sort_order"].is_null());
        assert_eq!(details[2]["content_mm"], "c");
        assert_eq!(json["hymns"][0]["reference_id"], 3);
        assert!(json["hymns"][0]["pdf_file"].is_null());
    }
}
