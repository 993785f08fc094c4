use std::future::Future;

use chrono::Utc;
use tracing::{info, warn};

use crate::config::Settings;
use crate::fetch::{FetchError, HttpFetcher};
use crate::model::{Attachments, HymnRecord};
use crate::parser;

/// Native titles shorter than this mean the page carried no hymn.
const MIN_TITLE_CHARS: usize = 2;

/// Produces one hymn record per source id, or `None` for a skip.
/// Implementations never fail: every per-id problem becomes a skip.
pub trait HymnSource {
    fn assemble(&self, source_id: i64) -> impl Future<Output = Option<HymnRecord>>;
}

/// Fetches a hymn page, extracts it, and downloads its attachments.
pub struct Assembler {
    settings: Settings,
    fetcher: HttpFetcher,
}

impl Assembler {
    pub fn new(settings: Settings) -> Result<Self, FetchError> {
        let fetcher = HttpFetcher::new(&settings)?;
        Ok(Self { settings, fetcher })
    }

    async fn try_assemble(&self, source_id: i64) -> Result<Option<HymnRecord>, FetchError> {
        info!("Scraping hymn {}...", source_id);
        let url = self.settings.page_url(source_id);
        let html = self.fetcher.fetch_page(&url).await?;

        // The parsed document is dropped inside extract(), before any further await
        let fields = parser::extract(&html);

        if fields.title_native.chars().count() < MIN_TITLE_CHARS {
            warn!("Skipped hymn {} - no title found", source_id);
            return Ok(None);
        }

        let attachments = Attachments {
            slides_path: self
                .fetch_attachment(source_id, fields.slides_href.as_deref(), "pptx")
                .await,
            pdf_path: self
                .fetch_attachment(source_id, fields.pdf_href.as_deref(), "pdf")
                .await,
        };

        let record = HymnRecord {
            source_id,
            hymn_number: fields.hymn_number.unwrap_or(source_id),
            title_native: fields.title_native,
            title_translated: fields.title_translated,
            composer: fields.composer,
            scripture_reference: fields.scripture_reference,
            category: fields.category,
            verses: fields.verses,
            attachments,
            source_url: url,
            scraped_at: Utc::now(),
        };

        if record.title_translated.is_empty() {
            info!("Hymn {}: {}", source_id, record.title_native);
        } else {
            info!(
                "Hymn {}: {} / {}",
                source_id, record.title_native, record.title_translated
            );
        }
        Ok(Some(record))
    }

    /// Download one attachment kind if the page links it. Returns the path
    /// relative to the output dir; a failed download is just "no attachment".
    async fn fetch_attachment(
        &self,
        source_id: i64,
        href: Option<&str>,
        ext: &str,
    ) -> Option<String> {
        let href = href?;
        let file_name = format!("hymn-{}.{}", source_id, ext);
        let dest = self.settings.files_dir().join(&file_name);

        info!("  Downloading {}...", ext.to_uppercase());
        let url = self.settings.attachment_url(href);
        self.fetcher
            .download(&url, &dest)
            .await
            .then(|| format!("files/{}", file_name))
    }
}

impl HymnSource for Assembler {
    async fn assemble(&self, source_id: i64) -> Option<HymnRecord> {
        match self.try_assemble(source_id).await {
            Ok(record) => record,
            Err(e) if e.is_not_found() => {
                warn!("Hymn {} not found (404)", source_id);
                None
            }
            Err(e) => {
                warn!("Error scraping hymn {}: {}", source_id, e);
                None
            }
        }
    }
}

/// Canned source for runner and merge tests: accepts ids in `accept`,
/// records every call.
#[cfg(test)]
pub(crate) struct FakeSource {
    pub accept: std::collections::HashSet<i64>,
    pub calls: std::cell::RefCell<Vec<i64>>,
}

#[cfg(test)]
impl FakeSource {
    pub fn accepting(ids: &[i64]) -> Self {
        FakeSource {
            accept: ids.iter().copied().collect(),
            calls: Default::default(),
        }
    }
}

#[cfg(test)]
impl HymnSource for FakeSource {
    async fn assemble(&self, source_id: i64) -> Option<HymnRecord> {
        use crate::model::{VerseKind, VerseSegment};

        self.calls.borrow_mut().push(source_id);
        self.accept.contains(&source_id).then(|| {
            crate::model::sample_record(
                source_id,
                vec![VerseSegment {
                    number: Some(1),
                    kind: VerseKind::Verse,
                    text: format!("verse of {}", source_id),
                }],
            )
        })
    }
}
