use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment};
use serde::Deserialize;

const DEFAULT_BASE_URL: &str = "https://www.myanmarhymn.com/hymn.php?id=";
const DEFAULT_SITE_ROOT: &str = "https://www.myanmarhymn.com/";
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Runtime settings: compiled defaults overlaid by `HYMN_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub base_url: String,
    pub site_root: String,
    pub output_dir: PathBuf,
    pub page_timeout_secs: u64,
    pub attachment_timeout_secs: u64,
    pub default_delay_ms: u64,
    pub fast_delay_ms: u64,
    pub slow_delay_ms: u64,
    pub user_agent: String,
    pub use_system_proxy: bool,
}

impl Settings {
    pub fn load() -> Result<Self> {
        Self::from_builder(
            Config::builder().add_source(Environment::with_prefix("HYMN").try_parsing(true)),
        )
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self> {
        let settings = builder
            .set_default("base_url", DEFAULT_BASE_URL)?
            .set_default("site_root", DEFAULT_SITE_ROOT)?
            .set_default("output_dir", "output")?
            .set_default("page_timeout_secs", 15)?
            .set_default("attachment_timeout_secs", 30)?
            .set_default("default_delay_ms", 2000)?
            .set_default("fast_delay_ms", 500)?
            .set_default("slow_delay_ms", 5000)?
            .set_default("user_agent", DEFAULT_USER_AGENT)?
            .set_default("use_system_proxy", true)?
            .build()
            .context("Failed to build settings")?
            .try_deserialize::<Settings>()
            .context("Invalid HYMN_* setting")?;
        Ok(settings)
    }

    pub fn page_url(&self, source_id: i64) -> String {
        format!("{}{}", self.base_url, source_id)
    }

    /// Resolve an attachment href (usually relative, e.g. `hymn.php?id=3&download=pdf`).
    pub fn attachment_url(&self, href: &str) -> String {
        if href.starts_with("http://") || href.starts_with("https://") {
            href.to_string()
        } else {
            format!(
                "{}/{}",
                self.site_root.trim_end_matches('/'),
                href.trim_start_matches('/')
            )
        }
    }

    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }

    pub fn attachment_timeout(&self) -> Duration {
        Duration::from_secs(self.attachment_timeout_secs)
    }

    pub fn files_dir(&self) -> PathBuf {
        self.output_dir.join("files")
    }

    pub fn status_file(&self) -> PathBuf {
        self.output_dir.join(".scrape-status.json")
    }

    pub fn pid_file(&self) -> PathBuf {
        self.output_dir.join(".scrape-pid.txt")
    }

    pub fn log_file(&self) -> PathBuf {
        self.output_dir.join("scrape.log")
    }

    /// Create the output and attachment directories if missing.
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(self.files_dir())
            .with_context(|| format!("Failed to create {}", self.files_dir().display()))?;
        Ok(())
    }
}

/// Settings pointing at a local test server rooted at `root` ("http://127.0.0.1:port/").
#[cfg(test)]
pub(crate) fn test_settings(output_dir: &std::path::Path, root: &str) -> Settings {
    let mut s = Settings::from_builder(Config::builder()).unwrap();
    s.output_dir = output_dir.to_path_buf();
    s.base_url = format!("{}hymn.php?id=", root);
    s.site_root = root.to_string();
    s.page_timeout_secs = 5;
    s.attachment_timeout_secs = 5;
    s.use_system_proxy = false;
    s
}
