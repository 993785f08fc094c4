use std::path::Path;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, UPGRADE_INSECURE_REQUESTS};
use reqwest::StatusCode;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::config::Settings;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("not found (404): {url}")]
    NotFound { url: String },
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    pub fn is_not_found(&self) -> bool {
        match self {
            FetchError::NotFound { .. } => true,
            FetchError::Http(e) => e.status() == Some(StatusCode::NOT_FOUND),
            _ => false,
        }
    }
}

/// HTTP client for hymn pages and their attachments. One request at a time;
/// pacing is the caller's job.
pub struct HttpFetcher {
    client: reqwest::Client,
    page_timeout: Duration,
    attachment_timeout: Duration,
}

impl HttpFetcher {
    pub fn new(settings: &Settings) -> Result<Self, FetchError> {
        // Browser-like headers; the site turns away obvious bots
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
        headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));

        let mut builder = reqwest::Client::builder()
            .user_agent(settings.user_agent.as_str())
            .default_headers(headers)
            .gzip(true)
            .brotli(true)
            .deflate(true);
        if !settings.use_system_proxy {
            builder = builder.no_proxy();
        }

        Ok(Self {
            client: builder.build()?,
            page_timeout: settings.page_timeout(),
            attachment_timeout: settings.attachment_timeout(),
        })
    }

    /// GET a page and return its body as text.
    pub async fn fetch_page(&self, url: &str) -> Result<String, FetchError> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .timeout(self.page_timeout)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound { url: url.to_string() });
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.text().await?)
    }

    /// Stream `url` into `dest`. Returns false on any failure, after removing
    /// whatever part of `dest` was written.
    pub async fn download(&self, url: &str, dest: &Path) -> bool {
        match self.try_download(url, dest).await {
            Ok(bytes) => {
                debug!("Downloaded {} ({} bytes) to {}", url, bytes, dest.display());
                true
            }
            Err(e) => {
                warn!("Failed to download {}: {}", url, e);
                false
            }
        }
    }

    async fn try_download(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        let mut response = self
            .client
            .get(url)
            .timeout(self.attachment_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let mut file = File::create(dest).await?;
        let written = async {
            let mut total = 0u64;
            while let Some(chunk) = response.chunk().await? {
                file.write_all(&chunk).await?;
                total += chunk.len() as u64;
            }
            file.flush().await?;
            Ok::<_, FetchError>(total)
        }
        .await;

        if written.is_err() {
            drop(file);
            let _ = tokio::fs::remove_file(dest).await;
        }
        written
    }
}

/// Minimal HTTP/1.1 server for tests: `respond(path) -> (status, body)`.
#[cfg(test)]
pub(crate) async fn spawn_test_server<F>(respond: F) -> String
where
    F: Fn(&str) -> (u16, Vec<u8>) + Send + Sync + 'static,
{
    use std::sync::Arc;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let respond = Arc::new(respond);

    tokio::spawn(async move {
        while let Ok((mut sock, _)) = listener.accept().await {
            let respond = Arc::clone(&respond);
            tokio::spawn(async move {
                let mut buf = vec![0u8; 8192];
                let n = sock.read(&mut buf).await.unwrap_or(0);
                let request = String::from_utf8_lossy(&buf[..n]).to_string();
                let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();
                let (status, body) = respond(&path);
                let reason = if status == 200 { "OK" } else { "Not Found" };
                let head = format!(
                    "HTTP/1.1 {} {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    status,
                    reason,
                    body.len()
                );
                let _ = sock.write_all(head.as_bytes()).await;
                let _ = sock.write_all(&body).await;
                let _ = sock.shutdown().await;
            });
        }
    });

    format!("http://{}/", addr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_settings;

    #[tokio::test]
    async fn page_404_is_not_found() {
        let root = spawn_test_server(|_| (404, Vec::new())).await;
        let dir = tempfile::tempdir().unwrap();
        let settings = test_settings(dir.path(), &root);
        let fetcher = HttpFetcher::new(&settings).unwrap();

        let err = fetcher.fetch_page(&settings.page_url(999)).await.unwrap_err();
        assert!(err.is_not_found(), "unexpected error: {}", err);
    }

    #[tokio::test]
    async fn page_body_returned() {
        let root = spawn_test_server(|_| (200, b"<html>ok</html>".to_vec())).await;
        let dir = tempfile::tempdir().unwrap();
        let settings = test_settings(dir.path(), &root);
        let fetcher = HttpFetcher::new(&settings).unwrap();

        let body = fetcher.fetch_page(&settings.page_url(1)).await.unwrap();
        assert_eq!(body, "<html>ok</html>");
    }

    #[tokio::test]
    async fn download_writes_file() {
        let root = spawn_test_server(|_| (200, b"%PDF-1.4 data".to_vec())).await;
        let dir = tempfile::tempdir().unwrap();
        let settings = test_settings(dir.path(), &root);
        let fetcher = HttpFetcher::new(&settings).unwrap();
        let dest = dir.path().join("hymn-1.pdf");

        assert!(fetcher.download(&settings.attachment_url("x?download=pdf"), &dest).await);
        assert_eq!(std::fs::read(&dest).unwrap(), b"%PDF-1.4 data");
    }

    #[tokio::test]
    async fn failed_download_leaves_no_file() {
        let root = spawn_test_server(|_| (404, Vec::new())).await;
        let dir = tempfile::tempdir().unwrap();
        let settings = test_settings(dir.path(), &root);
        let fetcher = HttpFetcher::new(&settings).unwrap();
        let dest = dir.path().join("hymn-1.pdf");

        assert!(!fetcher.download(&settings.attachment_url("x?download=pdf"), &dest).await);
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn unreachable_host_is_not_a_404() {
        let dir = tempfile::tempdir().unwrap();
        // Nothing listens on port 9 locally
        let settings = test_settings(dir.path(), "http://127.0.0.1:9/");
        let fetcher = HttpFetcher::new(&settings).unwrap();

        let err = fetcher.fetch_page(&settings.page_url(1)).await.unwrap_err();
        assert!(!err.is_not_found());
    }
}
