//! reqwest-backed implementations of the collaborator traits

use super::traits::{DatumResolver, DownloadUrlSource, Fetcher, ResolvedDatum};
use crate::config::{ApiConfig, DownloadConfig, RetryConfig};
use crate::error::{DownloadError, Error, Result};
use crate::retry::with_retry;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Suffix of the temporary file a fetch writes to before the final rename
const PARTIAL_SUFFIX: &str = ".part";

fn build_client(download: &DownloadConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(download.timeout)
        .build()
        .map_err(|e| Error::Config {
            message: format!("failed to create HTTP client: {e}"),
            key: Some("download.timeout".to_string()),
        })
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_owned();
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

fn check_status(response: reqwest::Response, url: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(Error::Download(DownloadError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        }))
    }
}

/// Downloads files over HTTP(S)
///
/// Content is streamed to `<destination>.part` and renamed into place once
/// complete, so an interrupted fetch never leaves a truncated destination.
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    retry: RetryConfig,
}

impl HttpFetcher {
    /// Create a fetcher using the configured request timeout
    pub fn new(download: &DownloadConfig, retry: RetryConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(download)?,
            retry,
        })
    }

    async fn fetch_once(&self, url: &str, destination: &Path) -> Result<u64> {
        let response = self.client.get(url).send().await?;
        let mut response = check_status(response, url)?;

        let partial = partial_path(destination);
        let mut file = tokio::fs::File::create(&partial).await?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&partial, destination).await?;
        Ok(written)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, destination: &Path, force: bool) -> Result<PathBuf> {
        if !force && destination.is_file() {
            debug!(?destination, "destination exists, skipping fetch");
            return Ok(destination.to_path_buf());
        }
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let result = with_retry(&self.retry, "fetch", || self.fetch_once(url, destination)).await;
        match result {
            Ok(bytes) => {
                info!(?destination, bytes, "file downloaded");
                Ok(destination.to_path_buf())
            }
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_file(partial_path(destination)).await
                    && cleanup.kind() != std::io::ErrorKind::NotFound
                {
                    warn!(?destination, error = %cleanup, "failed to remove partial download");
                }
                Err(e)
            }
        }
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Platform API client for datum resolution and batch download URLs
///
/// Endpoints, relative to the configured base URL:
/// - `GET /api/v0/data/resolve/?datum=<id or alias>` → `{"name": ..., "url": ...}`
/// - `GET /api/v0/inputs/<input id>/download-urls/` → `{"<filename>": "<url>", ...}`
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    retry: RetryConfig,
}

impl ApiClient {
    /// Create a client for the configured API
    pub fn new(api: &ApiConfig, download: &DownloadConfig, retry: RetryConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(download)?,
            base_url: api.base_url.trim_end_matches('/').to_string(),
            retry,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/v0/{}", self.base_url, path)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let response = self.client.get(url).query(query).send().await?;
        let response = check_status(response, url)?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl DatumResolver for ApiClient {
    async fn resolve(&self, id_or_alias: &str) -> Result<ResolvedDatum> {
        let url = self.endpoint("data/resolve/");
        let query = [("datum", id_or_alias)];
        let resolved: ResolvedDatum =
            with_retry(&self.retry, "datum resolve", || self.get_json(&url, &query)).await?;
        debug!(datum = id_or_alias, name = %resolved.name, "resolved datum");
        Ok(resolved)
    }
}

#[async_trait]
impl DownloadUrlSource for ApiClient {
    async fn download_urls(&self, input_id: &str) -> Result<HashMap<String, String>> {
        let url = self.endpoint(&format!(
            "inputs/{}/download-urls/",
            urlencoding::encode(input_id)
        ));
        let urls: HashMap<String, String> =
            with_retry(&self.retry, "download urls", || self.get_json(&url, &[])).await?;
        debug!(input_id, count = urls.len(), "fetched batch download URLs");
        Ok(urls)
    }
}
