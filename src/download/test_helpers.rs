//! In-memory collaborators for exercising the coordinator without a network

use super::{DatumResolver, DownloadCoordinator, DownloadUrlSource, Fetcher, ResolvedDatum};
use crate::config::Config;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

/// A recorded fetch call
#[derive(Clone, Debug)]
pub(crate) struct FetchCall {
    pub url: String,
    pub destination: PathBuf,
    pub force: bool,
}

/// Writes the URL itself (or a configured body) to the destination
#[derive(Default)]
pub(crate) struct MockFetcher {
    calls: Mutex<Vec<FetchCall>>,
    bodies: HashMap<String, Vec<u8>>,
    failing: HashSet<String>,
}

impl MockFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_body(mut self, url: &str, body: &[u8]) -> Self {
        self.bodies.insert(url.to_string(), body.to_vec());
        self
    }

    pub(crate) fn failing_on(mut self, url: &str) -> Self {
        self.failing.insert(url.to_string());
        self
    }

    pub(crate) fn calls(&self) -> Vec<FetchCall> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str, destination: &Path, force: bool) -> Result<PathBuf> {
        self.calls.lock().unwrap().push(FetchCall {
            url: url.to_string(),
            destination: destination.to_path_buf(),
            force,
        });
        if self.failing.contains(url) {
            return Err(Error::Other(format!("simulated failure for {url}")));
        }
        let body = self
            .bodies
            .get(url)
            .cloned()
            .unwrap_or_else(|| url.as_bytes().to_vec());
        tokio::fs::write(destination, body).await?;
        Ok(destination.to_path_buf())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Resolves datums from a fixed table
#[derive(Default)]
pub(crate) struct MockResolver {
    datums: HashMap<String, ResolvedDatum>,
    calls: AtomicUsize,
}

impl MockResolver {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_datum(mut self, id: &str, name: &str, url: &str) -> Self {
        self.datums.insert(
            id.to_string(),
            ResolvedDatum {
                name: name.to_string(),
                url: url.to_string(),
            },
        );
        self
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DatumResolver for MockResolver {
    async fn resolve(&self, id_or_alias: &str) -> Result<ResolvedDatum> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.datums
            .get(id_or_alias)
            .cloned()
            .ok_or_else(|| Error::Other(format!("unknown datum {id_or_alias}")))
    }
}

/// Serves batch URLs from a fixed table
#[derive(Default)]
pub(crate) struct MockUrlSource {
    urls: HashMap<String, String>,
    fail: bool,
    calls: AtomicUsize,
}

impl MockUrlSource {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_url(mut self, filename: &str, url: &str) -> Self {
        self.urls.insert(filename.to_string(), url.to_string());
        self
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DownloadUrlSource for MockUrlSource {
    async fn download_urls(&self, _input_id: &str) -> Result<HashMap<String, String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::Other("url service unavailable".into()));
        }
        Ok(self.urls.clone())
    }
}

/// Config whose inputs and config directories live inside `temp`
pub(crate) fn test_config(temp: &TempDir) -> Config {
    let mut config = Config::default();
    config.paths.inputs_dir = temp.path().join("inputs");
    config.paths.config_dir = temp.path().join("config");
    config.retry.max_attempts = 1;
    config
}

/// Collaborators shared with the coordinator so tests can inspect calls
pub(crate) struct Mocks {
    pub fetcher: Arc<MockFetcher>,
    pub resolver: Arc<MockResolver>,
    pub url_source: Arc<MockUrlSource>,
}

impl Default for Mocks {
    fn default() -> Self {
        Self {
            fetcher: Arc::new(MockFetcher::new()),
            resolver: Arc::new(MockResolver::new()),
            url_source: Arc::new(MockUrlSource::new()),
        }
    }
}

impl Mocks {
    pub(crate) fn coordinator(&self, config: &Config) -> DownloadCoordinator {
        DownloadCoordinator::new(
            config,
            self.fetcher.clone(),
            self.resolver.clone(),
            self.url_source.clone(),
        )
    }
}
