//! Collaborator traits used by the download coordinator

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// A datum id or alias resolved to something downloadable
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedDatum {
    /// Concrete filename of the datum
    pub name: String,
    /// URL the datum can be fetched from
    pub url: String,
}

/// Byte-level transport
///
/// Implementations write the content at `url` to `destination` and return
/// the path of the materialized file. When `force` is false and the
/// destination already exists, implementations may return it untouched.
///
/// # Examples
///
/// ```no_run
/// use input_vfs::download::{Fetcher, HttpFetcher};
/// use input_vfs::config::Config;
/// use std::path::Path;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config::default();
/// let fetcher = HttpFetcher::new(&config.download, config.retry.clone())?;
/// let path = fetcher
///     .fetch("https://example.com/a.csv", Path::new("/tmp/a.csv"), false)
///     .await?;
/// println!("saved to {}", path.display());
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Materialize `url` at `destination`
    ///
    /// # Errors
    ///
    /// Returns an error on network or storage failure; a partially written
    /// destination must not be left behind.
    async fn fetch(&self, url: &str, destination: &Path, force: bool) -> crate::Result<PathBuf>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Maps datum ids and aliases to a concrete name and URL
#[async_trait]
pub trait DatumResolver: Send + Sync {
    /// Resolve one datum id or alias
    ///
    /// # Errors
    ///
    /// Returns an error if the id or alias is unknown or the lookup fails.
    async fn resolve(&self, id_or_alias: &str) -> crate::Result<ResolvedDatum>;
}

/// Supplies fresh per-filename download URLs for a declared input
#[async_trait]
pub trait DownloadUrlSource: Send + Sync {
    /// Filename → URL for every file of the input
    async fn download_urls(&self, input_id: &str) -> crate::Result<HashMap<String, String>>;
}
