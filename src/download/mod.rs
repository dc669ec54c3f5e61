//! Download-need decision and fetching
//!
//! [`DownloadCoordinator`] brings an [`InputRecord`] to the requested
//! [`DownloadPolicy`]: it resolves datum references, requests batch
//! download URLs, picks on-disk destinations and fetches what is missing.
//! Transport and platform lookups go through the traits in [`traits`], so
//! the coordinator itself never talks HTTP.

mod http;
mod traits;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
pub(crate) mod test_helpers;


pub use http::{ApiClient, HttpFetcher};
pub use traits::{DatumResolver, DownloadUrlSource, Fetcher, ResolvedDatum};

use crate::config::{Config, PathsConfig};
use crate::error::{DownloadError, Error, Result};
use crate::input::{FileSource, InputRecord};
use crate::naming::allocate_all;
use crate::types::{DownloadPolicy, DownloadReport, DuplicateHandling, FileFailure};
use crate::utils::safe_file_name;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One pending fetch: file index, URL and destination
struct FetchJob {
    index: usize,
    url: String,
    destination: PathBuf,
}

/// Decides whether an input needs downloading and performs the download
#[derive(Clone)]
pub struct DownloadCoordinator {
    paths: PathsConfig,
    max_concurrent_fetches: usize,
    allow_partial: bool,
    fetcher: Arc<dyn Fetcher>,
    resolver: Arc<dyn DatumResolver>,
    url_source: Arc<dyn DownloadUrlSource>,
}

impl std::fmt::Debug for DownloadCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadCoordinator")
            .field("paths", &self.paths)
            .field("max_concurrent_fetches", &self.max_concurrent_fetches)
            .field("allow_partial", &self.allow_partial)
            .field("fetcher", &self.fetcher.name())
            .finish_non_exhaustive()
    }
}

impl DownloadCoordinator {
    /// Create a coordinator with explicit collaborators
    pub fn new(
        config: &Config,
        fetcher: Arc<dyn Fetcher>,
        resolver: Arc<dyn DatumResolver>,
        url_source: Arc<dyn DownloadUrlSource>,
    ) -> Self {
        Self {
            paths: config.paths.clone(),
            max_concurrent_fetches: config.download.max_concurrent_fetches.max(1),
            allow_partial: config.download.allow_partial,
            fetcher,
            resolver,
            url_source,
        }
    }

    /// Download directory of `input_name`
    pub fn input_dir(&self, input_name: &str) -> PathBuf {
        self.paths.input_dir(input_name)
    }

    /// Bring `record` to the state `policy` asks for
    ///
    /// - [`DownloadPolicy::Never`] does nothing, not even creating the
    ///   input directory.
    /// - [`DownloadPolicy::Optional`] runs a pass only when some file is
    ///   missing; present files are left alone.
    /// - [`DownloadPolicy::Always`] re-fetches every remote file.
    ///
    /// Datum resolution failures and missing local files are recorded in
    /// the report. A failed fetch (or a file without URL) aborts the call
    /// unless `download.allow_partial` is set, in which case it is recorded
    /// too. Files fetched before an abort keep their local path.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Failed`], [`DownloadError::MissingUrl`] or
    /// [`DownloadError::UrlLookup`], or an I/O error if the input directory
    /// cannot be created.
    pub async fn download_if_necessary(
        &self,
        record: &mut InputRecord,
        input_name: &str,
        policy: DownloadPolicy,
    ) -> Result<DownloadReport> {
        let mut report = DownloadReport::default();

        match policy {
            DownloadPolicy::Never => {
                debug!(input = %input_name, "download policy is never, skipping");
                return Ok(report);
            }
            DownloadPolicy::Optional if record.is_downloaded() => {
                debug!(input = %input_name, "all files present, skipping download");
                report.skipped = record.files.len();
                return Ok(report);
            }
            _ => {}
        }

        if record.files.is_empty() {
            debug!(input = %input_name, "input has no files");
            return Ok(report);
        }

        let dir = self.input_dir(input_name);
        tokio::fs::create_dir_all(&dir).await?;
        let force = policy == DownloadPolicy::Always;

        let unresolved = self.resolve_datums(record, &mut report).await;

        // Declared names may carry directories; on disk every file sits
        // directly under the input directory
        let plain_names: Vec<String> = record
            .files
            .iter()
            .map(|file| safe_file_name(&file.name))
            .collect();
        let disk_names = allocate_all(
            DuplicateHandling::AppendIndex,
            plain_names.iter().map(String::as_str),
        )?;

        let mut pending = Vec::new();
        for (index, file) in record.files.iter_mut().enumerate() {
            if unresolved.contains(&index) {
                continue;
            }
            if let FileSource::LocalPath(path) = &file.source {
                if file.is_downloaded() {
                    report.skipped += 1;
                } else {
                    warn!(input = %input_name, file = %file.name, ?path, "local file missing");
                    report.failed.push(FileFailure {
                        file: file.name.clone(),
                        error: DownloadError::LocalFileMissing {
                            file: file.name.clone(),
                            path: path.clone(),
                        }
                        .into(),
                    });
                }
                continue;
            }

            if !force {
                if file.is_downloaded() {
                    report.skipped += 1;
                    continue;
                }
                let candidate = dir.join(&disk_names[index]);
                if file.local_path.is_none() && candidate.is_file() {
                    debug!(
                        input = %input_name,
                        file = %file.name,
                        ?candidate,
                        "adopting existing download"
                    );
                    file.local_path = Some(candidate);
                    report.skipped += 1;
                    continue;
                }
            }
            pending.push(index);
        }

        if pending.is_empty() {
            return Ok(report);
        }

        if let Some(input_id) = record.input_id.as_deref() {
            let urls = self
                .url_source
                .download_urls(input_id)
                .await
                .map_err(|e| DownloadError::UrlLookup {
                    input: input_name.to_string(),
                    reason: e.to_string(),
                })?;
            debug!(input = %input_name, count = urls.len(), "applying batch download URLs");
            for &index in &pending {
                let file = &mut record.files[index];
                if let Some(url) = urls.get(&file.original_name) {
                    file.download_url = Some(url.clone());
                }
            }
        }

        let mut failures = Vec::new();
        let mut jobs = Vec::with_capacity(pending.len());
        for index in pending {
            let file = &record.files[index];
            let Some(url) = file.download_url.clone() else {
                failures.push(FileFailure {
                    file: file.name.clone(),
                    error: DownloadError::MissingUrl {
                        input: input_name.to_string(),
                        file: file.name.clone(),
                    }
                    .into(),
                });
                continue;
            };
            let destination = file
                .local_path
                .clone()
                .unwrap_or_else(|| dir.join(&disk_names[index]));
            jobs.push(FetchJob {
                index,
                url,
                destination,
            });
        }

        let mut results = self.fetch_all(jobs, force).await;
        results.sort_by_key(|(index, _)| *index);

        for (index, result) in results {
            let file = &mut record.files[index];
            match result {
                Ok(path) => {
                    file.local_path = Some(path);
                    report.fetched += 1;
                }
                Err(e) => failures.push(FileFailure {
                    file: file.name.clone(),
                    error: DownloadError::Failed {
                        input: input_name.to_string(),
                        file: file.name.clone(),
                        reason: e.to_string(),
                    }
                    .into(),
                }),
            }
        }

        if !failures.is_empty() {
            if !self.allow_partial {
                return Err(first_error(failures));
            }
            for failure in &failures {
                warn!(
                    input = %input_name,
                    file = %failure.file,
                    error = %failure.error,
                    "file not downloaded"
                );
            }
            report.failed.extend(failures);
        }

        info!(
            input = %input_name,
            fetched = report.fetched,
            skipped = report.skipped,
            failed = report.failed.len(),
            "download pass complete"
        );
        Ok(report)
    }

    /// Resolve every datum reference; returns indexes that failed
    async fn resolve_datums(
        &self,
        record: &mut InputRecord,
        report: &mut DownloadReport,
    ) -> HashSet<usize> {
        let mut unresolved = HashSet::new();
        for (index, file) in record.files.iter_mut().enumerate() {
            let FileSource::DatumRef(datum) = &file.source else {
                continue;
            };
            let datum = datum.clone();
            match self.resolver.resolve(&datum).await {
                Ok(resolved) => {
                    debug!(%datum, name = %resolved.name, "datum resolved");
                    file.resolve_datum(resolved.name, resolved.url);
                }
                Err(e) => {
                    warn!(%datum, error = %e, "datum resolution failed");
                    report.failed.push(FileFailure {
                        file: file.name.clone(),
                        error: DownloadError::DatumResolution {
                            datum,
                            reason: e.to_string(),
                        }
                        .into(),
                    });
                    unresolved.insert(index);
                }
            }
        }
        unresolved
    }

    async fn fetch_all(&self, jobs: Vec<FetchJob>, force: bool) -> Vec<(usize, Result<PathBuf>)> {
        stream::iter(jobs)
            .map(|job| {
                let fetcher = Arc::clone(&self.fetcher);
                async move {
                    let FetchJob {
                        index,
                        url,
                        destination,
                    } = job;
                    debug!(%url, ?destination, fetcher = fetcher.name(), "fetching");
                    let result = fetch_into(fetcher.as_ref(), &url, &destination, force).await;
                    (index, result)
                }
            })
            .buffer_unordered(self.max_concurrent_fetches)
            .collect()
            .await
    }
}

async fn fetch_into(
    fetcher: &dyn Fetcher,
    url: &str,
    destination: &Path,
    force: bool,
) -> Result<PathBuf> {
    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    fetcher.fetch(url, destination, force).await
}

fn first_error(failures: Vec<FileFailure>) -> Error {
    failures
        .into_iter()
        .next()
        .map(|failure| failure.error)
        .unwrap_or_else(|| Error::Other("download failed".to_string()))
}
