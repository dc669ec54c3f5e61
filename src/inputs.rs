//! Entry point for job code: named inputs as virtual file systems
//!
//! [`InputContext`] owns the registry and the download collaborators; it
//! replaces process globals with an explicit value that can be cloned into
//! tasks. [`Input`] is a handle on one named input with the everyday
//! accessors (paths, readers, directory).
//!
//! ```no_run
//! use input_vfs::{Config, InputContext, VfsOptions};
//!
//! # #[tokio::main]
//! # async fn main() -> input_vfs::Result<()> {
//! let context = InputContext::new(Config::from_env())?;
//! let vfs = context.get_input_vfs("train", VfsOptions::default()).await?;
//! for name in vfs.names() {
//!     println!("{name}");
//! }
//! let first = context.input("train").path(VfsOptions::default()).await?;
//! println!("first file at {}", first.display());
//! # Ok(())
//! # }
//! ```

use crate::config::Config;
use crate::download::{
    ApiClient, DatumResolver, DownloadCoordinator, DownloadUrlSource, Fetcher, HttpFetcher,
};
use crate::error::{Error, InputError, Result};
use crate::input::InputRecord;
use crate::registry::InputRegistry;
use crate::types::{DownloadPolicy, DuplicateHandling};
use crate::vfs::{BuildOptions, Vfs};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Subdirectory of an input directory that receives extracted archive members
pub const UNPACKED_DIR: &str = ".unpacked";

/// Options for turning an input into a [`Vfs`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VfsOptions {
    /// Expand recognized archives into their members (default: true)
    pub process_archives: bool,
    /// When to download (default: optional)
    pub download: DownloadPolicy,
    /// How colliding names are disambiguated (default: overwrite)
    pub duplicate_handling: DuplicateHandling,
}

impl Default for VfsOptions {
    fn default() -> Self {
        Self {
            process_archives: true,
            download: DownloadPolicy::Optional,
            duplicate_handling: DuplicateHandling::Overwrite,
        }
    }
}

/// Shared state for resolving inputs
#[derive(Clone)]
pub struct InputContext {
    config: Arc<Config>,
    registry: Arc<InputRegistry>,
    fetcher: Arc<dyn Fetcher>,
    resolver: Arc<dyn DatumResolver>,
    url_source: Arc<dyn DownloadUrlSource>,
    coordinator: DownloadCoordinator,
}

impl std::fmt::Debug for InputContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputContext")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("coordinator", &self.coordinator)
            .finish_non_exhaustive()
    }
}

impl InputContext {
    /// Create a context with HTTP collaborators built from `config`
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` does not validate or the
    /// HTTP client cannot be built.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let fetcher: Arc<dyn Fetcher> =
            Arc::new(HttpFetcher::new(&config.download, config.retry.clone())?);
        let api = Arc::new(ApiClient::new(
            &config.api,
            &config.download,
            config.retry.clone(),
        )?);
        let registry = Arc::new(InputRegistry::new(config.paths.inputs_config_path()));
        let resolver: Arc<dyn DatumResolver> = api.clone();
        let url_source: Arc<dyn DownloadUrlSource> = api;
        let coordinator = DownloadCoordinator::new(
            &config,
            fetcher.clone(),
            resolver.clone(),
            url_source.clone(),
        );

        Ok(Self {
            config: Arc::new(config),
            registry,
            fetcher,
            resolver,
            url_source,
            coordinator,
        })
    }

    fn rebuild_coordinator(mut self) -> Self {
        self.coordinator = DownloadCoordinator::new(
            &self.config,
            self.fetcher.clone(),
            self.resolver.clone(),
            self.url_source.clone(),
        );
        self
    }

    /// Replace the byte transport
    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = fetcher;
        self.rebuild_coordinator()
    }

    /// Replace the datum resolver
    pub fn with_datum_resolver(mut self, resolver: Arc<dyn DatumResolver>) -> Self {
        self.resolver = resolver;
        self.rebuild_coordinator()
    }

    /// Replace the batch download URL source
    pub fn with_url_source(mut self, url_source: Arc<dyn DownloadUrlSource>) -> Self {
        self.url_source = url_source;
        self.rebuild_coordinator()
    }

    /// Configuration in effect
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The input registry
    pub fn registry(&self) -> &InputRegistry {
        &self.registry
    }

    /// Download directory of an input
    pub fn input_dir(&self, name: &str) -> PathBuf {
        self.config.paths.input_dir(name)
    }

    /// Handle on one named input
    pub fn input(&self, name: impl Into<String>) -> Input {
        Input {
            context: self.clone(),
            name: name.into(),
        }
    }

    /// Register an ad hoc input from URL and glob literals
    ///
    /// Returns `false` if `name` is a declared input, which is never
    /// replaced.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPattern`] for a malformed glob.
    pub async fn register_literal<I, S>(
        &self,
        name: &str,
        values: I,
        duplicate_handling: DuplicateHandling,
    ) -> Result<bool>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        let record = tokio::task::spawn_blocking(move || {
            InputRecord::from_literals(values, duplicate_handling)
        })
        .await
        .map_err(|e| Error::Other(format!("literal expansion task failed: {e}")))??;
        self.registry.register(name, record).await
    }

    /// Resolve an input to a [`Vfs`]
    ///
    /// Looks the input up, downloads it according to `options.download`,
    /// settles duplicate names and assembles the VFS. Updated names and
    /// local paths are kept on the registered record.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::NotDeclared`] for an unknown name, download
    /// errors as described on
    /// [`DownloadCoordinator::download_if_necessary`], and
    /// [`Error::DuplicateName`] for unresolvable name collisions.
    pub async fn get_input_vfs(&self, name: &str, options: VfsOptions) -> Result<Vfs> {
        let shared = self
            .registry
            .lookup(name)
            .await?
            .ok_or_else(|| InputError::NotDeclared {
                name: name.to_string(),
            })?;
        let mut record = shared.lock().await;

        let report = self
            .coordinator
            .download_if_necessary(&mut record, name, options.download)
            .await?;
        for failure in &report.failed {
            warn!(
                input = %name,
                file = %failure.file,
                error = %failure.error,
                "file missing from VFS"
            );
        }
        if report.fetched > 0 {
            clear_unpacked(&self.input_dir(name)).await?;
        }

        let mut working = record.clone();
        let prefix_archive_members = self.config.vfs.prefix_archive_members;
        let (working, vfs) = tokio::task::spawn_blocking(move || -> Result<(InputRecord, Vfs)> {
            let strategy = working.finalize_names(options.duplicate_handling)?;
            let vfs = Vfs::build(
                &working.files,
                &BuildOptions {
                    expand_archives: options.process_archives,
                    duplicate_handling: strategy,
                    prefix_archive_members,
                },
            )?;
            Ok((working, vfs))
        })
        .await
        .map_err(|e| Error::Other(format!("VFS build task failed: {e}")))??;

        *record = working;
        debug!(input = %name, entries = vfs.len(), "input VFS ready");
        Ok(vfs)
    }
}

/// Drop members extracted from an earlier download of this input
async fn clear_unpacked(input_dir: &Path) -> Result<()> {
    let unpacked = input_dir.join(UNPACKED_DIR);
    match tokio::fs::remove_dir_all(&unpacked).await {
        Ok(()) => {
            debug!(?unpacked, "cleared extracted members after download");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Handle on one named input
#[derive(Clone, Debug)]
pub struct Input {
    context: InputContext,
    name: String,
}

impl Input {
    /// Input name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Download directory of this input
    pub fn dir_path(&self) -> PathBuf {
        self.context.input_dir(&self.name)
    }

    /// The input as a [`Vfs`]
    pub async fn vfs(&self, options: VfsOptions) -> Result<Vfs> {
        self.context.get_input_vfs(&self.name, options).await
    }

    /// A concrete path for every entry, in VFS order
    ///
    /// Archive members are extracted under `<input dir>/.unpacked`.
    pub async fn paths(&self, options: VfsOptions) -> Result<Vec<PathBuf>> {
        let vfs = self.vfs(options).await?;
        let unpacked = self.dir_path().join(UNPACKED_DIR);
        tokio::task::spawn_blocking(move || vfs.materialize_all(&unpacked))
        .await
        .map_err(|e| Error::Other(format!("materialize task failed: {e}")))?
    }

    /// Path of the first entry
    ///
    /// # Errors
    ///
    /// Returns [`InputError::NoFiles`] if the input has no entries.
    pub async fn path(&self, options: VfsOptions) -> Result<PathBuf> {
        self.paths(options)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                InputError::NoFiles {
                    name: self.name.clone(),
                }
                .into()
            })
    }

    /// A reader for every entry, paired with its name, in VFS order
    pub async fn open_all(
        &self,
        options: VfsOptions,
    ) -> Result<Vec<(String, Box<dyn Read + Send>)>> {
        let vfs = self.vfs(options).await?;
        tokio::task::spawn_blocking(move || {
            vfs.entries()
                .iter()
                .map(|entry| Ok((entry.name.clone(), entry.open()?)))
                .collect::<Result<Vec<_>>>()
        })
        .await
        .map_err(|e| Error::Other(format!("open task failed: {e}")))?
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::test_helpers::{MockFetcher, MockResolver, MockUrlSource, test_config};
    use std::fs;
    use tempfile::TempDir;

    fn context(
        temp: &TempDir,
        inputs_json: Option<&str>,
        fetcher: Arc<MockFetcher>,
    ) -> InputContext {
        let config = test_config(temp);
        if let Some(json) = inputs_json {
            fs::create_dir_all(&config.paths.config_dir).unwrap();
            fs::write(config.paths.inputs_config_path(), json).unwrap();
        }
        InputContext::new(config)
            .unwrap()
            .with_fetcher(fetcher)
            .with_datum_resolver(Arc::new(MockResolver::new()))
            .with_url_source(Arc::new(MockUrlSource::new()))
    }

    #[tokio::test]
    async fn unknown_input_is_not_declared() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp, None, Arc::new(MockFetcher::new()));
        let err = ctx
            .get_input_vfs("nope", VfsOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "input_not_declared");
    }

    #[tokio::test]
    async fn declared_input_is_downloaded_then_served() {
        let temp = TempDir::new().unwrap();
        let fetcher = Arc::new(MockFetcher::new().with_body("https://x/a.csv", b"1,2"));
        let ctx = context(
            &temp,
            Some(r#"{"train": {"files": [{"name": "a.csv", "uri": "https://x/a.csv"}]}}"#),
            fetcher.clone(),
        );

        let vfs = ctx.get_input_vfs("train", VfsOptions::default()).await.unwrap();
        assert_eq!(vfs.read("a.csv").unwrap(), b"1,2");

        ctx.get_input_vfs("train", VfsOptions::default()).await.unwrap();
        assert_eq!(fetcher.call_count(), 1, "a complete input is not fetched again");
    }

    #[tokio::test]
    async fn never_policy_serves_only_what_is_on_disk() {
        let temp = TempDir::new().unwrap();
        let fetcher = Arc::new(MockFetcher::new());
        let ctx = context(
            &temp,
            Some(r#"{"train": {"files": [{"name": "a.csv", "uri": "https://x/a.csv"}]}}"#),
            fetcher.clone(),
        );

        let vfs = ctx
            .get_input_vfs(
                "train",
                VfsOptions {
                    download: DownloadPolicy::Never,
                    ..VfsOptions::default()
                },
            )
            .await
            .unwrap();
        assert!(vfs.is_empty());
        assert_eq!(fetcher.call_count(), 0);
    }

    #[tokio::test]
    async fn literal_strategy_wins_over_requested_one() {
        let temp = TempDir::new().unwrap();
        let fetcher = Arc::new(
            MockFetcher::new()
                .with_body("https://x/1/a.txt", b"first")
                .with_body("https://x/2/a.txt", b"hello"),
        );
        let ctx = context(&temp, None, fetcher);

        assert!(
            ctx.register_literal(
                "adhoc",
                ["https://x/1/a.txt", "https://x/2/a.txt"],
                DuplicateHandling::AppendHash,
            )
            .await
            .unwrap()
        );
        let vfs = ctx.get_input_vfs("adhoc", VfsOptions::default()).await.unwrap();
        let names: Vec<_> = vfs.names().collect();
        assert_eq!(names, vec!["a.txt", "a_2cf24dba.txt"]);
        assert_eq!(vfs.read("a_2cf24dba.txt").unwrap(), b"hello");
    }

    #[tokio::test]
    async fn register_literal_never_replaces_declared_input() {
        let temp = TempDir::new().unwrap();
        let ctx = context(
            &temp,
            Some(r#"{"train": {"files": []}}"#),
            Arc::new(MockFetcher::new()),
        );
        assert!(
            !ctx.register_literal("train", ["https://x/a"], DuplicateHandling::Overwrite)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn paths_extract_archive_members_under_input_dir() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("bundle.zip");
        {
            use std::io::Write;
            let mut writer = zip::ZipWriter::new(fs::File::create(&archive).unwrap());
            writer
                .start_file("a.txt", zip::write::FileOptions::default())
                .unwrap();
            writer.write_all(b"A").unwrap();
            writer.finish().unwrap();
        }
        let ctx = context(&temp, None, Arc::new(MockFetcher::new()));
        ctx.register_literal(
            "bundle",
            [archive.to_str().unwrap()],
            DuplicateHandling::Overwrite,
        )
        .await
        .unwrap();

        let input = ctx.input("bundle");
        let path = input.path(VfsOptions::default()).await.unwrap();
        assert_eq!(path, input.dir_path().join(UNPACKED_DIR).join("a.txt"));
        assert_eq!(fs::read(&path).unwrap(), b"A");

        let mut readers = input.open_all(VfsOptions::default()).await.unwrap();
        let (name, reader) = &mut readers[0];
        let mut content = String::new();
        reader.read_to_string(&mut content).unwrap();
        assert_eq!((name.as_str(), content.as_str()), ("a.txt", "A"));
    }

    fn zip_with(name: &str, content: &[u8]) -> Vec<u8> {
        use std::io::Write;
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        writer
            .start_file(name, zip::write::FileOptions::default())
            .unwrap();
        writer.write_all(content).unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[tokio::test]
    async fn always_refresh_replaces_extracted_members() {
        let temp = TempDir::new().unwrap();
        let url = "https://x/bundle.zip";
        let ctx = context(
            &temp,
            Some(r#"{"bundle": {"files": [{"name": "bundle.zip", "uri": "https://x/bundle.zip"}]}}"#),
            Arc::new(MockFetcher::new().with_body(url, &zip_with("a.txt", b"v1"))),
        );
        let first = ctx.input("bundle").path(VfsOptions::default()).await.unwrap();
        assert_eq!(fs::read(&first).unwrap(), b"v1");

        let ctx = ctx.with_fetcher(Arc::new(
            MockFetcher::new().with_body(url, &zip_with("a.txt", b"v2")),
        ));
        let always = VfsOptions {
            download: DownloadPolicy::Always,
            ..VfsOptions::default()
        };
        let paths = ctx.input("bundle").paths(always).await.unwrap();
        assert_eq!(paths, vec![first]);
        assert_eq!(fs::read(&paths[0]).unwrap(), b"v2");
        assert_eq!(
            ctx.get_input_vfs("bundle", VfsOptions::default())
                .await
                .unwrap()
                .read("a.txt")
                .unwrap(),
            b"v2"
        );
    }

    #[tokio::test]
    async fn encoded_traversal_in_literal_url_stays_in_input_dir() {
        let temp = TempDir::new().unwrap();
        let fetcher = Arc::new(MockFetcher::new());
        let ctx = context(&temp, None, fetcher.clone());
        ctx.register_literal(
            "in",
            ["https://x/d/..%2F..%2Fescaped.txt"],
            DuplicateHandling::Overwrite,
        )
        .await
        .unwrap();

        let vfs = ctx.get_input_vfs("in", VfsOptions::default()).await.unwrap();
        assert_eq!(vfs.names().collect::<Vec<_>>(), vec!["escaped.txt"]);
        assert_eq!(
            fetcher.calls()[0].destination,
            ctx.input_dir("in").join("escaped.txt")
        );
        assert!(!temp.path().join("escaped.txt").exists());
    }

    #[tokio::test]
    async fn empty_input_has_no_path() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp, None, Arc::new(MockFetcher::new()));
        let pattern = temp.path().join("*.none");
        ctx.register_literal("empty", [pattern.to_str().unwrap()], DuplicateHandling::Overwrite)
            .await
            .unwrap();

        let err = ctx
            .input("empty")
            .path(VfsOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "input_no_files");
    }
}
