//! Input and file records
//!
//! An [`InputRecord`] is the ordered set of [`FileRecord`]s declared under one
//! input name. Records come either from the persisted job configuration
//! ([`InputRecord::from_config_entry`]) or from URL/path literals given at call
//! time ([`InputRecord::from_literals`]), and are mutated in place as files get
//! downloaded and named.

mod literal;


use crate::error::{Error, Result};
use crate::naming::{Allocation, NameAllocator};
use crate::types::DuplicateHandling;
use crate::utils::{DATUM_SCHEME, safe_file_name, sha256_file, uri_to_filename};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where a file's bytes come from
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FileSource {
    /// A URL the fetcher can download directly
    RemoteUri(String),
    /// A file already on local disk
    LocalPath(PathBuf),
    /// A datum id or alias that must be resolved to a name and URL first
    DatumRef(String),
}

impl FileSource {
    /// Whether bytes have to be fetched over the network
    pub fn is_remote(&self) -> bool {
        !matches!(self, FileSource::LocalPath(_))
    }
}

/// One physical or virtual file belonging to an input
#[derive(Clone, Debug)]
pub struct FileRecord {
    /// Logical filename, final once duplicate handling has run
    pub name: String,
    /// Name as declared (or as resolved from a datum); duplicate handling starts from it
    pub original_name: String,
    /// Provenance of the bytes
    pub source: FileSource,
    /// Where the file lives once materialized
    pub local_path: Option<PathBuf>,
    /// URL for the next fetch; starts as the remote URI, replaced by batch URLs
    pub download_url: Option<String>,
    /// Size in bytes, if known
    pub size: Option<u64>,
    /// Checksums by algorithm name (e.g. "sha256", "md5")
    pub checksums: BTreeMap<String, String>,
    /// Free-form metadata attached by the platform
    pub metadata: Vec<serde_json::Value>,
}

impl FileRecord {
    fn with_source(name: String, source: FileSource) -> Self {
        let download_url = match &source {
            FileSource::RemoteUri(url) => Some(url.clone()),
            _ => None,
        };
        let local_path = match &source {
            FileSource::LocalPath(path) => Some(path.clone()),
            _ => None,
        };
        Self {
            original_name: name.clone(),
            name,
            source,
            local_path,
            download_url,
            size: None,
            checksums: BTreeMap::new(),
            metadata: Vec::new(),
        }
    }

    /// A file fetched from `url`
    pub fn remote(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self::with_source(name.into(), FileSource::RemoteUri(url.into()))
    }

    /// A file that already exists at `path`
    pub fn local(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::with_source(name.into(), FileSource::LocalPath(path.into()))
    }

    /// A datum reference; the name is provisional until resolution
    pub fn datum(id_or_alias: impl Into<String>) -> Self {
        let id = id_or_alias.into();
        Self::with_source(id.clone(), FileSource::DatumRef(id))
    }

    /// Set the location where the file is expected on disk
    pub fn with_local_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.local_path = Some(path.into());
        self
    }

    /// Whether the file is materialized
    ///
    /// Checks the filesystem on every call; the answer is never cached.
    pub fn is_downloaded(&self) -> bool {
        self.local_path.as_deref().is_some_and(Path::is_file)
    }

    /// Switch a datum reference to its resolved name and URL
    ///
    /// The resolved name is reduced to one path component.
    pub fn resolve_datum(&mut self, name: String, url: String) {
        let name = safe_file_name(&name);
        self.name = name.clone();
        self.original_name = name;
        self.download_url = Some(url.clone());
        self.source = FileSource::RemoteUri(url);
    }

    /// SHA-256 of the content: the declared checksum if any, else computed from disk
    ///
    /// `Ok(None)` when neither is available.
    pub fn content_hash(&self) -> Result<Option<String>> {
        if let Some(declared) = self.checksums.get("sha256") {
            return Ok(Some(declared.to_ascii_lowercase()));
        }
        match &self.local_path {
            Some(path) if path.is_file() => Ok(Some(sha256_file(path)?)),
            _ => Ok(None),
        }
    }

    fn from_entry(entry: FileEntry, index: usize) -> Result<Self> {
        let FileEntry {
            name,
            uri,
            path,
            size,
            checksums,
            metadata,
            datum_id,
        } = entry;

        let datum_from_uri = uri
            .as_deref()
            .filter(|uri| uri.starts_with(DATUM_SCHEME))
            .map(uri_to_filename);

        let source = match (datum_id.or(datum_from_uri), uri, &path) {
            (Some(datum), _, _) => FileSource::DatumRef(datum),
            (None, Some(uri), _) => FileSource::RemoteUri(uri),
            (None, None, Some(path)) => FileSource::LocalPath(PathBuf::from(path)),
            (None, None, None) => {
                return Err(Error::Config {
                    message: format!("file {name} has neither uri, path nor datum_id"),
                    key: Some(format!("files[{index}]")),
                });
            }
        };

        let mut record = Self::with_source(name, source);
        if let Some(path) = path {
            record.local_path = Some(PathBuf::from(path));
        }
        record.size = size;
        record.checksums = checksums.unwrap_or_default();
        record.metadata = metadata.unwrap_or_default();
        Ok(record)
    }
}

/// Ordered files declared under one input name
#[derive(Clone, Debug, Default)]
pub struct InputRecord {
    /// Identifier for batch download URL requests
    pub input_id: Option<String>,
    /// Files in declaration order
    pub files: Vec<FileRecord>,
    /// Duplicate handling fixed when the record was built, if any
    ///
    /// Literal inputs resolve names at construction, so their strategy wins
    /// over the one requested when the VFS is built.
    pub duplicate_handling: Option<DuplicateHandling>,
    /// Some names still wait for content to be hashed
    pub names_pending: bool,
}

impl InputRecord {
    /// Create a record from files in declaration order
    pub fn new(files: Vec<FileRecord>, input_id: Option<String>) -> Self {
        Self {
            input_id,
            files,
            duplicate_handling: None,
            names_pending: false,
        }
    }

    /// Whether there is at least one file and every file is materialized
    pub fn is_downloaded(&self) -> bool {
        !self.files.is_empty() && self.files.iter().all(FileRecord::is_downloaded)
    }

    /// Local paths of materialized files, in declaration order
    pub fn paths(&self) -> Vec<&Path> {
        self.files
            .iter()
            .filter(|file| file.is_downloaded())
            .filter_map(|file| file.local_path.as_deref())
            .collect()
    }

    /// Build from one entry of the persisted configuration
    pub fn from_config_entry(entry: InputEntry) -> Result<Self> {
        let files = entry
            .files
            .into_iter()
            .enumerate()
            .map(|(index, file)| FileRecord::from_entry(file, index))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(files, entry.input_id))
    }

    /// Rewrite file names under `strategy`, starting from the declared names
    ///
    /// Runs in declaration order, so the outcome only depends on the
    /// declaration (and content, for hashes). Files whose hash is needed but
    /// whose content is not available keep their declared name and leave
    /// `names_pending` set.
    pub fn assign_names(&mut self, strategy: DuplicateHandling) -> Result<()> {
        let mut allocator = NameAllocator::new(strategy);
        let mut deferred = false;

        for file in &mut self.files {
            let original = file.original_name.clone();
            match allocator.allocate(&original, || file.content_hash())? {
                Allocation::Assigned(name) => file.name = name,
                Allocation::Deferred => {
                    debug!(file = %original, "name allocation deferred until content exists");
                    file.name = original;
                    deferred = true;
                }
            }
        }

        self.names_pending = deferred;
        Ok(())
    }

    /// Make names final before the VFS is built and return the strategy in effect
    ///
    /// A strategy fixed at construction takes precedence over `requested`;
    /// its names are only recomputed when some were deferred.
    pub fn finalize_names(&mut self, requested: DuplicateHandling) -> Result<DuplicateHandling> {
        match self.duplicate_handling {
            Some(fixed) => {
                if self.names_pending {
                    self.assign_names(fixed)?;
                }
                Ok(fixed)
            }
            None => {
                self.assign_names(requested)?;
                Ok(requested)
            }
        }
    }
}

/// One file as stored in the persisted configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileEntry {
    /// Logical filename
    pub name: String,
    /// Remote URI (may be `datum://<id>`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    /// Local path the platform placed the file at
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Size in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Checksums by algorithm
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksums: Option<BTreeMap<String, String>>,
    /// Free-form metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Vec<serde_json::Value>>,
    /// Datum id, when the file is a datum reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datum_id: Option<String>,
}

/// One input as stored in the persisted configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct InputEntry {
    /// Identifier for batch download URL requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_id: Option<String>,
    /// Files in declaration order
    #[serde(default)]
    pub files: Vec<FileEntry>,
}

/// Parse the persisted configuration: input name → declaration
pub fn parse_inputs_config(content: &[u8]) -> Result<BTreeMap<String, InputRecord>> {
    let entries: BTreeMap<String, InputEntry> = serde_json::from_slice(content)?;
    entries
        .into_iter()
        .map(|(name, entry)| {
            let record = InputRecord::from_config_entry(entry).map_err(|e| match e {
                Error::Config { message, key } => Error::Config {
                    message: format!("input {name}: {message}"),
                    key: key.map(|key| format!("{name}.{key}")),
                },
                other => other,
            })?;
            Ok((name, record))
        })
        .collect()
}
