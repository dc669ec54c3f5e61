//! Process-wide registry of named inputs
//!
//! Declared inputs come from the persisted job configuration and are loaded
//! once, on first use. Ad hoc inputs can be registered at runtime next to
//! them. Every record sits behind its own async mutex, so work on one input
//! name is serialized while different inputs proceed independently.

use crate::error::Result;
use crate::input::{InputRecord, parse_inputs_config};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell, RwLock};
use tracing::{debug, info};

/// A registered input, shared between callers
pub type SharedInput = Arc<Mutex<InputRecord>>;

/// Name → input record, for declared and ad hoc inputs
#[derive(Debug)]
pub struct InputRegistry {
    config_path: PathBuf,
    declared: OnceCell<BTreeMap<String, SharedInput>>,
    registered: RwLock<BTreeMap<String, SharedInput>>,
}

impl InputRegistry {
    /// Registry backed by the configuration file at `config_path`
    ///
    /// Nothing is read until the first lookup.
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            declared: OnceCell::new(),
            registered: RwLock::new(BTreeMap::new()),
        }
    }

    /// Path of the backing configuration file
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Whether the declared inputs have been loaded
    pub fn is_loaded(&self) -> bool {
        self.declared.initialized()
    }

    /// Load declared inputs if that has not happened yet
    ///
    /// Concurrent first callers share a single read. A missing file yields
    /// no declared inputs.
    ///
    /// # Errors
    ///
    /// Returns a serialization or configuration error for a malformed
    /// file. The registry then stays unloaded and the next call retries.
    async fn declared(&self) -> Result<&BTreeMap<String, SharedInput>> {
        self.declared
            .get_or_try_init(|| load_declared(&self.config_path))
            .await
    }

    /// Find an input by name; declared inputs take precedence
    pub async fn lookup(&self, name: &str) -> Result<Option<SharedInput>> {
        if let Some(record) = self.declared().await?.get(name) {
            return Ok(Some(Arc::clone(record)));
        }
        Ok(self.registered.read().await.get(name).cloned())
    }

    /// Names of all inputs, sorted
    pub async fn names(&self) -> Result<Vec<String>> {
        let declared = self.declared().await?;
        let registered = self.registered.read().await;
        let mut names: Vec<String> = declared.keys().chain(registered.keys()).cloned().collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    /// Register an ad hoc input
    ///
    /// Returns `false` without changing anything when `name` is a declared
    /// input. An earlier ad hoc registration under the same name is
    /// replaced.
    pub async fn register(&self, name: impl Into<String>, record: InputRecord) -> Result<bool> {
        let name = name.into();
        if self.declared().await?.contains_key(&name) {
            debug!(input = %name, "declared input takes precedence over ad hoc registration");
            return Ok(false);
        }
        debug!(input = %name, files = record.files.len(), "registered ad hoc input");
        self.registered
            .write()
            .await
            .insert(name, Arc::new(Mutex::new(record)));
        Ok(true)
    }
}

async fn load_declared(path: &Path) -> Result<BTreeMap<String, SharedInput>> {
    let content = match tokio::fs::read(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(?path, "no inputs configuration, no declared inputs");
            return Ok(BTreeMap::new());
        }
        Err(e) => return Err(e.into()),
    };
    let inputs = parse_inputs_config(&content)?;
    info!(?path, count = inputs.len(), "loaded declared inputs");
    Ok(inputs
        .into_iter()
        .map(|(name, record)| (name, Arc::new(Mutex::new(record))))
        .collect())
}
