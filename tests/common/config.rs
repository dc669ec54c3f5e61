//! Test configuration helpers: isolated directories and a context wired to a mock API

use input_vfs::{Config, InputContext};
use std::path::Path;
use tempfile::TempDir;

/// Config rooted in `temp`, talking to `api_base_url`, without retries
pub fn test_config(temp: &TempDir, api_base_url: &str) -> Config {
    let mut config = Config::default();
    config.paths.inputs_dir = temp.path().join("inputs");
    config.paths.config_dir = temp.path().join("config");
    config.api.base_url = api_base_url.to_string();
    config.retry.max_attempts = 0;
    config.retry.jitter = false;
    config
}

/// Write the persisted input declarations for `config`
pub fn write_inputs_config(config: &Config, json: &serde_json::Value) {
    let path = config.paths.inputs_config_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, serde_json::to_vec_pretty(json).unwrap()).unwrap();
}

/// Context with the default HTTP collaborators and the given declarations
pub fn context_with_inputs(
    temp: &TempDir,
    api_base_url: &str,
    json: &serde_json::Value,
) -> InputContext {
    let config = test_config(temp, api_base_url);
    write_inputs_config(&config, json);
    InputContext::new(config).unwrap()
}

/// Path as a UTF-8 string for literals
pub fn literal(path: &Path) -> String {
    path.to_str().unwrap().to_string()
}
