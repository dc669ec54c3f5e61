//! Core types for input-vfs

use serde::{Deserialize, Serialize};

/// When to fetch the files of an input
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadPolicy {
    /// Never fetch, use whatever is already on disk
    Never,
    /// Fetch only when some file is missing (default)
    #[default]
    Optional,
    /// Re-fetch every remote file, overwriting
    Always,
}

impl std::str::FromStr for DownloadPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "never" => Ok(DownloadPolicy::Never),
            "optional" => Ok(DownloadPolicy::Optional),
            "always" => Ok(DownloadPolicy::Always),
            other => Err(format!("unknown download policy: {other}")),
        }
    }
}

/// How colliding file names are disambiguated
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateHandling {
    /// Keep the name, the last file wins (default)
    #[default]
    Overwrite,
    /// Append `_1`, `_2`, ... to later occurrences
    AppendIndex,
    /// Append the first 8 hex characters of the content hash to later occurrences
    AppendHash,
}

impl std::str::FromStr for DuplicateHandling {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "overwrite" => Ok(DuplicateHandling::Overwrite),
            "append_index" => Ok(DuplicateHandling::AppendIndex),
            "append_hash" => Ok(DuplicateHandling::AppendHash),
            other => Err(format!("unknown duplicate handling: {other}")),
        }
    }
}

/// Archive type detected by file name
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveType {
    /// ZIP archive (.zip)
    Zip,
    /// Uncompressed tarball (.tar)
    Tar,
    /// Gzip-compressed tarball (.tar.gz, .tgz)
    TarGz,
    /// 7-Zip archive (.7z)
    SevenZip,
}

/// Outcome of one download pass over an input
#[must_use]
#[derive(Debug, Default)]
pub struct DownloadReport {
    /// Number of fetch calls that completed
    pub fetched: usize,
    /// Number of files that were already present and left alone
    pub skipped: usize,
    /// Files that could not be materialized
    pub failed: Vec<FileFailure>,
}

impl DownloadReport {
    /// Whether every file of the pass was materialized
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// A file that could not be materialized, with the reason
#[derive(Debug)]
pub struct FileFailure {
    /// The logical file name at the time of failure
    pub file: String,
    /// What went wrong
    pub error: crate::error::Error,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn download_policy_parses_case_insensitively() {
        let cases = [
            ("never", DownloadPolicy::Never),
            ("Optional", DownloadPolicy::Optional),
            ("ALWAYS", DownloadPolicy::Always),
        ];
        for (text, expected) in cases {
            assert_eq!(DownloadPolicy::from_str(text).unwrap(), expected);
        }
        assert!(DownloadPolicy::from_str("sometimes").is_err());
    }

    #[test]
    fn duplicate_handling_defaults_to_overwrite() {
        assert_eq!(DuplicateHandling::default(), DuplicateHandling::Overwrite);
        assert_eq!(
            DuplicateHandling::from_str("append_hash").unwrap(),
            DuplicateHandling::AppendHash
        );
    }

    #[test]
    fn duplicate_handling_serializes_snake_case() {
        let json = serde_json::to_string(&DuplicateHandling::AppendIndex).unwrap();
        assert_eq!(json, "\"append_index\"");
        let back: DuplicateHandling = serde_json::from_str(&json).unwrap();
        assert_eq!(back, DuplicateHandling::AppendIndex);
    }
}
