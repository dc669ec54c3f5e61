//! Error types for input-vfs
//!
//! This module provides the error taxonomy for input resolution:
//! - Lookup errors (undeclared inputs)
//! - Per-file download and datum resolution errors
//! - VFS assembly and entry access errors
//! - Machine-readable error codes for callers that report failures upstream

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for input-vfs operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for input-vfs
///
/// Collaborator failures are wrapped with the offending input and file names
/// attached so a failure can be traced back to its declaration.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "files[0].uri")
        key: Option<String>,
    },

    /// Input lookup error
    #[error("input error: {0}")]
    Input(#[from] InputError),

    /// Download-related error
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// VFS assembly or access error
    #[error("vfs error: {0}")]
    Vfs(#[from] VfsError),

    /// Duplicate handling produced a second collision
    #[error("duplicate name {name} could not be disambiguated")]
    DuplicateName {
        /// The name that collided after disambiguation
        name: String,
    },

    /// Invalid local glob pattern
    #[error("invalid pattern: {0}")]
    InvalidPattern(#[from] glob::PatternError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Input lookup errors
#[derive(Debug, Error)]
pub enum InputError {
    /// No input with this name was declared or registered
    #[error("no such input: {name}")]
    NotDeclared {
        /// The requested input name
        name: String,
    },

    /// The input exists but resolved to zero files
    #[error("input {name} has no files")]
    NoFiles {
        /// The input name
        name: String,
    },
}

/// Per-file download errors
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Fetching a file failed
    #[error("failed to download {file} for input {input}: {reason}")]
    Failed {
        /// The input the file belongs to
        input: String,
        /// The logical file name
        file: String,
        /// The underlying failure
        reason: String,
    },

    /// A file needs fetching but no URL is known for it
    #[error("no download URL for {file} in input {input}")]
    MissingUrl {
        /// The input the file belongs to
        input: String,
        /// The logical file name
        file: String,
    },

    /// The batch download URL lookup for an input failed
    #[error("failed to fetch download URLs for input {input}: {reason}")]
    UrlLookup {
        /// The input whose URLs were requested
        input: String,
        /// The underlying failure
        reason: String,
    },

    /// Datum id or alias could not be resolved
    #[error("failed to resolve datum {datum}: {reason}")]
    DatumResolution {
        /// The datum id or alias
        datum: String,
        /// The underlying failure
        reason: String,
    },

    /// A local-path file does not exist
    #[error("local file {file} not found at {path}")]
    LocalFileMissing {
        /// The logical file name
        file: String,
        /// The path where the file was expected
        path: PathBuf,
    },

    /// The server answered with a non-success status
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The requested URL
        url: String,
        /// The HTTP status code
        status: u16,
    },
}

/// VFS assembly and access errors
#[derive(Debug, Error)]
pub enum VfsError {
    /// No entry with this name exists
    #[error("no such entry: {name}")]
    NoSuchEntry {
        /// The requested entry name
        name: String,
    },

    /// An archive could not be opened or listed
    #[error("archive {archive} is unreadable: {reason}")]
    ArchiveUnreadable {
        /// The archive path
        archive: PathBuf,
        /// The underlying failure
        reason: String,
    },

    /// A member listed earlier is no longer in the archive
    #[error("member {member} not found in {archive}")]
    MemberNotFound {
        /// The archive path
        archive: PathBuf,
        /// The member path inside the archive
        member: String,
    },

    /// An entry name that would resolve outside the extraction directory
    #[error("entry name {name} does not stay inside the extraction directory")]
    UnsafeName {
        /// The offending entry name
        name: String,
    },
}

impl Error {
    /// Machine-readable error code
    ///
    /// Stable identifiers for reporting failures upstream without parsing
    /// the display message.
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Input(InputError::NotDeclared { .. }) => "input_not_declared",
            Error::Input(InputError::NoFiles { .. }) => "input_no_files",
            Error::Download(DownloadError::Failed { .. }) => "download_failed",
            Error::Download(DownloadError::MissingUrl { .. }) => "download_url_missing",
            Error::Download(DownloadError::UrlLookup { .. }) => "download_url_lookup_failed",
            Error::Download(DownloadError::DatumResolution { .. }) => "datum_resolution_failed",
            Error::Download(DownloadError::LocalFileMissing { .. }) => "local_file_missing",
            Error::Download(DownloadError::HttpStatus { .. }) => "http_status",
            Error::Vfs(VfsError::NoSuchEntry { .. }) => "no_such_entry",
            Error::Vfs(VfsError::ArchiveUnreadable { .. }) => "archive_unreadable",
            Error::Vfs(VfsError::MemberNotFound { .. }) => "member_not_found",
            Error::Vfs(VfsError::UnsafeName { .. }) => "unsafe_entry_name",
            Error::DuplicateName { .. } => "duplicate_name_unresolvable",
            Error::InvalidPattern(_) => "invalid_pattern",
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::Other(_) => "internal_error",
        }
    }

    /// Whether the error only concerns a single file of an input
    ///
    /// Per-file errors may be collected into a report instead of aborting
    /// the whole input when partial downloads are allowed.
    pub fn is_per_file(&self) -> bool {
        match self {
            Error::Download(DownloadError::UrlLookup { .. }) => false,
            Error::Download(_) | Error::Vfs(VfsError::ArchiveUnreadable { .. }) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_error_variants() -> Vec<(Error, &'static str)> {
        vec![
            (
                Error::Config {
                    message: "bad".into(),
                    key: Some("files".into()),
                },
                "config_error",
            ),
            (
                InputError::NotDeclared {
                    name: "train".into(),
                }
                .into(),
                "input_not_declared",
            ),
            (
                InputError::NoFiles {
                    name: "train".into(),
                }
                .into(),
                "input_no_files",
            ),
            (
                DownloadError::Failed {
                    input: "train".into(),
                    file: "a.csv".into(),
                    reason: "reset".into(),
                }
                .into(),
                "download_failed",
            ),
            (
                DownloadError::MissingUrl {
                    input: "train".into(),
                    file: "a.csv".into(),
                }
                .into(),
                "download_url_missing",
            ),
            (
                DownloadError::UrlLookup {
                    input: "train".into(),
                    reason: "503".into(),
                }
                .into(),
                "download_url_lookup_failed",
            ),
            (
                DownloadError::DatumResolution {
                    datum: "alias".into(),
                    reason: "unknown".into(),
                }
                .into(),
                "datum_resolution_failed",
            ),
            (
                DownloadError::LocalFileMissing {
                    file: "a.csv".into(),
                    path: PathBuf::from("/tmp/a.csv"),
                }
                .into(),
                "local_file_missing",
            ),
            (
                DownloadError::HttpStatus {
                    url: "https://example.com/a".into(),
                    status: 404,
                }
                .into(),
                "http_status",
            ),
            (
                VfsError::NoSuchEntry { name: "a".into() }.into(),
                "no_such_entry",
            ),
            (
                VfsError::ArchiveUnreadable {
                    archive: PathBuf::from("x.zip"),
                    reason: "eof".into(),
                }
                .into(),
                "archive_unreadable",
            ),
            (
                VfsError::MemberNotFound {
                    archive: PathBuf::from("x.zip"),
                    member: "a".into(),
                }
                .into(),
                "member_not_found",
            ),
            (
                VfsError::UnsafeName {
                    name: "../a".into(),
                }
                .into(),
                "unsafe_entry_name",
            ),
            (
                Error::DuplicateName {
                    name: "a_1234abcd.txt".into(),
                },
                "duplicate_name_unresolvable",
            ),
            (Error::Io(std::io::Error::other("boom")), "io_error"),
            (Error::Other("boom".into()), "internal_error"),
        ]
    }

    #[test]
    fn every_variant_maps_to_expected_error_code() {
        for (error, expected) in all_error_variants() {
            assert_eq!(
                error.error_code(),
                expected,
                "unexpected error code for {error}"
            );
        }
    }

    #[test]
    fn download_failure_message_names_input_and_file() {
        let error: Error = DownloadError::Failed {
            input: "train".into(),
            file: "a.csv".into(),
            reason: "connection reset".into(),
        }
        .into();
        let message = error.to_string();
        assert!(message.contains("train"), "got: {message}");
        assert!(message.contains("a.csv"), "got: {message}");
        assert!(message.contains("connection reset"), "got: {message}");
    }

    #[test]
    fn only_file_scoped_errors_are_per_file() {
        let per_file: Error = DownloadError::MissingUrl {
            input: "train".into(),
            file: "a.csv".into(),
        }
        .into();
        assert!(per_file.is_per_file());

        let lookup: Error = InputError::NotDeclared {
            name: "train".into(),
        }
        .into();
        assert!(!lookup.is_per_file());

        let dup = Error::DuplicateName { name: "a".into() };
        assert!(!dup.is_per_file());
    }
}
