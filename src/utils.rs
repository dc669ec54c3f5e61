//! Utility functions for names, URIs and file hashing

use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

/// Scheme separator that distinguishes a URI literal from a local pattern
pub const SCHEME_SEPARATOR: &str = "://";

/// Scheme of content-addressed datum references
pub const DATUM_SCHEME: &str = "datum://";

/// Name used when a URI has no usable final path segment
const FALLBACK_FILENAME: &str = "download";

/// Whether a literal is a URI rather than a local path or pattern
pub fn is_uri(value: &str) -> bool {
    value.contains(SCHEME_SEPARATOR)
}

/// Derive a filename from the final path segment of a URI
///
/// Query strings and fragments are ignored and the segment is
/// percent-decoded, then reduced with [`safe_file_name`] so encoded
/// separators cannot reintroduce a path. `datum://<id>` yields `<id>`.
///
/// # Examples
///
/// ```
/// use input_vfs::utils::uri_to_filename;
///
/// assert_eq!(uri_to_filename("s3://bucket/data/train.csv"), "train.csv");
/// assert_eq!(uri_to_filename("https://host/a/b%20c.txt?sig=1"), "b c.txt");
/// assert_eq!(uri_to_filename("datum://017f3a"), "017f3a");
/// assert_eq!(uri_to_filename("https://x/d/..%2F..%2Fescaped.txt"), "escaped.txt");
/// ```
pub fn uri_to_filename(uri: &str) -> String {
    let segment = match url::Url::parse(uri) {
        Ok(parsed) => {
            let from_path = parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back())
                .filter(|segment| !segment.is_empty())
                .map(str::to_string);
            // datum://<id> puts the id in the host position
            from_path.or_else(|| {
                parsed
                    .host_str()
                    .filter(|host| !host.is_empty() && parsed.path().is_empty())
                    .map(str::to_string)
            })
        }
        Err(_) => uri
            .split(['?', '#'])
            .next()
            .and_then(|path| path.rsplit('/').next())
            .filter(|segment| !segment.is_empty())
            .map(str::to_string),
    };

    match segment {
        Some(segment) => match urlencoding::decode(&segment) {
            Ok(decoded) => safe_file_name(&decoded),
            Err(_) => safe_file_name(&segment),
        },
        None => FALLBACK_FILENAME.to_string(),
    }
}

/// Reduce a name to a single plain path component
///
/// Both `/` and `\` count as separators; the last component that is not
/// empty, `.` or `..` is kept. Names with no such component become
/// `"download"`.
///
/// # Examples
///
/// ```
/// use input_vfs::utils::safe_file_name;
///
/// assert_eq!(safe_file_name("train.csv"), "train.csv");
/// assert_eq!(safe_file_name("../../etc/passwd"), "passwd");
/// assert_eq!(safe_file_name("..\\x.bin"), "x.bin");
/// assert_eq!(safe_file_name(".."), "download");
/// ```
pub fn safe_file_name(name: &str) -> String {
    name.split(['/', '\\'])
        .filter(|component| !matches!(*component, "" | "." | ".."))
        .next_back()
        .unwrap_or(FALLBACK_FILENAME)
        .to_string()
}

/// Split a filename into stem and extension at the last dot
///
/// A leading dot does not start an extension, and the returned extension
/// keeps its dot so `stem + ext` always rebuilds the input.
///
/// # Examples
///
/// ```
/// use input_vfs::utils::split_extension;
///
/// assert_eq!(split_extension("a.txt"), ("a", ".txt"));
/// assert_eq!(split_extension("archive.tar.gz"), ("archive.tar", ".gz"));
/// assert_eq!(split_extension(".env"), (".env", ""));
/// assert_eq!(split_extension("README"), ("README", ""));
/// ```
pub fn split_extension(name: &str) -> (&str, &str) {
    let start = name.len() - name.trim_start_matches('.').len();
    match name[start..].rfind('.') {
        Some(idx) => name.split_at(start + idx),
        None => (name, ""),
    }
}

/// Insert `_<suffix>` between stem and extension
pub fn with_suffix(name: &str, suffix: &str) -> String {
    let (stem, ext) = split_extension(name);
    format!("{stem}_{suffix}{ext}")
}

/// Final component of a path as an owned string
pub fn basename(path: &Path) -> Option<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

/// SHA-256 of everything a reader yields, as lowercase hex
pub fn sha256_reader(mut reader: impl Read) -> std::io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// SHA-256 of a file's content, as lowercase hex
pub fn sha256_file(path: &Path) -> std::io::Result<String> {
    sha256_reader(std::fs::File::open(path)?)
}
