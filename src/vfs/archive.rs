//! Archive listing and member reads for ZIP, TAR, TAR.GZ and 7z
//!
//! All functions are blocking; callers on the async runtime run them on the
//! blocking pool.

use crate::error::{Result, VfsError};
use crate::types::ArchiveType;
use flate2::read::GzDecoder;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Detect archive type from a file name
///
/// Matching is case-insensitive and only looks at the suffix; the content
/// is not inspected.
pub fn detect_archive_type(name: &str) -> Option<ArchiveType> {
    let name = name.to_ascii_lowercase();
    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        Some(ArchiveType::TarGz)
    } else if name.ends_with(".tar") {
        Some(ArchiveType::Tar)
    } else if name.ends_with(".zip") {
        Some(ArchiveType::Zip)
    } else if name.ends_with(".7z") {
        Some(ArchiveType::SevenZip)
    } else {
        None
    }
}

/// Member names that stay inside the directory they are materialized into
pub(crate) fn is_safe_member(name: &str) -> bool {
    !name.is_empty()
        && Path::new(name)
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}

fn normalize_member(name: &str) -> String {
    name.trim_start_matches("./").to_string()
}

fn unreadable(archive: &Path, reason: impl std::fmt::Display) -> crate::error::Error {
    VfsError::ArchiveUnreadable {
        archive: archive.to_path_buf(),
        reason: reason.to_string(),
    }
    .into()
}

/// List the file members of an archive in archive order
///
/// Directories are skipped, as are members whose path would escape the
/// extraction directory.
///
/// # Errors
///
/// Returns [`VfsError::ArchiveUnreadable`] if the archive cannot be opened
/// or its index is corrupt.
pub fn list_members(path: &Path, kind: ArchiveType) -> Result<Vec<String>> {
    let mut members = Vec::new();
    let mut push = |name: String| {
        let name = normalize_member(&name);
        if is_safe_member(&name) {
            members.push(name);
        } else {
            warn!(archive = ?path, member = %name, "skipping member with unsafe path");
        }
    };

    match kind {
        ArchiveType::Zip => {
            let file = File::open(path).map_err(|e| unreadable(path, e))?;
            let mut archive = zip::ZipArchive::new(file).map_err(|e| unreadable(path, e))?;
            for index in 0..archive.len() {
                let entry = archive.by_index(index).map_err(|e| unreadable(path, e))?;
                if entry.is_dir() {
                    continue;
                }
                push(entry.name().to_string());
            }
        }
        ArchiveType::Tar | ArchiveType::TarGz => {
            let mut archive = tar::Archive::new(open_tar_stream(path, kind)?);
            for entry in archive.entries().map_err(|e| unreadable(path, e))? {
                let entry = entry.map_err(|e| unreadable(path, e))?;
                if !entry.header().entry_type().is_file() {
                    continue;
                }
                let name = entry.path().map_err(|e| unreadable(path, e))?;
                push(name.to_string_lossy().into_owned());
            }
        }
        ArchiveType::SevenZip => {
            // Names come from the header; nothing is decoded
            let archive = sevenz_rust::Archive::open(path).map_err(|e| unreadable(path, e))?;
            for entry in archive.files.iter().filter(|entry| !entry.is_directory()) {
                push(entry.name().to_string());
            }
        }
    }

    debug!(archive = ?path, ?kind, count = members.len(), "listed archive members");
    Ok(members)
}

/// Read one member fully into memory
///
/// # Errors
///
/// Returns [`VfsError::MemberNotFound`] if no file member has this name and
/// [`VfsError::ArchiveUnreadable`] if the archive cannot be read.
pub fn read_member(path: &Path, kind: ArchiveType, member: &str) -> Result<Vec<u8>> {
    let mut content = None;

    match kind {
        ArchiveType::Zip => {
            let file = File::open(path).map_err(|e| unreadable(path, e))?;
            let mut archive = zip::ZipArchive::new(file).map_err(|e| unreadable(path, e))?;
            let stored = archive
                .file_names()
                .find(|name| !name.ends_with('/') && normalize_member(name) == member)
                .map(str::to_string);
            if let Some(stored) = stored {
                let mut entry = archive.by_name(&stored).map_err(|e| unreadable(path, e))?;
                // Declared sizes are not trusted for preallocation
                let mut buf = Vec::new();
                entry.read_to_end(&mut buf).map_err(|e| unreadable(path, e))?;
                content = Some(buf);
            }
        }
        ArchiveType::Tar | ArchiveType::TarGz => {
            let mut archive = tar::Archive::new(open_tar_stream(path, kind)?);
            for entry in archive.entries().map_err(|e| unreadable(path, e))? {
                let mut entry = entry.map_err(|e| unreadable(path, e))?;
                if !entry.header().entry_type().is_file() {
                    continue;
                }
                let matches = {
                    let name = entry.path().map_err(|e| unreadable(path, e))?;
                    normalize_member(&name.to_string_lossy()) == member
                };
                if !matches {
                    continue;
                }
                let mut buf = Vec::new();
                entry.read_to_end(&mut buf).map_err(|e| unreadable(path, e))?;
                content = Some(buf);
                break;
            }
        }
        ArchiveType::SevenZip => {
            for_each_sevenz_member(path, |name, reader| {
                if normalize_member(name) != member {
                    io::copy(reader, &mut io::sink())?;
                    return Ok(true);
                }
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf)?;
                content = Some(buf);
                Ok(false)
            })?;
        }
    }

    content.ok_or_else(|| {
        VfsError::MemberNotFound {
            archive: path.to_path_buf(),
            member: member.to_string(),
        }
        .into()
    })
}

/// Extract members to their targets in one walk over the archive
///
/// `targets` maps member names (as listed by [`list_members`]) to the paths
/// that should receive them; a member may be written to several paths.
/// Each file is written next to its target and renamed into place, so a
/// target is either absent or complete.
///
/// # Errors
///
/// Returns [`VfsError::MemberNotFound`] for the first requested member the
/// archive does not contain, [`VfsError::ArchiveUnreadable`] if the archive
/// cannot be read, and an I/O error if a target cannot be written.
pub fn extract_members(
    path: &Path,
    kind: ArchiveType,
    targets: &HashMap<String, Vec<PathBuf>>,
) -> Result<()> {
    let mut written = HashSet::new();

    match kind {
        ArchiveType::Zip => {
            let file = File::open(path).map_err(|e| unreadable(path, e))?;
            let mut archive = zip::ZipArchive::new(file).map_err(|e| unreadable(path, e))?;
            for index in 0..archive.len() {
                let mut entry = archive.by_index(index).map_err(|e| unreadable(path, e))?;
                if entry.is_dir() {
                    continue;
                }
                let name = normalize_member(entry.name());
                let Some(paths) = targets.get(&name) else {
                    continue;
                };
                if written.insert(name) {
                    write_member(&mut entry, paths)?;
                }
            }
        }
        ArchiveType::Tar | ArchiveType::TarGz => {
            let mut archive = tar::Archive::new(open_tar_stream(path, kind)?);
            for entry in archive.entries().map_err(|e| unreadable(path, e))? {
                let mut entry = entry.map_err(|e| unreadable(path, e))?;
                if !entry.header().entry_type().is_file() {
                    continue;
                }
                let name = {
                    let name = entry.path().map_err(|e| unreadable(path, e))?;
                    normalize_member(&name.to_string_lossy())
                };
                let Some(paths) = targets.get(&name) else {
                    continue;
                };
                if written.insert(name) {
                    write_member(&mut entry, paths)?;
                }
                if written.len() == targets.len() {
                    break;
                }
            }
        }
        ArchiveType::SevenZip => {
            // Solid blocks decode front to back, so unwanted members are
            // drained rather than skipped
            let mut write_error = None;
            for_each_sevenz_member(path, |name, reader| {
                let name = normalize_member(name);
                let wanted = targets.get(&name).filter(|_| !written.contains(&name));
                match wanted {
                    Some(paths) => {
                        written.insert(name);
                        if let Err(e) = write_member(reader, paths) {
                            write_error = Some(e);
                            return Ok(false);
                        }
                    }
                    None => {
                        io::copy(reader, &mut io::sink())?;
                    }
                }
                Ok(written.len() < targets.len())
            })?;
            if let Some(e) = write_error {
                return Err(e);
            }
        }
    }

    if let Some(missing) = targets.keys().find(|member| !written.contains(*member)) {
        return Err(VfsError::MemberNotFound {
            archive: path.to_path_buf(),
            member: missing.clone(),
        }
        .into());
    }
    debug!(archive = ?path, ?kind, count = written.len(), "extracted archive members");
    Ok(())
}

/// Stream one member into the first path, then copy it to the rest
fn write_member<R: Read + ?Sized>(reader: &mut R, paths: &[PathBuf]) -> Result<()> {
    let Some((first, rest)) = paths.split_first() else {
        io::copy(reader, &mut io::sink())?;
        return Ok(());
    };
    if let Some(parent) = first.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut partial = first.as_os_str().to_owned();
    partial.push(".part");
    let partial = PathBuf::from(partial);

    let result = File::create(&partial)
        .and_then(|mut file| io::copy(reader, &mut file))
        .and_then(|_| std::fs::rename(&partial, first));
    if let Err(e) = result {
        let _ = std::fs::remove_file(&partial);
        return Err(e.into());
    }

    for path in rest {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(first, path)?;
    }
    Ok(())
}

fn open_tar_stream(path: &Path, kind: ArchiveType) -> Result<Box<dyn Read>> {
    let file = File::open(path).map_err(|e| unreadable(path, e))?;
    Ok(match kind {
        ArchiveType::TarGz => Box::new(GzDecoder::new(file)),
        _ => Box::new(file),
    })
}

/// Visit the file members of a 7z archive
///
/// `visit` returns `Ok(false)` to stop early. I/O errors raised by the
/// visitor are reported as the archive being unreadable.
fn for_each_sevenz_member<F>(path: &Path, mut visit: F) -> Result<()>
where
    F: FnMut(&str, &mut dyn Read) -> io::Result<bool>,
{
    let mut reader = sevenz_rust::SevenZReader::open(path, sevenz_rust::Password::empty())
        .map_err(|e| unreadable(path, e))?;

    let mut io_error = None;
    reader
        .for_each_entries(|entry, member_reader| {
            if entry.is_directory() {
                return Ok(true);
            }
            match visit(entry.name(), member_reader) {
                Ok(more) => Ok(more),
                Err(e) => {
                    io_error = Some(e);
                    Ok(false)
                }
            }
        })
        .map_err(|e| unreadable(path, e))?;

    match io_error {
        Some(e) => Err(unreadable(path, e)),
        None => Ok(()),
    }
}
