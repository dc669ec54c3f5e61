//! Virtual file system over the files of an input
//!
//! A [`Vfs`] is a flat namespace of uniquely named entries. Each entry is
//! either a file on disk or a member inside an archive on disk; archive
//! members are read lazily, so building a VFS never extracts anything.

pub mod archive;


use crate::error::{Error, Result, VfsError};
use crate::input::FileRecord;
use crate::naming::{Allocation, NameAllocator};
use crate::types::{ArchiveType, DuplicateHandling};
use crate::utils::{sha256_file, sha256_reader};
use archive::{detect_archive_type, extract_members, is_safe_member, list_members, read_member};
use std::collections::HashMap;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Where an entry's bytes live
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntrySource {
    /// A regular file
    Disk {
        /// Path of the file
        path: PathBuf,
    },
    /// A member of an archive on disk
    ArchiveMember {
        /// Path of the archive
        archive: PathBuf,
        /// Archive format
        kind: ArchiveType,
        /// Member path inside the archive
        member: String,
    },
}

/// One named file in a [`Vfs`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VfsEntry {
    /// Unique name within the VFS
    pub name: String,
    /// Where the bytes come from
    pub source: EntrySource,
}

impl VfsEntry {
    /// Path on disk, for entries that are plain files
    pub fn disk_path(&self) -> Option<&Path> {
        match &self.source {
            EntrySource::Disk { path } => Some(path),
            EntrySource::ArchiveMember { .. } => None,
        }
    }

    /// Open the entry for reading
    ///
    /// Archive members are decompressed into memory.
    pub fn open(&self) -> Result<Box<dyn Read + Send>> {
        match &self.source {
            EntrySource::Disk { path } => Ok(Box::new(File::open(path)?)),
            EntrySource::ArchiveMember { .. } => Ok(Box::new(Cursor::new(self.read()?))),
        }
    }

    /// Read the whole entry
    pub fn read(&self) -> Result<Vec<u8>> {
        match &self.source {
            EntrySource::Disk { path } => Ok(std::fs::read(path)?),
            EntrySource::ArchiveMember {
                archive,
                kind,
                member,
            } => read_member(archive, *kind, member),
        }
    }

    /// Give the entry a concrete path
    ///
    /// Disk entries return their own path. Archive members are extracted to
    /// `dir/<name>`; an earlier extraction is reused only while it is at
    /// least as new as the archive.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::UnsafeName`] if the entry name would leave `dir`,
    /// or the errors of [`archive::extract_members`].
    pub fn materialize(&self, dir: &Path) -> Result<PathBuf> {
        let (archive, kind, member) = match &self.source {
            EntrySource::Disk { path } => return Ok(path.clone()),
            EntrySource::ArchiveMember {
                archive,
                kind,
                member,
            } => (archive, kind, member),
        };
        let target = self.extraction_target(dir)?;
        if !is_current(&target, archive) {
            let targets = HashMap::from([(member.clone(), vec![target.clone()])]);
            extract_members(archive, *kind, &targets)?;
            debug!(entry = %self.name, ?target, "materialized archive member");
        }
        Ok(target)
    }

    fn extraction_target(&self, dir: &Path) -> Result<PathBuf> {
        if !is_safe_member(&self.name) {
            return Err(VfsError::UnsafeName {
                name: self.name.clone(),
            }
            .into());
        }
        Ok(dir.join(&self.name))
    }

    fn content_hash(&self) -> Result<String> {
        Ok(match &self.source {
            EntrySource::Disk { path } => sha256_file(path)?,
            EntrySource::ArchiveMember { .. } => sha256_reader(Cursor::new(self.read()?))?,
        })
    }
}

/// How [`Vfs::build`] assembles entries
#[derive(Clone, Debug)]
pub struct BuildOptions {
    /// Replace recognized archives by their members (default: true)
    pub expand_archives: bool,
    /// How colliding entry names are disambiguated (default: overwrite)
    pub duplicate_handling: DuplicateHandling,
    /// Name members `<archive name>/<member path>` (default: false)
    pub prefix_archive_members: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            expand_archives: true,
            duplicate_handling: DuplicateHandling::Overwrite,
            prefix_archive_members: false,
        }
    }
}

/// Flat namespace of uniquely named entries, in insertion order
#[derive(Clone, Debug, Default)]
pub struct Vfs {
    entries: Vec<VfsEntry>,
    index: HashMap<String, usize>,
}

impl Vfs {
    /// Assemble a VFS from materialized files
    ///
    /// Files without a local copy are skipped. With `expand_archives`, each
    /// archive contributes its file members instead of itself; an archive
    /// that cannot be read is kept as a plain entry. Name collisions follow
    /// `duplicate_handling`: under overwrite a later entry replaces the
    /// earlier one in place, otherwise the later name is disambiguated.
    ///
    /// Blocking: lists archives and may hash content.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateName`] if a collision cannot be
    /// disambiguated, or an I/O error if content needed for a hash cannot
    /// be read.
    pub fn build(files: &[FileRecord], options: &BuildOptions) -> Result<Self> {
        let mut vfs = Self::default();
        let mut allocator = NameAllocator::new(options.duplicate_handling);

        for file in files {
            let Some(path) = file.local_path.as_deref().filter(|_| file.is_downloaded()) else {
                warn!(file = %file.name, "file not materialized, leaving it out of the VFS");
                continue;
            };

            for entry in expand(file, path, options) {
                vfs.insert(entry, &mut allocator)?;
            }
        }

        debug!(entries = vfs.len(), "assembled VFS");
        Ok(vfs)
    }

    fn insert(&mut self, mut entry: VfsEntry, allocator: &mut NameAllocator) -> Result<()> {
        if allocator.strategy() == DuplicateHandling::Overwrite {
            if let Some(&position) = self.index.get(&entry.name) {
                debug!(entry = %entry.name, "replacing entry with the same name");
                self.entries[position] = entry;
                return Ok(());
            }
            self.push(entry);
            return Ok(());
        }

        let base = entry.name.clone();
        match allocator.allocate(&base, || entry.content_hash().map(Some))? {
            Allocation::Assigned(name) => entry.name = name,
            Allocation::Deferred => return Err(Error::DuplicateName { name: base }),
        }
        if self.index.contains_key(&entry.name) {
            return Err(Error::DuplicateName { name: entry.name });
        }
        self.push(entry);
        Ok(())
    }

    fn push(&mut self, entry: VfsEntry) {
        self.index.insert(entry.name.clone(), self.entries.len());
        self.entries.push(entry);
    }

    /// Entry names in order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.name.as_str())
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the VFS has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether an entry with this name exists
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Look up an entry by name
    pub fn get(&self, name: &str) -> Option<&VfsEntry> {
        self.index.get(name).map(|&position| &self.entries[position])
    }

    /// All entries in order
    pub fn entries(&self) -> &[VfsEntry] {
        &self.entries
    }

    /// Open an entry by name
    pub fn open(&self, name: &str) -> Result<Box<dyn Read + Send>> {
        self.entry(name)?.open()
    }

    /// Read an entry by name
    pub fn read(&self, name: &str) -> Result<Vec<u8>> {
        self.entry(name)?.read()
    }

    /// A concrete path for every entry, in order
    ///
    /// Like [`VfsEntry::materialize`], but stale members are extracted with
    /// one walk per archive instead of one per member.
    ///
    /// Blocking: reads archives and writes under `dir`.
    pub fn materialize_all(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::with_capacity(self.entries.len());
        let mut stale: HashMap<&Path, (ArchiveType, HashMap<String, Vec<PathBuf>>)> =
            HashMap::new();

        for entry in &self.entries {
            match &entry.source {
                EntrySource::Disk { path } => paths.push(path.clone()),
                EntrySource::ArchiveMember {
                    archive,
                    kind,
                    member,
                } => {
                    let target = entry.extraction_target(dir)?;
                    if !is_current(&target, archive) {
                        stale
                            .entry(archive.as_path())
                            .or_insert_with(|| (*kind, HashMap::new()))
                            .1
                            .entry(member.clone())
                            .or_default()
                            .push(target.clone());
                    }
                    paths.push(target);
                }
            }
        }

        for (archive, (kind, targets)) in &stale {
            extract_members(archive, *kind, targets)?;
        }
        debug!(entries = paths.len(), archives = stale.len(), "materialized VFS");
        Ok(paths)
    }

    fn entry(&self, name: &str) -> Result<&VfsEntry> {
        self.get(name).ok_or_else(|| {
            VfsError::NoSuchEntry {
                name: name.to_string(),
            }
            .into()
        })
    }
}

/// Whether `target` exists and is not older than `archive`
fn is_current(target: &Path, archive: &Path) -> bool {
    let modified = |path: &Path| std::fs::metadata(path).and_then(|meta| meta.modified());
    match (modified(target), modified(archive)) {
        (Ok(extracted), Ok(source)) => extracted >= source,
        _ => false,
    }
}

/// Entries contributed by one materialized file
fn expand(file: &FileRecord, path: &Path, options: &BuildOptions) -> Vec<VfsEntry> {
    let plain = || {
        vec![VfsEntry {
            name: file.name.clone(),
            source: EntrySource::Disk {
                path: path.to_path_buf(),
            },
        }]
    };

    if !options.expand_archives {
        return plain();
    }
    let Some(kind) = detect_archive_type(&file.name) else {
        return plain();
    };

    match list_members(path, kind) {
        Ok(members) => {
            debug!(archive = %file.name, count = members.len(), "expanding archive");
            members
                .into_iter()
                .map(|member| VfsEntry {
                    name: if options.prefix_archive_members {
                        format!("{}/{}", file.name, member)
                    } else {
                        member.clone()
                    },
                    source: EntrySource::ArchiveMember {
                        archive: path.to_path_buf(),
                        kind,
                        member,
                    },
                })
                .collect()
        }
        Err(e) => {
            warn!(
                archive = %file.name,
                error = %e,
                "archive unreadable, keeping it as a plain file"
            );
            plain()
        }
    }
}
