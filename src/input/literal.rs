use super::{FileRecord, InputRecord};
use crate::error::Result;
use crate::types::DuplicateHandling;
use crate::utils::{basename, is_uri, uri_to_filename};
use tracing::{debug, warn};

impl InputRecord {
    /// Build an ad hoc input from URL and local path literals
    ///
    /// Each value containing `://` becomes one remote file named after the
    /// URI's last path segment; any other value is a glob pattern whose
    /// matching files become local files named by basename. Value order and
    /// match order are kept. Duplicate names are resolved here, except hash
    /// disambiguation of remote files, which waits for their content (see
    /// [`InputRecord::finalize_names`]).
    pub fn from_literals<I, S>(values: I, duplicate_handling: DuplicateHandling) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut files = Vec::new();

        for value in values {
            let value = value.as_ref();
            if is_uri(value) {
                files.push(FileRecord::remote(uri_to_filename(value), value));
                continue;
            }

            let mut matched = 0usize;
            for entry in glob::glob(value)? {
                let path = match entry {
                    Ok(path) => path,
                    Err(e) => {
                        warn!(pattern = value, error = %e, "skipping unreadable glob match");
                        continue;
                    }
                };
                if !path.is_file() {
                    continue;
                }
                let Some(name) = basename(&path) else {
                    continue;
                };
                files.push(FileRecord::local(name, path));
                matched += 1;
            }
            debug!(pattern = value, matched, "expanded local pattern");
        }

        let mut record = InputRecord::new(files, None);
        record.duplicate_handling = Some(duplicate_handling);
        record.assign_names(duplicate_handling)?;
        Ok(record)
    }
}
