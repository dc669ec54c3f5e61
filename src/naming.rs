//! Duplicate name allocation
//!
//! [`NameAllocator`] turns the base names of an input's files, taken in
//! declaration order, into the names used in the VFS. The same ordered list
//! of base names (and hashes) always produces the same result.

use crate::error::{Error, Result};
use crate::types::DuplicateHandling;
use crate::utils::with_suffix;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Number of hex characters of the content hash used as a suffix
pub const HASH_SUFFIX_LEN: usize = 8;

/// Result of a single allocation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Allocation {
    /// The name to use
    Assigned(String),
    /// A content hash is needed but the content is not available yet
    Deferred,
}

/// Deterministic duplicate-name policy
///
/// Keeps, per base name, a collision counter and the set of names handed out
/// so far. Call [`NameAllocator::allocate`] once per file in declaration order.
#[derive(Debug)]
pub struct NameAllocator {
    strategy: DuplicateHandling,
    counters: HashMap<String, u32>,
    taken: HashSet<String>,
}

impl NameAllocator {
    /// Create an allocator for one input
    pub fn new(strategy: DuplicateHandling) -> Self {
        Self {
            strategy,
            counters: HashMap::new(),
            taken: HashSet::new(),
        }
    }

    /// Strategy this allocator applies
    pub fn strategy(&self) -> DuplicateHandling {
        self.strategy
    }

    /// Allocate the final name for the next file
    ///
    /// `content_hash` is only invoked for a repeated base name under
    /// [`DuplicateHandling::AppendHash`]; returning `Ok(None)` from it defers
    /// the allocation.
    pub fn allocate<F>(&mut self, base: &str, content_hash: F) -> Result<Allocation>
    where
        F: FnOnce() -> Result<Option<String>>,
    {
        let seen = self.counters.contains_key(base);

        let name = match self.strategy {
            DuplicateHandling::Overwrite => base.to_string(),
            DuplicateHandling::AppendIndex => {
                if !seen && !self.taken.contains(base) {
                    self.counters.insert(base.to_string(), 0);
                    base.to_string()
                } else {
                    self.next_indexed(base)
                }
            }
            DuplicateHandling::AppendHash => {
                if !seen && !self.taken.contains(base) {
                    self.counters.insert(base.to_string(), 0);
                    base.to_string()
                } else {
                    let Some(hash) = content_hash()? else {
                        debug!(base, "content hash unavailable, deferring name");
                        return Ok(Allocation::Deferred);
                    };
                    let prefix: String = hash.chars().take(HASH_SUFFIX_LEN).collect();
                    let candidate = with_suffix(base, &prefix);
                    if self.taken.contains(&candidate) {
                        return Err(Error::DuplicateName { name: candidate });
                    }
                    *self.counters.entry(base.to_string()).or_insert(0) += 1;
                    candidate
                }
            }
        };

        if name != base {
            debug!(base, name = %name, "disambiguated duplicate name");
        }
        self.taken.insert(name.clone());
        Ok(Allocation::Assigned(name))
    }

    /// Allocate without content, for strategies that never need it
    ///
    /// Under [`DuplicateHandling::AppendHash`] a repeated name comes back as
    /// [`Allocation::Deferred`].
    pub fn allocate_without_content(&mut self, base: &str) -> Result<Allocation> {
        self.allocate(base, || Ok(None))
    }

    fn next_indexed(&mut self, base: &str) -> String {
        let counter = self.counters.entry(base.to_string()).or_insert(0);
        loop {
            *counter += 1;
            let candidate = with_suffix(base, &counter.to_string());
            if !self.taken.contains(&candidate) {
                return candidate;
            }
        }
    }
}

/// Allocate names for a list of base names that need no content
///
/// Convenience for [`DuplicateHandling::Overwrite`] and
/// [`DuplicateHandling::AppendIndex`]; hash allocations that cannot be made
/// keep their base name.
pub fn allocate_all<'a>(
    strategy: DuplicateHandling,
    bases: impl IntoIterator<Item = &'a str>,
) -> Result<Vec<String>> {
    let mut allocator = NameAllocator::new(strategy);
    bases
        .into_iter()
        .map(|base| {
            Ok(match allocator.allocate_without_content(base)? {
                Allocation::Assigned(name) => name,
                Allocation::Deferred => base.to_string(),
            })
        })
        .collect()
}
