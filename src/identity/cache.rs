//! Run-scoped identity cache with claim-or-get coalescing.
//!
//! Keys are mapping attempts (`DOI:…`, `TITLE:…`, `S2:…`, …); values are the
//! outcome of that attempt, either a resolved catalog work or an explicit miss.
//! The first task to ask for an unknown key becomes its owner and performs
//! the upstream call; every concurrent task asking for the same key waits on
//! the owner's result instead of issuing its own call.
//!
//! Entries are never invalidated within a run. If an owner is dropped
//! without committing (task aborted), the key reverts to unknown and the
//! waiters race to claim it again.
//!
//! Committed entries can be carried across runs with
//! [`IdentityCache::load_file`] and [`IdentityCache::save_file`]. Misses
//! caused by a failed upstream call are marked transient and never written.

use std::collections::BTreeMap;
use std::fs;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, trace};

use crate::sources::CatalogWork;

/// Outcome of one mapping attempt: the resolved work, or `None` for a miss.
pub type CacheOutcome = Option<Arc<CatalogWork>>;

#[derive(Debug)]
enum Slot {
    Pending(watch::Receiver<Option<CacheOutcome>>),
    Ready(CacheOutcome),
}

/// Format version of the on-disk cache file.
const CACHE_FILE_VERSION: u32 = 1;

/// Errors reading or writing the on-disk cache file.
#[derive(Debug, Error)]
pub enum CacheFileError {
    #[error("failed to access cache file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed cache file {}: {source}", path.display())]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("cache file {} has version {found}, expected {CACHE_FILE_VERSION}", path.display())]
    Version { path: PathBuf, found: u32 },
}

#[derive(Serialize)]
struct CacheFileRef<'a> {
    version: u32,
    entries: BTreeMap<&'a str, Option<&'a CatalogWork>>,
}

#[derive(Deserialize)]
struct CacheFile {
    version: u32,
    entries: BTreeMap<String, Option<CatalogWork>>,
}

/// Result of [`IdentityCache::claim`].
#[derive(Debug)]
pub enum Claim<'a> {
    /// The key is already known.
    Resolved(CacheOutcome),
    /// Another task owns the key; await its outcome.
    Wait(Waiter),
    /// The caller owns the key and must resolve it.
    Owner(ClaimGuard<'a>),
}

/// Handle for awaiting another task's resolution.
#[derive(Debug)]
pub struct Waiter {
    rx: watch::Receiver<Option<CacheOutcome>>,
}

impl Waiter {
    /// Waits for the owner's outcome. `None` means the owner gave up without
    /// committing and the key should be claimed again.
    pub async fn wait(mut self) -> Option<CacheOutcome> {
        let value = self.rx.wait_for(Option::is_some).await.ok()?;
        value.clone()
    }
}

/// Exclusive right to resolve a key. Commit with [`ClaimGuard::insert`].
#[derive(Debug)]
pub struct ClaimGuard<'a> {
    cache: &'a IdentityCache,
    key: String,
    tx: Option<watch::Sender<Option<CacheOutcome>>>,
}

impl ClaimGuard<'_> {
    /// The claimed key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Commits the outcome and releases every waiter.
    pub fn insert(mut self, outcome: CacheOutcome) {
        self.cache
            .entries
            .insert(self.key.clone(), Slot::Ready(outcome.clone()));
        if let Some(tx) = self.tx.take() {
            tx.send_replace(Some(outcome));
        }
    }
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            // Abandoned: revert to unknown before waiters observe the closed channel.
            self.cache
                .entries
                .remove_if(&self.key, |_, slot| matches!(slot, Slot::Pending(_)));
            drop(tx);
            trace!(key = %self.key, "claim abandoned");
        }
    }
}

/// Concurrency-safe identity cache.
#[derive(Debug, Default)]
pub struct IdentityCache {
    entries: DashMap<String, Slot>,
    /// Keys whose miss came from a failed call rather than an empty answer.
    transient: DashSet<String>,
    upstream_calls: AtomicU64,
    hits: AtomicU64,
}

impl IdentityCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the committed outcome for `key`, or `None` if unknown or in flight.
    #[must_use]
    pub fn lookup(&self, key: &str) -> Option<CacheOutcome> {
        match self.entries.get(key)?.value() {
            Slot::Ready(outcome) => Some(outcome.clone()),
            Slot::Pending(_) => None,
        }
    }

    /// Atomically resolves, joins, or takes ownership of `key`.
    pub fn claim(&self, key: &str) -> Claim<'_> {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(entry) => match entry.get() {
                Slot::Ready(outcome) => Claim::Resolved(outcome.clone()),
                Slot::Pending(rx) => Claim::Wait(Waiter { rx: rx.clone() }),
            },
            Entry::Vacant(entry) => {
                let (tx, rx) = watch::channel(None);
                entry.insert(Slot::Pending(rx));
                Claim::Owner(ClaimGuard {
                    cache: self,
                    key: key.to_string(),
                    tx: Some(tx),
                })
            }
        }
    }

    /// Records an outcome for a key nobody has claimed. Existing entries
    /// (committed or in flight) are left untouched.
    pub fn insert_if_absent(&self, key: &str, outcome: CacheOutcome) {
        self.entries
            .entry(key.to_string())
            .or_insert(Slot::Ready(outcome));
    }

    /// Returns the outcome for `key`, calling `resolve` only if no other
    /// task has resolved or is resolving it.
    pub async fn get_or_resolve<F, Fut>(&self, key: &str, resolve: F) -> CacheOutcome
    where
        F: Fn() -> Fut,
        Fut: Future<Output = CacheOutcome>,
    {
        loop {
            match self.claim(key) {
                Claim::Resolved(outcome) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return outcome;
                }
                Claim::Wait(waiter) => {
                    if let Some(outcome) = waiter.wait().await {
                        self.hits.fetch_add(1, Ordering::Relaxed);
                        return outcome;
                    }
                }
                Claim::Owner(guard) => {
                    self.upstream_calls.fetch_add(1, Ordering::Relaxed);
                    let outcome = resolve().await;
                    guard.insert(outcome.clone());
                    return outcome;
                }
            }
        }
    }

    /// Marks `key`'s outcome as specific to this run; it is not saved.
    pub fn mark_transient(&self, key: &str) {
        self.transient.insert(key.to_string());
    }

    /// Loads committed entries from a cache file written by
    /// [`save_file`](Self::save_file). A missing file loads nothing. Entries
    /// already present are kept.
    ///
    /// # Errors
    ///
    /// Returns [`CacheFileError`] if the file cannot be read or parsed.
    pub fn load_file(&self, path: &Path) -> Result<usize, CacheFileError> {
        let body = match fs::read(path) {
            Ok(body) => body,
            Err(source) if source.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(source) => {
                return Err(CacheFileError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        let file: CacheFile = serde_json::from_slice(&body).map_err(|source| CacheFileError::Format {
            path: path.to_path_buf(),
            source,
        })?;
        if file.version != CACHE_FILE_VERSION {
            return Err(CacheFileError::Version {
                path: path.to_path_buf(),
                found: file.version,
            });
        }
        let loaded = file.entries.len();
        for (key, work) in file.entries {
            self.insert_if_absent(&key, work.map(Arc::new));
        }
        debug!(path = %path.display(), loaded, "identity cache loaded");
        Ok(loaded)
    }

    /// Writes every committed, non-transient entry to `path`, replacing the
    /// file atomically. Returns the number of entries written.
    ///
    /// # Errors
    ///
    /// Returns [`CacheFileError`] if the file cannot be written.
    pub fn save_file(&self, path: &Path) -> Result<usize, CacheFileError> {
        let io_error = |source| CacheFileError::Io {
            path: path.to_path_buf(),
            source,
        };
        let snapshot: Vec<(String, CacheOutcome)> = self
            .entries
            .iter()
            .filter(|entry| !self.transient.contains(entry.key()))
            .filter_map(|entry| match entry.value() {
                Slot::Ready(outcome) => Some((entry.key().clone(), outcome.clone())),
                Slot::Pending(_) => None,
            })
            .collect();
        let file = CacheFileRef {
            version: CACHE_FILE_VERSION,
            entries: snapshot
                .iter()
                .map(|(key, outcome)| (key.as_str(), outcome.as_deref()))
                .collect(),
        };
        let body = serde_json::to_vec(&file).map_err(|source| CacheFileError::Format {
            path: path.to_path_buf(),
            source,
        })?;

        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(io_error)?;
        }
        let mut staging = path.as_os_str().to_owned();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);
        fs::write(&staging, body).map_err(io_error)?;
        fs::rename(&staging, path).map_err(io_error)?;
        debug!(path = %path.display(), saved = snapshot.len(), "identity cache saved");
        Ok(snapshot.len())
    }

    /// Number of keys resolved upstream by a claim owner.
    #[must_use]
    pub fn upstream_calls(&self) -> u64 {
        self.upstream_calls.load(Ordering::Relaxed)
    }

    /// Number of lookups answered without an upstream call.
    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Number of keys (committed or in flight).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no key was ever claimed or inserted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
