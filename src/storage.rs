// SPDX-License-Identifier: GPL-3.0-only

//! Temp-file bookkeeping for photo and video artifacts
//!
//! Files are created before the hardware writes to them and stay in the
//! *pending* set until their owning operation hands them off to the caller
//! or aborts. Whatever is still pending when a session stops is deleted.

use crate::constants::files;
use crate::errors::{SessionError, SessionResult};
use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// What kind of artifact a temp file holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TempFileKind {
    Photo,
    Video,
}

impl TempFileKind {
    fn prefix(&self) -> &'static str {
        match self {
            TempFileKind::Photo => files::PHOTO_PREFIX,
            TempFileKind::Video => files::VIDEO_PREFIX,
        }
    }
}

/// A tracked temp file
#[derive(Debug, Clone, PartialEq)]
pub struct TempFile {
    pub path: PathBuf,
    pub kind: TempFileKind,
    pub created_at: DateTime<Local>,
    /// Session generation of the owning operation
    pub generation: u64,
}

/// Turns a local path into something the host caller can load
pub trait PathResolver: Send + Sync {
    fn portable_path(&self, path: &Path) -> String;
}

/// Resolves to `file://` URLs
#[derive(Debug, Clone, Copy, Default)]
pub struct FileUrlResolver;

impl PathResolver for FileUrlResolver {
    fn portable_path(&self, path: &Path) -> String {
        format!("file://{}", path.display())
    }
}

/// Registry of pending temp files
pub struct TempFileRegistry {
    dir: PathBuf,
    resolver: Arc<dyn PathResolver>,
    pending: Mutex<HashMap<PathBuf, TempFile>>,
}

impl TempFileRegistry {
    pub fn new(dir: PathBuf, resolver: Arc<dyn PathResolver>) -> Self {
        Self {
            dir,
            resolver,
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<PathBuf, TempFile>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create an empty file on disk and register it as pending
    ///
    /// The file exists before any hardware write so an interrupted operation
    /// leaves something discoverable behind.
    pub fn allocate(
        &self,
        kind: TempFileKind,
        extension: &str,
        generation: u64,
    ) -> SessionResult<TempFile> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            SessionError::Storage(format!(
                "cannot create temp directory {}: {}",
                self.dir.display(),
                e
            ))
        })?;

        let created_at = Local::now();
        let filename = format!(
            "{}_{}_{}.{}",
            kind.prefix(),
            created_at.format("%Y%m%d_%H%M%S"),
            uuid::Uuid::new_v4().simple(),
            extension
        );
        let path = self.dir.join(filename);

        std::fs::File::create(&path).map_err(|e| {
            SessionError::Storage(format!("cannot create {}: {}", path.display(), e))
        })?;

        let file = TempFile {
            path: path.clone(),
            kind,
            created_at,
            generation,
        };
        self.pending().insert(path, file.clone());

        debug!(path = %file.path.display(), ?kind, generation, "Allocated temp file");
        Ok(file)
    }

    /// Hand the file over to the caller: it leaves the pending set and stays on disk
    pub fn hand_off(&self, path: &Path) -> SessionResult<String> {
        if self.pending().remove(path).is_none() {
            return Err(SessionError::Storage(format!(
                "{} is not a pending temp file",
                path.display()
            )));
        }
        debug!(path = %path.display(), "Temp file handed off");
        Ok(self.portable_path(path))
    }

    /// Drop the file from the pending set after a failed finalize
    ///
    /// Partially written files are left for inspection and their path is
    /// returned; empty ones are deleted.
    pub fn release(&self, path: &Path) -> Option<PathBuf> {
        self.pending().remove(path);
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() == 0 => {
                remove_file(path);
                None
            }
            Ok(meta) => {
                info!(path = %path.display(), bytes = meta.len(), "Keeping partial file after failure");
                Some(path.to_path_buf())
            }
            Err(_) => None,
        }
    }

    /// Drop the file from the pending set and delete it
    pub fn abort(&self, path: &Path) {
        self.pending().remove(path);
        remove_file(path);
    }

    /// Delete every pending file; returns how many were removed
    pub fn drain(&self) -> usize {
        let drained: Vec<TempFile> = self.pending().drain().map(|(_, file)| file).collect();
        for file in &drained {
            remove_file(&file.path);
        }
        drained.len()
    }

    /// Delete pending files owned by one session generation
    pub fn drain_generation(&self, generation: u64) -> usize {
        let drained: Vec<TempFile> = {
            let mut pending = self.pending();
            let paths: Vec<PathBuf> = pending
                .values()
                .filter(|f| f.generation == generation)
                .map(|f| f.path.clone())
                .collect();
            paths.iter().filter_map(|p| pending.remove(p)).collect()
        };
        for file in &drained {
            remove_file(&file.path);
        }
        drained.len()
    }

    pub fn is_pending(&self, path: &Path) -> bool {
        self.pending().contains_key(path)
    }

    pub fn pending_count(&self) -> usize {
        self.pending().len()
    }

    pub fn portable_path(&self, path: &Path) -> String {
        self.resolver.portable_path(path)
    }
}

fn remove_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "Removed temp file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove temp file"),
    }
}
