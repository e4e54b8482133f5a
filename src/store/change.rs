// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Reversible file changes.
//!
//! A mutation of the document tree is first planned as a [`ChangeSet`] of
//! whole-file writes and removals relative to the working copy. Applying it
//! remembers what every touched file held before, so the working copy can be
//! put back exactly as it was if the change cannot be committed.

use std::{
    fs,
    io,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

/// One file level change, relative to the working copy root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Write { path: PathBuf, contents: String },
    Remove { path: PathBuf },
}

impl Change {
    pub fn path(&self) -> &Path {
        match self {
            Self::Write { path, .. } | Self::Remove { path } => path,
        }
    }
}

/// Ordered list of planned file changes.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChangeSet {
    changes: Vec<Change>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, path: impl Into<PathBuf>, contents: impl Into<String>) {
        self.changes.push(Change::Write {
            path: path.into(),
            contents: contents.into(),
        });
    }

    pub fn remove(&mut self, path: impl Into<PathBuf>) {
        self.changes.push(Change::Remove { path: path.into() });
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Apply every change under `root`.
    ///
    /// Directories emptied by removals are removed as well, and missing
    /// directories are created for writes. If any change fails, the ones
    /// already applied are reverted before returning.
    ///
    /// # Errors
    ///
    /// - Return [`io::Error`] if a file cannot be read, written, or removed.
    pub fn apply(&self, root: &Path) -> io::Result<Applied> {
        let mut applied = Applied {
            root: root.to_path_buf(),
            prior: Vec::with_capacity(self.changes.len()),
        };

        for change in &self.changes {
            if let Err(error) = applied.apply_one(change) {
                warn!("cannot apply change to {:?}: {error}", change.path().display());
                if let Err(revert) = applied.revert() {
                    warn!("cannot revert partial change: {revert}");
                }
                return Err(error);
            }
        }
        debug!("applied {} changes under {:?}", self.changes.len(), root.display());

        Ok(applied)
    }
}

/// Change set that has been written to disk.
#[derive(Debug)]
#[must_use = "an applied change set is needed to revert it"]
pub struct Applied {
    root: PathBuf,
    prior: Vec<(PathBuf, Option<Vec<u8>>)>,
}

impl Applied {
    fn apply_one(&mut self, change: &Change) -> io::Result<()> {
        let path = self.root.join(change.path());
        let before = read_if_exists(&path)?;

        match change {
            Change::Write { contents, .. } => {
                if let Some(parent) = path.parent() {
                    mkdirp::mkdirp(parent)?;
                }
                self.prior.push((path.clone(), before));
                fs::write(&path, contents)?;
            }
            Change::Remove { .. } => {
                if before.is_none() {
                    return Ok(());
                }
                self.prior.push((path.clone(), before));
                fs::remove_file(&path)?;
                remove_dir_if_empty(&path);
            }
        }

        Ok(())
    }

    /// Put every touched file back the way it was, newest change first.
    ///
    /// # Errors
    ///
    /// - Return [`io::Error`] if a file cannot be restored.
    pub fn revert(self) -> io::Result<()> {
        for (path, before) in self.prior.into_iter().rev() {
            match before {
                Some(contents) => {
                    if let Some(parent) = path.parent() {
                        mkdirp::mkdirp(parent)?;
                    }
                    fs::write(&path, contents)?;
                }
                None => {
                    match fs::remove_file(&path) {
                        Err(error) if error.kind() != io::ErrorKind::NotFound => return Err(error),
                        _ => {}
                    }
                    remove_dir_if_empty(&path);
                }
            }
        }

        Ok(())
    }
}

fn read_if_exists(path: &Path) -> io::Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(error) => Err(error),
    }
}

// Only succeeds on empty directories, which is the point.
fn remove_dir_if_empty(file: &Path) {
    if let Some(parent) = file.parent() {
        let _ = fs::remove_dir(parent);
    }
}
