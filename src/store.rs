// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Document and requirement store.
//!
//! Each user working copy holds a tree of __documents__, every document holds
//! numbered __requirements__, and requirements can be __linked__ to each other
//! for traceability. The store is the only thing that reads or writes that
//! tree.
//!
//! # Transactions
//!
//! Every mutation runs as one transaction while holding the working copy's
//! lock:
//!
//! 1. Load and validate the tree from disk.
//! 2. Plan the mutation as a [`ChangeSet`].
//! 3. Apply the change set, remembering previous file contents.
//! 4. Stage, commit, and push.
//!
//! If step 4 fails, the commit is already undone by the version control layer.
//! The store then reverts the files and re-stages, so the working copy is left
//! exactly as it was and the failure is reported to the caller.
//!
//! All methods block. Callers on an async runtime should run them through
//! [`GitWorkers`](crate::vcs::pool::GitWorkers).

pub mod catalogue;
pub mod change;
pub mod model;
pub mod tree;

use crate::{
    store::{
        change::ChangeSet,
        model::{parse_req_number, DocId, DocumentView, RequirementView, Uid},
        tree::DocumentTree,
    },
    vcs::{GitCredentials, VcsError, VersionControl},
};

use parking_lot::Mutex;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{error, info, instrument, warn};

/// One lock per working copy.
#[derive(Debug, Clone, Default)]
pub struct RepoLocks {
    locks: Arc<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>>,
}

impl RepoLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock guarding target working copy.
    ///
    /// Locks nobody holds a handle to are dropped on the way, so the map only
    /// keeps paths that are in use.
    pub fn get(&self, repo: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock();
        // INVARIANT: Handles are only cloned under the map lock, so a strong
        // count of one means no caller holds or waits on that lock.
        locks.retain(|path, lock| path == repo || Arc::strong_count(lock) > 1);
        locks.entry(repo.to_path_buf()).or_default().clone()
    }
}

/// Document store over user working copies.
#[derive(Clone)]
pub struct DocumentStore {
    vcs: Arc<dyn VersionControl>,
    locks: RepoLocks,
}

impl DocumentStore {
    /// Construct new store on top of target version control.
    pub fn new(vcs: Arc<dyn VersionControl>) -> Self {
        Self {
            vcs,
            locks: RepoLocks::new(),
        }
    }

    pub fn vcs(&self) -> &Arc<dyn VersionControl> {
        &self.vcs
    }

    pub fn locks(&self) -> &RepoLocks {
        &self.locks
    }

    /// Every document, nested under the root document.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::RepoNotFound`] if `repo` is not a working copy.
    /// - Return [`StoreError::Malformed`] if the tree is broken.
    #[instrument(skip(self, repo), level = "debug")]
    pub fn documents(&self, repo: &Path) -> Result<Vec<DocumentView>> {
        let tree = self.read(repo)?;
        Ok(tree.views())
    }

    /// Requirements of one document.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::InvalidId`] if `doc_id` is not a document id.
    /// - Return [`StoreError::DocumentNotFound`] if the document is unknown.
    #[instrument(skip(self, repo), level = "debug")]
    pub fn requirements(&self, repo: &Path, doc_id: &str) -> Result<Vec<RequirementView>> {
        let doc_id: DocId = doc_id.parse()?;
        let tree = self.read(repo)?;
        tree.requirement_views(&doc_id)
    }

    /// Add a document. An empty parent means the document becomes the root.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::RootExists`] if there already is a root and no
    ///   parent was given.
    /// - Return [`StoreError::DocumentExists`] if the id is taken.
    /// - Return [`StoreError::DocumentNotFound`] if the parent is unknown.
    /// - Return [`StoreError::Vcs`] if the change cannot be persisted.
    #[instrument(skip(self, repo, credentials), level = "debug")]
    pub fn add_document(
        &self,
        repo: &Path,
        credentials: &GitCredentials,
        doc_id: &str,
        parent_id: Option<&str>,
    ) -> Result<()> {
        let doc_id: DocId = doc_id.parse()?;
        let parent = parse_parent(parent_id)?;

        self.transact(repo, credentials, format!("Add document {doc_id}"), |tree| {
            tree.add_document(&doc_id, parent.as_ref())
        })
    }

    /// Move a document under another parent. An empty parent makes the
    /// document the root.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::DocumentNotFound`] if the document or the new
    ///   parent is unknown.
    /// - Return [`StoreError::RootExists`] if no parent was given and another
    ///   document is the root.
    /// - Return [`StoreError::ParentCycle`] if the move would create a cycle.
    /// - Return [`StoreError::Vcs`] if the change cannot be persisted.
    #[instrument(skip(self, repo, credentials), level = "debug")]
    pub fn edit_document(
        &self,
        repo: &Path,
        credentials: &GitCredentials,
        doc_id: &str,
        parent_id: Option<&str>,
    ) -> Result<()> {
        let doc_id: DocId = doc_id.parse()?;
        let parent = parse_parent(parent_id)?;

        self.transact(repo, credentials, format!("Edit document {doc_id}"), |tree| {
            tree.edit_document(&doc_id, parent.as_ref())
        })
    }

    /// Delete a document together with its child documents.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::DocumentNotFound`] if the document is unknown.
    /// - Return [`StoreError::Vcs`] if the change cannot be persisted.
    #[instrument(skip(self, repo, credentials), level = "debug")]
    pub fn delete_document(
        &self,
        repo: &Path,
        credentials: &GitCredentials,
        doc_id: &str,
    ) -> Result<()> {
        let doc_id: DocId = doc_id.parse()?;
        self.transact(repo, credentials, format!("Delete document {doc_id}"), |tree| {
            tree.delete_document(&doc_id)
        })
    }

    /// Add requirement number `number` to a document.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::InvalidNumber`] if `number` is not a positive
    ///   integer.
    /// - Return [`StoreError::RequirementExists`] if the number is taken.
    /// - Return [`StoreError::Vcs`] if the change cannot be persisted.
    #[instrument(skip(self, repo, credentials, text), level = "debug")]
    pub fn add_requirement(
        &self,
        repo: &Path,
        credentials: &GitCredentials,
        doc_id: &str,
        number: &str,
        text: &str,
    ) -> Result<()> {
        let uid = Uid::new(doc_id.parse()?, parse_req_number(number)?);
        self.transact(repo, credentials, format!("Add requirement {}", uid.render(3)), |tree| {
            tree.add_requirement(&uid, text)
        })
    }

    /// Replace the text of a requirement.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::RequirementNotFound`] if the requirement is
    ///   unknown.
    /// - Return [`StoreError::Vcs`] if the change cannot be persisted.
    #[instrument(skip(self, repo, credentials, text), level = "debug")]
    pub fn edit_requirement(
        &self,
        repo: &Path,
        credentials: &GitCredentials,
        doc_id: &str,
        req_id: &str,
        text: &str,
    ) -> Result<()> {
        let uid = resolve_requirement(doc_id, req_id)?;
        self.transact(repo, credentials, format!("Edit requirement {}", uid.render(3)), |tree| {
            tree.edit_requirement(&uid, text)
        })
    }

    /// Delete a requirement and every link to it.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::RequirementNotFound`] if the requirement is
    ///   unknown.
    /// - Return [`StoreError::Vcs`] if the change cannot be persisted.
    #[instrument(skip(self, repo, credentials), level = "debug")]
    pub fn delete_requirement(
        &self,
        repo: &Path,
        credentials: &GitCredentials,
        doc_id: &str,
        req_id: &str,
    ) -> Result<()> {
        let uid = resolve_requirement(doc_id, req_id)?;
        self.transact(repo, credentials, format!("Delete requirement {}", uid.render(3)), |tree| {
            tree.delete_requirement(&uid)
        })
    }

    /// Link two requirements.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::SelfLink`] if both ids are the same.
    /// - Return [`StoreError::LinkExists`] if they are already linked.
    /// - Return [`StoreError::Vcs`] if the change cannot be persisted.
    #[instrument(skip(self, repo, credentials), level = "debug")]
    pub fn add_link(
        &self,
        repo: &Path,
        credentials: &GitCredentials,
        req1_id: &str,
        req2_id: &str,
    ) -> Result<()> {
        let (from, to) = (req1_id.trim().parse::<Uid>()?, req2_id.trim().parse::<Uid>()?);
        self.transact(repo, credentials, format!("Link {req1_id} to {req2_id}"), |tree| {
            tree.add_link(&from, &to)
        })
    }

    /// Unlink two requirements.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::LinkNotFound`] if they are not linked.
    /// - Return [`StoreError::Vcs`] if the change cannot be persisted.
    #[instrument(skip(self, repo, credentials), level = "debug")]
    pub fn remove_link(
        &self,
        repo: &Path,
        credentials: &GitCredentials,
        req1_id: &str,
        req2_id: &str,
    ) -> Result<()> {
        let (from, to) = (req1_id.trim().parse::<Uid>()?, req2_id.trim().parse::<Uid>()?);
        self.transact(repo, credentials, format!("Unlink {req1_id} from {req2_id}"), |tree| {
            tree.remove_link(&from, &to)
        })
    }

    fn ensure_repo(&self, repo: &Path) -> Result<()> {
        if self.vcs.exists(repo) {
            Ok(())
        } else {
            Err(StoreError::RepoNotFound(repo.to_path_buf()))
        }
    }

    fn read(&self, repo: &Path) -> Result<DocumentTree> {
        self.ensure_repo(repo)?;
        let lock = self.locks.get(repo);
        let _guard = lock.lock();
        DocumentTree::load(repo)
    }

    fn transact(
        &self,
        repo: &Path,
        credentials: &GitCredentials,
        message: String,
        plan: impl FnOnce(&DocumentTree) -> Result<ChangeSet>,
    ) -> Result<()> {
        self.ensure_repo(repo)?;
        let lock = self.locks.get(repo);
        let _guard = lock.lock();

        let tree = DocumentTree::load(repo)?;
        let changes = plan(&tree)?;
        let applied = changes.apply(repo)?;

        let persisted = self
            .vcs
            .stage(repo)
            .and_then(|_| self.vcs.commit_and_push(repo, &message, credentials));

        if let Err(cause) = persisted {
            warn!("cannot persist {message:?}, reverting: {cause}");
            match applied.revert() {
                Ok(()) => {
                    if let Err(restage) = self.vcs.stage(repo) {
                        warn!("cannot re-stage reverted files: {restage}");
                    }
                }
                Err(revert) => error!("working copy {:?} left dirty: {revert}", repo.display()),
            }
            return Err(StoreError::Vcs(cause));
        }
        info!("{message}");

        Ok(())
    }
}

/// Blank parents mean "no parent".
fn parse_parent(parent_id: Option<&str>) -> Result<Option<DocId>> {
    match parent_id.map(str::trim).filter(|parent| !parent.is_empty()) {
        Some(parent) => Ok(Some(parent.parse()?)),
        None => Ok(None),
    }
}

/// Requirement ids may be given as a full uid or as a bare number within
/// the document.
fn resolve_requirement(doc_id: &str, req_id: &str) -> Result<Uid> {
    let doc_id: DocId = doc_id.parse()?;
    let req_id = req_id.trim();
    if req_id.chars().all(|c| c.is_ascii_digit()) {
        return Ok(Uid::new(doc_id, parse_req_number(req_id)?));
    }

    let uid: Uid = req_id.parse()?;
    if uid.doc != doc_id {
        return Err(StoreError::RequirementNotFound(format!("{req_id} in {doc_id}")));
    }

    Ok(uid)
}

/// All possible error types for store interaction.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0:?} is not a valid id")]
    InvalidId(String),

    #[error("{0:?} is not a valid requirement number")]
    InvalidNumber(String),

    #[error("requirement {0} cannot link to itself")]
    SelfLink(String),

    #[error("working copy {0:?} does not exist")]
    RepoNotFound(PathBuf),

    #[error("document {0} does not exist")]
    DocumentNotFound(String),

    #[error("requirement {0} does not exist")]
    RequirementNotFound(String),

    #[error("{0} and {1} are not linked")]
    LinkNotFound(String, String),

    #[error("root document {0} already exists")]
    RootExists(String),

    #[error("document {0} already exists")]
    DocumentExists(String),

    #[error("requirement {0} already exists")]
    RequirementExists(String),

    #[error("{0} and {1} are already linked")]
    LinkExists(String, String),

    #[error("document {0} cannot move below {1}, which is part of its own subtree")]
    ParentCycle(String, String),

    /// Files on disk do not form a valid document tree.
    #[error("malformed document tree: {0}")]
    Malformed(String),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Change could not be committed and pushed.
    #[error(transparent)]
    Vcs(#[from] VcsError),
}

/// Friendly result alias :3
type Result<T, E = StoreError> = std::result::Result<T, E>;
