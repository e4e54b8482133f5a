// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! In-memory document tree.
//!
//! A [`DocumentTree`] is rebuilt from the working copy for every operation.
//! Loading validates the whole tree up front, so the mutation planners below
//! only have to check the ids they are handed. Planners never touch the disk.
//! They return a [`ChangeSet`] for the caller to apply.
//!
//! # Layout
//!
//! ```text
//! <repo>/
//!   SRS/
//!     .document.yml   # parent: null, digits: 3
//!     SRS001.yml      # text: ..., links: [HLR002]
//!   HLR/
//!     .document.yml   # parent: SRS
//!     HLR002.yml
//! ```
//!
//! Links are written into the file of the requirement they were added on,
//! but are otherwise undirected.

use crate::store::{
    change::ChangeSet,
    model::{
        DocId, DocumentFile, DocumentView, RequirementFile, RequirementView, Uid, DOCUMENT_FILE,
        REQUIREMENT_EXT,
    },
    StoreError,
};

use serde::{de::DeserializeOwned, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument, warn};

/// One requirement as found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    /// File name inside the document directory.
    pub file: String,
    pub text: String,

    /// Outgoing links exactly as written, including ones that no longer
    /// resolve.
    pub links: Vec<String>,
}

impl Requirement {
    fn links_to(&self, target: &Uid) -> bool {
        self.links
            .iter()
            .any(|link| link.parse::<Uid>().is_ok_and(|uid| &uid == target))
    }

    fn to_file(&self) -> RequirementFile {
        RequirementFile {
            text: self.text.clone(),
            links: self.links.clone(),
        }
    }
}

/// One document as found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: DocId,
    pub parent: Option<DocId>,
    pub digits: usize,
    pub requirements: BTreeMap<u32, Requirement>,
}

impl Document {
    fn requirement_path(&self, file: &str) -> PathBuf {
        PathBuf::from(self.id.as_str()).join(file)
    }

    fn settings_path(&self) -> PathBuf {
        PathBuf::from(self.id.as_str()).join(DOCUMENT_FILE)
    }
}

/// Validated tree of documents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentTree {
    documents: BTreeMap<DocId, Document>,
}

impl DocumentTree {
    /// Load and validate every document under `root`.
    ///
    /// Only top-level directories holding a `.document.yml` are documents.
    /// Hidden directories are skipped.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Io`] if the directory cannot be read.
    /// - Return [`StoreError::Malformed`] if any file fails to parse, more
    ///   than one root exists, a parent is missing, or parents form a cycle.
    #[instrument(skip(root), level = "debug")]
    pub fn load(root: &Path) -> Result<Self> {
        let mut documents = BTreeMap::new();
        for entry in fs::read_dir(root)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let dir = entry.path();
            if name.starts_with('.') || !dir.join(DOCUMENT_FILE).is_file() {
                continue;
            }

            let document = load_document(&dir, &name)?;
            documents.insert(document.id.clone(), document);
        }

        let tree = Self { documents };
        tree.validate()?;
        debug!("loaded {} documents from {:?}", tree.documents.len(), root.display());

        Ok(tree)
    }

    fn validate(&self) -> Result<()> {
        let roots = self
            .documents
            .values()
            .filter(|document| document.parent.is_none())
            .map(|document| document.id.to_string())
            .collect::<Vec<_>>();
        if roots.len() > 1 {
            return Err(StoreError::Malformed(format!(
                "more than one root document: {}",
                roots.join(", ")
            )));
        }

        for document in self.documents.values() {
            let mut seen = BTreeSet::from([&document.id]);
            let mut current = document;
            while let Some(parent) = &current.parent {
                current = self.documents.get(parent).ok_or_else(|| {
                    StoreError::Malformed(format!(
                        "document {} has unknown parent {parent}",
                        current.id
                    ))
                })?;
                if !seen.insert(&current.id) {
                    return Err(StoreError::Malformed(format!(
                        "document {} is part of a parent cycle",
                        document.id
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn root(&self) -> Option<&Document> {
        self.documents.values().find(|document| document.parent.is_none())
    }

    /// Look up a document.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::DocumentNotFound`] if no such document exists.
    pub fn document(&self, id: &DocId) -> Result<&Document> {
        self.documents
            .get(id)
            .ok_or_else(|| StoreError::DocumentNotFound(id.to_string()))
    }

    /// Look up a requirement.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::DocumentNotFound`] if its document is unknown.
    /// - Return [`StoreError::RequirementNotFound`] if its number is unknown.
    pub fn requirement(&self, uid: &Uid) -> Result<(&Document, &Requirement)> {
        let document = self.document(&uid.doc)?;
        let requirement = document
            .requirements
            .get(&uid.number)
            .ok_or_else(|| StoreError::RequirementNotFound(uid.render(document.digits)))?;

        Ok((document, requirement))
    }

    fn contains(&self, uid: &Uid) -> bool {
        self.requirement(uid).is_ok()
    }

    fn render(&self, uid: &Uid) -> String {
        let digits = self
            .documents
            .get(&uid.doc)
            .map_or(3, |document| document.digits);
        uid.render(digits)
    }

    fn children<'a>(&'a self, id: &'a DocId) -> impl Iterator<Item = &'a Document> + 'a {
        self.documents
            .values()
            .filter(move |document| document.parent.as_ref() == Some(id))
    }

    /// Target document and everything below it.
    fn subtree(&self, id: &DocId) -> Vec<&Document> {
        let mut found = Vec::new();
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            if let Some(document) = self.documents.get(current) {
                found.push(document);
                pending.extend(self.children(current).map(|child| &child.id));
            }
        }
        found
    }

    /// Every live requirement linked to target, in either direction.
    pub fn links_of(&self, uid: &Uid) -> BTreeSet<Uid> {
        let mut linked = BTreeSet::new();
        if let Ok((_, requirement)) = self.requirement(uid) {
            for link in &requirement.links {
                match link.parse::<Uid>() {
                    Ok(target) if self.contains(&target) => {
                        linked.insert(target);
                    }
                    _ => warn!("{} links to unknown requirement {link}", self.render(uid)),
                }
            }
        }

        for document in self.documents.values() {
            for (number, requirement) in &document.requirements {
                if requirement.links_to(uid) {
                    linked.insert(Uid::new(document.id.clone(), *number));
                }
            }
        }

        linked.remove(uid);
        linked
    }

    /// Plan a new document.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::DocumentExists`] if the id is taken.
    /// - Return [`StoreError::RootExists`] if no parent is given but a root
    ///   document already exists.
    /// - Return [`StoreError::DocumentNotFound`] if the parent is unknown.
    pub fn add_document(&self, id: &DocId, parent: Option<&DocId>) -> Result<ChangeSet> {
        if self.documents.contains_key(id) {
            return Err(StoreError::DocumentExists(id.to_string()));
        }
        match parent {
            Some(parent) => {
                self.document(parent)?;
            }
            None => {
                if let Some(root) = self.root() {
                    return Err(StoreError::RootExists(root.id.to_string()));
                }
            }
        }

        let mut changes = ChangeSet::new();
        changes.write(
            PathBuf::from(id.as_str()).join(DOCUMENT_FILE),
            to_yaml(&DocumentFile::new(parent))?,
        );

        Ok(changes)
    }

    /// Plan moving a document under a new parent. No parent makes it the
    /// root.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::DocumentNotFound`] if the document or the new
    ///   parent is unknown.
    /// - Return [`StoreError::RootExists`] if no parent is given but another
    ///   document is the root.
    /// - Return [`StoreError::ParentCycle`] if the new parent is the document
    ///   itself or one of its descendants.
    pub fn edit_document(&self, id: &DocId, parent: Option<&DocId>) -> Result<ChangeSet> {
        let document = self.document(id)?;
        match parent {
            Some(parent) => {
                self.document(parent)?;
                if self.subtree(id).iter().any(|below| &below.id == parent) {
                    return Err(StoreError::ParentCycle(id.to_string(), parent.to_string()));
                }
            }
            None => {
                if let Some(root) = self.root().filter(|root| &root.id != id) {
                    return Err(StoreError::RootExists(root.id.to_string()));
                }
            }
        }

        let settings = DocumentFile {
            parent: parent.map(ToString::to_string),
            digits: document.digits,
        };
        let mut changes = ChangeSet::new();
        changes.write(document.settings_path(), to_yaml(&settings)?);

        Ok(changes)
    }

    /// Plan removal of a document, its descendants, and all their
    /// requirements. Links into the removed requirements are scrubbed.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::DocumentNotFound`] if the document is unknown.
    pub fn delete_document(&self, id: &DocId) -> Result<ChangeSet> {
        self.document(id)?;
        let doomed = self.subtree(id);
        let doomed_ids = doomed.iter().map(|document| &document.id).collect::<BTreeSet<_>>();

        let mut changes = ChangeSet::new();
        for document in &doomed {
            for requirement in document.requirements.values() {
                changes.remove(document.requirement_path(&requirement.file));
            }
            changes.remove(document.settings_path());
        }

        self.scrub_links(&mut changes, |uid| doomed_ids.contains(&uid.doc), |doc| {
            doomed_ids.contains(doc)
        })?;

        Ok(changes)
    }

    /// Plan a new requirement.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::DocumentNotFound`] if the document is unknown.
    /// - Return [`StoreError::RequirementExists`] if the number is taken.
    pub fn add_requirement(&self, uid: &Uid, text: &str) -> Result<ChangeSet> {
        let document = self.document(&uid.doc)?;
        if document.requirements.contains_key(&uid.number) {
            return Err(StoreError::RequirementExists(uid.render(document.digits)));
        }

        let file = RequirementFile {
            text: text.to_string(),
            links: Vec::new(),
        };
        let mut changes = ChangeSet::new();
        changes.write(
            document.requirement_path(&uid.file_name(document.digits)),
            to_yaml(&file)?,
        );

        Ok(changes)
    }

    /// Plan new text for a requirement. Links are kept.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::DocumentNotFound`] or
    ///   [`StoreError::RequirementNotFound`] if the requirement is unknown.
    pub fn edit_requirement(&self, uid: &Uid, text: &str) -> Result<ChangeSet> {
        let (document, requirement) = self.requirement(uid)?;
        let mut file = requirement.to_file();
        file.text = text.to_string();

        let mut changes = ChangeSet::new();
        changes.write(document.requirement_path(&requirement.file), to_yaml(&file)?);

        Ok(changes)
    }

    /// Plan removal of a requirement, scrubbing links that point to it.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::DocumentNotFound`] or
    ///   [`StoreError::RequirementNotFound`] if the requirement is unknown.
    pub fn delete_requirement(&self, uid: &Uid) -> Result<ChangeSet> {
        let (document, requirement) = self.requirement(uid)?;
        let mut changes = ChangeSet::new();
        changes.remove(document.requirement_path(&requirement.file));

        self.scrub_links(&mut changes, |target| target == uid, |_| false)?;

        Ok(changes)
    }

    /// Plan a link between two requirements.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::SelfLink`] if both ids name one requirement.
    /// - Return [`StoreError::DocumentNotFound`] or
    ///   [`StoreError::RequirementNotFound`] if either side is unknown.
    /// - Return [`StoreError::LinkExists`] if they are already linked in
    ///   either direction.
    pub fn add_link(&self, from: &Uid, to: &Uid) -> Result<ChangeSet> {
        if from == to {
            return Err(StoreError::SelfLink(self.render(from)));
        }
        let (document, requirement) = self.requirement(from)?;
        let (_, other) = self.requirement(to)?;
        if requirement.links_to(to) || other.links_to(from) {
            return Err(StoreError::LinkExists(self.render(from), self.render(to)));
        }

        let mut file = requirement.to_file();
        file.links.push(self.render(to));
        let mut changes = ChangeSet::new();
        changes.write(document.requirement_path(&requirement.file), to_yaml(&file)?);

        Ok(changes)
    }

    /// Plan removal of a link, whichever side it was written on.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::DocumentNotFound`] or
    ///   [`StoreError::RequirementNotFound`] if either side is unknown.
    /// - Return [`StoreError::LinkNotFound`] if they are not linked.
    pub fn remove_link(&self, from: &Uid, to: &Uid) -> Result<ChangeSet> {
        let sides = [(from, to), (to, from)];
        let mut changes = ChangeSet::new();
        for (owner, target) in sides {
            let (document, requirement) = self.requirement(owner)?;
            if requirement.links_to(target) {
                let mut file = requirement.to_file();
                file.links
                    .retain(|link| link.parse::<Uid>().map_or(true, |uid| &uid != target));
                changes.write(document.requirement_path(&requirement.file), to_yaml(&file)?);
            }
        }

        if changes.is_empty() {
            return Err(StoreError::LinkNotFound(self.render(from), self.render(to)));
        }

        Ok(changes)
    }

    fn scrub_links(
        &self,
        changes: &mut ChangeSet,
        removed: impl Fn(&Uid) -> bool,
        skip_doc: impl Fn(&DocId) -> bool,
    ) -> Result<()> {
        for document in self.documents.values().filter(|document| !skip_doc(&document.id)) {
            for (number, requirement) in &document.requirements {
                if removed(&Uid::new(document.id.clone(), *number)) {
                    continue;
                }

                let mut file = requirement.to_file();
                file.links
                    .retain(|link| link.parse::<Uid>().map_or(true, |uid| !removed(&uid)));
                if file.links.len() != requirement.links.len() {
                    changes.write(document.requirement_path(&requirement.file), to_yaml(&file)?);
                }
            }
        }

        Ok(())
    }

    /// Requirements of one document, ordered by number.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::DocumentNotFound`] if the document is unknown.
    pub fn requirement_views(&self, id: &DocId) -> Result<Vec<RequirementView>> {
        let document = self.document(id)?;
        Ok(document
            .requirements
            .iter()
            .map(|(number, requirement)| {
                let uid = Uid::new(document.id.clone(), *number);
                RequirementView {
                    id: uid.render(document.digits),
                    text: requirement.text.clone(),
                    links: self
                        .links_of(&uid)
                        .iter()
                        .map(|linked| self.render(linked))
                        .collect(),
                }
            })
            .collect())
    }

    /// Whole tree, starting from the root document.
    pub fn views(&self) -> Vec<DocumentView> {
        self.root()
            .map(|root| vec![self.view(root)])
            .unwrap_or_default()
    }

    fn view(&self, document: &Document) -> DocumentView {
        DocumentView {
            prefix: document.id.to_string(),
            parent: document.parent.as_ref().map(ToString::to_string),
            // INVARIANT: Document was taken from this tree, so it resolves.
            requirements: self.requirement_views(&document.id).unwrap_or_default(),
            children: self
                .children(&document.id)
                .map(|child| self.view(child))
                .collect(),
        }
    }
}

fn load_document(dir: &Path, name: &str) -> Result<Document> {
    let id: DocId = name
        .parse()
        .map_err(|_| StoreError::Malformed(format!("invalid document directory {name:?}")))?;
    let settings: DocumentFile = read_yaml(&dir.join(DOCUMENT_FILE))?;
    let parent = match settings.parent.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(parent) => Some(parent.parse().map_err(|_| {
            StoreError::Malformed(format!("document {id} has invalid parent {parent:?}"))
        })?),
    };

    let mut requirements = BTreeMap::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let file = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        if file.starts_with('.')
            || !path.is_file()
            || path.extension().and_then(|ext| ext.to_str()) != Some(REQUIREMENT_EXT)
        {
            continue;
        }

        let stem = file.trim_end_matches(&format!(".{REQUIREMENT_EXT}"));
        let uid = stem
            .parse::<Uid>()
            .ok()
            .filter(|uid| uid.doc == id)
            .ok_or_else(|| {
                StoreError::Malformed(format!("{file:?} is not a requirement of document {id}"))
            })?;

        let contents: RequirementFile = read_yaml(&path)?;
        let requirement = Requirement {
            file: file.clone(),
            text: contents.text,
            links: contents.links,
        };
        if requirements.insert(uid.number, requirement).is_some() {
            return Err(StoreError::Malformed(format!(
                "requirement number {} appears twice in document {id}",
                uid.number
            )));
        }
    }

    Ok(Document {
        id,
        parent,
        digits: settings.digits.clamp(1, 9),
        requirements,
    })
}

fn read_yaml<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    let data = fs::read_to_string(path)?;
    if data.trim().is_empty() {
        return Ok(T::default());
    }

    serde_yaml::from_str(&data)
        .map_err(|error| StoreError::Malformed(format!("{}: {error}", path.display())))
}

fn to_yaml(value: &impl Serialize) -> Result<String> {
    Ok(serde_yaml::to_string(value)?)
}

/// Friendly result alias :3
type Result<T, E = StoreError> = std::result::Result<T, E>;
