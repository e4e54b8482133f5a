// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Version control of user working copies.
//!
//! Every user repository lives on disk as a normal (non-bare) working copy
//! cloned from the user's provider. Reqtrack never shells out to Git. All
//! operations go through libgit2, and remote authentication is handed to
//! [`auth_git2`] with the OAuth token of the logged in user.
//!
//! # Commit Atomicity
//!
//! [`VersionControl::commit_and_push`] either lands a commit on the remote or
//! leaves `HEAD` exactly where it was. A commit that cannot be pushed is
//! undone before the error is returned, so the caller only has to revert the
//! files it touched.
//!
//! # Remote URLs
//!
//! Clone URLs are scheme-less remotes such as `github.com/owner/repo`. The
//! token is embedded into the URL only for the clone itself. Afterwards the
//! stored `origin` URL is rewritten to its token-free form, and later fetches
//! and pushes authenticate through credential callbacks. Absolute paths and
//! `file://` URLs are cloned as-is without credentials, which is what local
//! mirrors need.

pub mod pool;

use crate::auth::{provider::OAuthToken, registry::Session};

use auth_git2::GitAuthenticator;
use git2::{
    build::{CheckoutBuilder, RepoBuilder},
    BranchType, ErrorCode, FetchOptions, IndexAddOption, Oid, PushOptions, RemoteCallbacks,
    Repository, ResetType, Signature,
};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

/// Who is committing and how to reach the remote on their behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitCredentials {
    pub token: OAuthToken,
    pub author_name: String,
    pub author_email: String,
}

impl GitCredentials {
    /// Derive credentials from a logged in session.
    ///
    /// Users that keep their email private get the provider's no-reply
    /// address.
    pub fn from_session(session: &Session) -> Self {
        let provider = session.token.provider;
        let author_email = session.identity.email.clone().unwrap_or_else(|| {
            format!("{}@users.noreply.{}", session.identity.username, provider.host())
        });

        Self {
            token: session.token.clone(),
            author_name: session.identity.username.clone(),
            author_email,
        }
    }
}

/// Layer of indirection for version control access.
pub trait VersionControl: Send + Sync + 'static {
    /// Stage every change in the working copy, deletions included.
    fn stage(&self, repo_path: &Path) -> Result<()>;

    /// Commit the index and push the current branch to `origin`.
    ///
    /// On failure `HEAD` is left where it was before the call.
    fn commit_and_push(
        &self,
        repo_path: &Path,
        message: &str,
        credentials: &GitCredentials,
    ) -> Result<()>;

    /// Clone remote into a new working copy at `dest`.
    fn clone_repo(&self, url: &str, dest: &Path, token: &OAuthToken) -> Result<()>;

    /// Fetch the current branch and fast-forward to it.
    fn pull(&self, repo_path: &Path, token: &OAuthToken) -> Result<()>;

    /// Check that `path` holds a working copy.
    fn exists(&self, path: &Path) -> bool {
        Repository::open(path).is_ok()
    }

    /// URL of the working copy's `origin` remote, if it has one.
    fn origin(&self, repo_path: &Path) -> Result<Option<String>> {
        let repo = open(repo_path)?;
        let origin = match repo.find_remote("origin") {
            Ok(remote) => remote.url().map(ToString::to_string),
            Err(error) if error.code() == ErrorCode::NotFound => None,
            Err(error) => return Err(error.into()),
        };
        Ok(origin)
    }
}

/// Check that the working copy at `repo_path` was cloned from `url`.
///
/// Different repository names can map onto the same working copy directory.
///
/// # Errors
///
/// - Return [`VcsError::OriginMismatch`] if `origin` points elsewhere or is
///   missing.
pub fn check_origin(
    vcs: &dyn VersionControl,
    repo_path: &Path,
    url: &str,
    token: &OAuthToken,
) -> Result<()> {
    let expected = public_url(url, token);
    match vcs.origin(repo_path)? {
        Some(found) if found == expected => Ok(()),
        found => Err(VcsError::OriginMismatch {
            expected,
            found: found.unwrap_or_else(|| "nothing".into()),
        }),
    }
}

/// Clone URL stored in `.git/config`, never carrying the token.
pub fn public_url(url: &str, token: &OAuthToken) -> String {
    if is_local(url) {
        url.to_string()
    } else {
        token.provider.public_clone_url(url)
    }
}

/// Version control through libgit2.
#[derive(Debug, Default, Clone, Copy)]
pub struct Git2Vcs;

impl Git2Vcs {
    pub fn new() -> Self {
        Self
    }
}

impl VersionControl for Git2Vcs {
    #[instrument(skip(self, repo_path), level = "debug")]
    fn stage(&self, repo_path: &Path) -> Result<()> {
        let repo = open(repo_path)?;
        let mut index = repo.index()?;
        index.add_all(["*"], IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"], None)?;
        index.write()?;

        Ok(())
    }

    /// Commit the index and push the current branch to `origin`.
    ///
    /// # Errors
    ///
    /// - Return [`VcsError::Open`] if `repo_path` is not a working copy.
    /// - Return [`VcsError::Rejected`] if the remote refuses the update.
    /// - Return [`VcsError::Git2`] if any other libgit2 operation fails.
    #[instrument(skip(self, repo_path, credentials), level = "debug")]
    fn commit_and_push(
        &self,
        repo_path: &Path,
        message: &str,
        credentials: &GitCredentials,
    ) -> Result<()> {
        let repo = open(repo_path)?;
        let previous = head_commit(&repo)?;
        commit(&repo, message, credentials)?;

        if let Err(error) = push_head(&repo, &credentials.token) {
            warn!("push failed, undoing commit: {error}");
            if let Err(undo) = undo_commit(&repo, previous) {
                warn!("cannot undo commit: {undo}");
            }
            return Err(error);
        }
        info!("pushed {:?} from {:?}", message, repo_path.display());

        Ok(())
    }

    /// Clone remote into a new working copy at `dest`.
    ///
    /// Missing parent directories are created. A partially cloned directory
    /// is removed again on failure.
    ///
    /// # Errors
    ///
    /// - Return [`VcsError::AlreadyExists`] if `dest` already exists.
    /// - Return [`VcsError::Clone`] if libgit2 cannot clone. The message has
    ///   the token scrubbed out.
    #[instrument(skip(self, dest, token), level = "debug")]
    fn clone_repo(&self, url: &str, dest: &Path, token: &OAuthToken) -> Result<()> {
        if dest.exists() {
            return Err(VcsError::AlreadyExists(dest.to_path_buf()));
        }
        if let Some(parent) = dest.parent() {
            mkdirp::mkdirp(parent)?;
        }

        let clone_url = if is_local(url) {
            url.to_string()
        } else {
            token.provider.authenticated_clone_url(url, &token.token)
        };

        info!("clone {url} into {:?}", dest.display());
        let repo = RepoBuilder::new()
            .clone(&clone_url, dest)
            .map_err(|error| {
                if dest.exists() {
                    let _ = fs::remove_dir_all(dest);
                }
                VcsError::Clone(scrub(error.message(), &token.token))
            })?;

        // INVARIANT: Never leave the token in .git/config.
        repo.remote_set_url("origin", &public_url(url, token))?;

        Ok(())
    }

    /// Fetch the current branch and fast-forward to it.
    ///
    /// A working copy without commits, e.g., one cloned from an empty
    /// remote, checks out the remote's branch once it has one.
    ///
    /// # Errors
    ///
    /// - Return [`VcsError::Open`] if `repo_path` is not a working copy.
    /// - Return [`VcsError::Diverged`] if a fast-forward is impossible.
    /// - Return [`VcsError::Git2`] if any other libgit2 operation fails.
    #[instrument(skip(self, repo_path, token), level = "debug")]
    fn pull(&self, repo_path: &Path, token: &OAuthToken) -> Result<()> {
        let repo = open(repo_path)?;
        let branch = match repo.head() {
            Ok(head) => head.shorthand().ok_or(VcsError::DetachedHead)?.to_string(),
            Err(error) if error.code() == ErrorCode::UnbornBranch => {
                fetch(&repo, &[], token)?;
                return check_out_remote_branch(&repo);
            }
            Err(error) => return Err(error.into()),
        };

        fetch(&repo, &[branch.as_str()], token)?;
        let fetch_head = repo.find_reference("FETCH_HEAD")?;
        let incoming = repo.reference_to_annotated_commit(&fetch_head)?;
        let (analysis, _) = repo.merge_analysis(&[&incoming])?;

        if analysis.is_up_to_date() {
            debug!("{branch} is up to date");
            return Ok(());
        }
        if !analysis.is_fast_forward() {
            return Err(VcsError::Diverged(branch));
        }

        let refname = format!("refs/heads/{branch}");
        let mut reference = repo.find_reference(&refname)?;
        reference.set_target(incoming.id(), "pull: fast-forward")?;
        repo.set_head(&refname)?;
        repo.checkout_head(Some(CheckoutBuilder::default().force()))?;
        info!("fast-forwarded {branch} to {}", incoming.id());

        Ok(())
    }
}

/// Start the unborn local branch from its remote counterpart.
///
/// Prefer the branch HEAD already names, then `origin/HEAD`, then any remote
/// branch. Nothing happens while the remote is still empty.
fn check_out_remote_branch(repo: &Repository) -> Result<()> {
    let Some((branch, oid)) = remote_branch(repo)? else {
        debug!("remote has no branches yet");
        return Ok(());
    };

    let refname = format!("refs/heads/{branch}");
    repo.reference(&refname, oid, false, "pull: check out remote branch")?;
    repo.set_head(&refname)?;
    repo.checkout_head(Some(CheckoutBuilder::default().force()))?;
    info!("checked out {branch} at {oid}");

    Ok(())
}

fn remote_branch(repo: &Repository) -> Result<Option<(String, Oid)>> {
    let head = repo.find_reference("HEAD")?;
    if let Some(branch) = head
        .symbolic_target()
        .and_then(|target| target.strip_prefix("refs/heads/"))
    {
        if let Ok(remote) = repo.find_reference(&format!("refs/remotes/origin/{branch}")) {
            if let Some(oid) = remote.target() {
                return Ok(Some((branch.to_string(), oid)));
            }
        }
    }

    if let Ok(remote) = repo.find_reference("refs/remotes/origin/HEAD") {
        let resolved = remote.resolve()?;
        if let (Some(name), Some(oid)) = (resolved.shorthand(), resolved.target()) {
            if let Some(branch) = name.strip_prefix("origin/") {
                return Ok(Some((branch.to_string(), oid)));
            }
        }
    }

    for entry in repo.branches(Some(BranchType::Remote))? {
        let (remote, _) = entry?;
        let reference = remote.get();
        if let (Some(name), Some(oid)) = (reference.shorthand(), reference.target()) {
            if let Some(branch) = name.strip_prefix("origin/").filter(|name| *name != "HEAD") {
                return Ok(Some((branch.to_string(), oid)));
            }
        }
    }

    Ok(None)
}

fn open(path: &Path) -> Result<Repository> {
    Repository::open(path).map_err(|source| VcsError::Open {
        path: path.to_path_buf(),
        source,
    })
}

fn is_local(url: &str) -> bool {
    url.starts_with("file://") || Path::new(url).is_absolute()
}

fn scrub(message: &str, token: &str) -> String {
    if token.is_empty() {
        message.to_string()
    } else {
        message.replace(token, "***")
    }
}

fn authenticator(token: &OAuthToken) -> GitAuthenticator {
    let (username, password) = token.provider.git_credentials(&token.token);
    GitAuthenticator::new_empty().add_plaintext_credentials("*", username, password)
}

fn head_commit(repo: &Repository) -> Result<Option<Oid>> {
    match repo.head() {
        Ok(head) => Ok(head.target()),
        Err(error) if error.code() == ErrorCode::UnbornBranch => Ok(None),
        Err(error) => Err(error.into()),
    }
}

fn commit(repo: &Repository, message: &str, credentials: &GitCredentials) -> Result<Oid> {
    let signature = Signature::now(&credentials.author_name, &credentials.author_email)?;
    let mut index = repo.index()?;
    let tree = repo.find_tree(index.write_tree()?)?;

    // INVARIANT: Append to current HEAD unless the branch is still unborn.
    let parent = match head_commit(repo)? {
        Some(oid) => Some(repo.find_commit(oid)?),
        None => None,
    };
    let parents = parent.iter().collect::<Vec<_>>();

    let oid = repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)?;
    debug!("committed {oid}");

    Ok(oid)
}

fn undo_commit(repo: &Repository, previous: Option<Oid>) -> Result<()> {
    match previous {
        Some(oid) => {
            let target = repo.find_object(oid, None)?;
            repo.reset(&target, ResetType::Soft, None)?;
        }
        None => {
            // INVARIANT: Deleting the branch ref makes HEAD unborn again.
            let mut branch = repo.head()?;
            branch.delete()?;
        }
    }

    Ok(())
}

fn fetch(repo: &Repository, refspecs: &[&str], token: &OAuthToken) -> Result<()> {
    let config = repo.config()?;
    let authenticator = authenticator(token);
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(authenticator.credentials(&config));

    let mut options = FetchOptions::new();
    options.remote_callbacks(callbacks);
    repo.find_remote("origin")?
        .fetch(refspecs, Some(&mut options), None)?;

    Ok(())
}

fn push_head(repo: &Repository, token: &OAuthToken) -> Result<()> {
    let head = repo.head()?;
    let refname = head.name().ok_or(VcsError::DetachedHead)?.to_string();
    let config = repo.config()?;
    let authenticator = authenticator(token);
    let mut remote = repo.find_remote("origin")?;

    let mut rejection = None;
    {
        let mut callbacks = RemoteCallbacks::new();
        callbacks.credentials(authenticator.credentials(&config));
        callbacks.push_update_reference(|name, status| {
            if let Some(status) = status {
                rejection = Some(format!("{name}: {status}"));
            }
            Ok(())
        });

        let mut options = PushOptions::new();
        options.remote_callbacks(callbacks);
        remote.push(&[format!("{refname}:{refname}")], Some(&mut options))?;
    }

    match rejection {
        Some(reason) => Err(VcsError::Rejected(reason)),
        None => Ok(()),
    }
}

/// All possible error types for version control.
#[derive(Debug, thiserror::Error)]
pub enum VcsError {
    /// Path does not hold a usable repository.
    #[error("{path:?} is not a usable repository")]
    Open {
        path: PathBuf,
        #[source]
        source: git2::Error,
    },

    /// Clone destination is taken.
    #[error("{0:?} already exists")]
    AlreadyExists(PathBuf),

    /// Clone failed.
    #[error("clone failed: {0}")]
    Clone(String),

    /// Nothing to push or pull because HEAD is not on a branch.
    #[error("HEAD is not on a branch")]
    DetachedHead,

    /// Remote refused the pushed reference.
    #[error("push rejected: {0}")]
    Rejected(String),

    /// Working copy tracks a different remote than requested.
    #[error("working copy tracks {found}, not {expected}")]
    OriginMismatch { expected: String, found: String },

    /// Local branch has commits the remote does not.
    #[error("branch {0} has diverged from its remote")]
    Diverged(String),

    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),

    /// Local filesystem failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Friendly result alias :3
type Result<T, E = VcsError> = std::result::Result<T, E>;

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::auth::provider::{Identity, Provider};
    use pretty_assertions::assert_eq;
    use git2::RepositoryInitOptions;
    use tempfile::TempDir;

    pub(crate) fn credentials() -> GitCredentials {
        GitCredentials {
            token: OAuthToken::new("mocked_token", Provider::GitHub),
            author_name: "John Doe".into(),
            author_email: "john@doe.com".into(),
        }
    }

    /// Bare remote seeded with one commit on `main`.
    pub(crate) fn seeded_remote(root: &Path) -> anyhow::Result<PathBuf> {
        let seed = root.join("seed");
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head("main");
        let repo = Repository::init_opts(&seed, &opts)?;
        fs::write(seed.join("README.md"), "requirements\n")?;

        let mut index = repo.index()?;
        index.add_path(Path::new("README.md"))?;
        index.write()?;
        let tree = repo.find_tree(index.write_tree()?)?;
        let signature = Signature::now("John Doe", "john@doe.com")?;
        repo.commit(Some("HEAD"), &signature, &signature, "init", &tree, &[])?;

        let remote = root.join("remote.git");
        RepoBuilder::new().bare(true).clone(seed.to_str().unwrap(), &remote)?;

        Ok(remote)
    }

    fn working_copy(root: &TempDir, remote: &Path, name: &str) -> anyhow::Result<PathBuf> {
        let dest = root.path().join(name);
        Git2Vcs.clone_repo(remote.to_str().unwrap(), &dest, &credentials().token)?;
        Ok(dest)
    }

    fn head(path: &Path) -> Oid {
        Repository::open(path).unwrap().head().unwrap().target().unwrap()
    }

    fn remote_head(remote: &Path) -> Oid {
        Repository::open_bare(remote)
            .unwrap()
            .find_reference("refs/heads/main")
            .unwrap()
            .target()
            .unwrap()
    }

    #[test]
    fn commit_and_push_reaches_remote() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let remote = seeded_remote(root.path())?;
        let work = working_copy(&root, &remote, "work")?;

        fs::create_dir(work.join("SRS"))?;
        fs::write(work.join("SRS").join(".document.yml"), "digits: 3\n")?;
        Git2Vcs.stage(&work)?;
        Git2Vcs.commit_and_push(&work, "add SRS", &credentials())?;

        assert_eq!(head(&work), remote_head(&remote));
        let repo = Repository::open(&work)?;
        let commit = repo.head()?.peel_to_commit()?;
        assert_eq!(commit.author().name(), Some("John Doe"));
        assert_eq!(commit.message(), Some("add SRS"));

        Ok(())
    }

    #[test]
    fn stage_picks_up_deletions() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let remote = seeded_remote(root.path())?;
        let work = working_copy(&root, &remote, "work")?;

        fs::remove_file(work.join("README.md"))?;
        Git2Vcs.stage(&work)?;
        Git2Vcs.commit_and_push(&work, "drop readme", &credentials())?;

        let repo = Repository::open(&work)?;
        let tree = repo.head()?.peel_to_tree()?;
        assert!(tree.get_name("README.md").is_none());

        Ok(())
    }

    #[test]
    fn rejected_push_undoes_commit() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let remote = seeded_remote(root.path())?;
        let first = working_copy(&root, &remote, "first")?;
        let second = working_copy(&root, &remote, "second")?;

        fs::write(second.join("other.txt"), "other")?;
        Git2Vcs.stage(&second)?;
        Git2Vcs.commit_and_push(&second, "other", &credentials())?;

        let before = head(&first);
        fs::write(first.join("mine.txt"), "mine")?;
        Git2Vcs.stage(&first)?;
        let result = Git2Vcs.commit_and_push(&first, "mine", &credentials());

        assert!(result.is_err());
        assert_eq!(head(&first), before);
        assert_eq!(remote_head(&remote), head(&second));

        Ok(())
    }

    #[test]
    fn pull_fast_forwards() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let remote = seeded_remote(root.path())?;
        let first = working_copy(&root, &remote, "first")?;
        let second = working_copy(&root, &remote, "second")?;

        fs::write(second.join("new.txt"), "new")?;
        Git2Vcs.stage(&second)?;
        Git2Vcs.commit_and_push(&second, "new", &credentials())?;

        Git2Vcs.pull(&first, &credentials().token)?;
        assert_eq!(head(&first), head(&second));
        assert_eq!(fs::read_to_string(first.join("new.txt"))?, "new");

        // Second pull has nothing to do.
        Git2Vcs.pull(&first, &credentials().token)?;

        Ok(())
    }

    fn empty_remote(root: &Path) -> anyhow::Result<PathBuf> {
        let remote = root.join("empty.git");
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head("main");
        opts.bare(true);
        Repository::init_opts(&remote, &opts)?;
        Ok(remote)
    }

    /// Clone of an empty remote, with HEAD naming `main`.
    fn unborn_copy(root: &TempDir, remote: &Path, name: &str) -> anyhow::Result<PathBuf> {
        let dest = working_copy(root, remote, name)?;
        Repository::open(&dest)?.set_head("refs/heads/main")?;
        Ok(dest)
    }

    #[test]
    fn pull_checks_out_first_remote_commit() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let remote = empty_remote(root.path())?;
        let first = working_copy(&root, &remote, "first")?;
        let second = unborn_copy(&root, &remote, "second")?;

        // Nothing to check out yet.
        Git2Vcs.pull(&first, &credentials().token)?;
        assert!(Repository::open(&first)?.head().is_err());

        fs::write(second.join("new.txt"), "new")?;
        Git2Vcs.stage(&second)?;
        Git2Vcs.commit_and_push(&second, "new", &credentials())?;

        Git2Vcs.pull(&first, &credentials().token)?;
        assert_eq!(head(&first), head(&second));
        assert_eq!(fs::read_to_string(first.join("new.txt"))?, "new");

        fs::write(first.join("more.txt"), "more")?;
        Git2Vcs.stage(&first)?;
        Git2Vcs.commit_and_push(&first, "more", &credentials())?;
        assert_eq!(remote_head(&remote), head(&first));

        Ok(())
    }

    #[test]
    fn rejected_first_push_leaves_branch_unborn() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let remote = empty_remote(root.path())?;
        let first = unborn_copy(&root, &remote, "first")?;
        let second = unborn_copy(&root, &remote, "second")?;

        fs::write(second.join("other.txt"), "other")?;
        Git2Vcs.stage(&second)?;
        Git2Vcs.commit_and_push(&second, "other", &credentials())?;

        fs::write(first.join("mine.txt"), "mine")?;
        Git2Vcs.stage(&first)?;
        let result = Git2Vcs.commit_and_push(&first, "mine", &credentials());

        assert!(result.is_err());
        let repo = Repository::open(&first)?;
        assert!(matches!(
            repo.head().map(|_| ()),
            Err(error) if error.code() == ErrorCode::UnbornBranch
        ));
        assert!(repo.find_reference("refs/heads/main").is_err());
        assert_eq!(remote_head(&remote), head(&second));

        Ok(())
    }

    #[test]
    fn clone_refuses_existing_destination() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let remote = seeded_remote(root.path())?;
        let work = working_copy(&root, &remote, "work")?;

        let result = Git2Vcs.clone_repo(remote.to_str().unwrap(), &work, &credentials().token);
        assert!(matches!(result, Err(VcsError::AlreadyExists(_))));
        assert!(Git2Vcs.exists(&work));
        assert!(!Git2Vcs.exists(root.path()));

        Ok(())
    }

    #[test]
    fn origin_must_match_requested_remote() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let remote = seeded_remote(root.path())?;
        let work = working_copy(&root, &remote, "work")?;
        let token = credentials().token;

        let url = remote.to_str().unwrap();
        assert_eq!(Git2Vcs.origin(&work)?.as_deref(), Some(url));
        check_origin(&Git2Vcs, &work, url, &token)?;

        let other = root.path().join("other.git");
        let result = check_origin(&Git2Vcs, &work, other.to_str().unwrap(), &token);
        assert!(matches!(result, Err(VcsError::OriginMismatch { .. })));

        Repository::open(&work)?.remote_delete("origin")?;
        let result = check_origin(&Git2Vcs, &work, url, &token);
        assert!(matches!(
            result,
            Err(VcsError::OriginMismatch { found, .. }) if found == "nothing"
        ));

        Ok(())
    }

    #[test]
    fn public_url_of_hosted_remote_has_scheme() {
        let token = credentials().token;
        assert_eq!(public_url("github.com/a/b", &token), "https://github.com/a/b");
        assert_eq!(public_url("/srv/git/a.git", &token), "/srv/git/a.git");
    }

    #[test]
    fn failed_clone_leaves_nothing_behind() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let dest = root.path().join("users").join("github").join("123").join("gone");
        let missing = root.path().join("missing.git");

        let result = Git2Vcs.clone_repo(missing.to_str().unwrap(), &dest, &credentials().token);
        assert!(matches!(result, Err(VcsError::Clone(_))));
        assert!(!dest.exists());

        Ok(())
    }

    #[test]
    fn commit_outside_repository_fails() {
        let root = tempfile::tempdir().unwrap();
        let result = Git2Vcs.commit_and_push(root.path(), "nope", &credentials());
        assert!(matches!(result, Err(VcsError::Open { .. })));
    }

    #[test]
    fn credentials_fall_back_to_noreply_email() {
        let session = Session {
            token: OAuthToken::new("mocked_token", Provider::GitLab),
            identity: Identity {
                external_id: "7".into(),
                username: "jdoe".into(),
                email: None,
            },
            expires_at: 0,
        };

        let result = GitCredentials::from_session(&session);
        assert_eq!(result.author_name, "jdoe");
        assert_eq!(result.author_email, "jdoe@users.noreply.gitlab.com");
    }

    #[test]
    fn scrub_hides_token() {
        assert_eq!(
            scrub("cannot reach https://abc123:@github.com/o/r", "abc123"),
            "cannot reach https://***:@github.com/o/r"
        );
    }
}
