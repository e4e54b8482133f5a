// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

mod integration;

use reqtrack::{
    api::router,
    auth::{
        login::Authenticator,
        provider::{Identity, IdentityClient, OAuthToken, Provider},
        registry::{Session, TokenRegistry},
    },
    config::{GitSettings, ServerInfo, Settings, Secret},
    vcs::Git2Vcs,
    AppState,
};

use anyhow::Result;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use git2::{IndexEntry, IndexTime, Oid, Repository, RepositoryInitOptions};
use serde_json::Value;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

/// Bare repository standing in for a provider hosted remote.
pub(crate) struct RemoteFixture {
    repo: Repository,
}

impl RemoteFixture {
    pub(crate) fn new(path: impl AsRef<Path>) -> Result<Self> {
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head("main");
        opts.bare(true);
        let repo = Repository::init_opts(path.as_ref(), &opts)?;

        // INVARIANT: Always provide valid name and email.
        //   - Git will complain if this is not set in CI/CD environments.
        let mut config = repo.config()?;
        config.set_str("user.name", "John Doe")?;
        config.set_str("user.email", "john@doe.com")?;

        Ok(Self { repo })
    }

    /// Commit a file straight onto `main`, as if someone else pushed it.
    pub(crate) fn stage_and_commit(
        &self,
        filename: impl AsRef<Path>,
        contents: impl AsRef<str>,
    ) -> Result<Oid> {
        let entry = IndexEntry {
            ctime: IndexTime::new(0, 0),
            mtime: IndexTime::new(0, 0),
            dev: 0,
            ino: 0,
            mode: 0o100644,
            uid: 0,
            gid: 0,
            file_size: contents.as_ref().len() as u32,
            id: self.repo.blob(contents.as_ref().as_bytes())?,
            flags: 0,
            flags_extended: 0,
            path: filename.as_ref().to_string_lossy().into_owned().into_bytes(),
        };

        // INVARIANT: Build on top of whatever main currently points at.
        let parent = match self.repo.head() {
            Ok(head) => Some(head.peel_to_commit()?),
            Err(_) => None,
        };
        let mut index = self.repo.index()?;
        if let Some(parent) = &parent {
            index.read_tree(&parent.tree()?)?;
        }
        index.add_frombuffer(&entry, contents.as_ref().as_bytes())?;
        let tree = self.repo.find_tree(index.write_tree()?)?;

        let signature = self.repo.signature()?;
        let parents = parent.iter().collect::<Vec<_>>();
        let oid = self.repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            format!("chore: add {:?}", filename.as_ref()).as_ref(),
            &tree,
            &parents,
        )?;

        Ok(oid)
    }

    pub(crate) fn head_message(&self) -> Result<String> {
        let commit = self.repo.head()?.peel_to_commit()?;
        Ok(commit.message().unwrap_or_default().to_string())
    }

    /// Contents of a file at the tip of `main`.
    pub(crate) fn read(&self, path: impl AsRef<Path>) -> Result<Option<String>> {
        let tree = self.repo.head()?.peel_to_tree()?;
        let entry = match tree.get_path(path.as_ref()) {
            Ok(entry) => entry,
            Err(_) => return Ok(None),
        };
        let blob = entry.to_object(&self.repo)?.peel_to_blob()?;
        Ok(Some(String::from_utf8_lossy(blob.content()).into_owned()))
    }
}

/// Running server wired to real Git, with one logged in GitHub user.
pub(crate) struct ServerFixture {
    root: TempDir,
    router: Router,
    bearer: String,
}

impl ServerFixture {
    pub(crate) fn new() -> Result<Self> {
        let root = tempfile::tempdir()?;
        let info = ServerInfo {
            users_folder: root.path().join("users"),
            git: GitSettings {
                remote_base: Some(root.path().join("mirror").to_string_lossy().into_owned()),
                ..GitSettings::default()
            },
        };
        let settings = Settings {
            backend_url: "http://localhost:8000".into(),
            frontend_url: "http://localhost:5173".into(),
            jwt_secret: Secret::new("mocked_jwt_secret"),
            session_ttl: Duration::from_secs(3600),
            github: None,
            gitlab: None,
            sessions_file: None,
        };

        let auth = Authenticator::new(settings, IdentityClient::new()?, TokenRegistry::new());
        let uuid = Uuid::new_v4();
        let (token, claims) = auth.keys().issue_session(uuid, Duration::from_secs(3600))?;
        auth.registry().insert(
            uuid,
            Session {
                token: OAuthToken::new("mocked_token", Provider::GitHub),
                identity: Identity {
                    external_id: "123".into(),
                    username: "mocked_login".into(),
                    email: Some("mocked@example.com".into()),
                },
                expires_at: claims.exp,
            },
        );

        let state = Arc::new(AppState::new(auth, Some(info), Arc::new(Git2Vcs::new())));
        Ok(Self {
            root,
            router: router(state),
            bearer: format!("Bearer {token}"),
        })
    }

    /// Create a remote the user can check out as `name`.
    pub(crate) fn remote(&self, name: &str) -> Result<RemoteFixture> {
        RemoteFixture::new(self.root.path().join("mirror").join(name))
    }

    pub(crate) fn remote_path(&self, name: &str) -> PathBuf {
        self.root.path().join("mirror").join(name)
    }

    pub(crate) fn working_copy(&self, name: &str) -> PathBuf {
        self.root
            .path()
            .join("users/github/123")
            .join(name.replace('/', "-"))
    }

    pub(crate) async fn send(
        &self,
        method: Method,
        uri: &str,
        form: &str,
    ) -> Result<(StatusCode, Value)> {
        let builder = Request::builder()
            .method(method.clone())
            .header(header::AUTHORIZATION, &self.bearer);
        let request = if method == Method::GET {
            builder.uri(format!("{uri}?{form}")).body(Body::empty())?
        } else {
            builder
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(form.to_string()))?
        };

        let response = self.router.clone().oneshot(request).await?;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        Ok((status, body))
    }
}
