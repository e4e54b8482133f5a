// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Requirements tracking backend.
//!
//! Reqtrack keeps requirement documents as plain YAML files inside Git
//! repositories that belong to its users. Users log in through GitHub or
//! GitLab, pick one of their repositories, and then browse and edit the
//! document tree over a small REST API. Every edit becomes a commit that is
//! pushed back to the user's remote.

pub mod api;
pub mod auth;
pub mod config;
pub mod path;
pub mod store;
pub mod vcs;

use crate::{
    auth::login::Authenticator,
    config::{GitSettings, ServerInfo},
    store::DocumentStore,
    vcs::{pool::GitWorkers, VersionControl},
};

use std::sync::Arc;

/// State shared by every request handler.
pub struct AppState {
    /// Absent if the server info file could not be loaded.
    pub server_info: Option<ServerInfo>,
    pub auth: Authenticator,
    pub store: DocumentStore,
    pub workers: GitWorkers,
}

impl AppState {
    pub fn new(
        auth: Authenticator,
        server_info: Option<ServerInfo>,
        vcs: Arc<dyn VersionControl>,
    ) -> Self {
        let workers = match &server_info {
            Some(info) => GitWorkers::new(&info.git),
            None => GitWorkers::new(&GitSettings::default()),
        };

        Self {
            server_info,
            auth,
            store: DocumentStore::new(vcs),
            workers,
        }
    }
}

pub type SharedState = Arc<AppState>;
