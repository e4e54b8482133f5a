// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! HTTP facing errors.
//!
//! Every failure leaves the server as a JSON body `{"message": ...}`. The
//! message of a failed data operation always starts with what was being
//! attempted, e.g., "Unable to add document.", followed by the cause.

use crate::{
    auth::{
        login::LoginError,
        provider::ProviderError,
    },
    store::StoreError,
    vcs::{pool::WorkerError, VcsError},
};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{debug, error};

/// All possible error types for request handling.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Server info could not be loaded at start-up.
    #[error("Unable to {0}. Server configuration problem")]
    Config(&'static str),

    #[error("Unable to {action}. Missing field {field}")]
    MissingField {
        action: &'static str,
        field: &'static str,
    },

    #[error("Unable to {action}. {reason}")]
    InvalidField { action: &'static str, reason: String },

    #[error("Unable to {action}. {}", describe(.source))]
    Store {
        action: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("Unable to {action}. {source}")]
    Vcs {
        action: &'static str,
        #[source]
        source: VcsError,
    },

    #[error("Unable to {action}. {source}")]
    Io {
        action: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to {action}. {source}")]
    Worker {
        action: &'static str,
        #[source]
        source: WorkerError,
    },

    #[error(transparent)]
    Login(#[from] LoginError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

fn describe(error: &StoreError) -> String {
    match error {
        StoreError::Vcs(cause) => format!("Could not persist change: {cause}"),
        other => other.to_string(),
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Config(_) | Self::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::MissingField { .. } | Self::InvalidField { .. } => StatusCode::BAD_REQUEST,
            Self::Store { source, .. } => store_status(source),
            Self::Vcs { source, .. } => match source {
                VcsError::AlreadyExists(_) | VcsError::OriginMismatch { .. } => {
                    StatusCode::CONFLICT
                }
                _ => StatusCode::BAD_GATEWAY,
            },
            Self::Worker { source, .. } => match source {
                WorkerError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Login(source) => match source {
                LoginError::NotConfigured(_) => StatusCode::NOT_FOUND,
                LoginError::Denied(_) | LoginError::BadState | LoginError::MissingCode => {
                    StatusCode::BAD_REQUEST
                }
                LoginError::Provider(_) => StatusCode::BAD_GATEWAY,
                LoginError::Jwt(_) | LoginError::Url(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Provider(source) => match source {
                ProviderError::Unknown(_) => StatusCode::NOT_FOUND,
                _ => StatusCode::BAD_GATEWAY,
            },
        }
    }
}

fn store_status(error: &StoreError) -> StatusCode {
    match error {
        StoreError::InvalidId(_) | StoreError::InvalidNumber(_) | StoreError::SelfLink(_) => {
            StatusCode::BAD_REQUEST
        }
        StoreError::RepoNotFound(_)
        | StoreError::DocumentNotFound(_)
        | StoreError::RequirementNotFound(_)
        | StoreError::LinkNotFound(..) => StatusCode::NOT_FOUND,
        StoreError::RootExists(_)
        | StoreError::DocumentExists(_)
        | StoreError::RequirementExists(_)
        | StoreError::LinkExists(..)
        | StoreError::ParentCycle(..) => StatusCode::CONFLICT,
        StoreError::Malformed(_) | StoreError::Yaml(_) | StoreError::Io(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        StoreError::Vcs(_) => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("{self:?}");
        } else {
            debug!("{self}");
        }

        (status, Json(json!({ "message": self.to_string() }))).into_response()
    }
}
