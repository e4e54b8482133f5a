// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Identity providers.
//!
//! Reqtrack only talks to two OAuth providers, GitHub and GitLab. Each one is
//! a variant of [`Provider`] that knows its endpoint URLs, the scopes it needs,
//! the shape of its user info response, and how an access token must be
//! presented to its Git remotes.
//!
//! # Quirks
//!
//! - GitHub does not return the email inline. A second call to the emails
//!   endpoint picks the primary, verified address.
//! - GitHub expects the access token as the basic auth username with an empty
//!   password. GitLab expects the literal username `oauth2` with the token as
//!   the password, and its remote URLs must end in `.git`.

use crate::config::ProviderCredentials;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    fmt::{Debug, Display, Formatter, Result as FmtResult},
    str::FromStr,
    time::Duration,
};
use tracing::{debug, instrument, warn};

/// Supported OAuth providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    GitHub,
    GitLab,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::GitHub, Provider::GitLab];

    /// Lowercase name used in URLs, paths, and environment variables.
    pub fn name(self) -> &'static str {
        match self {
            Self::GitHub => "github",
            Self::GitLab => "gitlab",
        }
    }

    /// Host serving repositories and the web consent screen.
    pub fn host(self) -> &'static str {
        match self {
            Self::GitHub => "github.com",
            Self::GitLab => "gitlab.com",
        }
    }

    /// Scopes requested on the consent screen.
    pub fn scopes(self) -> &'static str {
        match self {
            Self::GitHub => "repo user:email",
            Self::GitLab => "api read_user",
        }
    }

    /// Path of the backend route that receives this provider's callback.
    pub fn callback_path(self) -> String {
        format!("/login_callback/{}", self.name())
    }

    /// Fixed redirect URI registered with the provider.
    pub fn redirect_url(self, backend_url: &str) -> String {
        format!("{}{}", backend_url.trim_end_matches('/'), self.callback_path())
    }

    /// Public endpoints of the hosted provider.
    pub fn endpoints(self) -> ProviderEndpoints {
        match self {
            Self::GitHub => ProviderEndpoints {
                authorize: "https://github.com/login/oauth/authorize".into(),
                token: "https://github.com/login/oauth/access_token".into(),
                user: "https://api.github.com/user".into(),
                emails: Some("https://api.github.com/user/emails".into()),
            },
            Self::GitLab => ProviderEndpoints {
                authorize: "https://gitlab.com/oauth/authorize".into(),
                token: "https://gitlab.com/oauth/token".into(),
                user: "https://gitlab.com/api/v4/user".into(),
                emails: None,
            },
        }
    }

    /// Basic auth pair that Git remotes of this provider accept for a token.
    pub fn git_credentials(self, token: &str) -> (String, String) {
        match self {
            Self::GitHub => (token.to_string(), String::new()),
            Self::GitLab => ("oauth2".to_string(), token.to_string()),
        }
    }

    /// Build an HTTPS clone URL with the token embedded as user info.
    ///
    /// The input is a scheme-less remote such as `github.com/owner/repo`. A
    /// leading `https://` is tolerated and dropped.
    pub fn authenticated_clone_url(self, url: &str, token: &str) -> String {
        let (username, password) = self.git_credentials(token);
        format!("https://{username}:{password}@{}", self.normalize_remote(url))
    }

    /// Same remote as [`Provider::authenticated_clone_url`] minus the token.
    pub fn public_clone_url(self, url: &str) -> String {
        format!("https://{}", self.normalize_remote(url))
    }

    /// Scheme-less remote of a repository hosted by this provider.
    pub fn repo_remote(self, repo_name: &str) -> String {
        format!("{}/{}", self.host(), repo_name.trim_matches('/'))
    }

    fn normalize_remote(self, url: &str) -> String {
        let url = url.strip_prefix("https://").unwrap_or(url);
        match self {
            Self::GitLab if !url.ends_with(".git") => format!("{url}.git"),
            _ => url.to_string(),
        }
    }

    /// Pull identity out of this provider's user info response.
    fn extract_identity(self, user: Value) -> Result<Identity> {
        match self {
            Self::GitHub => {
                let user: GitHubUser = serde_json::from_value(user).map_err(ProviderError::Decode)?;
                Ok(Identity {
                    external_id: id_to_string(&user.id),
                    username: user.login,
                    email: None,
                })
            }
            Self::GitLab => {
                let user: GitLabUser = serde_json::from_value(user).map_err(ProviderError::Decode)?;
                Ok(Identity {
                    external_id: id_to_string(&user.id),
                    username: user.username,
                    email: user.email.filter(|email| !email.is_empty()),
                })
            }
        }
    }
}

impl Display for Provider {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.name())
    }
}

impl FromStr for Provider {
    type Err = ProviderError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|provider| provider.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| ProviderError::Unknown(name.to_string()))
    }
}

/// OAuth and API endpoints of one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEndpoints {
    pub authorize: String,
    pub token: String,
    pub user: String,
    pub emails: Option<String>,
}

/// OAuth access token together with the provider that issued it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthToken {
    pub token: String,
    pub provider: Provider,
}

impl OAuthToken {
    pub fn new(token: impl Into<String>, provider: Provider) -> Self {
        Self {
            token: token.into(),
            provider,
        }
    }
}

impl Debug for OAuthToken {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.debug_struct("OAuthToken")
            .field("token", &"***")
            .field("provider", &self.provider)
            .finish()
    }
}

/// Who the user is according to their provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub external_id: String,
    pub username: String,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubUser {
    id: Value,
    login: String,
}

#[derive(Debug, Deserialize)]
struct GitHubEmail {
    email: String,
    #[serde(default)]
    primary: bool,
    #[serde(default)]
    verified: bool,
}

#[derive(Debug, Deserialize)]
struct GitLabUser {
    id: Value,
    username: String,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

fn id_to_string(id: &Value) -> String {
    match id {
        Value::String(id) => id.clone(),
        other => other.to_string(),
    }
}

/// HTTP client for provider token and identity endpoints.
#[derive(Debug, Clone)]
pub struct IdentityClient {
    http: reqwest::Client,
    github: ProviderEndpoints,
    gitlab: ProviderEndpoints,
}

impl IdentityClient {
    /// Construct new client against the hosted provider endpoints.
    ///
    /// # Errors
    ///
    /// - Return [`ProviderError::Http`] if the HTTP client cannot be built.
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("reqtrack/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            github: Provider::GitHub.endpoints(),
            gitlab: Provider::GitLab.endpoints(),
        })
    }

    /// Replace endpoints of target provider.
    pub fn with_endpoints(mut self, provider: Provider, endpoints: ProviderEndpoints) -> Self {
        match provider {
            Provider::GitHub => self.github = endpoints,
            Provider::GitLab => self.gitlab = endpoints,
        }
        self
    }

    /// Endpoints currently used for target provider.
    pub fn endpoints(&self, provider: Provider) -> &ProviderEndpoints {
        match provider {
            Provider::GitHub => &self.github,
            Provider::GitLab => &self.gitlab,
        }
    }

    /// Exchange an authorization code for an access token.
    ///
    /// # Errors
    ///
    /// - Return [`ProviderError::Http`] if the request cannot be sent.
    /// - Return [`ProviderError::Exchange`] if the provider refuses the code.
    #[instrument(skip(self, credentials, code), level = "debug")]
    pub async fn exchange_code(
        &self,
        provider: Provider,
        credentials: &ProviderCredentials,
        code: &str,
        redirect_uri: &str,
    ) -> Result<OAuthToken> {
        let response = self
            .http
            .post(&self.endpoints(provider).token)
            .header("Accept", "application/json")
            .form(&[
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.expose()),
                ("code", code),
                ("grant_type", "authorization_code"),
                ("redirect_uri", redirect_uri),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Exchange(format!("status {status}: {body}")));
        }

        let body: TokenResponse = response.json().await?;
        match body.access_token {
            Some(token) if !token.is_empty() => Ok(OAuthToken::new(token, provider)),
            _ => Err(ProviderError::Exchange(
                body.error_description
                    .or(body.error)
                    .unwrap_or_else(|| "no access token in response".into()),
            )),
        }
    }

    /// Determine identity of the token's owner.
    ///
    /// GitHub needs a second call to find the primary, verified email. If it
    /// fails or finds nothing, the email is simply left empty.
    ///
    /// # Errors
    ///
    /// - Return [`ProviderError::Http`] if the user info request fails.
    /// - Return [`ProviderError::Status`] if the provider rejects the token.
    /// - Return [`ProviderError::Decode`] if the user info has an unexpected
    ///   shape.
    #[instrument(skip(self, token), fields(provider = %token.provider), level = "debug")]
    pub async fn get_identity(&self, token: &OAuthToken) -> Result<Identity> {
        let endpoints = self.endpoints(token.provider);
        let response = self
            .http
            .get(&endpoints.user)
            .bearer_auth(&token.token)
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ProviderError::Status {
                endpoint: endpoints.user.clone(),
                status: response.status().as_u16(),
            });
        }

        let mut identity = token.provider.extract_identity(response.json().await?)?;
        if let Some(emails) = &endpoints.emails {
            identity.email = self.primary_email(emails, &token.token).await;
        }
        debug!("resolved identity of {}", identity.username);

        Ok(identity)
    }

    async fn primary_email(&self, endpoint: &str, token: &str) -> Option<String> {
        let response = self
            .http
            .get(endpoint)
            .header("Authorization", format!("token {token}"))
            .header("Accept", "application/json")
            .send()
            .await
            .inspect_err(|error| warn!("cannot fetch user emails: {error}"))
            .ok()?;

        if !response.status().is_success() {
            warn!("email endpoint answered {}", response.status());
            return None;
        }

        let emails: Vec<GitHubEmail> = response.json().await.ok()?;
        emails
            .into_iter()
            .find(|email| email.primary && email.verified)
            .map(|email| email.email)
    }
}

/// All possible error types for provider interaction.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Provider name is not one we support.
    #[error("Unknown provider {0}")]
    Unknown(String),

    /// Transport level failure.
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Provider answered with a failure status.
    #[error("{endpoint} answered with status {status}")]
    Status { endpoint: String, status: u16 },

    /// Authorization code could not be exchanged.
    #[error("token exchange failed: {0}")]
    Exchange(String),

    /// Response body had an unexpected shape.
    #[error("unexpected response shape: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Friendly result alias :3
type Result<T, E = ProviderError> = std::result::Result<T, E>;
