// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Reqtrack reads two kinds of configuration at start-up. The __server info__
//! file is a TOML document that tells the server where user repositories live
//! and how hard it may lean on Git. The __settings__ come from the process
//! environment, because they carry secrets (JWT signing key, OAuth client
//! credentials) that should never be committed into a file next to the data.
//!
//! The server info file is optional in the sense that the server will still
//! boot without it. Every data endpoint then reports a server configuration
//! problem instead of touching the disk.

use crate::auth::provider::Provider;

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Debug, Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

/// Server info layout.
///
/// # General Layout
///
/// ```toml
/// users_folder = "$HOME/reqtrack/users"
///
/// [git]
/// workers = 4
/// timeout_secs = 120
/// ```
///
/// The users folder is shell expanded on parse, so environment variables and
/// `~` can be used freely.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct ServerInfo {
    /// Base directory that holds every user's working copies.
    pub users_folder: PathBuf,

    /// Limits placed on version control operations.
    #[serde(default)]
    pub git: GitSettings,
}

impl ServerInfo {
    /// Read and parse server info from target path.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if the file cannot be read.
    /// - Return [`ConfigError::Deserialize`] if the TOML is invalid.
    /// - Return [`ConfigError::ShellExpansion`] if the users folder cannot be
    ///   expanded.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = read_to_string(path.as_ref()).map_err(|source| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source,
        })?;
        data.parse()
    }
}

impl FromStr for ServerInfo {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut info: ServerInfo = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on users folder field.
        info.users_folder = PathBuf::from(
            shellexpand::full(info.users_folder.to_string_lossy().as_ref())
                .map_err(ConfigError::ShellExpansion)?
                .into_owned(),
        );

        Ok(info)
    }
}

impl Display for ServerInfo {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Limits for the version control worker pool.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct GitSettings {
    /// Number of version control operations allowed to run at once.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Deadline in seconds for any single version control operation.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Clone from here instead of the provider's host, e.g., a local mirror
    /// directory or a self-hosted instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_base: Option<String>,
}

impl GitSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Remote to clone target repository from.
    pub fn remote(&self, provider: Provider, repo_name: &str) -> String {
        match &self.remote_base {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), repo_name.trim_matches('/')),
            None => provider.repo_remote(repo_name),
        }
    }
}

impl Default for GitSettings {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            timeout_secs: default_timeout_secs(),
            remote_base: None,
        }
    }
}

fn default_workers() -> usize {
    4
}

fn default_timeout_secs() -> u64 {
    120
}

/// Environment backed settings.
///
/// Read exactly once at start-up through [`Settings::from_env`].
#[derive(Debug, Clone)]
pub struct Settings {
    /// Public base URL of this backend, used to build OAuth redirect URIs.
    pub backend_url: String,

    /// Public base URL of the frontend that receives the session token.
    pub frontend_url: String,

    /// HS256 signing key for session tokens.
    pub jwt_secret: Secret,

    /// Lifetime of a session token and its registry entry.
    pub session_ttl: Duration,

    /// OAuth application registered with GitHub.
    pub github: Option<ProviderCredentials>,

    /// OAuth application registered with GitLab.
    pub gitlab: Option<ProviderCredentials>,

    /// Where to persist the token registry, if anywhere.
    pub sessions_file: Option<PathBuf>,
}

impl Settings {
    /// Load settings from process environment.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::MissingVar`] if `JWT_SECRET` is not set.
    /// - Return [`ConfigError::InvalidVar`] if `SESSION_TTL_SECS` is not a
    ///   number.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let session_ttl = match var("SESSION_TTL_SECS") {
            Some(value) => value.trim().parse().map_err(|_| ConfigError::InvalidVar {
                name: "SESSION_TTL_SECS",
                value,
            })?,
            None => 24 * 60 * 60,
        };

        let credentials = |provider: Provider| {
            let prefix = provider.name().to_uppercase();
            match (
                var(&format!("{prefix}_CLIENT_ID")),
                var(&format!("{prefix}_CLIENT_SECRET")),
            ) {
                (Some(client_id), Some(client_secret)) => Some(ProviderCredentials {
                    client_id,
                    client_secret: Secret::new(client_secret),
                }),
                _ => None,
            }
        };

        Ok(Self {
            backend_url: trim_url(var("BACKEND_URL").unwrap_or_else(|| "http://localhost:8000".into())),
            frontend_url: trim_url(var("FRONTEND_URL").unwrap_or_else(|| "http://localhost:5173".into())),
            jwt_secret: var("JWT_SECRET")
                .map(Secret::new)
                .ok_or(ConfigError::MissingVar("JWT_SECRET"))?,
            session_ttl: Duration::from_secs(session_ttl),
            github: credentials(Provider::GitHub),
            gitlab: credentials(Provider::GitLab),
            sessions_file: var("SESSIONS_FILE").map(PathBuf::from),
        })
    }

    /// OAuth application credentials for target provider, if configured.
    pub fn credentials(&self, provider: Provider) -> Option<&ProviderCredentials> {
        match provider {
            Provider::GitHub => self.github.as_ref(),
            Provider::GitLab => self.gitlab.as_ref(),
        }
    }
}

fn trim_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

/// Client id and secret of an OAuth application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCredentials {
    pub client_id: String,
    pub client_secret: Secret,
}

/// String that never shows up in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        self.0.as_str()
    }
}

impl Debug for Secret {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str("Secret(***)")
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read server info file.
    #[error("cannot read {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Required environment variable is not set.
    #[error("environment variable {0} is required")]
    MissingVar(&'static str),

    /// Environment variable holds garbage.
    #[error("environment variable {name} has invalid value {value:?}")]
    InvalidVar { name: &'static str, value: String },
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::collections::HashMap;

    #[sealed_test(env = [("BLAH", "/srv/blah")])]
    fn deserialize_server_info() -> anyhow::Result<()> {
        let result: ServerInfo = r#"
            users_folder = "$BLAH/users"

            [git]
            workers = 2
            timeout_secs = 30
        "#
        .parse()?;

        let expect = ServerInfo {
            users_folder: PathBuf::from("/srv/blah/users"),
            git: GitSettings {
                workers: 2,
                timeout_secs: 30,
                remote_base: None,
            },
        };

        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn deserialize_server_info_git_defaults() -> anyhow::Result<()> {
        let result: ServerInfo = r#"users_folder = "/srv/users""#.parse()?;
        assert_eq!(result.git, GitSettings::default());
        Ok(())
    }

    #[test]
    fn serialize_server_info() {
        let result = ServerInfo {
            users_folder: PathBuf::from("/srv/users"),
            git: GitSettings {
                workers: 8,
                timeout_secs: 60,
                remote_base: None,
            },
        }
        .to_string();

        let expect = indoc! {r#"
            users_folder = "/srv/users"

            [git]
            workers = 8
            timeout_secs = 60
        "#};

        assert_eq!(result, expect);
    }

    #[test]
    fn remote_prefers_configured_base() -> anyhow::Result<()> {
        let info: ServerInfo = indoc! {r#"
            users_folder = "/srv/users"

            [git]
            remote_base = "/srv/mirrors/"
        "#}
        .parse()?;

        assert_eq!(info.git.remote(Provider::GitHub, "owner/repo"), "/srv/mirrors/owner/repo");
        assert_eq!(
            GitSettings::default().remote(Provider::GitHub, "owner/repo"),
            "github.com/owner/repo"
        );

        Ok(())
    }

    #[test]
    fn load_missing_server_info() {
        let result = ServerInfo::load("/definitely/not/here/server.toml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn settings_from_lookup() -> anyhow::Result<()> {
        let vars = HashMap::from([
            ("BACKEND_URL", "https://api.example.com/"),
            ("JWT_SECRET", "hunter2"),
            ("SESSION_TTL_SECS", "60"),
            ("GITHUB_CLIENT_ID", "gh-id"),
            ("GITHUB_CLIENT_SECRET", "gh-secret"),
            ("GITLAB_CLIENT_ID", "gl-id"),
        ]);
        let settings = Settings::from_lookup(|key| vars.get(key).map(ToString::to_string))?;

        assert_eq!(settings.backend_url, "https://api.example.com");
        assert_eq!(settings.frontend_url, "http://localhost:5173");
        assert_eq!(settings.jwt_secret.expose(), "hunter2");
        assert_eq!(settings.session_ttl, Duration::from_secs(60));
        assert_eq!(
            settings.credentials(Provider::GitHub),
            Some(&ProviderCredentials {
                client_id: "gh-id".into(),
                client_secret: Secret::new("gh-secret"),
            })
        );
        // Half configured provider stays disabled.
        assert_eq!(settings.credentials(Provider::GitLab), None);
        assert_eq!(settings.sessions_file, None);

        Ok(())
    }

    #[test]
    fn settings_require_jwt_secret() {
        let result = Settings::from_lookup(|_| None);
        assert!(matches!(result, Err(ConfigError::MissingVar("JWT_SECRET"))));
    }

    #[sealed_test(env = [("JWT_SECRET", "s3cr3t"), ("SESSION_TTL_SECS", "soon")])]
    fn settings_reject_bad_ttl() {
        let result = Settings::from_env();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidVar { name: "SESSION_TTL_SECS", .. })
        ));
    }

    #[test]
    fn secret_debug_is_redacted() {
        assert_eq!(format!("{:?}", Secret::new("hunter2")), "Secret(***)");
    }
}
