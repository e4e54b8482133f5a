// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! OAuth login flow.
//!
//! 1. [`Authenticator::generate_authorization_url`] sends the browser to the
//!    provider's consent screen with a signed state token.
//! 2. The provider redirects back to our callback route with a code.
//!    [`Authenticator::generate_frontend_redirect_url`] checks the state,
//!    trades the code for an access token, asks the provider who the user
//!    is, opens a session in the token registry, and sends the browser on to
//!    the frontend with a session token.

use crate::{
    auth::{
        jwt::{JwtError, JwtKeys},
        provider::{IdentityClient, Provider, ProviderError},
        registry::{Session, TokenRegistry},
    },
    config::Settings,
};

use serde::Deserialize;
use std::time::Duration;
use tracing::{info, instrument, warn};
use url::Url;
use uuid::Uuid;

/// Query string the provider appends to our callback URL.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Everything needed to log users in and recognize them afterwards.
#[derive(Clone)]
pub struct Authenticator {
    settings: Settings,
    keys: JwtKeys,
    identity: IdentityClient,
    registry: TokenRegistry,
}

impl Authenticator {
    pub fn new(settings: Settings, identity: IdentityClient, registry: TokenRegistry) -> Self {
        Self {
            keys: JwtKeys::new(&settings.jwt_secret),
            settings,
            identity,
            registry,
        }
    }

    pub fn keys(&self) -> &JwtKeys {
        &self.keys
    }

    pub fn registry(&self) -> &TokenRegistry {
        &self.registry
    }

    pub fn session_ttl(&self) -> Duration {
        self.settings.session_ttl
    }

    /// Build the consent screen URL of target provider.
    ///
    /// # Errors
    ///
    /// - Return [`LoginError::NotConfigured`] if no OAuth application is set
    ///   up for the provider.
    /// - Return [`LoginError::Url`] if the configured endpoint is not a URL.
    #[instrument(skip(self), level = "debug")]
    pub fn generate_authorization_url(&self, provider: Provider) -> Result<String> {
        let credentials = self
            .settings
            .credentials(provider)
            .ok_or(LoginError::NotConfigured(provider))?;
        let state = self.keys.issue_state(provider)?;
        let redirect_uri = provider.redirect_url(&self.settings.backend_url);

        let url = Url::parse_with_params(
            &self.identity.endpoints(provider).authorize,
            &[
                ("response_type", "code"),
                ("client_id", credentials.client_id.as_str()),
                ("redirect_uri", redirect_uri.as_str()),
                ("scope", provider.scopes()),
                ("state", state.as_str()),
            ],
        )?;

        Ok(url.into())
    }

    /// Finish a login and build the frontend URL carrying the session token.
    ///
    /// # Errors
    ///
    /// - Return [`LoginError::Denied`] if the provider reports an error,
    ///   usually because the user declined.
    /// - Return [`LoginError::BadState`] if the state token is missing,
    ///   forged, expired, or was issued for another provider.
    /// - Return [`LoginError::MissingCode`] if there is no code to exchange.
    /// - Return [`LoginError::Provider`] if exchange or identity lookup fails.
    #[instrument(skip(self, query), level = "debug")]
    pub async fn generate_frontend_redirect_url(
        &self,
        query: &CallbackQuery,
        provider: Provider,
    ) -> Result<String> {
        if let Some(error) = &query.error {
            let reason = query.error_description.as_deref().unwrap_or(error);
            return Err(LoginError::Denied(reason.to_string()));
        }

        let state = query.state.as_deref().ok_or(LoginError::BadState)?;
        match self.keys.verify_state(state) {
            Ok(claims) if claims.provider == provider => {}
            Ok(claims) => {
                warn!("state issued for {} used on {provider} callback", claims.provider);
                return Err(LoginError::BadState);
            }
            Err(error) => {
                warn!("rejecting login state: {error}");
                return Err(LoginError::BadState);
            }
        }

        let code = query
            .code
            .as_deref()
            .filter(|code| !code.is_empty())
            .ok_or(LoginError::MissingCode)?;
        let credentials = self
            .settings
            .credentials(provider)
            .ok_or(LoginError::NotConfigured(provider))?;

        let redirect_uri = provider.redirect_url(&self.settings.backend_url);
        let token = self
            .identity
            .exchange_code(provider, credentials, code, &redirect_uri)
            .await?;
        let identity = self.identity.get_identity(&token).await?;

        let uuid = Uuid::new_v4();
        let (jwt, claims) = self.keys.issue_session(uuid, self.settings.session_ttl)?;
        info!("{} logged in through {provider}", identity.username);
        self.registry.insert(
            uuid,
            Session {
                token,
                identity,
                expires_at: claims.exp,
            },
        );

        let url = Url::parse_with_params(
            &format!("{}/login_callback", self.settings.frontend_url),
            &[("token", jwt.as_str())],
        )?;

        Ok(url.into())
    }
}

/// All possible error types for the login flow.
#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error("Provider {0} is not configured")]
    NotConfigured(Provider),

    #[error("Login was denied: {0}")]
    Denied(String),

    #[error("Invalid login state")]
    BadState,

    #[error("Missing authorization code")]
    MissingCode,

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Jwt(#[from] JwtError),

    #[error(transparent)]
    Url(#[from] url::ParseError),
}

/// Friendly result alias :3
type Result<T, E = LoginError> = std::result::Result<T, E>;
