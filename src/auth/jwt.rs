// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Signed tokens.
//!
//! Two kinds of HS256 tokens are minted with the same secret:
//!
//! 1. __Session tokens__ carry the session UUID that keys the token registry.
//!    They are handed to the frontend after login and come back in the
//!    `Authorization: Bearer` header.
//! 2. __State tokens__ travel through the provider's consent screen as the
//!    OAuth `state` parameter, so the callback can tell that it was us who
//!    started the login and for which provider.

use crate::{auth::provider::Provider, config::Secret};

use chrono::Utc;
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// How long a login may sit on the provider's consent screen.
pub const STATE_TTL: Duration = Duration::from_secs(10 * 60);

/// Claims of a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub uuid: Uuid,
    pub iat: i64,
    pub exp: i64,
}

/// Claims of an OAuth state token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateClaims {
    pub nonce: Uuid,
    pub provider: Provider,
    pub exp: i64,
}

/// Signing and verification keys derived from the configured secret.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl JwtKeys {
    pub fn new(secret: &Secret) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(secret.expose().as_bytes()),
            decoding: DecodingKey::from_secret(secret.expose().as_bytes()),
            validation,
        }
    }

    /// Mint a session token for target session UUID.
    ///
    /// # Errors
    ///
    /// - Return [`JwtError::Encode`] if signing fails.
    pub fn issue_session(&self, uuid: Uuid, ttl: Duration) -> Result<(String, SessionClaims)> {
        let iat = Utc::now().timestamp();
        let claims = SessionClaims {
            uuid,
            iat,
            exp: iat + ttl.as_secs() as i64,
        };
        Ok((self.sign(&claims)?, claims))
    }

    /// Verify a session token.
    ///
    /// # Errors
    ///
    /// - Return [`JwtError::Expired`] if the token is past its expiry.
    /// - Return [`JwtError::Invalid`] for any other defect: bad signature,
    ///   bad format, wrong algorithm, missing claims.
    pub fn verify_session(&self, token: &str) -> Result<SessionClaims> {
        self.verify(token)
    }

    /// Mint a state token for a login through target provider.
    ///
    /// # Errors
    ///
    /// - Return [`JwtError::Encode`] if signing fails.
    pub fn issue_state(&self, provider: Provider) -> Result<String> {
        self.sign(&StateClaims {
            nonce: Uuid::new_v4(),
            provider,
            exp: Utc::now().timestamp() + STATE_TTL.as_secs() as i64,
        })
    }

    /// Verify a state token.
    ///
    /// # Errors
    ///
    /// - Return [`JwtError::Expired`] if the login took too long.
    /// - Return [`JwtError::Invalid`] for any other defect.
    pub fn verify_state(&self, token: &str) -> Result<StateClaims> {
        self.verify(token)
    }

    fn sign(&self, claims: &impl Serialize) -> Result<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding).map_err(JwtError::Encode)
    }

    fn verify<T: DeserializeOwned>(&self, token: &str) -> Result<T> {
        decode::<T>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|error| match error.kind() {
                ErrorKind::ExpiredSignature => JwtError::Expired,
                _ => JwtError::Invalid,
            })
    }
}

/// All possible error types for token handling.
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Token expired")]
    Expired,

    #[error("Invalid token")]
    Invalid,

    #[error(transparent)]
    Encode(jsonwebtoken::errors::Error),
}

/// Friendly result alias :3
type Result<T, E = JwtError> = std::result::Result<T, E>;
