// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Authentication.
//!
//! Users log in through an OAuth provider. The resulting provider access
//! token never leaves the server: it is parked in the [`registry`] under a
//! fresh session UUID, and the browser only ever sees a signed [`jwt`] that
//! names that UUID. Protected routes resolve the token back to the session
//! through the [`middleware`].

pub mod jwt;
pub mod login;
pub mod middleware;
pub mod provider;
pub mod registry;
