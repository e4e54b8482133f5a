// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! REST surface.
//!
//! # Routes
//!
//! | Route                         | Methods               | Guarded |
//! |-------------------------------|-----------------------|---------|
//! | `/hello`                      | GET                   | no      |
//! | `/login/{provider}`           | GET                   | no      |
//! | `/login_callback/{provider}`  | GET                   | no      |
//! | `/logout`                     | POST                  | yes     |
//! | `/git/repos`                  | GET, POST             | yes     |
//! | `/documents`                  | GET, POST, PUT, DELETE| yes     |
//! | `/requirements`               | GET, POST, PUT, DELETE| yes     |
//! | `/link`                       | PUT                   | yes     |
//! | `/unlink`                     | PUT                   | yes     |
//!
//! Guarded routes need an `Authorization: Bearer <jwt>` header. Parameters
//! are form encoded, in the query string for GET and in the body otherwise.

pub mod error;
pub mod handlers;

use crate::{auth::middleware::require_jwt_login, SharedState};

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Build the full application router.
pub fn router(state: SharedState) -> Router {
    let protected = Router::new()
        .route("/logout", post(handlers::logout))
        .route("/git/repos", get(handlers::list_repos).post(handlers::sync_repo))
        .route(
            "/documents",
            get(handlers::get_documents)
                .post(handlers::add_document)
                .put(handlers::edit_document)
                .delete(handlers::delete_document),
        )
        .route(
            "/requirements",
            get(handlers::get_requirements)
                .post(handlers::add_requirement)
                .put(handlers::edit_requirement)
                .delete(handlers::delete_requirement),
        )
        .route("/link", put(handlers::add_link))
        .route("/unlink", put(handlers::remove_link))
        .route_layer(from_fn_with_state(state.clone(), require_jwt_login));

    Router::new()
        .route("/hello", get(handlers::hello))
        .route("/login/{provider}", get(handlers::login))
        .route("/login_callback/{provider}", get(handlers::login_callback))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
