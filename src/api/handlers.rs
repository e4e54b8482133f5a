// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Route handlers.
//!
//! Handlers only pick parameters out of the request and translate outcomes.
//! Store and version control work is shipped to the worker pool, because it
//! blocks.

use crate::{
    api::error::ApiError,
    auth::{
        login::CallbackQuery,
        middleware::CurrentSession,
        provider::Provider,
    },
    config::ServerInfo,
    path::{repo_name_to_dir_name, user_dir, user_repo_dir, CATALOGUE_FILE},
    store::{
        catalogue::Catalogue,
        model::{DocumentView, RequirementView},
        DocumentStore, StoreError,
    },
    vcs::{check_origin, GitCredentials},
    AppState, SharedState,
};

use axum::{
    extract::{Path, Query, State},
    response::Redirect,
    Extension, Form, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::{collections::BTreeMap, path::PathBuf};
use tracing::info;

/// Form fields accepted by the data routes.
///
/// GET requests carry them in the query string, everything else in an
/// `application/x-www-form-urlencoded` body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Params {
    pub repository_name: Option<String>,
    pub doc_id: Option<String>,
    pub parent_id: Option<String>,
    pub req_id: Option<String>,
    pub req_number_id: Option<String>,
    pub req_text: Option<String>,
    pub req1_id: Option<String>,
    pub req2_id: Option<String>,
}

fn ok() -> Json<Value> {
    Json(json!({ "message": "OK" }))
}

/// Non-blank field, trimmed.
fn require<'a>(
    value: &'a Option<String>,
    action: &'static str,
    field: &'static str,
) -> Result<&'a str, ApiError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(ApiError::MissingField { action, field })
}

/// Field that must be present but may be blank.
fn present<'a>(
    value: &'a Option<String>,
    action: &'static str,
    field: &'static str,
) -> Result<&'a str, ApiError> {
    value
        .as_deref()
        .ok_or(ApiError::MissingField { action, field })
}

fn server_info<'a>(state: &'a AppState, action: &'static str) -> Result<&'a ServerInfo, ApiError> {
    state.server_info.as_ref().ok_or(ApiError::Config(action))
}

/// Repository names look like `owner/repo` or `group/sub/repo`.
fn validate_repo_name(name: &str, action: &'static str) -> Result<(), ApiError> {
    let valid = name.split('/').all(|segment| {
        !segment.is_empty()
            && segment != "."
            && segment != ".."
            && segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    });

    if valid {
        Ok(())
    } else {
        Err(ApiError::InvalidField {
            action,
            reason: format!("Invalid repository name {name:?}"),
        })
    }
}

/// Working copy selected by the `repositoryName` field.
fn working_copy(
    state: &AppState,
    current: &CurrentSession,
    params: &Params,
    action: &'static str,
) -> Result<PathBuf, ApiError> {
    let info = server_info(state, action)?;
    let name = require(&params.repository_name, action, "repositoryName")?;
    validate_repo_name(name, action)?;

    Ok(user_repo_dir(
        &info.users_folder,
        current.session.token.provider,
        &current.session.identity.external_id,
        name,
    ))
}

async fn with_store<T, F>(state: &AppState, action: &'static str, job: F) -> Result<T, ApiError>
where
    F: FnOnce(&DocumentStore) -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    let store = state.store.clone();
    state
        .workers
        .run(move || job(&store))
        .await
        .map_err(|source| ApiError::Worker { action, source })?
        .map_err(|source| ApiError::Store { action, source })
}

pub async fn hello() -> &'static str {
    "Hello from backend"
}

pub async fn login(
    State(state): State<SharedState>,
    Path(provider): Path<String>,
) -> Result<Redirect, ApiError> {
    let provider: Provider = provider.parse()?;
    let url = state.auth.generate_authorization_url(provider)?;
    Ok(Redirect::temporary(&url))
}

pub async fn login_callback(
    State(state): State<SharedState>,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
) -> Result<Redirect, ApiError> {
    let provider: Provider = provider.parse()?;
    let url = state
        .auth
        .generate_frontend_redirect_url(&query, provider)
        .await?;
    Ok(Redirect::temporary(&url))
}

pub async fn logout(
    State(state): State<SharedState>,
    Extension(current): Extension<CurrentSession>,
) -> Json<Value> {
    state.auth.registry().remove(&current.uuid);
    info!("{} logged out", current.session.identity.username);
    ok()
}

pub async fn get_documents(
    State(state): State<SharedState>,
    Extension(current): Extension<CurrentSession>,
    Form(params): Form<Params>,
) -> Result<Json<Vec<DocumentView>>, ApiError> {
    const ACTION: &str = "get documents";
    let repo = working_copy(&state, &current, &params, ACTION)?;
    let documents = with_store(&state, ACTION, move |store| store.documents(&repo)).await?;
    Ok(Json(documents))
}

pub async fn add_document(
    State(state): State<SharedState>,
    Extension(current): Extension<CurrentSession>,
    Form(params): Form<Params>,
) -> Result<Json<Value>, ApiError> {
    const ACTION: &str = "add document";
    let repo = working_copy(&state, &current, &params, ACTION)?;
    let doc_id = require(&params.doc_id, ACTION, "docId")?.to_string();
    let parent_id = params.parent_id.clone();
    let credentials = GitCredentials::from_session(&current.session);

    with_store(&state, ACTION, move |store| {
        store.add_document(&repo, &credentials, &doc_id, parent_id.as_deref())
    })
    .await?;
    Ok(ok())
}

pub async fn edit_document(
    State(state): State<SharedState>,
    Extension(current): Extension<CurrentSession>,
    Form(params): Form<Params>,
) -> Result<Json<Value>, ApiError> {
    const ACTION: &str = "edit document";
    let repo = working_copy(&state, &current, &params, ACTION)?;
    let doc_id = require(&params.doc_id, ACTION, "docId")?.to_string();
    let parent_id = params.parent_id.clone();
    let credentials = GitCredentials::from_session(&current.session);

    with_store(&state, ACTION, move |store| {
        store.edit_document(&repo, &credentials, &doc_id, parent_id.as_deref())
    })
    .await?;
    Ok(ok())
}

pub async fn delete_document(
    State(state): State<SharedState>,
    Extension(current): Extension<CurrentSession>,
    Form(params): Form<Params>,
) -> Result<Json<Value>, ApiError> {
    const ACTION: &str = "delete document";
    let repo = working_copy(&state, &current, &params, ACTION)?;
    let doc_id = require(&params.doc_id, ACTION, "docId")?.to_string();
    let credentials = GitCredentials::from_session(&current.session);

    with_store(&state, ACTION, move |store| {
        store.delete_document(&repo, &credentials, &doc_id)
    })
    .await?;
    Ok(ok())
}

pub async fn get_requirements(
    State(state): State<SharedState>,
    Extension(current): Extension<CurrentSession>,
    Form(params): Form<Params>,
) -> Result<Json<Vec<RequirementView>>, ApiError> {
    const ACTION: &str = "get requirements";
    let repo = working_copy(&state, &current, &params, ACTION)?;
    let doc_id = require(&params.doc_id, ACTION, "docId")?.to_string();

    let requirements =
        with_store(&state, ACTION, move |store| store.requirements(&repo, &doc_id)).await?;
    Ok(Json(requirements))
}

pub async fn add_requirement(
    State(state): State<SharedState>,
    Extension(current): Extension<CurrentSession>,
    Form(params): Form<Params>,
) -> Result<Json<Value>, ApiError> {
    const ACTION: &str = "add requirement";
    let repo = working_copy(&state, &current, &params, ACTION)?;
    let doc_id = require(&params.doc_id, ACTION, "docId")?.to_string();
    let number = require(&params.req_number_id, ACTION, "reqNumberId")?.to_string();
    let text = present(&params.req_text, ACTION, "reqText")?.to_string();
    let credentials = GitCredentials::from_session(&current.session);

    with_store(&state, ACTION, move |store| {
        store.add_requirement(&repo, &credentials, &doc_id, &number, &text)
    })
    .await?;
    Ok(ok())
}

pub async fn edit_requirement(
    State(state): State<SharedState>,
    Extension(current): Extension<CurrentSession>,
    Form(params): Form<Params>,
) -> Result<Json<Value>, ApiError> {
    const ACTION: &str = "edit requirement";
    let repo = working_copy(&state, &current, &params, ACTION)?;
    let doc_id = require(&params.doc_id, ACTION, "docId")?.to_string();
    let req_id = require(&params.req_id, ACTION, "reqId")?.to_string();
    let text = present(&params.req_text, ACTION, "reqText")?.to_string();
    let credentials = GitCredentials::from_session(&current.session);

    with_store(&state, ACTION, move |store| {
        store.edit_requirement(&repo, &credentials, &doc_id, &req_id, &text)
    })
    .await?;
    Ok(ok())
}

pub async fn delete_requirement(
    State(state): State<SharedState>,
    Extension(current): Extension<CurrentSession>,
    Form(params): Form<Params>,
) -> Result<Json<Value>, ApiError> {
    const ACTION: &str = "delete requirement";
    let repo = working_copy(&state, &current, &params, ACTION)?;
    let doc_id = require(&params.doc_id, ACTION, "docId")?.to_string();
    let req_id = require(&params.req_id, ACTION, "reqId")?.to_string();
    let credentials = GitCredentials::from_session(&current.session);

    with_store(&state, ACTION, move |store| {
        store.delete_requirement(&repo, &credentials, &doc_id, &req_id)
    })
    .await?;
    Ok(ok())
}

pub async fn add_link(
    State(state): State<SharedState>,
    Extension(current): Extension<CurrentSession>,
    Form(params): Form<Params>,
) -> Result<Json<Value>, ApiError> {
    const ACTION: &str = "add link";
    let repo = working_copy(&state, &current, &params, ACTION)?;
    let req1 = require(&params.req1_id, ACTION, "req1Id")?.to_string();
    let req2 = require(&params.req2_id, ACTION, "req2Id")?.to_string();
    let credentials = GitCredentials::from_session(&current.session);

    with_store(&state, ACTION, move |store| {
        store.add_link(&repo, &credentials, &req1, &req2)
    })
    .await?;
    Ok(ok())
}

pub async fn remove_link(
    State(state): State<SharedState>,
    Extension(current): Extension<CurrentSession>,
    Form(params): Form<Params>,
) -> Result<Json<Value>, ApiError> {
    const ACTION: &str = "remove link";
    let repo = working_copy(&state, &current, &params, ACTION)?;
    let req1 = require(&params.req1_id, ACTION, "req1Id")?.to_string();
    let req2 = require(&params.req2_id, ACTION, "req2Id")?.to_string();
    let credentials = GitCredentials::from_session(&current.session);

    with_store(&state, ACTION, move |store| {
        store.remove_link(&repo, &credentials, &req1, &req2)
    })
    .await?;
    Ok(ok())
}

pub async fn list_repos(
    State(state): State<SharedState>,
    Extension(current): Extension<CurrentSession>,
) -> Result<Json<BTreeMap<String, String>>, ApiError> {
    const ACTION: &str = "get repositories";
    let info = server_info(&state, ACTION)?;
    let path = user_dir(
        &info.users_folder,
        current.session.token.provider,
        &current.session.identity.external_id,
    )
    .join(CATALOGUE_FILE);

    let catalogue = state
        .workers
        .run(move || Catalogue::load(path))
        .await
        .map_err(|source| ApiError::Worker { action: ACTION, source })?
        .map_err(|source| ApiError::Io { action: ACTION, source })?;

    Ok(Json(catalogue.entries().clone()))
}

/// Clone a repository the user does not have yet, or pull one they do.
pub async fn sync_repo(
    State(state): State<SharedState>,
    Extension(current): Extension<CurrentSession>,
    Form(params): Form<Params>,
) -> Result<Json<Value>, ApiError> {
    const ACTION: &str = "clone repository";
    let info = server_info(&state, ACTION)?;
    let name = require(&params.repository_name, ACTION, "repositoryName")?.to_string();
    validate_repo_name(&name, ACTION)?;

    let provider = current.session.token.provider;
    let user = user_dir(&info.users_folder, provider, &current.session.identity.external_id);
    let dest = user.join(repo_name_to_dir_name(&name));
    let remote = info.git.remote(provider, &name);
    let token = current.session.token.clone();
    let store = state.store.clone();

    state
        .workers
        .run(move || -> Result<(), ApiError> {
            let vcs = store.vcs();
            let lock = store.locks().get(&dest);
            let _guard = lock.lock();
            let synced = if vcs.exists(&dest) {
                check_origin(vcs.as_ref(), &dest, &remote, &token)
                    .and_then(|()| vcs.pull(&dest, &token))
            } else {
                vcs.clone_repo(&remote, &dest, &token)
            };
            synced.map_err(|source| ApiError::Vcs { action: ACTION, source })?;

            let path = user.join(CATALOGUE_FILE);
            let lock = store.locks().get(&path);
            let _guard = lock.lock();
            let mut catalogue =
                Catalogue::load(&path).map_err(|source| ApiError::Io { action: ACTION, source })?;
            catalogue.insert(name, remote);
            catalogue
                .save(&path)
                .map_err(|source| ApiError::Io { action: ACTION, source })
        })
        .await
        .map_err(|source| ApiError::Worker { action: ACTION, source })??;

    Ok(ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use simple_test_case::test_case;

    #[test_case("owner/repo", true; "owner and repo")]
    #[test_case("group/sub/repo.js", true; "nested with dot")]
    #[test_case("../etc", false; "parent escape")]
    #[test_case("/abs/repo", false; "absolute")]
    #[test_case("owner//repo", false; "empty segment")]
    #[test_case("owner/re po", false; "space")]
    #[test]
    fn repository_names(name: &str, expect: bool) {
        assert_eq!(validate_repo_name(name, "test").is_ok(), expect);
    }

    #[test]
    fn blank_fields_are_missing() {
        let params = Params {
            doc_id: Some("  ".into()),
            req_text: Some(String::new()),
            ..Params::default()
        };

        assert!(matches!(
            require(&params.doc_id, "test", "docId"),
            Err(ApiError::MissingField { field: "docId", .. })
        ));
        assert_eq!(present(&params.req_text, "test", "reqText").ok(), Some(""));
        assert!(present(&params.req_id, "test", "reqId").is_err());
    }
}
