// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::ServerFixture;

use anyhow::Result;
use axum::http::{Method, StatusCode};
use git2::Repository;
use indoc::indoc;
use pretty_assertions::assert_eq;
use serde_json::json;

const REPO: &str = "repositoryName=owner%2Frepo";

async fn checkout(server: &ServerFixture) -> Result<()> {
    let (status, body) = server.send(Method::POST, "/git/repos", REPO).await?;
    assert_eq!((status, body), (StatusCode::OK, json!({ "message": "OK" })));
    Ok(())
}

#[tokio::test]
async fn edits_are_pushed_to_remote() -> Result<()> {
    let server = ServerFixture::new()?;
    let remote = server.remote("owner/repo")?;
    remote.stage_and_commit("README.md", "requirements\n")?;
    checkout(&server).await?;

    let (status, body) = server.send(Method::GET, "/git/repos", "").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "owner/repo": server.remote_path("owner/repo").to_string_lossy() })
    );

    let form = format!("{REPO}&docId=SRS");
    assert_eq!(server.send(Method::POST, "/documents", &form).await?.0, StatusCode::OK);
    let form = format!("{REPO}&docId=SRS&reqNumberId=1&reqText=Boot+fast");
    assert_eq!(server.send(Method::POST, "/requirements", &form).await?.0, StatusCode::OK);

    assert_eq!(remote.head_message()?, "Add requirement SRS001");
    assert_eq!(
        remote.read("SRS/SRS001.yml")?.as_deref(),
        Some(indoc! {"
            text: Boot fast
            links: []
        "})
    );

    let working_copy = Repository::open(server.working_copy("owner/repo"))?;
    let commit = working_copy.head()?.peel_to_commit()?;
    assert_eq!(commit.author().name(), Some("mocked_login"));
    assert_eq!(commit.author().email(), Some("mocked@example.com"));

    Ok(())
}

#[tokio::test]
async fn checkout_again_pulls_remote_changes() -> Result<()> {
    let server = ServerFixture::new()?;
    let remote = server.remote("owner/repo")?;
    remote.stage_and_commit("README.md", "requirements\n")?;
    checkout(&server).await?;

    remote.stage_and_commit("SRS/.document.yml", "digits: 3\n")?;
    remote.stage_and_commit("SRS/SRS001.yml", "text: Pulled\n")?;
    checkout(&server).await?;

    let form = format!("{REPO}&docId=SRS");
    let (status, body) = server.send(Method::GET, "/requirements", &form).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([{ "id": "SRS001", "text": "Pulled", "links": [] }]));

    Ok(())
}

#[tokio::test]
async fn stale_working_copy_rolls_back() -> Result<()> {
    let server = ServerFixture::new()?;
    let remote = server.remote("owner/repo")?;
    remote.stage_and_commit("README.md", "requirements\n")?;
    checkout(&server).await?;

    let path = server.working_copy("owner/repo");
    let before = Repository::open(&path)?.head()?.target();
    remote.stage_and_commit("NOTES.md", "someone else\n")?;

    let form = format!("{REPO}&docId=SRS");
    let (status, body) = server.send(Method::POST, "/documents", &form).await?;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    let message = body["message"].as_str().unwrap_or_default();
    assert!(message.starts_with("Unable to add document. Could not persist change:"), "{message}");

    assert_eq!(Repository::open(&path)?.head()?.target(), before);
    assert!(!path.join("SRS").exists());
    assert_eq!(remote.read("SRS/.document.yml")?, None);

    // Pulling brings the copy up to date, and the same edit goes through.
    checkout(&server).await?;
    assert_eq!(server.send(Method::POST, "/documents", &form).await?.0, StatusCode::OK);
    assert_eq!(remote.head_message()?, "Add document SRS");

    Ok(())
}

#[tokio::test]
async fn missing_remote_leaves_nothing_behind() -> Result<()> {
    let server = ServerFixture::new()?;

    let (status, body) = server.send(Method::POST, "/git/repos", REPO).await?;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    let message = body["message"].as_str().unwrap_or_default();
    assert!(message.starts_with("Unable to clone repository. clone failed:"), "{message}");
    assert!(!server.working_copy("owner/repo").exists());

    let (status, body) = server.send(Method::GET, "/git/repos", "").await?;
    assert_eq!((status, body), (StatusCode::OK, json!({})));

    Ok(())
}
