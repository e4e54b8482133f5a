// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine where configuration lives, and where each user's working copies
//! are placed inside the users folder.
//!
//! # Users Folder Layout
//!
//! ```text
//! <users_folder>/
//!   github/
//!     <external_id>/
//!       repos             # repository catalogue
//!       owner-repo/       # working copy of "owner/repo"
//!   gitlab/
//!     ...
//! ```

use crate::auth::provider::Provider;

use std::path::{Path, PathBuf};

/// Name of the per-user repository catalogue file.
pub const CATALOGUE_FILE: &str = "repos";

/// Determine default absolute path to server info file.
///
/// Uses `$XDG_CONFIG_HOME/reqtrack/server.toml`. Does not check if the path
/// returned actually exists.
///
/// # Errors
///
/// - Return [`NoConfigDir`] if the configuration directory cannot be
///   determined.
pub fn default_server_info_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("reqtrack").join("server.toml"))
        .ok_or(NoConfigDir)
}

/// Flatten an "owner/repo" style repository name into one directory name.
///
/// Both forward and backward slashes become hyphens, so names that are
/// already flat come back untouched.
pub fn repo_name_to_dir_name(repo_name: impl AsRef<str>) -> String {
    repo_name.as_ref().replace(['/', '\\'], "-")
}

/// Directory holding every working copy of one user.
pub fn user_dir(
    users_folder: impl AsRef<Path>,
    provider: Provider,
    external_id: impl AsRef<str>,
) -> PathBuf {
    users_folder
        .as_ref()
        .join(provider.name())
        .join(external_id.as_ref())
}

/// Working copy of target repository for one user.
pub fn user_repo_dir(
    users_folder: impl AsRef<Path>,
    provider: Provider,
    external_id: impl AsRef<str>,
    repo_name: impl AsRef<str>,
) -> PathBuf {
    user_dir(users_folder, provider, external_id).join(repo_name_to_dir_name(repo_name))
}

/// No way to determine the configuration directory.
///
/// # See Also
///
/// - [`dirs::config_dir`](https://docs.rs/dirs/latest/dirs/fn.config_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to configuration directory")]
pub struct NoConfigDir;

/// Friendly result alias :3
pub type Result<T, E = NoConfigDir> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use simple_test_case::test_case;

    #[test_case("owner/repo", "owner-repo"; "slash")]
    #[test_case("owner-repo", "owner-repo"; "already flat")]
    #[test_case("group/sub/repo", "group-sub-repo"; "nested group")]
    #[test_case("owner\\repo", "owner-repo"; "backslash")]
    #[test]
    fn flatten_repo_name(input: &str, expect: &str) {
        assert_eq!(repo_name_to_dir_name(input), expect);
    }

    #[test]
    fn flatten_is_idempotent() {
        let once = repo_name_to_dir_name("user_folder/repo");
        assert_eq!(once, "user_folder-repo");
        assert_eq!(repo_name_to_dir_name(&once), once);
    }

    #[test]
    fn resolve_user_repo_dir() {
        let result = user_repo_dir("/default/repos/folder", Provider::GitHub, "123", "user/repo");
        assert_eq!(
            result,
            PathBuf::from("/default/repos/folder/github/123/user-repo")
        );
    }
}
