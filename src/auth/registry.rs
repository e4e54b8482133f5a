// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Token registry.
//!
//! Maps the session UUID embedded in a session token to the OAuth token (and
//! identity) obtained at login. The registry is shared by every request
//! handler, so all access goes through a read-write lock.
//!
//! By default the registry only lives in memory and every session is lost on
//! restart. When a sessions file is configured, the registry is loaded from it
//! on start-up and rewritten after each insertion or removal. That file holds
//! live OAuth tokens in plain text, so it is created with owner-only
//! permissions.
//!
//! The map is only snapshotted under its lock. Writing the snapshot happens
//! after the lock is released, so lookups never wait on the disk. Each
//! snapshot carries a generation number and older snapshots never overwrite
//! newer ones.

use crate::auth::provider::{Identity, OAuthToken};

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Everything known about one logged in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: OAuthToken,
    pub identity: Identity,

    /// Unix timestamp after which the session is dead.
    pub expires_at: i64,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now().timestamp()
    }
}

/// Thread-safe session lookup table.
#[derive(Debug, Clone, Default)]
pub struct TokenRegistry {
    sessions: Arc<RwLock<HashMap<Uuid, Session>>>,
    sessions_file: Option<Arc<SessionsFile>>,
}

#[derive(Debug)]
struct SessionsFile {
    path: PathBuf,
    generation: AtomicU64,

    /// Generation currently on disk. Held while writing.
    written: Mutex<u64>,
}

/// Serialized registry contents at one point in time.
#[derive(Debug)]
struct Snapshot {
    generation: u64,
    data: Vec<u8>,
}

impl TokenRegistry {
    /// Create a new in-memory registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry backed by target sessions file.
    ///
    /// Missing file means no sessions yet. Expired sessions are dropped on
    /// load.
    ///
    /// # Errors
    ///
    /// - Return [`RegistryError::Io`] if the file exists but cannot be read.
    /// - Return [`RegistryError::Decode`] if the file is not a valid session
    ///   dump.
    #[instrument(skip(path), level = "debug")]
    pub fn persistent(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut sessions: HashMap<Uuid, Session> = match fs::read(&path) {
            Ok(data) => serde_json::from_slice(&data)?,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(error) => return Err(error.into()),
        };
        sessions.retain(|_, session| !session.is_expired());
        info!("loaded {} sessions from {:?}", sessions.len(), path.display());

        Ok(Self {
            sessions: Arc::new(RwLock::new(sessions)),
            sessions_file: Some(Arc::new(SessionsFile {
                path,
                generation: AtomicU64::new(0),
                written: Mutex::new(0),
            })),
        })
    }

    /// Register a session under target UUID.
    pub fn insert(&self, uuid: Uuid, session: Session) {
        let snapshot = {
            let mut sessions = self.sessions.write();
            sessions.insert(uuid, session);
            self.snapshot(&sessions)
        };
        self.persist(snapshot);
    }

    /// Look up a live session.
    pub fn get(&self, uuid: &Uuid) -> Option<Session> {
        self.sessions
            .read()
            .get(uuid)
            .filter(|session| !session.is_expired())
            .cloned()
    }

    /// Forget a session, returning it if it was known.
    pub fn remove(&self, uuid: &Uuid) -> Option<Session> {
        let (removed, snapshot) = {
            let mut sessions = self.sessions.write();
            let removed = sessions.remove(uuid);
            let snapshot = removed.as_ref().and_then(|_| self.snapshot(&sessions));
            (removed, snapshot)
        };
        self.persist(snapshot);
        removed
    }

    /// Drop every expired session, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let (purged, snapshot) = {
            let mut sessions = self.sessions.write();
            let before = sessions.len();
            sessions.retain(|_, session| !session.is_expired());
            let purged = before - sessions.len();
            let snapshot = (purged > 0).then(|| self.snapshot(&sessions)).flatten();
            (purged, snapshot)
        };
        if purged > 0 {
            debug!("purged {purged} expired sessions");
        }
        self.persist(snapshot);
        purged
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    // INVARIANT: Called with the write lock held so generations follow the
    // order of mutations.
    fn snapshot(&self, sessions: &HashMap<Uuid, Session>) -> Option<Snapshot> {
        let file = self.sessions_file.as_ref()?;
        let generation = file.generation.fetch_add(1, Ordering::SeqCst) + 1;
        match serde_json::to_vec(sessions) {
            Ok(data) => Some(Snapshot { generation, data }),
            Err(error) => {
                warn!("cannot serialize sessions: {error}");
                None
            }
        }
    }

    // INVARIANT: Called without the sessions lock held.
    fn persist(&self, snapshot: Option<Snapshot>) {
        let (Some(file), Some(snapshot)) = (&self.sessions_file, snapshot) else {
            return;
        };

        let mut written = file.written.lock();
        if snapshot.generation <= *written {
            debug!("skipping stale session snapshot {}", snapshot.generation);
            return;
        }
        match write_sessions(&file.path, &snapshot.data) {
            Ok(()) => *written = snapshot.generation,
            Err(error) => warn!("cannot persist sessions to {:?}: {error}", file.path.display()),
        }
    }
}

fn write_sessions(path: &Path, data: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(&tmp)?;
    file.write_all(data)?;
    file.sync_all()?;
    fs::rename(&tmp, path)?;

    Ok(())
}

/// All possible error types for registry persistence.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Decode(#[from] serde_json::Error),
}

/// Friendly result alias :3
type Result<T, E = RegistryError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::provider::Provider;
    use pretty_assertions::assert_eq;

    fn session(expires_in: i64) -> Session {
        Session {
            token: OAuthToken::new("mocked_token", Provider::GitHub),
            identity: Identity {
                external_id: "123".into(),
                username: "mocked_login".into(),
                email: None,
            },
            expires_at: Utc::now().timestamp() + expires_in,
        }
    }

    #[test]
    fn get_known_session() {
        let registry = TokenRegistry::new();
        let uuid = Uuid::new_v4();
        let expect = session(60);
        registry.insert(uuid, expect.clone());

        assert_eq!(registry.get(&uuid), Some(expect));
        assert_eq!(registry.get(&Uuid::new_v4()), None);
    }

    #[test]
    fn expired_session_misses() {
        let registry = TokenRegistry::new();
        let uuid = Uuid::new_v4();
        registry.insert(uuid, session(-1));

        assert_eq!(registry.get(&uuid), None);
        assert_eq!(registry.purge_expired(), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn remove_session() {
        let registry = TokenRegistry::new();
        let uuid = Uuid::new_v4();
        registry.insert(uuid, session(60));

        assert!(registry.remove(&uuid).is_some());
        assert!(registry.remove(&uuid).is_none());
        assert_eq!(registry.get(&uuid), None);
    }

    #[test]
    fn concurrent_inserts_are_all_kept() {
        let registry = TokenRegistry::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        registry.insert(Uuid::new_v4(), session(60));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.len(), 400);
    }

    #[test]
    fn persistent_registry_survives_restart() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("state").join("sessions.json");
        let uuid = Uuid::new_v4();
        let stale = Uuid::new_v4();

        let registry = TokenRegistry::persistent(&path)?;
        registry.insert(uuid, session(60));
        registry.insert(stale, session(-1));
        drop(registry);

        let reloaded = TokenRegistry::persistent(&path)?;
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.get(&uuid).map(|s| s.identity.username), Some("mocked_login".into()));

        reloaded.remove(&uuid);
        assert!(TokenRegistry::persistent(&path)?.is_empty());

        Ok(())
    }

    #[test]
    fn lookups_do_not_wait_for_disk() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let registry = TokenRegistry::persistent(dir.path().join("sessions.json"))?;
        let uuid = Uuid::new_v4();

        // Hold the file while another thread logs in.
        let file = registry.sessions_file.clone().unwrap();
        let held = file.written.lock();
        let writer = {
            let registry = registry.clone();
            std::thread::spawn(move || registry.insert(uuid, session(60)))
        };

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while registry.get(&uuid).is_none() {
            assert!(std::time::Instant::now() < deadline, "lookup stuck behind file write");
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        drop(held);
        writer.join().unwrap();

        Ok(())
    }

    #[test]
    fn stale_snapshot_does_not_overwrite_newer() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("sessions.json");
        let registry = TokenRegistry::persistent(&path)?;
        let uuid = Uuid::new_v4();

        let stale = registry.snapshot(&HashMap::new());
        registry.insert(uuid, session(60));
        registry.persist(stale);

        let reloaded = TokenRegistry::persistent(&path)?;
        assert!(reloaded.get(&uuid).is_some());

        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn sessions_file_is_private() -> anyhow::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir()?;
        let path = dir.path().join("sessions.json");
        TokenRegistry::persistent(&path)?.insert(Uuid::new_v4(), session(60));

        let mode = fs::metadata(&path)?.permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        Ok(())
    }
}
