// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Bounded pool for blocking version control work.
//!
//! Clones, pulls, and pushes can take arbitrarily long, and libgit2 calls
//! block. They are kept off the async executor by running them on tokio's
//! blocking threads, with a semaphore capping how many run at once and a
//! deadline capping how long a request waits for one.
//!
//! A job that misses its deadline is not cancelled. It keeps its permit and
//! runs to completion in the background, so the pool never admits more
//! concurrent jobs than configured.

use crate::config::GitSettings;

use std::{sync::Arc, time::Duration};
use tokio::{
    sync::Semaphore,
    task::spawn_blocking,
    time::{timeout_at, Instant},
};
use tracing::warn;

/// Semaphore-bounded runner for blocking jobs.
#[derive(Debug, Clone)]
pub struct GitWorkers {
    permits: Arc<Semaphore>,
    timeout: Duration,
}

impl GitWorkers {
    /// Construct new pool from git settings.
    ///
    /// A worker count of zero is treated as one.
    pub fn new(settings: &GitSettings) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(settings.workers.max(1))),
            timeout: settings.timeout(),
        }
    }

    /// Deadline applied to each job.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run a blocking job on the pool.
    ///
    /// The deadline covers both waiting for a free worker and running the
    /// job itself.
    ///
    /// # Errors
    ///
    /// - Return [`WorkerError::Timeout`] if the deadline passes.
    /// - Return [`WorkerError::Panicked`] if the job panics.
    /// - Return [`WorkerError::Closed`] if the pool was shut down.
    pub async fn run<T, F>(&self, job: F) -> Result<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let deadline = Instant::now() + self.timeout;
        let permit = timeout_at(deadline, self.permits.clone().acquire_owned())
            .await
            .map_err(|_| WorkerError::Timeout(self.timeout))?
            .map_err(|_| WorkerError::Closed)?;

        let handle = spawn_blocking(move || {
            let _permit = permit;
            job()
        });

        match timeout_at(deadline, handle).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => Err(WorkerError::Panicked(error.to_string())),
            Err(_) => {
                warn!("job exceeded {:?}, left running in background", self.timeout);
                Err(WorkerError::Timeout(self.timeout))
            }
        }
    }
}

/// All possible error types for the worker pool.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("operation panicked: {0}")]
    Panicked(String),

    #[error("worker pool is closed")]
    Closed,
}

/// Friendly result alias :3
type Result<T, E = WorkerError> = std::result::Result<T, E>;
