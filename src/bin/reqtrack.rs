// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use reqtrack::{
    api::router,
    auth::{login::Authenticator, provider::IdentityClient, registry::TokenRegistry},
    config::{ServerInfo, Settings},
    path::default_server_info_path,
    vcs::Git2Vcs,
    AppState,
};

use anyhow::{Context, Result};
use clap::Parser;
use std::{net::SocketAddr, path::PathBuf, process::exit, sync::Arc, time::Duration};
use tokio::{net::TcpListener, signal};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// How often expired sessions are dropped from the token registry.
const PURGE_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Parser)]
#[command(about, version)]
struct Cli {
    /// Address to listen on.
    #[arg(short, long, value_name = "addr", default_value = "127.0.0.1:8000")]
    pub bind: SocketAddr,

    /// Path to server info file.
    #[arg(short, long, value_name = "path")]
    pub server_info: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let layer = fmt::layer().compact();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry().with(layer).with(filter).init();

    if let Err(error) = run(Cli::parse()).await {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

async fn run(cli: Cli) -> Result<()> {
    let settings = Settings::from_env().context("cannot load settings from environment")?;

    let server_info = match cli.server_info {
        Some(path) => Ok(path),
        None => default_server_info_path(),
    }
    .map_err(anyhow::Error::from)
    .and_then(|path| {
        ServerInfo::load(&path).with_context(|| format!("cannot load server info {path:?}"))
    });
    let server_info = match server_info {
        Ok(info) => {
            info!("serving users from {:?}", info.users_folder.display());
            Some(info)
        }
        Err(error) => {
            warn!("{error:#}, data routes will report a configuration problem");
            None
        }
    };

    let registry = match &settings.sessions_file {
        Some(path) => match TokenRegistry::persistent(path) {
            Ok(registry) => registry,
            Err(error) => {
                warn!("cannot load sessions from {path:?}, starting empty: {error}");
                TokenRegistry::new()
            }
        },
        None => {
            warn!("no SESSIONS_FILE set, sessions will not survive a restart");
            TokenRegistry::new()
        }
    };

    let identity = IdentityClient::new().context("cannot build identity client")?;
    let auth = Authenticator::new(settings, identity, registry.clone());
    let state = Arc::new(AppState::new(auth, server_info, Arc::new(Git2Vcs::new())));

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            let purged = registry.purge_expired();
            if purged > 0 {
                debug!("purged {purged} expired sessions");
            }
        }
    });

    let listener = TcpListener::bind(cli.bind)
        .await
        .with_context(|| format!("cannot bind to {}", cli.bind))?;
    info!("listening on {}", cli.bind);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown())
        .await
        .context("server failed")?;

    info!("shut down");
    Ok(())
}

async fn shutdown() {
    if let Err(error) = signal::ctrl_c().await {
        warn!("cannot listen for shutdown signal: {error}");
        std::future::pending::<()>().await;
    }
}
