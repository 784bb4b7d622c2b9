// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{net::SocketAddr, sync::Arc};

use axum_server::{tls_rustls::RustlsConfig, Handle};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use wg_panel_server::{
    api::router,
    auth::{RateLimiter, TokenAuthority, TokenSettings},
    config::{AppConfig, LogFormat},
    maintenance::MaintenanceTask,
    mesh::MeshClient,
    provisioning::PeerProvisioner,
    runner::SystemCommandRunner,
    state::AppState,
    storage::Database,
    wireguard::{ServerProfile, WgInterface},
};

const DEFAULT_LOG_FILTER: &str = "info,tower_http=info";

#[tokio::main]
async fn main() {
    // Install the ring crypto provider for rustls (must be done before any TLS operations)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    init_tracing(config.log_format);
    config.warn_insecure_defaults();

    std::fs::create_dir_all(&config.data_dir).expect("Failed to create data directory");
    let db = Arc::new(
        Database::open(&config.database_path()).expect("Failed to open database"),
    );
    tracing::info!(path = %config.database_path().display(), "Database opened");

    let tokens = TokenAuthority::new(
        db.clone(),
        TokenSettings {
            access_secret: config.jwt_access_secret.clone(),
            access_ttl: config.access_token_ttl,
            refresh_ttl: config.refresh_token_ttl,
        },
    );
    match tokens.ensure_user(&config.admin_username, &config.admin_password) {
        Ok(true) => tracing::info!(username = %config.admin_username, "Admin user created"),
        Ok(false) => {}
        Err(e) => panic!("Failed to bootstrap admin user: {e}"),
    }

    let runner = Arc::new(SystemCommandRunner);
    let provisioner = PeerProvisioner::new(
        db.clone(),
        WgInterface::new(config.wg_interface.clone(), runner.clone()),
        config.wg_subnet,
        ServerProfile {
            server_public_key: config.wg_server_public_key.clone(),
            server_endpoint: config.wg_server_endpoint.clone(),
            dns: config.wg_dns.clone(),
            allowed_ips: config.wg_allowed_ips.clone(),
        },
    );
    match provisioner.sync_to_interface().await {
        Ok(applied) => tracing::info!(applied, interface = %config.wg_interface, "Peers synced to interface"),
        Err(e) => tracing::warn!(error = %e, "Peer sync skipped"),
    }

    let state = AppState::new(
        db.clone(),
        tokens,
        provisioner,
        RateLimiter::new(config.rate_limit_requests, config.rate_limit_window),
        MeshClient::new(runner),
    )
    .with_cookie_secure(config.cookie_secure);

    let shutdown = CancellationToken::new();
    tokio::spawn(MaintenanceTask::new(db).run(shutdown.clone()));
    {
        let limiter = state.login_limiter.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { limiter.run_pruner(shutdown).await });
    }

    let handle = Handle::<SocketAddr>::new();
    tokio::spawn(shutdown_on_signal(
        handle.clone(),
        shutdown,
        config.shutdown_grace,
    ));

    let app = router(state).into_make_service_with_connect_info::<SocketAddr>();
    let addr = config.bind_addr;

    match &config.tls {
        Some(tls) => {
            let tls_config = RustlsConfig::from_pem_file(&tls.cert, &tls.key)
                .await
                .expect("Failed to load TLS certificate and key");
            tracing::info!(%addr, "WG Panel listening on https (docs at /docs)");
            axum_server::bind_rustls(addr, tls_config)
                .handle(handle)
                .serve(app)
                .await
                .expect("HTTPS server failed");
        }
        None => {
            tracing::info!(%addr, "WG Panel listening on http (docs at /docs)");
            axum_server::bind(addr)
                .handle(handle)
                .serve(app)
                .await
                .expect("HTTP server failed");
        }
    }

    tracing::info!("Server stopped");
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }
}

/// Stop accepting connections on SIGINT or SIGTERM and give in-flight
/// requests `grace` to finish.
async fn shutdown_on_signal(
    handle: Handle<SocketAddr>,
    shutdown: CancellationToken,
    grace: std::time::Duration,
) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!(grace_secs = grace.as_secs(), "Shutdown signal received");
    shutdown.cancel();
    handle.graceful_shutdown(Some(grace));
}
