//! itd-daemon entry point.
//!
//! Thin: tracing, config, secrets, wiring, then the orchestrator and the
//! HTTP control API side by side until ctrl-c.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use clap::Parser;
use itd_config::{load_desk_config, resolve_secrets_from_env};
use itd_daemon::{routes, state, wiring};
use itd_runtime::spawn_alert_dispatcher;
use itd_schemas::{AlertHandle, SystemClock};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{error, info, Level};

#[derive(Parser)]
#[command(name = "itd-daemon")]
#[command(about = "Intraday trade desk daemon", long_about = None)]
struct Args {
    /// Config layers in merge order (base first)
    #[arg(env = "ITD_CONFIG", value_delimiter = ',', default_value = "config/desk.yaml")]
    config: Vec<String>,

    /// Listen address; overrides `daemon.addr` from config
    #[arg(long, env = "ITD_DAEMON_ADDR")]
    addr: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();
    let args = Args::parse();

    let path_refs: Vec<&str> = args.config.iter().map(String::as_str).collect();
    let (cfg, config_hash) = load_desk_config(&path_refs).context("load desk config")?;
    info!(config = ?args.config, %config_hash, "config loaded");

    let secrets = resolve_secrets_from_env(&cfg)?;
    let cfg = Arc::new(cfg);

    let (alerts, alert_rx) = AlertHandle::channel(cfg.alerts.queue_capacity);
    let dispatcher = spawn_alert_dispatcher(alert_rx, wiring::alert_sinks(&secrets)?);

    let desk = wiring::build_desk(Arc::clone(&cfg), &secrets, alerts.clone(), Arc::new(SystemClock))?;

    let shared = Arc::new(state::AppState::new(
        Arc::clone(&cfg),
        config_hash,
        desk.orchestrator.status(),
        Arc::clone(&desk.exclusions),
    ));

    let app = routes::build_router(shared)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr: SocketAddr = args
        .addr
        .unwrap_or_else(|| cfg.daemon.addr.clone())
        .parse()
        .context("invalid daemon listen address")?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("itd-daemon listening on http://{}", addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let runner = tokio::spawn(Arc::clone(&desk.orchestrator).run(shutdown_rx.clone()));

    let mut server_shutdown = shutdown_rx;
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.wait_for(|stop| *stop).await;
            })
            .await
    });

    tokio::signal::ctrl_c().await.context("install ctrl-c handler")?;
    info!("shutdown requested");
    let _ = shutdown_tx.send(true);

    if let Err(e) = runner.await {
        error!(error = %e, "orchestrator task failed");
    }
    server.await.context("server task failed")?.context("server crashed")?;

    // Closing the last handles lets the dispatcher drain and exit.
    drop(alerts);
    drop(desk);
    if tokio::time::timeout(Duration::from_secs(5), dispatcher).await.is_err() {
        error!("alert dispatcher did not drain in time");
    }
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
