//! The `serve` subcommand: HTTP endpoint that starts a collection run.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use asx_dividends_lib::{run_job, Settings};
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Args;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

#[derive(Args)]
pub struct ServeArgs {
    /// Bind address (overrides ASX_LISTEN_ADDR)
    #[arg(long)]
    pub listen: Option<SocketAddr>,
}

/// Starts one run in the background. Must return without waiting for it.
pub type Launcher = Arc<dyn Fn() + Send + Sync>;

#[derive(Clone)]
pub struct AppState {
    launch: Launcher,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/trigger-crawl", post(trigger_crawl))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn trigger_crawl(State(state): State<AppState>) -> Json<Value> {
    (state.launch)();
    Json(json!({ "status": "Job started" }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Spawns `run_job` on the runtime for every trigger.
fn job_launcher(settings: Settings) -> Launcher {
    Arc::new(move || {
        let settings = settings.clone();
        tokio::spawn(async move {
            match run_job(settings).await {
                Ok(summary) => tracing::info!(
                    announcements = summary.collection.announcements.len(),
                    failures = summary.report.failures.len(),
                    "triggered run finished"
                ),
                Err(err) => tracing::error!("triggered run failed: {}", err),
            }
        });
    })
}

pub async fn run(args: &ServeArgs, settings: Settings) -> Result<()> {
    let addr = args.listen.unwrap_or(settings.listen_addr);
    let app = router(AppState {
        launch: job_launcher(settings),
    });

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "trigger endpoint listening");
    eprintln!("Listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
