//! Daemon assembly: wires the filter, coordinator, scheduler, watcher,
//! search engine, and RPC server together for one project root.

use crate::config::Settings;
use crate::filter::{GitignoreSource, PathFilter};
use crate::index::IndexCoordinator;
use crate::parsing::ParserRegistry;
use crate::scheduler::IndexScheduler;
use crate::search::SearchEngine;
use crate::server::socket::{self, BindOutcome};
use crate::server::{AppState, router};
use crate::watcher::FileWatcher;
use anyhow::Context;
use axum::Json;
use axum::error_handling::HandleErrorLayer;
use axum::http::StatusCode;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower::timeout::TimeoutLayer;

/// Ceiling on any single RPC request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Run the daemon until shutdown. Returns `Ok(())` both on graceful
/// shutdown and on the non-fatal "another daemon owns this project" exit.
pub async fn serve(settings: Arc<Settings>) -> anyhow::Result<()> {
    let filter = Arc::new(build_filter(&settings)?);
    let coordinator = Arc::new(IndexCoordinator::new(settings.limits.unhealthy_threshold));
    let registry = Arc::new(ParserRegistry::new());

    let scheduler = Arc::new(IndexScheduler::start(
        Arc::clone(&coordinator),
        Arc::clone(&settings),
        Arc::clone(&filter),
        registry,
    ));

    // Claim the socket before doing any heavy work so a second daemon
    // backs off cheaply.
    let socket_path = socket::socket_path(&settings.project_root);
    let listener = match socket::bind(&socket_path).await.with_context(|| {
        format!("failed to bind socket {}", socket_path.display())
    })? {
        BindOutcome::Bound(listener) => listener,
        BindOutcome::AlreadyRunning => {
            crate::log_event!(
                "daemon",
                "already running",
                "{}",
                socket_path.display()
            );
            return Ok(());
        }
    };

    // Initial walk in the background; the RPC surface answers 503 until
    // it settles.
    {
        let scheduler = Arc::clone(&scheduler);
        std::thread::Builder::new()
            .name("lci-walk".to_string())
            .spawn(move || scheduler.walk_project())
            .context("failed to spawn initial walk")?;
    }

    let watcher = if settings.watcher.enabled {
        Some(
            FileWatcher::spawn(
                Arc::clone(&settings),
                Arc::clone(&filter),
                Arc::clone(&scheduler),
            )
            .context("failed to start file watcher")?,
        )
    } else {
        None
    };

    let engine = Arc::new(SearchEngine::new(
        Arc::clone(&coordinator),
        Arc::clone(&settings),
    ));
    let shutdown = CancellationToken::new();
    let state = AppState::new(
        Arc::clone(&settings),
        engine,
        Arc::clone(&scheduler),
        shutdown.clone(),
    );

    let app = router(state).layer(
        ServiceBuilder::new()
            .layer(HandleErrorLayer::new(|_: tower::BoxError| async {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "request timed out" })),
                )
            }))
            .layer(TimeoutLayer::new(REQUEST_TIMEOUT)),
    );

    crate::log_event!("daemon", "listening", "{}", socket_path.display());
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await;

    if let Some(watcher) = &watcher {
        watcher.stop();
    }
    socket::unlink(&socket_path);
    crate::log_event!("daemon", "stopped");

    result.context("rpc server failed")
}

fn build_filter(settings: &Settings) -> anyhow::Result<PathFilter> {
    let mut sources = Vec::new();
    if settings.indexing.use_gitignore {
        sources.push(GitignoreSource::File(
            settings.project_root.join(".gitignore"),
        ));
    }
    for line in &settings.indexing.ignore_patterns {
        sources.push(GitignoreSource::Line(line.clone()));
    }
    PathFilter::build(
        &settings.project_root,
        &settings.indexing.include,
        &settings.indexing.exclude,
        &sources,
    )
    .context("invalid path filter configuration")
}
