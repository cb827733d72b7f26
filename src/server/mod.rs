// src/server/mod.rs

//! HTTP + WebSocket front for observers.
//!
//! - `GET /` starts a login and renders the entry page with the login URL
//!   and session id.
//! - `GET /ws` upgrades to the observer protocol (see [`protocol`]).

pub mod observer;
pub mod page;
pub mod protocol;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::engine::Engine;
use crate::progress::Heartbeat;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub heartbeat: Arc<Heartbeat>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ws", get(observer::ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `0.0.0.0:<port>` and serve until Ctrl-C.
pub async fn serve(state: AppState, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "listening for observers");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("server stopped");
    Ok(())
}

async fn index(State(state): State<AppState>) -> Response {
    match state.engine.begin_login().await {
        Ok(ticket) => Html(page::render_index(&ticket)).into_response(),
        Err(e) => {
            error!(error = %e, "could not start login");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "could not start login - see logs for details",
            )
                .into_response()
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
