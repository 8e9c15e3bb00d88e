//! # fluxopt-server: HTTP Service for the Pushdown Optimizer
//!
//! This binary exposes the physical-plan rewriter as a network service. The query
//! planner posts the plan it compiled and receives the plan with range, filter and
//! tag queries pushed into storage reads.
//!
//! ## Architecture
//!
//! ```text
//! Query planner
//!   |
//!   | HTTP POST /optimize (JSON node list)
//!   v
//! fluxopt-server (this binary)
//!   |
//!   +-> PlanGraph::try_from_nodes (validate ids, edges, arities, acyclicity)
//!   +-> Rewriter::optimize (storage rules to a fixed point)
//!   |
//!   | HTTP response (optimized node list + explain)
//!   v
//! Query planner
//! ```
//!
//! ## Endpoints
//!
//! - `GET  /health`   - Health check
//! - `GET  /rules`    - List registered rules and their patterns
//! - `POST /optimize` - Optimize a JSON plan
//!
//! ## Configuration
//!
//! The server listens on `0.0.0.0:3000` unless `FLUXOPT_LISTEN_ADDR` says otherwise;
//! `FLUXOPT_MAX_REWRITES` sets the per-request rewrite budget. Logging is controlled
//! by the `RUST_LOG` environment variable (defaults to `fluxopt=debug`).

mod routes;
mod state;

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("fluxopt=debug".parse()?))
        .init();

    let config = state::ServerConfig::from_env()?;
    let listen_addr = config.listen_addr.clone();
    let state = Arc::new(state::AppState::new(config));

    let app = Router::new()
        .route("/health", get(routes::health))
        .route("/rules", get(routes::list_rules))
        .route("/optimize", post(routes::optimize))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    tracing::info!("fluxopt-server listening on http://{}", listen_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
