#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

//! # Recall Server
//!
//! Thin HTTP surface over the recall core: `POST /ingest` enqueues, the
//! `/ingest/logs` routes read job state, and `/spaces` exposes the topic
//! space service. Everything heavier happens in per-user queue workers.

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use recall_core::graph::JobStore;
use recall_core::queue::IngestQueue;
use recall_core::spaces::SpaceService;

mod auth;
mod error;
mod routes;

pub use auth::AuthContext;
pub use error::ApiError;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<IngestQueue>,
    pub jobs: Arc<dyn JobStore>,
    pub spaces: Arc<SpaceService>,
}

/// Build the full router.
///
/// CORS is permissive on the ingest routes only; integrations post from
/// anywhere, the rest of the surface stays same-origin.
pub fn router(state: AppState) -> Router {
    let ingest = Router::new()
        .route("/ingest", post(routes::ingest::submit))
        .route("/ingest/logs", get(routes::ingest::list_logs))
        .route("/ingest/logs/{id}", get(routes::ingest::get_log))
        .layer(CorsLayer::permissive());

    let spaces = Router::new()
        .route(
            "/spaces",
            get(routes::spaces::list).post(routes::spaces::create),
        )
        .route(
            "/spaces/{id}",
            get(routes::spaces::get)
                .patch(routes::spaces::update)
                .delete(routes::spaces::delete),
        )
        .route(
            "/spaces/{id}/statements",
            get(routes::spaces::list_statements)
                .post(routes::spaces::assign_statements)
                .delete(routes::spaces::remove_statements),
        );

    Router::new().merge(ingest).merge(spaces).with_state(state)
}
