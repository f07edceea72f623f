use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use super::{services, state::AppState};

/// Administrative router over the replication manager
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/exporters",
            post(services::create_exporter).get(services::list_exporters),
        )
        .route(
            "/exporters/{id}",
            get(services::get_exporter)
                .put(services::update_exporter)
                .delete(services::delete_exporter),
        )
        .route(
            "/pipelines",
            post(services::create_pipeline).get(services::list_pipelines),
        )
        .route(
            "/pipelines/{id}",
            get(services::get_pipeline).delete(services::delete_pipeline),
        )
        .route("/pipelines/{id}/start", post(services::start_pipeline))
        .route("/pipelines/{id}/stop", post(services::stop_pipeline))
        .route("/pipelines/{id}/reset", post(services::reset_pipeline))
        .route("/ledgers", get(services::list_ledgers))
        .route("/ledgers/{name}", get(services::get_ledger))
        .route("/ledgers/{name}/logs", post(services::append_logs))
        .route("/metrics", get(services::metrics))
        .route("/health", get(services::health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
