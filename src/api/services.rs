use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use super::{
    error::ApiError,
    models::{AppendLogRequest, ListResponse},
    state::AppState,
};
use crate::models::{ExporterConfiguration, PipelineConfiguration};

/// Create an exporter (POST /exporters)
///
/// The configuration is validated against the driver before it is stored.
pub async fn create_exporter(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let configuration: ExporterConfiguration = serde_json::from_slice(&body)?;
    let exporter = state.manager.create_exporter(configuration).await?;
    Ok((StatusCode::CREATED, Json(exporter)))
}

pub async fn list_exporters(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let exporters = state.manager.list_exporters().await?;
    Ok(Json(ListResponse::from(exporters)))
}

pub async fn get_exporter(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.manager.get_exporter(&id).await?))
}

/// Replace an exporter's configuration (PUT /exporters/{id})
///
/// Pipelines using the exporter are restarted against the new configuration.
pub async fn update_exporter(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let configuration: ExporterConfiguration = serde_json::from_slice(&body)?;
    state.manager.update_exporter(&id, configuration).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_exporter(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.manager.delete_exporter(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Create a pipeline and start it (POST /pipelines)
pub async fn create_pipeline(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let configuration: PipelineConfiguration = serde_json::from_slice(&body)?;
    let pipeline = state.manager.create_pipeline(configuration).await?;
    Ok((StatusCode::CREATED, Json(pipeline)))
}

pub async fn list_pipelines(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let pipelines = state.manager.list_pipelines().await?;
    Ok(Json(ListResponse::from(pipelines)))
}

pub async fn get_pipeline(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.manager.get_pipeline(&id).await?))
}

pub async fn delete_pipeline(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.manager.delete_pipeline(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn start_pipeline(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.manager.start_pipeline(&id).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn stop_pipeline(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.manager.stop_pipeline(&id).await?;
    Ok(StatusCode::ACCEPTED)
}

/// Replay a pipeline from the beginning (POST /pipelines/{id}/reset)
pub async fn reset_pipeline(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.manager.reset_pipeline(&id).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn list_ledgers(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(ListResponse::from(state.store.list_ledgers()?)))
}

pub async fn get_ledger(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.store.get_ledger(&name)?))
}

/// Append logs to a ledger (POST /ledgers/{name}/logs)
///
/// The ledger is created on first append. Returns the stored logs with their ids.
pub async fn append_logs(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let entries: Vec<AppendLogRequest> = serde_json::from_slice(&body)?;

    state.store.create_ledger(&name)?;
    let logs = state.store.append_logs(
        &name,
        entries
            .into_iter()
            .map(|entry| (entry.log_type, entry.payload))
            .collect(),
    )?;

    Ok((StatusCode::CREATED, Json(ListResponse::from(logs))))
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
