//! Wire models of the administrative API.
//!
//! Request bodies reuse the domain inputs:
//! - `POST /exporters` takes an [`ExporterConfiguration`](crate::models::ExporterConfiguration)
//!   (`{"driver": "http", "config": {"url": "...", "batching": {"maxItems": 100}}}`)
//! - `POST /pipelines` takes a [`PipelineConfiguration`](crate::models::PipelineConfiguration)
//!   (`{"ledger": "orders", "exporter_id": "..."}`)
//! - `POST /ledgers/{name}/logs` takes a list of [`AppendLogRequest`]
//!
//! Collections are wrapped in [`ListResponse`], errors in [`ErrorResponse`].

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListResponse<T> {
    pub data: Vec<T>,
}

impl<T> From<Vec<T>> for ListResponse<T> {
    fn from(data: Vec<T>) -> Self {
        Self { data }
    }
}

/// One entry of `POST /ledgers/{name}/logs`; the ledger assigns the id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendLogRequest {
    #[serde(rename = "type")]
    pub log_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}
