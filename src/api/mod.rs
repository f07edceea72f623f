//! Administrative HTTP API exposing the replication manager
//!
//! Domain errors map to status codes: not-found -> 404, already started /
//! not started -> 409, invalid configuration -> 400.

mod error;
pub mod models;
mod server;
pub mod services;
pub mod state;

pub use error::ApiError;
pub use server::router;
pub use state::AppState;
