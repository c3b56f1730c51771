//! Axum HTTP API server.
//!
//! Accepts video and image uploads, runs them through the prediction
//! pipeline, and serves the uploaded media back to the client.

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
