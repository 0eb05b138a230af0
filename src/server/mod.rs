//! HTTP surface over the request router.
//!
//! # Endpoints
//!
//! - `GET  /health`   - Liveness probe
//! - `GET  /state`    - Router state
//! - `POST /discover`, `/execute`, `/reset` - The three router entry points
//! - `POST /chat`     - The root assistant

pub mod routes;

pub use routes::{app_router, AppState};
