//! HTTP surface for the contacts agenda.
//!
//! Routes:
//! - `GET /health`
//! - `GET /status`, `POST /status/reset`
//! - `GET /contacts` (full sync, or one page with `page`/`pageSize`)
//! - `POST /contacts`
//! - `GET|PUT|DELETE /contacts/:id`
//! - `POST /contacts/:id/invalidate`

pub mod handlers;
pub mod server;

pub use handlers::ErrorResponse;
pub use server::{build_router, start_server, AppState};
