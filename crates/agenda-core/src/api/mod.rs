//! API implementation submodules.
//!
//! Each submodule contains `impl AgendaApi` blocks that extend the public API
//! with domain-specific methods. The struct definition remains in `lib.rs`.

mod builder;
mod contacts;
mod state;
mod status;

pub use builder::{AgendaApiBuilder, STORE_CIRCUIT, UPSTREAM_CIRCUIT};
pub(crate) use state::ApiState;
