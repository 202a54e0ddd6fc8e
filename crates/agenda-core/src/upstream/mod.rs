//! Upstream contacts API access.
//!
//! - `ContactSource`: paged fetch abstraction, `HttpContactSource` over reqwest
//! - `ResilientContactClient`: page cache, retry, circuit breaking and store fallback

mod client;
mod source;

pub use client::{ClientStats, ResilientContactClient};
pub use source::{ContactSource, HttpContactSource};
