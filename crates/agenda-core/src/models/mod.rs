//! Data models for contacts, upstream pages and status reports.

mod contact;
mod page;
mod status;

pub use contact::{Contact, StoredContact};
pub use page::{ContactPage, FALLBACK_HEADER, TOTAL_COUNT_HEADER};
pub use status::AgendaStatus;
