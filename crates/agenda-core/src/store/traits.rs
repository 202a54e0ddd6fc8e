//! Contact repository trait.

use crate::error::Result;
use crate::models::Contact;
use async_trait::async_trait;

/// Durable source of truth for contacts.
///
/// Implementations report a missing contact on `update`/`delete` as
/// `NotFound`, a duplicate id on `create` as `Conflict`, and any failure of
/// the underlying store as `StoreUnavailable`.
#[async_trait]
pub trait ContactRepository: Send + Sync {
    /// Short backend name used in logs and status output.
    fn name(&self) -> &'static str;

    /// Insert a new contact. Fails with `Conflict` if the id is taken.
    async fn create(&self, contact: Contact) -> Result<Contact>;

    /// Look up a contact by id. Absence is `Ok(None)`, not an error.
    async fn find_by_id(&self, id: i64) -> Result<Option<Contact>>;

    /// Replace an existing contact. Fails with `NotFound` if absent.
    async fn update(&self, contact: Contact) -> Result<Contact>;

    /// Remove a contact. Fails with `NotFound` if absent.
    async fn delete(&self, id: i64) -> Result<()>;

    /// All contacts ordered by id.
    async fn list(&self) -> Result<Vec<Contact>>;

    /// Upsert a batch of contacts, stamping each with a fresh sync time.
    ///
    /// An empty batch is a no-op. Returns the saved contacts.
    async fn save_all(&self, contacts: Vec<Contact>) -> Result<Vec<Contact>>;

    /// Number of stored contacts.
    async fn count(&self) -> Result<u64>;
}
