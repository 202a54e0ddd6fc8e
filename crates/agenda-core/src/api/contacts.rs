//! Contact methods on AgendaApi.

use crate::error::{AgendaError, Result};
use crate::models::{Contact, ContactPage};
use crate::AgendaApi;

impl AgendaApi {
    // ========================================
    // Single contacts (cache-aside)
    // ========================================

    /// Get one contact, served from cache when fresh.
    pub async fn get_contact(&self, id: i64) -> Result<Contact> {
        self.inner.accessor.get(id).await
    }

    pub async fn create_contact(&self, contact: Contact) -> Result<Contact> {
        self.inner.accessor.create(contact).await
    }

    /// Replace the contact stored under `id`.
    ///
    /// Ids are immutable: `contact.id` must equal `id`. The original
    /// creation time is kept.
    pub async fn update_contact(&self, id: i64, mut contact: Contact) -> Result<Contact> {
        if contact.id != id {
            return Err(AgendaError::validation(
                "id",
                format!("body id {} does not match {}", contact.id, id),
            ));
        }
        let existing = self.inner.accessor.get(id).await?;
        contact.created_at = existing.created_at;
        self.inner.accessor.update(contact).await
    }

    pub async fn delete_contact(&self, id: i64) -> Result<()> {
        self.inner.accessor.delete(id).await
    }

    /// Drop the cached copy of a contact. Returns whether one was cached.
    pub fn invalidate_contact(&self, id: i64) -> bool {
        self.inner.accessor.invalidate(id)
    }

    /// Contacts currently in the store.
    pub async fn list_stored_contacts(&self) -> Result<Vec<Contact>> {
        self.inner.accessor.list().await
    }

    // ========================================
    // Upstream synchronization
    // ========================================

    /// Every upstream contact, falling back to the stored snapshot.
    pub async fn get_all_contacts(&self) -> Result<Vec<Contact>> {
        self.inner.service.get_all_contacts().await
    }

    /// One upstream page through the resilient client.
    pub async fn get_contacts_page(
        &self,
        page: Option<u64>,
        page_size: Option<u64>,
    ) -> Result<ContactPage> {
        self.inner.client.get_contacts(page, page_size).await
    }
}
