//! In-process contact repository.

use super::traits::ContactRepository;
use crate::error::{AgendaError, Result};
use crate::models::{Contact, StoredContact};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// Contact repository held in memory.
///
/// Used for ephemeral runs and tests. `set_available(false)` makes every
/// call fail with `StoreUnavailable`, which lets callers exercise their
/// degraded paths.
#[derive(Default)]
pub struct MemoryContactStore {
    contacts: RwLock<BTreeMap<i64, StoredContact>>,
    unavailable: AtomicBool,
}

impl MemoryContactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle simulated store outages.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AgendaError::store("memory store marked unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl ContactRepository for MemoryContactStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn create(&self, contact: Contact) -> Result<Contact> {
        self.check()?;
        let mut contacts = self.contacts.write().await;
        if contacts.contains_key(&contact.id) {
            return Err(AgendaError::Conflict { id: contact.id });
        }
        contacts.insert(contact.id, StoredContact::from_contact(contact.clone()));
        Ok(contact)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Contact>> {
        self.check()?;
        let contacts = self.contacts.read().await;
        Ok(contacts.get(&id).map(|s| s.contact.clone()))
    }

    async fn update(&self, contact: Contact) -> Result<Contact> {
        self.check()?;
        let mut contacts = self.contacts.write().await;
        match contacts.get_mut(&contact.id) {
            Some(slot) => {
                *slot = StoredContact::from_contact(contact.clone());
                Ok(contact)
            }
            None => Err(AgendaError::NotFound { id: contact.id }),
        }
    }

    async fn delete(&self, id: i64) -> Result<()> {
        self.check()?;
        self.contacts
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(AgendaError::NotFound { id })
    }

    async fn list(&self) -> Result<Vec<Contact>> {
        self.check()?;
        let contacts = self.contacts.read().await;
        Ok(contacts.values().map(|s| s.contact.clone()).collect())
    }

    async fn save_all(&self, contacts: Vec<Contact>) -> Result<Vec<Contact>> {
        self.check()?;
        if contacts.is_empty() {
            return Ok(contacts);
        }
        let mut stored = self.contacts.write().await;
        for contact in &contacts {
            stored.insert(contact.id, StoredContact::from_contact(contact.clone()));
        }
        Ok(contacts)
    }

    async fn count(&self) -> Result<u64> {
        self.check()?;
        Ok(self.contacts.read().await.len() as u64)
    }
}
