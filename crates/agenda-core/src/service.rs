//! Contact synchronization service.
//!
//! `get_all_contacts` reads the full upstream dataset in at most two page
//! requests and stores the result as the fallback snapshot.

use crate::error::Result;
use crate::models::{Contact, ContactPage};
use crate::store::ContactRepository;
use crate::upstream::ResilientContactClient;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Anything that can hand out contact pages.
///
/// Implemented by [`ResilientContactClient`]; tests substitute scripted pages.
#[async_trait]
pub trait PageProvider: Send + Sync {
    async fn get_contacts(&self, page: Option<u64>, page_size: Option<u64>) -> Result<ContactPage>;
}

#[async_trait]
impl PageProvider for ResilientContactClient {
    async fn get_contacts(&self, page: Option<u64>, page_size: Option<u64>) -> Result<ContactPage> {
        ResilientContactClient::get_contacts(self, page, page_size).await
    }
}

pub struct ContactService {
    pages: Arc<dyn PageProvider>,
    repository: Arc<dyn ContactRepository>,
    default_page_size: u64,
}

impl ContactService {
    pub fn new(
        pages: Arc<dyn PageProvider>,
        repository: Arc<dyn ContactRepository>,
        default_page_size: u64,
    ) -> Self {
        Self {
            pages,
            repository,
            default_page_size: default_page_size.max(1),
        }
    }

    /// Fetch every upstream contact.
    ///
    /// The first page uses the default page size. When the upstream reports
    /// more contacts than that, a second request fetches the remainder. The
    /// combined list is saved as the new snapshot. Fallback pages are
    /// returned as they are, without another request or a save.
    pub async fn get_all_contacts(&self) -> Result<Vec<Contact>> {
        let first = self
            .pages
            .get_contacts(Some(1), Some(self.default_page_size))
            .await?;

        if first.is_fallback() {
            warn!("Using stored contacts since the upstream is unavailable");
            return Ok(first.contacts);
        }

        let total = first.total_count();
        if total <= self.default_page_size {
            debug!("Fetched all {} contacts in a single request", total);
            return self.save_contacts(first.contacts).await;
        }

        let remaining = total - self.default_page_size;
        debug!("Fetching remaining {} of {} contacts", remaining, total);
        let second = self.pages.get_contacts(Some(2), Some(remaining)).await?;

        if second.is_fallback() {
            warn!("Upstream failed mid-sync; using stored contacts");
            return Ok(second.contacts);
        }

        let mut contacts = first.contacts;
        contacts.extend(second.contacts);
        self.save_contacts(contacts).await
    }

    /// Persist a snapshot. An empty list is skipped.
    pub async fn save_contacts(&self, contacts: Vec<Contact>) -> Result<Vec<Contact>> {
        if contacts.is_empty() {
            debug!("No contacts to save");
            return Ok(contacts);
        }

        let saved = self.repository.save_all(contacts).await?;
        info!("Synchronized {} contacts", saved.len());
        Ok(saved)
    }
}
