//! Contact entity and its stored document form.

use crate::error::{AgendaError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

fn now() -> DateTime<Utc> {
    Utc::now()
}

/// A contact as served to callers and received from the upstream API.
///
/// The id is assigned by the upstream and never changes after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default = "now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "now")]
    pub updated_at: DateTime<Utc>,
}

impl Contact {
    /// Create a contact with both timestamps set to now.
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        let ts = now();
        Self {
            id,
            name: name.into(),
            email: None,
            phone: None,
            source: None,
            created_at: ts,
            updated_at: ts,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Check the invariants a contact must satisfy before it is stored.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AgendaError::validation("name", "must not be empty"));
        }

        let email = self.email.as_deref().filter(|e| !e.trim().is_empty());
        let phone = self.phone.as_deref().filter(|p| !p.trim().is_empty());

        if email.is_none() && phone.is_none() {
            return Err(AgendaError::validation(
                "email",
                "at least one contact method (email or phone) is required",
            ));
        }

        if let Some(email) = email {
            match email.split_once('@') {
                Some((local, domain)) if !local.is_empty() && domain.contains('.') => {}
                _ => {
                    return Err(AgendaError::validation(
                        "email",
                        format!("not a valid address: {}", email),
                    ))
                }
            }
        }

        if let Some(phone) = phone {
            let digits = phone.chars().filter(|c| c.is_ascii_digit()).count();
            let allowed = phone
                .chars()
                .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')' | '.'));
            if digits < 3 || !allowed {
                return Err(AgendaError::validation(
                    "phone",
                    format!("not a valid number: {}", phone),
                ));
            }
        }

        Ok(())
    }

    /// Mark the contact as modified.
    pub fn touch(&mut self) {
        self.updated_at = now();
    }
}

/// Repository document: a contact plus the time it was last synchronized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredContact {
    #[serde(flatten)]
    pub contact: Contact,
    pub synced_at: DateTime<Utc>,
}

impl StoredContact {
    /// Wrap a contact for storage, stamping `synced_at` with the current time.
    pub fn from_contact(contact: Contact) -> Self {
        Self {
            contact,
            synced_at: now(),
        }
    }

    pub fn into_contact(self) -> Contact {
        self.contact
    }
}

impl From<Contact> for StoredContact {
    fn from(contact: Contact) -> Self {
        StoredContact::from_contact(contact)
    }
}

impl From<StoredContact> for Contact {
    fn from(stored: StoredContact) -> Self {
        stored.into_contact()
    }
}
