//! A page of contacts as returned by the upstream API.

use super::Contact;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Header carrying the total number of contacts available upstream.
pub const TOTAL_COUNT_HEADER: &str = "total-count";

/// Header marking a page served from the fallback store.
pub const FALLBACK_HEADER: &str = "x-fallback";

/// Contacts plus the response headers that came with them.
///
/// Header names are stored lower-cased, keeping the first value of each.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContactPage {
    pub contacts: Vec<Contact>,
    pub headers: HashMap<String, String>,
}

impl ContactPage {
    /// Build a page from contacts and raw `(name, value)` header pairs.
    pub fn from_parts<I, K, V>(contacts: Vec<Contact>, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut map = HashMap::new();
        for (name, value) in headers {
            map.entry(name.as_ref().to_lowercase())
                .or_insert_with(|| value.into());
        }
        Self {
            contacts,
            headers: map,
        }
    }

    /// A page served from the fallback store.
    pub fn fallback(contacts: Vec<Contact>) -> Self {
        Self::from_parts(contacts, [(FALLBACK_HEADER, "true")])
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    /// Whether this page came from the fallback store instead of the upstream.
    pub fn is_fallback(&self) -> bool {
        self.header(FALLBACK_HEADER) == Some("true")
    }

    /// Total contacts reported by the upstream.
    ///
    /// Falls back to the size of this page when the header is absent or
    /// unparseable.
    pub fn total_count(&self) -> u64 {
        self.header(TOTAL_COUNT_HEADER)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(self.contacts.len() as u64)
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }
}
