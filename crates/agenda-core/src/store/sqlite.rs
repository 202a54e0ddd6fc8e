//! SQLite-backed contact repository.
//!
//! Contacts are stored as JSON documents keyed by id. Every call runs on the
//! blocking pool so the async executor is never held by SQLite I/O.

use super::traits::ContactRepository;
use crate::error::{AgendaError, Result};
use crate::models::{Contact, StoredContact};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Contact repository persisted in a SQLite file.
#[derive(Clone)]
pub struct SqliteContactStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteContactStore {
    /// Open (or create) the store at `db_path`.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AgendaError::io_with_path(e, parent))?;
        }

        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        let store = Self::from_connection(conn)?;

        info!("Opened contact store at {}", db_path.display());
        Ok(store)
    }

    /// Throwaway in-memory store.
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS contacts (
                id INTEGER PRIMARY KEY,
                document TEXT NOT NULL,
                synced_at TEXT NOT NULL
            );
            "#,
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|e| AgendaError::store(format!("Failed to lock contact store: {}", e)))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| AgendaError::store(format!("Contact store task failed: {}", e)))?
    }
}

fn encode(stored: &StoredContact) -> Result<String> {
    Ok(serde_json::to_string(stored)?)
}

fn decode(document: &str) -> Result<Contact> {
    let stored: StoredContact = serde_json::from_str(document)?;
    Ok(stored.into_contact())
}

fn exists(conn: &Connection, id: i64) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row("SELECT id FROM contacts WHERE id = ?", params![id], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(found.is_some())
}

fn write(conn: &Connection, contact: &Contact) -> Result<()> {
    let stored = StoredContact::from_contact(contact.clone());
    conn.execute(
        "INSERT OR REPLACE INTO contacts (id, document, synced_at) VALUES (?, ?, ?)",
        params![contact.id, encode(&stored)?, stored.synced_at.to_rfc3339()],
    )?;
    Ok(())
}

#[async_trait]
impl ContactRepository for SqliteContactStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn create(&self, contact: Contact) -> Result<Contact> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            if exists(&tx, contact.id)? {
                return Err(AgendaError::Conflict { id: contact.id });
            }
            write(&tx, &contact)?;
            tx.commit()?;
            debug!("Created contact {}", contact.id);
            Ok(contact)
        })
        .await
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Contact>> {
        self.with_conn(move |conn| {
            let document: Option<String> = conn
                .query_row(
                    "SELECT document FROM contacts WHERE id = ?",
                    params![id],
                    |row| row.get(0),
                )
                .optional()?;
            document.as_deref().map(decode).transpose()
        })
        .await
    }

    async fn update(&self, contact: Contact) -> Result<Contact> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            if !exists(&tx, contact.id)? {
                return Err(AgendaError::NotFound { id: contact.id });
            }
            write(&tx, &contact)?;
            tx.commit()?;
            debug!("Updated contact {}", contact.id);
            Ok(contact)
        })
        .await
    }

    async fn delete(&self, id: i64) -> Result<()> {
        self.with_conn(move |conn| {
            let removed = conn.execute("DELETE FROM contacts WHERE id = ?", params![id])?;
            if removed == 0 {
                return Err(AgendaError::NotFound { id });
            }
            debug!("Deleted contact {}", id);
            Ok(())
        })
        .await
    }

    async fn list(&self) -> Result<Vec<Contact>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT document FROM contacts ORDER BY id")?;
            let documents = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            documents.iter().map(|d| decode(d)).collect()
        })
        .await
    }

    async fn save_all(&self, contacts: Vec<Contact>) -> Result<Vec<Contact>> {
        if contacts.is_empty() {
            return Ok(contacts);
        }

        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            for contact in &contacts {
                write(&tx, contact)?;
            }
            tx.commit()?;
            info!("Saved {} contacts to store", contacts.len());
            Ok(contacts)
        })
        .await
    }

    async fn count(&self) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM contacts", [], |row| row.get(0))?;
            Ok(count as u64)
        })
        .await
    }
}
