//! Durable client-local storage and the session store built on it.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

use super::error::ChatResult;
use super::types::SessionId;

/// Client-local key/value storage that survives reloads.
///
/// The widget assumes it is the only writer of its key.
pub trait KeyValueStorage {
    /// Read a value.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn get_item(&self, key: &str) -> ChatResult<Option<String>>;

    /// Write a value, replacing any previous one.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn set_item(&self, key: &str, value: &str) -> ChatResult<()>;

    /// Remove a key entirely.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn remove_item(&self, key: &str) -> ChatResult<()>;
}

/// In-process storage, lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: RefCell<HashMap<String, String>>,
}

impl MemoryStorage {
    /// Create empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a key is present at all.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.items.borrow().contains_key(key)
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> ChatResult<Option<String>> {
        Ok(self.items.borrow().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> ChatResult<()> {
        self.items
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> ChatResult<()> {
        self.items.borrow_mut().remove(key);
        Ok(())
    }
}

/// `SQLite`-backed storage for hosts that need the session to survive restarts.
pub struct SqliteStorage {
    conn: Connection,
    table: String,
}

impl SqliteStorage {
    /// Table name for stored items.
    pub const DEFAULT_TABLE: &'static str = "kv_store";

    /// Open (or create) the database file and its table.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> ChatResult<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    /// Returns an error if the database cannot be created.
    pub fn open_in_memory() -> ChatResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> ChatResult<Self> {
        let table = Self::DEFAULT_TABLE.to_string();
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );"
        ))?;
        Ok(Self { conn, table })
    }
}

impl KeyValueStorage for SqliteStorage {
    fn get_item(&self, key: &str) -> ChatResult<Option<String>> {
        let table = &self.table;
        let value = self
            .conn
            .query_row(
                &format!("SELECT value FROM {table} WHERE key = ?1"),
                rusqlite::params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_item(&self, key: &str, value: &str) -> ChatResult<()> {
        let table = &self.table;
        self.conn.execute(
            &format!(
                "INSERT INTO {table} (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value"
            ),
            rusqlite::params![key, value],
        )?;
        Ok(())
    }

    fn remove_item(&self, key: &str) -> ChatResult<()> {
        let table = &self.table;
        self.conn.execute(
            &format!("DELETE FROM {table} WHERE key = ?1"),
            rusqlite::params![key],
        )?;
        Ok(())
    }
}

/// Owner of the single session identifier.
///
/// Holds at most one identifier; `set` unconditionally replaces it and
/// `clear` deletes the key so a later `get` sees nothing.
pub struct SessionStore {
    storage: Rc<dyn KeyValueStorage>,
    key: String,
}

impl SessionStore {
    /// Create a store over `storage` using the namespace `key`.
    #[must_use]
    pub fn new(storage: Rc<dyn KeyValueStorage>, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
        }
    }

    /// Current session identifier, if any.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub fn get(&self) -> ChatResult<Option<SessionId>> {
        Ok(self.storage.get_item(&self.key)?.map(SessionId::new))
    }

    /// Replace the stored identifier.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub fn set(&self, id: &SessionId) -> ChatResult<()> {
        debug!("Persisting chat session id");
        self.storage.set_item(&self.key, id.as_str())
    }

    /// Remove the stored identifier.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub fn clear(&self) -> ChatResult<()> {
        debug!("Clearing chat session id");
        self.storage.remove_item(&self.key)
    }
}
