//! Interface to an application-provided key/value store.
//!
//! The engine never persists anything itself. When a [`Storage`] is attached
//! to a [`Connection`](crate::connection::Connection), the connection
//! records a few session facts through it and calls [`Storage::save`] when
//! the session ends. Delegates reach the same store through
//! [`Connection::storage_mut`](crate::connection::Connection::storage_mut),
//! e.g. to keep a roster version.

use std::collections::BTreeMap;
use std::fmt;

/// Key of the last JID the server bound for this account.
pub const BOUND_JID_KEY: &str = "session.bound_jid";

/// A value in the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageValue {
    /// Text
    String(String),
    /// Flag
    Bool(bool),
    /// Signed integer
    Integer(i64),
    /// Ordered list
    Array(Vec<StorageValue>),
    /// Nested mapping
    Dictionary(BTreeMap<String, StorageValue>),
}

/// Failure to persist the store.
#[derive(Debug)]
pub struct StorageError(pub String);

impl fmt::Display for StorageError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "storage error: {}", self.0)
    }
}

impl std::error::Error for StorageError {}

/// Key-path addressed storage. Key paths are dot separated.
pub trait Storage: Send {
    /// The value at `key_path`.
    fn get(&self, key_path: &str) -> Option<StorageValue>;

    /// Replace the value at `key_path`; `None` removes it.
    fn set(&mut self, key_path: &str, value: Option<StorageValue>);

    /// Persist all changes.
    fn save(&mut self) -> Result<(), StorageError>;

    /// The string at `key_path`.
    fn string(&self, key_path: &str) -> Option<String> {
        match self.get(key_path)? {
            StorageValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// The boolean at `key_path`.
    fn bool(&self, key_path: &str) -> Option<bool> {
        match self.get(key_path)? {
            StorageValue::Bool(b) => Some(b),
            _ => None,
        }
    }

    /// The integer at `key_path`.
    fn integer(&self, key_path: &str) -> Option<i64> {
        match self.get(key_path)? {
            StorageValue::Integer(i) => Some(i),
            _ => None,
        }
    }

    /// The array at `key_path`.
    fn array(&self, key_path: &str) -> Option<Vec<StorageValue>> {
        match self.get(key_path)? {
            StorageValue::Array(a) => Some(a),
            _ => None,
        }
    }

    /// The dictionary at `key_path`.
    fn dictionary(&self, key_path: &str) -> Option<BTreeMap<String, StorageValue>> {
        match self.get(key_path)? {
            StorageValue::Dictionary(d) => Some(d),
            _ => None,
        }
    }

    /// Store a string.
    fn set_string(&mut self, key_path: &str, value: &str) {
        self.set(key_path, Some(StorageValue::String(value.to_owned())));
    }

    /// Store a boolean.
    fn set_bool(&mut self, key_path: &str, value: bool) {
        self.set(key_path, Some(StorageValue::Bool(value)));
    }

    /// Store an integer.
    fn set_integer(&mut self, key_path: &str, value: i64) {
        self.set(key_path, Some(StorageValue::Integer(value)));
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Flat in-memory store counting saves.
    #[derive(Default)]
    pub(crate) struct MemoryStorage {
        pub values: BTreeMap<String, StorageValue>,
        pub saves: usize,
    }

    impl Storage for MemoryStorage {
        fn get(&self, key_path: &str) -> Option<StorageValue> {
            self.values.get(key_path).cloned()
        }

        fn set(&mut self, key_path: &str, value: Option<StorageValue>) {
            match value {
                Some(value) => self.values.insert(key_path.to_owned(), value),
                None => self.values.remove(key_path),
            };
        }

        fn save(&mut self) -> Result<(), StorageError> {
            self.saves += 1;
            Ok(())
        }
    }

    #[test]
    fn typed_accessors() {
        let mut storage = MemoryStorage::default();
        storage.set_string("roster.ver", "v42");
        storage.set_bool("sm.enabled", true);
        storage.set_integer("sm.h", 7);
        assert_eq!(storage.string("roster.ver").as_deref(), Some("v42"));
        assert_eq!(storage.bool("sm.enabled"), Some(true));
        assert_eq!(storage.integer("sm.h"), Some(7));
        assert_eq!(storage.integer("roster.ver"), None);
        storage.set("sm.h", None);
        assert_eq!(storage.get("sm.h"), None);
    }
}
