//! Persistence of the state an upgrader has reached.
//!
//! One record per upgrader key, holding the last state the plan reached.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use rkyv::{Archive, Deserialize, Serialize};

use super::error::MigrationError;
use crate::error::Error;

/// Microseconds since the Unix epoch.
pub(crate) fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// The state an upgrader's plan has reached.
#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub struct UpgradeState {
    /// Name of the plan.
    pub plan: String,
    /// Last state reached.
    pub state: String,
    /// Fingerprint of the plan that reached it.
    pub fingerprint: String,
    /// When the record was written (microseconds since epoch).
    pub updated_at: u64,
}

impl UpgradeState {
    /// Create a record stamped with the current time.
    pub fn new(
        plan: impl Into<String>,
        state: impl Into<String>,
        fingerprint: impl Into<String>,
    ) -> Self {
        Self {
            plan: plan.into(),
            state: state.into(),
            fingerprint: fingerprint.into(),
            updated_at: current_timestamp(),
        }
    }

    /// Serialize the record to bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, MigrationError> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|v| v.to_vec())
            .map_err(|e| Error::Serialization(e.to_string()).into())
    }

    /// Deserialize a record from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MigrationError> {
        rkyv::from_bytes::<Self, rkyv::rancor::Error>(bytes)
            .map_err(|e| Error::Deserialization(e.to_string()).into())
    }
}

/// Key-value store for upgrade states.
pub trait StateStore {
    /// Load the record under `key`.
    fn get(&self, key: &str) -> Result<Option<UpgradeState>, MigrationError>;

    /// Store the record under `key`, replacing any previous one.
    fn set(&self, key: &str, state: &UpgradeState) -> Result<(), MigrationError>;

    /// Remove the record under `key`.
    fn remove(&self, key: &str) -> Result<(), MigrationError>;

    /// All records, by key.
    fn list(&self) -> Result<Vec<(String, UpgradeState)>, MigrationError>;
}

/// Upgrade states kept in a sled tree.
pub struct SledStateStore {
    tree: sled::Tree,
}

impl SledStateStore {
    /// Tree name for upgrade states.
    pub const TREE_NAME: &'static str = "migraph:upgrader";

    /// Open or create the state tree.
    pub fn open(db: &sled::Db) -> Result<Self, MigrationError> {
        let tree = db.open_tree(Self::TREE_NAME).map_err(Error::from)?;
        Ok(Self { tree })
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<(), MigrationError> {
        self.tree.flush().map_err(Error::from)?;
        Ok(())
    }
}

impl StateStore for SledStateStore {
    fn get(&self, key: &str) -> Result<Option<UpgradeState>, MigrationError> {
        match self.tree.get(key.as_bytes()).map_err(Error::from)? {
            Some(bytes) => Ok(Some(UpgradeState::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, state: &UpgradeState) -> Result<(), MigrationError> {
        let value = state.to_bytes()?;
        self.tree.insert(key.as_bytes(), value).map_err(Error::from)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), MigrationError> {
        self.tree.remove(key.as_bytes()).map_err(Error::from)?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<(String, UpgradeState)>, MigrationError> {
        let mut states = Vec::new();
        for result in self.tree.iter() {
            let (key, value) = result.map_err(Error::from)?;
            let key = String::from_utf8_lossy(&key).into_owned();
            states.push((key, UpgradeState::from_bytes(&value)?));
        }
        Ok(states)
    }
}

/// Upgrade states kept in memory.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    entries: RwLock<BTreeMap<String, UpgradeState>>,
}

impl MemoryStateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn get(&self, key: &str) -> Result<Option<UpgradeState>, MigrationError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, state: &UpgradeState) -> Result<(), MigrationError> {
        self.entries.write().insert(key.to_string(), state.clone());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), MigrationError> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn list(&self) -> Result<Vec<(String, UpgradeState)>, MigrationError> {
        Ok(self
            .entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}
