//! In-memory user directory.
//!
//! Registration is name-keyed and names are unique. Nothing survives a
//! restart: message history and accounts are session-scoped by design in
//! this deployment.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UserStoreError {
    #[error("Username must not be empty")]
    EmptyName,

    #[error("Username already taken: {0}")]
    NameTaken(String),
}

#[derive(Clone, Default)]
pub struct UserStore {
    inner: Arc<Mutex<HashMap<Uuid, UserRecord>>>,
}

impl UserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: &str) -> Result<UserRecord, UserStoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(UserStoreError::EmptyName);
        }

        let mut users = self.lock();
        if users.values().any(|u| u.name == name) {
            return Err(UserStoreError::NameTaken(name.to_string()));
        }

        let record = UserRecord {
            id: Uuid::new_v4(),
            name: name.to_string(),
        };
        users.insert(record.id, record.clone());
        Ok(record)
    }

    pub fn by_name(&self, name: &str) -> Option<UserRecord> {
        let name = name.trim();
        self.lock().values().find(|u| u.name == name).cloned()
    }

    pub fn by_id(&self, id: Uuid) -> Option<UserRecord> {
        self.lock().get(&id).cloned()
    }

    /// All users, sorted by name for stable listings.
    pub fn list(&self) -> Vec<UserRecord> {
        let mut users: Vec<UserRecord> = self.lock().values().cloned().collect();
        users.sort_by(|a, b| a.name.cmp(&b.name));
        users
    }

    pub fn delete(&self, id: Uuid) -> bool {
        self.lock().remove(&id).is_some()
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, UserRecord>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
