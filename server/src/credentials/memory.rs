use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{CredentialError, CredentialStore, UserRecord};

/// In-memory credential store for tests and throwaway servers.
///
/// Users are lost when the process exits.
#[derive(Clone, Default)]
pub struct MemoryCredentialStore {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Default)]
struct MemoryInner {
    users: HashMap<String, UserRecord>,
    last_id: u64,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered users.
    pub fn user_count(&self) -> Result<usize, CredentialError> {
        Ok(self.lock()?.users.len())
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryInner>, CredentialError> {
        self.inner
            .lock()
            .map_err(|_| CredentialError::Unavailable("credential mutex poisoned".to_string()))
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        now_secs: u64,
    ) -> Result<UserRecord, CredentialError> {
        let mut inner = self.lock()?;
        if inner.users.contains_key(username) {
            return Err(CredentialError::UsernameTaken);
        }

        inner.last_id += 1;
        let record = UserRecord {
            id: inner.last_id,
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            created_at_secs: now_secs,
            last_login_secs: None,
        };
        inner.users.insert(username.to_string(), record.clone());
        Ok(record)
    }

    fn find_user(&self, username: &str) -> Result<Option<UserRecord>, CredentialError> {
        Ok(self.lock()?.users.get(username).cloned())
    }

    fn record_login(&self, username: &str, now_secs: u64) -> Result<(), CredentialError> {
        let mut inner = self.lock()?;
        let record = inner
            .users
            .get_mut(username)
            .ok_or_else(|| CredentialError::UnknownUser(username.to_string()))?;
        record.last_login_secs = Some(now_secs);
        Ok(())
    }
}
