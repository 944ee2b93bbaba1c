//! Redb-backed credential store.
//!
//! Each write runs in its own ACID transaction, so the existence check and
//! insert in `create_user` cannot interleave with another registration.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableTable, TableDefinition};

use super::{CredentialError, CredentialStore, UserRecord};

/// Table: users
/// Key: username
/// Value: bincode-encoded UserRecord
const USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("users");

/// Table: meta
/// Key: counter name
/// Value: counter value
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const LAST_USER_ID: &str = "last_user_id";

#[derive(Clone)]
pub struct RedbCredentialStore {
    db: Arc<Database>,
}

impl RedbCredentialStore {
    /// Opens or creates the database file, creating its tables.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CredentialError> {
        let db = Database::create(path.as_ref()).map_err(storage)?;

        let txn = db.begin_write().map_err(storage)?;
        {
            let _ = txn.open_table(USERS).map_err(storage)?;
            let _ = txn.open_table(META).map_err(storage)?;
        }
        txn.commit().map_err(storage)?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl CredentialStore for RedbCredentialStore {
    fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        now_secs: u64,
    ) -> Result<UserRecord, CredentialError> {
        let txn = self.db.begin_write().map_err(storage)?;

        let record = {
            let mut users = txn.open_table(USERS).map_err(storage)?;
            let exists = users.get(username).map_err(storage)?.is_some();
            if exists {
                return Err(CredentialError::UsernameTaken);
            }

            let mut meta = txn.open_table(META).map_err(storage)?;
            let last_id = meta
                .get(LAST_USER_ID)
                .map_err(storage)?
                .map(|value| value.value())
                .unwrap_or(0);
            let id = last_id + 1;
            meta.insert(LAST_USER_ID, id).map_err(storage)?;

            let record = UserRecord {
                id,
                username: username.to_string(),
                password_hash: password_hash.to_string(),
                created_at_secs: now_secs,
                last_login_secs: None,
            };
            let bytes = bincode::serialize(&record).map_err(storage)?;
            users.insert(username, bytes.as_slice()).map_err(storage)?;
            record
        };

        txn.commit().map_err(storage)?;
        Ok(record)
    }

    fn find_user(&self, username: &str) -> Result<Option<UserRecord>, CredentialError> {
        let txn = self.db.begin_read().map_err(storage)?;
        let users = txn.open_table(USERS).map_err(storage)?;

        let Some(value) = users.get(username).map_err(storage)? else {
            return Ok(None);
        };
        let record = bincode::deserialize(value.value()).map_err(storage)?;
        Ok(Some(record))
    }

    fn record_login(&self, username: &str, now_secs: u64) -> Result<(), CredentialError> {
        let txn = self.db.begin_write().map_err(storage)?;
        {
            let mut users = txn.open_table(USERS).map_err(storage)?;
            let existing = users
                .get(username)
                .map_err(storage)?
                .map(|value| value.value().to_vec());
            let bytes = existing.ok_or_else(|| CredentialError::UnknownUser(username.to_string()))?;

            let mut record: UserRecord = bincode::deserialize(&bytes).map_err(storage)?;
            record.last_login_secs = Some(now_secs);
            let bytes = bincode::serialize(&record).map_err(storage)?;
            users.insert(username, bytes.as_slice()).map_err(storage)?;
        }
        txn.commit().map_err(storage)?;
        Ok(())
    }
}

fn storage(e: impl std::fmt::Display) -> CredentialError {
    CredentialError::Storage(e.to_string())
}
