//! Sled-backed user repository with optimistic concurrency.
//!
//! One key per user aggregate, CBOR-encoded inside a version-stamped
//! envelope. `update` is a compare-and-swap against the exact bytes a caller
//! previously read: any interleaved write makes the swap fail with
//! `StoreError::Conflict` instead of silently overwriting. Nothing here uses
//! multi-key transactions; a username index key is claimed with its own
//! single-key CAS.

use sled::Db;
use std::sync::Arc;

use crate::error::{EngineError, StoreError};
use crate::user::User;

const USERNAME_PREFIX: &str = "username!";

/// A value read from the store together with the version stamp it carried.
/// The stamp must be handed back to `update` unchanged.
#[derive(Debug, Clone)]
pub struct Versioned<T> {
    pub value: T,
    pub version: u64,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug)]
struct StoredUser {
    #[n(0)]
    version: u64,
    #[n(1)]
    user: User,
}

pub struct UserStore {
    db: Arc<Db>,
}

impl UserStore {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }

    fn encode(stored: &StoredUser) -> Result<Vec<u8>, StoreError> {
        minicbor::to_vec(stored).map_err(|e| StoreError::Codec {
            id: stored.user.id.clone(),
            reason: e.to_string(),
        })
    }

    fn decode(id: &str, bytes: &[u8]) -> Result<StoredUser, StoreError> {
        minicbor::decode(bytes).map_err(|e| StoreError::Codec {
            id: id.to_owned(),
            reason: e.to_string(),
        })
    }

    fn username_key(name: &str) -> String {
        format!("{USERNAME_PREFIX}{name}")
    }

    /// Registers a new user at version 1. The username index key is claimed
    /// first so concurrent registrations of the same name race to a single
    /// winner.
    pub fn insert(&self, user: &User) -> Result<(), StoreError> {
        let name_key = Self::username_key(&user.username);
        let claimed = self
            .db
            .compare_and_swap(name_key.as_bytes(), None::<&[u8]>, Some(user.id.as_bytes()))?;
        if claimed.is_err() {
            return Err(StoreError::AlreadyExists(user.username.clone()));
        }

        let stored = StoredUser {
            version: 1,
            user: user.clone(),
        };
        let encoded = Self::encode(&stored)?;
        match self
            .db
            .compare_and_swap(user.id.as_bytes(), None::<&[u8]>, Some(encoded))?
        {
            Ok(()) => Ok(()),
            Err(_) => {
                // release the username claim again, the id itself was taken
                let _ = self.db.compare_and_swap(
                    name_key.as_bytes(),
                    Some(user.id.as_bytes()),
                    None::<&[u8]>,
                );
                Err(StoreError::AlreadyExists(user.id.clone()))
            }
        }
    }

    pub fn get(&self, id: &str) -> Result<Versioned<User>, StoreError> {
        let bytes = self
            .db
            .get(id.as_bytes())?
            .ok_or_else(|| StoreError::NotFound(id.to_owned()))?;
        let stored = Self::decode(id, &bytes)?;

        Ok(Versioned {
            value: stored.user,
            version: stored.version,
        })
    }

    /// Fetch that reports a missing aggregate as the engine-level error.
    pub fn require(&self, id: &str) -> Result<Versioned<User>, EngineError> {
        self.get(id).map_err(|err| match err {
            StoreError::NotFound(id) => EngineError::UserNotFound(id),
            other => EngineError::Store(other),
        })
    }

    /// Persists the aggregate if, and only if, the stored version still
    /// matches `expected`. Returns the new version stamp.
    pub fn update(&self, user: &User, expected: u64) -> Result<u64, StoreError> {
        let key = user.id.as_bytes();
        let current = self
            .db
            .get(key)?
            .ok_or_else(|| StoreError::NotFound(user.id.clone()))?;
        let stored = Self::decode(&user.id, &current)?;
        if stored.version != expected {
            return Err(StoreError::Conflict {
                id: user.id.clone(),
                expected,
            });
        }

        let next = StoredUser {
            version: expected + 1,
            user: user.clone(),
        };
        let encoded = Self::encode(&next)?;
        match self.db.compare_and_swap(key, Some(current), Some(encoded))? {
            Ok(()) => Ok(expected + 1),
            // someone got in between our read and the swap
            Err(_) => Err(StoreError::Conflict {
                id: user.id.clone(),
                expected,
            }),
        }
    }

    /// Resolves a username to the owning user id, if registered.
    pub fn lookup_username(&self, name: &str) -> Result<Option<String>, StoreError> {
        let key = Self::username_key(name);
        match self.db.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            None => Ok(None),
        }
    }
}
