use super::{AdminState, Address, CredentialHash, CredentialRecord, RegistryCounters};
use crate::credentials::CredentialType;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("credential {0} already stored")]
    Duplicate(CredentialHash),

    #[error("credential {0} not stored")]
    Missing(CredentialHash),

    #[error("corrupt store: {0}")]
    Corrupt(String),

    #[error("{field} = {value} cannot be stored")]
    Unrepresentable { field: &'static str, value: u64 },

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Persistence behind the credential registry.
///
/// Implementations must make `insert_credentials` atomic: either every record (and its index
/// entries and counter increments) lands, or none does.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn load_admin(&self) -> Result<Option<AdminState>, StoreError>;
    async fn save_admin(&self, admin: &AdminState) -> Result<(), StoreError>;

    async fn set_verifier(&self, verifier: &Address, authorized: bool) -> Result<(), StoreError>;
    async fn is_verifier(&self, address: &Address) -> Result<bool, StoreError>;

    async fn insert_credentials(&self, records: &[CredentialRecord]) -> Result<(), StoreError>;
    async fn get_credential(&self, hash: &CredentialHash) -> Result<Option<CredentialRecord>, StoreError>;
    async fn mark_revoked(&self, hash: &CredentialHash) -> Result<(), StoreError>;
    async fn set_ipfs_hash(&self, hash: &CredentialHash, ipfs_hash: &str) -> Result<(), StoreError>;

    /// Hashes in registration order.
    async fn credentials_by_owner(&self, owner: &Address) -> Result<Vec<CredentialHash>, StoreError>;
    /// Hashes in registration order.
    async fn credentials_by_type(&self, credential_type: CredentialType) -> Result<Vec<CredentialHash>, StoreError>;

    async fn counters(&self) -> Result<RegistryCounters, StoreError>;
}

#[derive(Default)]
struct Ledger {
    admin: Option<AdminState>,
    verifiers: HashSet<Address>,
    credentials: HashMap<CredentialHash, CredentialRecord>,
    by_owner: HashMap<Address, Vec<CredentialHash>>,
    by_type: BTreeMap<CredentialType, Vec<CredentialHash>>,
    counters: RegistryCounters,
}

/// In-memory ledger for tests and ephemeral deployments.
#[derive(Default)]
pub struct InMemoryStore {
    ledger: Mutex<Ledger>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Ledger>, StoreError> {
        self.ledger
            .lock()
            .map_err(|e| StoreError::Backend(format!("lock poisoned: {e}")))
    }
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    async fn load_admin(&self) -> Result<Option<AdminState>, StoreError> {
        Ok(self.lock()?.admin.clone())
    }

    async fn save_admin(&self, admin: &AdminState) -> Result<(), StoreError> {
        self.lock()?.admin = Some(admin.clone());
        Ok(())
    }

    async fn set_verifier(&self, verifier: &Address, authorized: bool) -> Result<(), StoreError> {
        let mut ledger = self.lock()?;
        if authorized {
            ledger.verifiers.insert(verifier.clone());
        } else {
            ledger.verifiers.remove(verifier);
        }
        Ok(())
    }

    async fn is_verifier(&self, address: &Address) -> Result<bool, StoreError> {
        Ok(self.lock()?.verifiers.contains(address))
    }

    async fn insert_credentials(&self, records: &[CredentialRecord]) -> Result<(), StoreError> {
        let mut ledger = self.lock()?;

        let mut batch = HashSet::with_capacity(records.len());
        for r in records {
            if ledger.credentials.contains_key(&r.credential_hash) || !batch.insert(r.credential_hash) {
                return Err(StoreError::Duplicate(r.credential_hash));
            }
        }

        for r in records {
            ledger.by_owner.entry(r.owner.clone()).or_default().push(r.credential_hash);
            ledger.by_type.entry(r.credential_type).or_default().push(r.credential_hash);
            ledger.credentials.insert(r.credential_hash, r.clone());
            ledger.counters.total_credentials += 1;
        }
        Ok(())
    }

    async fn get_credential(&self, hash: &CredentialHash) -> Result<Option<CredentialRecord>, StoreError> {
        Ok(self.lock()?.credentials.get(hash).cloned())
    }

    async fn mark_revoked(&self, hash: &CredentialHash) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let ledger = &mut *guard;
        let record = ledger.credentials.get_mut(hash).ok_or(StoreError::Missing(*hash))?;
        if !record.is_revoked {
            record.is_revoked = true;
            ledger.counters.total_revoked += 1;
        }
        Ok(())
    }

    async fn set_ipfs_hash(&self, hash: &CredentialHash, ipfs_hash: &str) -> Result<(), StoreError> {
        let mut ledger = self.lock()?;
        let record = ledger.credentials.get_mut(hash).ok_or(StoreError::Missing(*hash))?;
        record.ipfs_hash = ipfs_hash.to_string();
        Ok(())
    }

    async fn credentials_by_owner(&self, owner: &Address) -> Result<Vec<CredentialHash>, StoreError> {
        Ok(self.lock()?.by_owner.get(owner).cloned().unwrap_or_default())
    }

    async fn credentials_by_type(&self, credential_type: CredentialType) -> Result<Vec<CredentialHash>, StoreError> {
        Ok(self.lock()?.by_type.get(&credential_type).cloned().unwrap_or_default())
    }

    async fn counters(&self) -> Result<RegistryCounters, StoreError> {
        Ok(self.lock()?.counters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::{addr, entry, hash, NOW};

    fn record(n: u8) -> CredentialRecord {
        let e = entry(n, &addr(2));
        CredentialRecord {
            owner: e.owner,
            credential_type: e.credential_type,
            credential_hash: e.credential_hash,
            issued_at: NOW,
            expires_at: e.expires_at,
            is_revoked: false,
            ipfs_hash: e.ipfs_hash,
            score: e.score,
        }
    }

    #[tokio::test]
    async fn failed_batch_leaves_no_trace() {
        let store = InMemoryStore::new();
        store.insert_credentials(&[record(1)]).await.unwrap();

        let err = store.insert_credentials(&[record(2), record(1)]).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(h) if h == hash(1)));
        assert!(store.get_credential(&hash(2)).await.unwrap().is_none());
        assert_eq!(store.counters().await.unwrap().total_credentials, 1);
        assert_eq!(store.credentials_by_owner(&addr(2)).await.unwrap(), vec![hash(1)]);
    }

    #[tokio::test]
    async fn revocation_counts_once() {
        let store = InMemoryStore::new();
        store.insert_credentials(&[record(1)]).await.unwrap();
        store.mark_revoked(&hash(1)).await.unwrap();
        store.mark_revoked(&hash(1)).await.unwrap();
        assert_eq!(store.counters().await.unwrap().total_revoked, 1);
        assert!(matches!(store.mark_revoked(&hash(9)).await, Err(StoreError::Missing(_))));
    }

    #[tokio::test]
    async fn verifier_flags_toggle() {
        let store = InMemoryStore::new();
        store.set_verifier(&addr(5), true).await.unwrap();
        assert!(store.is_verifier(&addr(5)).await.unwrap());
        store.set_verifier(&addr(5), false).await.unwrap();
        assert!(!store.is_verifier(&addr(5)).await.unwrap());
    }
}
