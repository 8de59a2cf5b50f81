//! Credential registry: proof-backed credential records with verifier-gated mutation.
//!
//! Per hash the lifecycle is `Unregistered -> Valid -> {Revoked, Expired}`; expiry is derived
//! at read time from the injected [`Clock`]. Every mutating call holds one async mutex for its
//! whole check-then-write sequence, so the registry behaves like a serialized ledger.

mod sqlite;
mod store;

pub use sqlite::SqliteStore;
pub use store::{InMemoryStore, LedgerStore, StoreError};

use crate::credentials::CredentialType;
use devcred_zk::types::ZkProof;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use thiserror::Error;
use tokio::sync::{Mutex, broadcast};
use tracing::{info, warn};

const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Account identity, normalized to lowercase.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn new(value: impl AsRef<str>) -> Self {
        Self(value.as_ref().trim().to_ascii_lowercase())
    }

    pub fn zero() -> Self {
        Self(ZERO_ADDRESS.to_string())
    }

    /// Empty string or the zero address.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty() || self.0 == ZERO_ADDRESS
    }

    /// `0x` followed by 40 hex digits.
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == 42
            && self.0.starts_with("0x")
            && self.0[2..].chars().all(|c| c.is_ascii_hexdigit())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Address {
    fn from(value: String) -> Self {
        Address::new(value)
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 32-byte credential identifier, carried as `0x`-prefixed lowercase hex.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CredentialHash([u8; 32]);

impl CredentialHash {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for CredentialHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for CredentialHash {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim_start_matches("0x")).map_err(|e| format!("invalid credential hash: {e}"))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| format!("credential hash must be 32 bytes, got {}", b.len()))?;
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for CredentialHash {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CredentialHash> for String {
    fn from(value: CredentialHash) -> Self {
        value.to_string()
    }
}

/// Source of "now" in unix seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Settable clock for tests.
pub struct ManualClock(AtomicI64);

impl ManualClock {
    pub fn new(now: i64) -> Self {
        Self(AtomicI64::new(now))
    }

    pub fn set(&self, now: i64) {
        self.0.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: i64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRecord {
    pub owner: Address,
    pub credential_type: CredentialType,
    pub credential_hash: CredentialHash,
    pub issued_at: i64,
    pub expires_at: i64,
    pub is_revoked: bool,
    pub ipfs_hash: String,
    pub score: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialStatus {
    Unregistered,
    Valid,
    Revoked,
    Expired,
}

impl CredentialStatus {
    /// Revocation wins over expiry.
    pub fn of(record: &CredentialRecord, now: i64) -> Self {
        if record.is_revoked {
            CredentialStatus::Revoked
        } else if now > record.expires_at {
            CredentialStatus::Expired
        } else {
            CredentialStatus::Valid
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialDetails {
    pub record: CredentialRecord,
    pub status: CredentialStatus,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminState {
    pub owner: Address,
    pub paused: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryCounters {
    pub total_credentials: u64,
    pub total_revoked: u64,
}

/// Arguments of `register_credential`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCredential {
    pub credential_hash: CredentialHash,
    pub owner: Address,
    pub credential_type: CredentialType,
    pub expires_at: i64,
    #[serde(default)]
    pub ipfs_hash: String,
    pub score: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RegistryEvent {
    CredentialRegistered {
        credential_hash: CredentialHash,
        owner: Address,
        credential_type: CredentialType,
        expires_at: i64,
        timestamp: i64,
    },
    CredentialRevoked {
        credential_hash: CredentialHash,
        revoked_by: Address,
        timestamp: i64,
    },
    MetadataUpdated {
        credential_hash: CredentialHash,
        ipfs_hash: String,
        timestamp: i64,
    },
    VerifierAuthorizationChanged {
        verifier: Address,
        authorized: bool,
        timestamp: i64,
    },
    OwnershipTransferred {
        previous_owner: Address,
        new_owner: Address,
        timestamp: i64,
    },
    Paused {
        by: Address,
        timestamp: i64,
    },
    Unpaused {
        by: Address,
        timestamp: i64,
    },
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("{caller} is not authorized to {action}")]
    Unauthorized { caller: Address, action: &'static str },

    #[error("invalid credential data: {0}")]
    InvalidCredentialData(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("credential not found: {0}")]
    NotFound(CredentialHash),

    #[error("credential already revoked: {0}")]
    AlreadyRevoked(CredentialHash),

    #[error("registry is paused")]
    ContractPaused,

    #[error("array length mismatch: {left} hashes vs {right} proofs")]
    ArrayLengthMismatch { left: usize, right: usize },

    #[error(transparent)]
    Store(#[from] StoreError),
}

const EVENT_CAPACITY: usize = 256;

pub struct CredentialRegistry {
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    write_lock: Mutex<()>,
    events: broadcast::Sender<RegistryEvent>,
}

impl CredentialRegistry {
    /// Open a registry over `store`. A fresh store gets `deployer` as owner and verifier; a
    /// store with existing admin state keeps it.
    pub async fn open(
        store: Arc<dyn LedgerStore>,
        deployer: Address,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, RegistryError> {
        if store.load_admin().await?.is_none() {
            if deployer.is_empty() {
                return Err(RegistryError::InvalidAddress("deployer must not be empty".to_string()));
            }
            store.save_admin(&AdminState { owner: deployer.clone(), paused: false }).await?;
            store.set_verifier(&deployer, true).await?;
            info!(owner = %deployer, "registry initialized");
        }

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self { store, clock, write_lock: Mutex::new(()), events })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: RegistryEvent) {
        info!(?event, "registry event");
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    async fn admin(&self) -> Result<AdminState, RegistryError> {
        self.store
            .load_admin()
            .await?
            .ok_or_else(|| StoreError::Corrupt("admin state missing".to_string()).into())
    }

    pub async fn owner(&self) -> Result<Address, RegistryError> {
        Ok(self.admin().await?.owner)
    }

    pub async fn is_paused(&self) -> Result<bool, RegistryError> {
        Ok(self.admin().await?.paused)
    }

    pub async fn is_verifier(&self, address: &Address) -> Result<bool, RegistryError> {
        Ok(self.store.is_verifier(address).await?)
    }

    async fn require_owner(&self, caller: &Address, action: &'static str) -> Result<AdminState, RegistryError> {
        let admin = self.admin().await?;
        if &admin.owner != caller {
            warn!(%caller, action, "unauthorized registry call");
            return Err(RegistryError::Unauthorized { caller: caller.clone(), action });
        }
        Ok(admin)
    }

    async fn require_unpaused(&self) -> Result<(), RegistryError> {
        if self.admin().await?.paused {
            return Err(RegistryError::ContractPaused);
        }
        Ok(())
    }

    async fn require_verifier(&self, caller: &Address, action: &'static str) -> Result<(), RegistryError> {
        if !self.store.is_verifier(caller).await? {
            warn!(%caller, action, "unauthorized registry call");
            return Err(RegistryError::Unauthorized { caller: caller.clone(), action });
        }
        Ok(())
    }

    fn validate_new(&self, entry: &NewCredential, now: i64) -> Result<(), RegistryError> {
        if entry.credential_hash.is_zero() {
            return Err(RegistryError::InvalidCredentialData("credential hash must not be zero".to_string()));
        }
        if entry.owner.is_empty() {
            return Err(RegistryError::InvalidCredentialData("owner must not be empty".to_string()));
        }
        if entry.expires_at <= now {
            return Err(RegistryError::InvalidCredentialData(format!(
                "expiresAt {} must be after now {}",
                entry.expires_at, now
            )));
        }
        Ok(())
    }

    fn record_for(entry: NewCredential, now: i64) -> CredentialRecord {
        CredentialRecord {
            owner: entry.owner,
            credential_type: entry.credential_type,
            credential_hash: entry.credential_hash,
            issued_at: now,
            expires_at: entry.expires_at,
            is_revoked: false,
            ipfs_hash: entry.ipfs_hash,
            score: entry.score,
        }
    }

    fn duplicate(hash: CredentialHash) -> RegistryError {
        RegistryError::InvalidCredentialData(format!("credential {hash} is already registered"))
    }

    pub async fn register_credential(
        &self,
        caller: &Address,
        entry: NewCredential,
    ) -> Result<CredentialRecord, RegistryError> {
        let _guard = self.write_lock.lock().await;
        self.require_unpaused().await?;
        self.require_verifier(caller, "register credentials").await?;

        let now = self.clock.now();
        self.validate_new(&entry, now)?;
        if self.store.get_credential(&entry.credential_hash).await?.is_some() {
            return Err(Self::duplicate(entry.credential_hash));
        }

        let record = Self::record_for(entry, now);
        self.store
            .insert_credentials(std::slice::from_ref(&record))
            .await
            .map_err(|e| match e {
                StoreError::Duplicate(hash) => Self::duplicate(hash),
                other => other.into(),
            })?;

        self.emit(RegistryEvent::CredentialRegistered {
            credential_hash: record.credential_hash,
            owner: record.owner.clone(),
            credential_type: record.credential_type,
            expires_at: record.expires_at,
            timestamp: now,
        });
        Ok(record)
    }

    /// Register every entry or none of them.
    pub async fn batch_register_credentials(
        &self,
        caller: &Address,
        entries: Vec<NewCredential>,
    ) -> Result<Vec<CredentialRecord>, RegistryError> {
        let _guard = self.write_lock.lock().await;
        self.require_unpaused().await?;
        self.require_verifier(caller, "register credentials").await?;

        let now = self.clock.now();
        let mut seen = HashSet::with_capacity(entries.len());
        for entry in &entries {
            self.validate_new(entry, now)?;
            let stored = self.store.get_credential(&entry.credential_hash).await?;
            if !seen.insert(entry.credential_hash) || stored.is_some() {
                return Err(Self::duplicate(entry.credential_hash));
            }
        }

        let records: Vec<CredentialRecord> = entries.into_iter().map(|e| Self::record_for(e, now)).collect();
        self.store.insert_credentials(&records).await.map_err(|e| match e {
            StoreError::Duplicate(hash) => Self::duplicate(hash),
            other => other.into(),
        })?;

        for record in &records {
            self.emit(RegistryEvent::CredentialRegistered {
                credential_hash: record.credential_hash,
                owner: record.owner.clone(),
                credential_type: record.credential_type,
                expires_at: record.expires_at,
                timestamp: now,
            });
        }
        Ok(records)
    }

    pub async fn revoke_credential(&self, caller: &Address, hash: &CredentialHash) -> Result<(), RegistryError> {
        let _guard = self.write_lock.lock().await;
        self.require_unpaused().await?;

        let record = self.store.get_credential(hash).await?.ok_or(RegistryError::NotFound(*hash))?;
        if &record.owner != caller && !self.store.is_verifier(caller).await? {
            warn!(%caller, %hash, "unauthorized revocation attempt");
            return Err(RegistryError::Unauthorized { caller: caller.clone(), action: "revoke this credential" });
        }
        if record.is_revoked {
            return Err(RegistryError::AlreadyRevoked(*hash));
        }

        self.store.mark_revoked(hash).await?;
        self.emit(RegistryEvent::CredentialRevoked {
            credential_hash: *hash,
            revoked_by: caller.clone(),
            timestamp: self.clock.now(),
        });
        Ok(())
    }

    pub async fn update_credential_ipfs(
        &self,
        caller: &Address,
        hash: &CredentialHash,
        ipfs_hash: String,
    ) -> Result<(), RegistryError> {
        let _guard = self.write_lock.lock().await;
        self.require_unpaused().await?;

        let record = self.store.get_credential(hash).await?.ok_or(RegistryError::NotFound(*hash))?;
        if &record.owner != caller {
            return Err(RegistryError::Unauthorized { caller: caller.clone(), action: "update credential metadata" });
        }

        self.store.set_ipfs_hash(hash, &ipfs_hash).await?;
        self.emit(RegistryEvent::MetadataUpdated {
            credential_hash: *hash,
            ipfs_hash,
            timestamp: self.clock.now(),
        });
        Ok(())
    }

    pub async fn credential_status(&self, hash: &CredentialHash) -> Result<CredentialStatus, RegistryError> {
        Ok(match self.store.get_credential(hash).await? {
            Some(record) => CredentialStatus::of(&record, self.clock.now()),
            None => CredentialStatus::Unregistered,
        })
    }

    pub async fn is_credential_valid(&self, hash: &CredentialHash) -> Result<bool, RegistryError> {
        Ok(self.credential_status(hash).await? == CredentialStatus::Valid)
    }

    pub async fn get_credential(&self, hash: &CredentialHash) -> Result<CredentialRecord, RegistryError> {
        self.store.get_credential(hash).await?.ok_or(RegistryError::NotFound(*hash))
    }

    pub async fn get_credential_details(&self, hash: &CredentialHash) -> Result<CredentialDetails, RegistryError> {
        let record = self.get_credential(hash).await?;
        let status = CredentialStatus::of(&record, self.clock.now());
        Ok(CredentialDetails { record, status })
    }

    pub async fn credentials_by_owner(&self, owner: &Address) -> Result<Vec<CredentialHash>, RegistryError> {
        Ok(self.store.credentials_by_owner(owner).await?)
    }

    pub async fn credentials_by_type(
        &self,
        credential_type: CredentialType,
    ) -> Result<Vec<CredentialHash>, RegistryError> {
        Ok(self.store.credentials_by_type(credential_type).await?)
    }

    pub async fn counters(&self) -> Result<RegistryCounters, RegistryError> {
        Ok(self.store.counters().await?)
    }

    /// Read-only validity check over parallel arrays.
    ///
    /// An entry is valid when the credential is valid and its proof envelope is present with
    /// at least one public signal.
    pub async fn batch_verify_credentials(
        &self,
        hashes: &[CredentialHash],
        proofs: &[Option<ZkProof>],
    ) -> Result<Vec<bool>, RegistryError> {
        if hashes.len() != proofs.len() {
            return Err(RegistryError::ArrayLengthMismatch { left: hashes.len(), right: proofs.len() });
        }

        let mut out = Vec::with_capacity(hashes.len());
        for (hash, proof) in hashes.iter().zip(proofs) {
            let has_proof = proof.as_ref().is_some_and(|p| !p.public_signals.is_empty());
            out.push(has_proof && self.is_credential_valid(hash).await?);
        }
        Ok(out)
    }

    pub async fn authorize_verifier(
        &self,
        caller: &Address,
        verifier: &Address,
        authorized: bool,
    ) -> Result<(), RegistryError> {
        let _guard = self.write_lock.lock().await;
        self.require_owner(caller, "authorize verifiers").await?;
        if verifier.is_empty() {
            return Err(RegistryError::InvalidAddress("verifier must not be empty".to_string()));
        }

        self.store.set_verifier(verifier, authorized).await?;
        self.emit(RegistryEvent::VerifierAuthorizationChanged {
            verifier: verifier.clone(),
            authorized,
            timestamp: self.clock.now(),
        });
        Ok(())
    }

    pub async fn pause(&self, caller: &Address) -> Result<(), RegistryError> {
        self.set_paused(caller, true).await
    }

    pub async fn unpause(&self, caller: &Address) -> Result<(), RegistryError> {
        self.set_paused(caller, false).await
    }

    async fn set_paused(&self, caller: &Address, paused: bool) -> Result<(), RegistryError> {
        let _guard = self.write_lock.lock().await;
        let mut admin = self.require_owner(caller, if paused { "pause" } else { "unpause" }).await?;
        admin.paused = paused;
        self.store.save_admin(&admin).await?;

        let timestamp = self.clock.now();
        self.emit(if paused {
            RegistryEvent::Paused { by: caller.clone(), timestamp }
        } else {
            RegistryEvent::Unpaused { by: caller.clone(), timestamp }
        });
        Ok(())
    }

    pub async fn transfer_ownership(&self, caller: &Address, new_owner: &Address) -> Result<(), RegistryError> {
        let _guard = self.write_lock.lock().await;
        let mut admin = self.require_owner(caller, "transfer ownership").await?;
        if new_owner.is_empty() {
            return Err(RegistryError::InvalidAddress("new owner must not be empty".to_string()));
        }

        let previous_owner = std::mem::replace(&mut admin.owner, new_owner.clone());
        self.store.save_admin(&admin).await?;
        self.emit(RegistryEvent::OwnershipTransferred {
            previous_owner,
            new_owner: new_owner.clone(),
            timestamp: self.clock.now(),
        });
        Ok(())
    }
}
