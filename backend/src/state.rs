use crate::config::Config;
use crate::issuance::ProofGenerationError;
use crate::registry::CredentialRegistry;
use crate::stats::StatsProvider;
use ark_bn254::Bn254;
use ark_groth16::{ProvingKey, VerifyingKey};
use devcred_zk::circuit::{ClaimCircuit, ContributionCircuit, RangeClaimCircuit};
use devcred_zk::groth16::{
    DefaultAggregateCircuit, deserialize_pk, deserialize_vk, serialize_pk, serialize_vk, setup_keys,
};
use devcred_zk::types::CircuitKind;
use rand::rngs::OsRng;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<CredentialRegistry>,
    pub stats: Arc<dyn StatsProvider>,
    pub keys: Arc<KeyCache>,
}

impl AppState {
    pub fn new(config: Config, registry: CredentialRegistry, stats: Arc<dyn StatsProvider>) -> Self {
        let keys = Arc::new(KeyCache::new(config.data_dir.clone()));
        Self { config: Arc::new(config), registry: Arc::new(registry), stats, keys }
    }
}

#[derive(Clone)]
pub struct ZkKeys {
    pub pk: Arc<ProvingKey<Bn254>>,
    pub vk: Arc<VerifyingKey<Bn254>>,
}

/// Groth16 keys per claim circuit: on disk under `<data_dir>/keys`, then in memory.
pub struct KeyCache {
    data_dir: PathBuf,
    range: OnceCell<ZkKeys>,
    contribution: OnceCell<ZkKeys>,
    aggregate: OnceCell<ZkKeys>,
}

impl KeyCache {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            range: OnceCell::new(),
            contribution: OnceCell::new(),
            aggregate: OnceCell::new(),
        }
    }

    pub async fn get(&self, kind: CircuitKind) -> Result<ZkKeys, ProofGenerationError> {
        match kind {
            CircuitKind::RangeClaim => self.ensure::<RangeClaimCircuit>(&self.range).await,
            CircuitKind::Contribution => self.ensure::<ContributionCircuit>(&self.contribution).await,
            CircuitKind::AggregateClaim => self.ensure::<DefaultAggregateCircuit>(&self.aggregate).await,
        }
    }

    /// Ensure keys for `C` exist on disk and in memory.
    ///
    /// This runs the trusted setup (prototype) on first use.
    async fn ensure<C: ClaimCircuit>(&self, cell: &OnceCell<ZkKeys>) -> Result<ZkKeys, ProofGenerationError> {
        let keys_dir = self.data_dir.join("keys");

        cell.get_or_try_init(|| async move {
            tokio::task::spawn_blocking(move || load_or_setup::<C>(keys_dir))
                .await
                .map_err(|e| ProofGenerationError::TaskFailed(e.to_string()))?
        })
        .await
        .cloned()
    }
}

fn load_or_setup<C: ClaimCircuit>(keys_dir: PathBuf) -> Result<ZkKeys, ProofGenerationError> {
    let io = |e: std::io::Error| ProofGenerationError::Keys(e.to_string());
    std::fs::create_dir_all(&keys_dir).map_err(io)?;

    let name = C::KIND.name();
    let pk_path = keys_dir.join(format!("{name}_pk.bin"));
    let vk_path = keys_dir.join(format!("{name}_vk.bin"));

    if pk_path.exists() && vk_path.exists() {
        let pk = deserialize_pk(&std::fs::read(&pk_path).map_err(io)?)?;
        let vk = deserialize_vk(&std::fs::read(&vk_path).map_err(io)?)?;
        return Ok(ZkKeys { pk: Arc::new(pk), vk: Arc::new(vk) });
    }

    // Trusted setup randomness (prototype).
    //
    // IMPORTANT: In production, use an MPC ceremony or a transparent proof system.
    info!(circuit = name, "running Groth16 setup");
    let (pk, vk) = setup_keys::<C>(&mut OsRng)?;
    std::fs::write(&pk_path, serialize_pk(&pk)?).map_err(io)?;
    std::fs::write(&vk_path, serialize_vk(&vk)?).map_err(io)?;

    Ok(ZkKeys { pk: Arc::new(pk), vk: Arc::new(vk) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn keys_are_persisted_and_reloaded() {
        let dir = tempfile::tempdir().unwrap();

        let first = KeyCache::new(dir.path().to_path_buf());
        let a = first.get(CircuitKind::RangeClaim).await.unwrap();
        assert!(dir.path().join("keys/range_claim_v1_pk.bin").exists());
        assert!(dir.path().join("keys/range_claim_v1_vk.bin").exists());

        // Cached in memory.
        let again = first.get(CircuitKind::RangeClaim).await.unwrap();
        assert!(Arc::ptr_eq(&a.vk, &again.vk));

        // A new cache reads the same key from disk.
        let second = KeyCache::new(dir.path().to_path_buf());
        let b = second.get(CircuitKind::RangeClaim).await.unwrap();
        assert_eq!(serialize_vk(&a.vk).unwrap(), serialize_vk(&b.vk).unwrap());
    }
}
