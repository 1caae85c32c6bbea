//! # Encryption-at-Rest Key Distribution
//!
//! Key material is generated and stored by an external KMS, reached through
//! [`KeyMaterialProvider`]. This module only caches resolved material
//! ([`KeyMaterialCache`]) and pushes it to cluster masters, either from a task
//! ([`crate::orchestration::subtasks::DistributeUniverseKey`]) or from the
//! periodic [`UniverseKeySetter`].

pub mod cache;
pub mod key_setter;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::cluster::{ClusterClient, RemoteResponse};
use crate::error::{CommissionerError, Result};

pub use cache::KeyMaterialCache;
pub use key_setter::{KeySetterReport, UniverseKeySetter};

/// The key a universe is currently encrypted with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveKey {
    pub config_id: Uuid,
    pub key_ref: Vec<u8>,
}

/// External KMS collaborator
#[async_trait]
pub trait KeyMaterialProvider: Send + Sync {
    /// `None` when encryption at rest is not enabled for the universe
    async fn active_key(&self, universe_id: Uuid) -> Result<Option<ActiveKey>>;

    async fn resolve_key(&self, universe_id: Uuid, config_id: Uuid, key_ref: &[u8])
        -> Result<Vec<u8>>;
}

/// Provider for deployments without encryption at rest
#[derive(Debug, Default)]
pub struct DisabledKeyProvider;

#[async_trait]
impl KeyMaterialProvider for DisabledKeyProvider {
    async fn active_key(&self, _universe_id: Uuid) -> Result<Option<ActiveKey>> {
        Ok(None)
    }

    async fn resolve_key(
        &self,
        universe_id: Uuid,
        config_id: Uuid,
        _key_ref: &[u8],
    ) -> Result<Vec<u8>> {
        Err(CommissionerError::Configuration(format!(
            "no key provider configured to resolve keys of {config_id} for universe {universe_id}"
        )))
    }
}

/// Resolve key material through the cache, asking the provider on a miss
pub async fn resolve_cached(
    cache: &KeyMaterialCache,
    provider: &dyn KeyMaterialProvider,
    universe_id: Uuid,
    key: &ActiveKey,
) -> Result<Vec<u8>> {
    if let Some(material) = cache.get(universe_id, &key.key_ref) {
        return Ok(material);
    }
    let material = provider
        .resolve_key(universe_id, key.config_id, &key.key_ref)
        .await?;
    cache.insert(universe_id, key.key_ref.clone(), material.clone());
    Ok(material)
}

/// Push key material to one master unless it already holds it.
///
/// Returns whether keys were sent.
pub async fn push_key_to_master(
    client: &dyn ClusterClient,
    host_port: &str,
    key_ref: &[u8],
    key_material: &[u8],
) -> Result<bool> {
    let status = client
        .has_universe_key_in_memory(host_port, key_ref)
        .await?
        .into_result("HasUniverseKeyInMemory")?;
    if status.has_key {
        debug!(master = %host_port, key_ref = %hex(key_ref), "Master already holds universe key");
        return Ok(false);
    }

    client
        .add_universe_keys(host_port, key_ref, key_material)
        .await?
        .into_result("AddUniverseKeys")?;
    debug!(master = %host_port, key_ref = %hex(key_ref), "🔑 Pushed universe key to master");
    Ok(true)
}

/// Lowercase hex rendering of a key reference for log fields
pub fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_rendering() {
        assert_eq!(hex(&[0x00, 0xab, 0x7f]), "00ab7f");
        assert_eq!(hex(&[]), "");
    }
}
