//! The schema/config store.
//!
//! Collection configs are persisted as one JSON blob under the key
//! `{collection}.config` in the versioned KV engine. Repositories load the
//! config once at construction and never re-read it, so schema changes after
//! that point are not observed by already-open handles — a documented
//! staleness window, not global mutable state.

use tracing::{info, warn};

use crate::{
  Error, Result,
  collection::CollectionConfig,
  ledger::{LedgerError, VersionedKv},
};

fn config_key(collection: &str) -> String {
  format!("{collection}.config")
}

/// Reads and writes per-collection schemas.
pub struct SchemaStore<C> {
  kv: C,
}

impl<C: VersionedKv> SchemaStore<C> {
  pub fn new(kv: C) -> Self {
    SchemaStore { kv }
  }

  /// Load the stored config; [`Error::SchemaNotFound`] if the collection was
  /// never created.
  pub async fn read(&self, collection: &str) -> Result<CollectionConfig> {
    let key = config_key(collection);
    let entry = match self.kv.get(key.as_bytes()).await {
      Ok(entry) => entry,
      Err(LedgerError::KeyNotFound(_)) => {
        return Err(Error::SchemaNotFound(collection.to_owned()));
      }
      Err(e) => return Err(e.into()),
    };

    Ok(serde_json::from_slice(&entry.value)?)
  }

  /// Persist a config. Re-writing is idempotent; overwriting an existing,
  /// different config is allowed but warned about, since open repository
  /// handles keep using the schema they loaded.
  pub async fn write(&self, collection: &str, config: &CollectionConfig) -> Result<u64> {
    match self.read(collection).await {
      Ok(existing) if existing != *config => {
        warn!(collection, "overwriting existing collection config");
      }
      Ok(_) | Err(Error::SchemaNotFound(_)) => {}
      Err(e) => return Err(e),
    }

    let bytes = serde_json::to_vec(config)?;
    let key = config_key(collection);
    let tx_id = self.kv.set(key.as_bytes(), &bytes).await?;
    info!(collection, tx_id, "stored collection config");
    Ok(tx_id)
  }
}
