//! Backend dispatch: one repository value regardless of where a collection
//! lives.

use serde_json::Value;
use thiserror::Error;

use ledgertail_core::{
  collection::BackendKind,
  repository::{DocQuery, DocumentRepository, HistoryEntry},
  schema::SchemaStore,
};
use ledgertail_ledger::{KvRepository, SqlRepository};
use ledgertail_vault::{VaultClient, VaultRepository};

use crate::client::LedgerClient;

#[derive(Debug, Error)]
pub enum RepoError {
  #[error(transparent)]
  Ledger(#[from] ledgertail_ledger::Error),

  #[error(transparent)]
  Vault(#[from] ledgertail_vault::Error),
}

/// A collection's repository, whichever backend its stored config names.
pub enum AnyRepository {
  Kv(KvRepository<LedgerClient>),
  Sql(SqlRepository<LedgerClient>),
  Vault(VaultRepository<VaultClient>),
}

/// Open the repository for `collection` by its stored backend kind, returning
/// it together with the collection's configured parser name.
pub async fn open_repository(
  client: &LedgerClient,
  collection: &str,
) -> Result<(AnyRepository, Option<String>), RepoError> {
  let schema = SchemaStore::new(client.clone());
  let config = schema.read(collection).await.map_err(ledgertail_ledger::Error::Core)?;

  let repository = match config.backend {
    BackendKind::Kv => {
      AnyRepository::Kv(KvRepository::open(client.clone(), collection).await?)
    }
    BackendKind::Sql => {
      AnyRepository::Sql(SqlRepository::open(client.clone(), &schema, collection).await?)
    }
    BackendKind::Vault => {
      // Vault collections are opened through open_vault_repository with the
      // vault connection settings; a stored config never names this backend.
      return Err(
        ledgertail_ledger::Error::Core(ledgertail_core::Error::CollectionNotFound(
          collection.to_owned(),
        ))
        .into(),
      );
    }
  };

  Ok((repository, config.parser))
}

pub fn open_vault_repository(
  client: VaultClient,
  collection: &str,
  batch_mode: bool,
) -> AnyRepository {
  AnyRepository::Vault(VaultRepository::new(client, collection, batch_mode))
}

impl DocumentRepository for AnyRepository {
  type Error = RepoError;

  async fn write(&self, document: &Value) -> Result<u64, RepoError> {
    match self {
      AnyRepository::Kv(repo) => Ok(repo.write(document).await?),
      AnyRepository::Sql(repo) => Ok(repo.write(document).await?),
      AnyRepository::Vault(repo) => Ok(repo.write(document).await?),
    }
  }

  async fn write_batch(&self, documents: &[Vec<u8>]) -> Result<u64, RepoError> {
    match self {
      AnyRepository::Kv(repo) => Ok(repo.write_batch(documents).await?),
      AnyRepository::Sql(repo) => Ok(repo.write_batch(documents).await?),
      AnyRepository::Vault(repo) => Ok(repo.write_batch(documents).await?),
    }
  }

  async fn read(&self, query: &DocQuery) -> Result<Vec<Vec<u8>>, RepoError> {
    match self {
      AnyRepository::Kv(repo) => Ok(repo.read(query).await?),
      AnyRepository::Sql(repo) => Ok(repo.read(query).await?),
      AnyRepository::Vault(repo) => Ok(repo.read(query).await?),
    }
  }

  async fn history(&self, selector: &str) -> Result<Vec<HistoryEntry>, RepoError> {
    match self {
      AnyRepository::Kv(repo) => Ok(repo.history(selector).await?),
      AnyRepository::Sql(repo) => Ok(repo.history(selector).await?),
      AnyRepository::Vault(repo) => Ok(repo.history(selector).await?),
    }
  }
}
