//! Error types for `ledgertail-core`.

use thiserror::Error;

use crate::ledger::LedgerError;

#[derive(Debug, Error)]
pub enum Error {
  /// The collection was never created — no config entry exists.
  #[error("no stored schema for collection: {0}")]
  SchemaNotFound(String),

  #[error("collection does not exist: {0}")]
  CollectionNotFound(String),

  /// A document is missing (or has a null value for) a primary key part.
  #[error("missing primary key field in document: {0}")]
  MissingPrimaryKey(String),

  /// A read referenced a field that is not in the configured index list.
  #[error("not an indexed field: {0}")]
  InvalidIndex(String),

  /// A declared column type has no coercion rule.
  #[error("unsupported column type: {0}")]
  UnsupportedType(String),

  #[error("invalid column definition: {0}")]
  InvalidColumn(String),

  #[error("line parse error: {0}")]
  Parse(String),

  #[error("ledger error: {0}")]
  Ledger(#[from] LedgerError),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
