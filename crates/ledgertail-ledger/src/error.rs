//! Error type for `ledgertail-ledger`.

use thiserror::Error;

use ledgertail_core::ledger::LedgerError;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] ledgertail_core::Error),

  #[error("ledger error: {0}")]
  Ledger(#[from] LedgerError),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("collection name cannot be empty")]
  EmptyCollection,

  /// The stored config carries no indexed fields / columns to derive a
  /// primary key from.
  #[error("collection {0} has no primary index")]
  NoPrimaryIndex(String),

  /// A result row did not have the expected `(primary, __value__)` shape.
  #[error("malformed result row from collection {0}")]
  MalformedRow(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
