//! Error type for `ledgertail-ingest`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A repository write failed; ingestion stops immediately, no retry.
  #[error("could not store audit entry: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("invalid source: {0}")]
  Source(String),
}

impl Error {
  pub fn store(err: impl std::error::Error + Send + Sync + 'static) -> Self {
    Error::Store(Box::new(err))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
