//! Error type for `ledgertail-vault`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("vault transport error: {0}")]
  Transport(String),

  /// A non-success HTTP status from the vault, with the response body.
  #[error("vault returned {status}: {body}")]
  Status { status: u16, body: String },

  /// The read query string did not deserialise as a vault query document.
  #[error("invalid vault query: {0}")]
  InvalidQuery(serde_json::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for Error {
  fn from(err: reqwest::Error) -> Self {
    Error::Transport(err.to_string())
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
