//! Collaborator contracts for the backing ledger engines.
//!
//! These traits describe the primitives the repositories consume; the actual
//! clients (remote gateway, in-memory test fakes) live elsewhere. The ledger's
//! own consistency and tamper-evidence proofs are out of scope — only its
//! versioning (per-write transaction ids, retained history) is surfaced here,
//! because the KV staleness filter depends on it.

use std::future::Future;

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
  /// The engine's native miss — a key that was never written.
  #[error("key not found: {0}")]
  KeyNotFound(String),

  /// The store is unreachable or returned a non-success status.
  #[error("transport error: {0}")]
  Transport(String),
}

// ─── Versioned KV primitive ──────────────────────────────────────────────────

/// A key/value pair submitted as part of an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
  pub key:   Vec<u8>,
  pub value: Vec<u8>,
}

/// One stored entry together with the id of the transaction that wrote it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvEntry {
  pub key:   Vec<u8>,
  pub value: Vec<u8>,
  pub tx_id: u64,
}

/// One historical revision of a key, ascending from revision 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvHistoryEntry {
  pub value:    Vec<u8>,
  pub tx_id:    u64,
  pub revision: u64,
}

/// An append-only key-value engine that retains every historical value per
/// key and exposes per-write transaction ids.
pub trait VersionedKv: Send + Sync {
  /// Latest value of `key`, or [`LedgerError::KeyNotFound`].
  fn get<'a>(
    &'a self,
    key: &'a [u8],
  ) -> impl Future<Output = Result<KvEntry, LedgerError>> + Send + 'a;

  /// Write a single key, returning the transaction id.
  fn set<'a>(
    &'a self,
    key: &'a [u8],
    value: &'a [u8],
  ) -> impl Future<Output = Result<u64, LedgerError>> + Send + 'a;

  /// Write all entries in one atomic transaction, returning its id. Either
  /// every entry becomes visible or none does.
  fn set_all(
    &self,
    entries: Vec<KeyValue>,
  ) -> impl Future<Output = Result<u64, LedgerError>> + Send + '_;

  /// Forward scan of latest values under `prefix`, starting strictly after
  /// `seek_key` (empty = from the beginning), at most `limit` entries.
  fn scan<'a>(
    &'a self,
    prefix: &'a [u8],
    seek_key: &'a [u8],
    limit: usize,
  ) -> impl Future<Output = Result<Vec<KvEntry>, LedgerError>> + Send + 'a;

  /// Revisions of `key` in ascending revision order, skipping `offset`,
  /// at most `limit` entries. A never-written key is the engine's native
  /// [`LedgerError::KeyNotFound`].
  fn history<'a>(
    &'a self,
    key: &'a [u8],
    offset: u64,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<KvHistoryEntry>, LedgerError>> + Send + 'a;
}

// ─── SQL primitive ───────────────────────────────────────────────────────────

/// A typed SQL value as bound to a statement or returned in a row.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
  Integer(i64),
  Varchar(String),
  Timestamp(DateTime<Utc>),
  Boolean(bool),
  Float(f64),
  Blob(Vec<u8>),
  Null,
}

impl SqlValue {
  pub fn as_blob(&self) -> Option<&[u8]> {
    match self {
      SqlValue::Blob(b) => Some(b),
      _ => None,
    }
  }

  /// Render this value as a predicate literal for keyset pagination.
  /// Varchar values are quoted; timestamps use the engine's microsecond
  /// integer form; everything else uses its display form.
  pub fn predicate_literal(&self) -> String {
    match self {
      SqlValue::Integer(n) => n.to_string(),
      SqlValue::Varchar(s) => format!("'{s}'"),
      SqlValue::Timestamp(ts) => ts.timestamp_micros().to_string(),
      SqlValue::Boolean(b) => b.to_string(),
      SqlValue::Float(f) => f.to_string(),
      SqlValue::Blob(_) | SqlValue::Null => "NULL".to_owned(),
    }
  }
}

/// Named statement parameters (`@name` placeholders).
pub type SqlParams = Vec<(String, SqlValue)>;

/// One result row; column order follows the select list.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlRow {
  pub values: Vec<SqlValue>,
}

/// A SQL engine with the temporal extension `SINCE TX n UNTIL NOW()` used by
/// history queries.
pub trait SqlLedger: Send + Sync {
  /// Execute a statement, returning the transaction id.
  fn exec<'a>(
    &'a self,
    stmt: &'a str,
    params: SqlParams,
  ) -> impl Future<Output = Result<u64, LedgerError>> + Send + 'a;

  /// Run a query and collect all rows of the result.
  fn query<'a>(
    &'a self,
    stmt: &'a str,
    params: SqlParams,
  ) -> impl Future<Output = Result<Vec<SqlRow>, LedgerError>> + Send + 'a;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn predicate_literals() {
    assert_eq!(SqlValue::Integer(42).predicate_literal(), "42");
    assert_eq!(SqlValue::Varchar("a'ok".into()).predicate_literal(), "'a'ok'");
    assert_eq!(SqlValue::Boolean(false).predicate_literal(), "false");
    assert_eq!(SqlValue::Float(2.5).predicate_literal(), "2.5");
  }
}
