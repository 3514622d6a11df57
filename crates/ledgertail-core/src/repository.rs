//! The `DocumentRepository` trait and supporting query types.
//!
//! The trait is implemented by storage backends (`ledgertail-ledger` for the
//! KV and SQL mappings, `ledgertail-vault` for the remote document API).
//! Higher layers (ingestion, CLI) depend on this abstraction, not on any
//! concrete backend; the backend serving a collection is selected by the
//! `type` field of its stored [`CollectionConfig`](crate::collection::CollectionConfig).

use std::future::Future;

use serde_json::Value;

/// Parameters for [`DocumentRepository::read`].
///
/// Each backend interprets the parts it understands: the KV backend reads
/// `field` (defaulting to the primary index) and treats `filter` as a value
/// prefix; the SQL backend appends `filter` verbatim after `WHERE`; the vault
/// backend deserialises `filter` as a structured query.
#[derive(Debug, Clone, Default)]
pub struct DocQuery {
  pub field:  Option<String>,
  pub filter: String,
}

impl DocQuery {
  pub fn filter(filter: impl Into<String>) -> Self {
    DocQuery { field: None, filter: filter.into() }
  }

  pub fn field(field: impl Into<String>, filter: impl Into<String>) -> Self {
    DocQuery { field: Some(field.into()), filter: filter.into() }
  }
}

/// One historical revision of a document: the stored payload bytes, the id of
/// the transaction that wrote it, and the 1-based revision number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
  pub entry:    Vec<u8>,
  pub tx_id:    u64,
  pub revision: u64,
}

/// Abstraction over a ledgertail storage backend.
///
/// Writes are append-only: re-writing a primary key creates a new revision,
/// never replaces history. All methods return `Send` futures so the trait can
/// be used from multi-threaded async runtimes.
pub trait DocumentRepository: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Serialise and store one document, returning the write's transaction id.
  fn write<'a>(
    &'a self,
    document: &'a Value,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;

  /// Store a batch of already-serialised documents, returning the last
  /// transaction id. Atomicity is per document, not per batch.
  fn write_batch<'a>(
    &'a self,
    documents: &'a [Vec<u8>],
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;

  /// Query latest document versions. Pagination is internal: the full result
  /// set is collected. No snapshot isolation across pages — a concurrent
  /// writer can cause a document to be missed or seen twice.
  fn read<'a>(
    &'a self,
    query: &'a DocQuery,
  ) -> impl Future<Output = Result<Vec<Vec<u8>>, Self::Error>> + Send + 'a;

  /// Enumerate historical revisions. The selector is backend-specific: a
  /// primary key value (KV), a temporal/filter clause (SQL), or a document
  /// id (vault).
  fn history<'a>(
    &'a self,
    selector: &'a str,
  ) -> impl Future<Output = Result<Vec<HistoryEntry>, Self::Error>> + Send + 'a;
}
