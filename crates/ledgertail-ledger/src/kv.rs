//! [`KvRepository`] — JSON documents over a raw versioned key-value space.
//!
//! Key scheme, with literal brace delimiters around values:
//!
//! - primary index: `{collection}.{pkField}.{{pkValue}}` → payload key
//! - payload:       `{collection}.payload.{pkField}.{{pkValue}}` → document bytes
//! - secondary:     `{collection}.{field}.{{value}}.{{pkValue}}` → payload key
//!
//! Index entries store an indirection pointer (the payload key) rather than
//! the document, so overwriting a primary key leaves older secondary entries
//! behind. Readers resolve every hit through the pointer and discard entries
//! whose transaction id no longer matches the payload's — the staleness
//! filter.

use serde_json::Value;
use tracing::{debug, info, trace, warn};

use ledgertail_core::{
  collection::{BackendKind, CollectionConfig},
  document,
  ledger::{KeyValue, VersionedKv},
  repository::{DocQuery, DocumentRepository, HistoryEntry},
  schema::SchemaStore,
};

use crate::{Error, Result};

const DEFAULT_PAGE_SIZE: usize = 999;

/// KV-backed document repository for one collection.
///
/// Holds a schema snapshot loaded at construction; schema changes made after
/// `open` are not observed by this handle.
pub struct KvRepository<C> {
  kv:         C,
  collection: String,
  indexes:    Vec<String>,
  page_size:  usize,
}

impl<C: VersionedKv + Clone> KvRepository<C> {
  /// Create the collection: persists its config (parser, backend, ordered
  /// index list). `indexes[0]` is the primary key and is mandatory.
  pub async fn setup(
    kv: &C,
    collection: &str,
    parser: Option<String>,
    indexes: Vec<String>,
  ) -> Result<()> {
    if collection.is_empty() {
      return Err(Error::EmptyCollection);
    }
    if indexes.is_empty() {
      return Err(Error::NoPrimaryIndex(collection.to_owned()));
    }

    let config = CollectionConfig {
      parser,
      backend: BackendKind::Kv,
      indexes,
      columns: vec![],
    };

    SchemaStore::new(kv.clone()).write(collection, &config).await?;
    info!(collection, indexes = ?config.indexes, "created kv collection");
    Ok(())
  }

  /// Open a repository handle over an existing collection.
  pub async fn open(kv: C, collection: &str) -> Result<Self> {
    let config = SchemaStore::new(kv.clone()).read(collection).await?;
    if config.indexes.is_empty() {
      return Err(Error::NoPrimaryIndex(collection.to_owned()));
    }

    debug!(collection, indexes = ?config.indexes, "loaded kv collection schema");
    Ok(KvRepository {
      kv,
      collection: collection.to_owned(),
      indexes: config.indexes,
      page_size: DEFAULT_PAGE_SIZE,
    })
  }

  /// Override the scan/history page size. Mostly useful in tests.
  pub fn with_page_size(mut self, page_size: usize) -> Self {
    self.page_size = page_size;
    self
  }

  fn primary(&self) -> &str {
    &self.indexes[0]
  }

  fn payload_key(&self, pk: &str) -> String {
    format!("{}.payload.{}.{{{}}}", self.collection, self.primary(), pk)
  }

  async fn write_one(&self, bytes: &[u8]) -> Result<u64> {
    let doc: Value = serde_json::from_slice(bytes)?;
    let pk = document::primary_key_value(&doc, self.primary()).map_err(Error::Core)?;

    let payload_key = self.payload_key(&pk);
    let mut entries = vec![
      KeyValue {
        key:   format!("{}.{}.{{{}}}", self.collection, self.primary(), pk).into_bytes(),
        value: payload_key.clone().into_bytes(),
      },
      KeyValue {
        key:   payload_key.clone().into_bytes(),
        value: bytes.to_vec(),
      },
    ];

    // Best-effort secondary indexing: a field absent from the document is
    // skipped, not an error.
    for field in &self.indexes[1..] {
      if let Some(text) = document::field_text(&doc, field) {
        entries.push(KeyValue {
          key:   format!("{}.{}.{{{}}}.{{{}}}", self.collection, field, text, pk)
            .into_bytes(),
          value: payload_key.clone().into_bytes(),
        });
      }
    }

    // One atomic batch per document: the payload and all its index entries
    // become visible together or not at all.
    let tx_id = self.kv.set_all(entries).await?;
    trace!(tx_id, "wrote entry");
    Ok(tx_id)
  }
}

impl<C: VersionedKv + Clone> DocumentRepository for KvRepository<C> {
  type Error = Error;

  async fn write(&self, document: &Value) -> Result<u64> {
    let bytes = serde_json::to_vec(document)?;
    self.write_one(&bytes).await
  }

  /// A document without its primary key is logged and skipped here; only the
  /// single-document [`write`](DocumentRepository::write) treats it as a hard
  /// error.
  async fn write_batch(&self, documents: &[Vec<u8>]) -> Result<u64> {
    let mut tx_id = 0;
    for bytes in documents {
      match self.write_one(bytes).await {
        Ok(id) => tx_id = id,
        Err(Error::Core(ledgertail_core::Error::MissingPrimaryKey(field))) => {
          warn!(field, "document lacks primary key, skipping");
        }
        Err(e) => return Err(e),
      }
    }
    Ok(tx_id)
  }

  async fn read(&self, query: &DocQuery) -> Result<Vec<Vec<u8>>> {
    let field = query.field.as_deref().unwrap_or_else(|| self.primary());
    if !self.indexes.iter().any(|i| i == field) {
      return Err(ledgertail_core::Error::InvalidIndex(field.to_owned()).into());
    }

    // Open-brace prefix so a partial value still matches.
    let prefix = format!("{}.{}.{{{}", self.collection, field, query.filter);

    let mut seek_key: Vec<u8> = Vec::new();
    let mut documents = Vec::new();
    loop {
      let entries = self
        .kv
        .scan(prefix.as_bytes(), &seek_key, self.page_size)
        .await?;
      if entries.is_empty() {
        debug!(field, prefix = %query.filter, "no more entries matching condition");
        break;
      }

      for entry in entries {
        // Resolve the indirection pointer to the payload.
        let payload = self.kv.get(&entry.value).await?;
        seek_key = entry.key;
        // Staleness filter: only keep hits whose index entry was written in
        // the same transaction as the payload's latest revision.
        if entry.tx_id == payload.tx_id {
          documents.push(payload.value);
        }
      }
    }

    Ok(documents)
  }

  async fn history(&self, selector: &str) -> Result<Vec<HistoryEntry>> {
    let key = self.payload_key(selector);

    let mut offset = 0u64;
    let mut entries = Vec::new();
    loop {
      let page = self
        .kv
        .history(key.as_bytes(), offset, self.page_size)
        .await?;
      let n = page.len();

      for e in page {
        entries.push(HistoryEntry {
          entry:    e.value,
          tx_id:    e.tx_id,
          revision: e.revision,
        });
        offset += 1;
      }

      if n < self.page_size {
        debug!(key = selector, "no more history entries");
        break;
      }
    }

    Ok(entries)
  }
}
