//! [`VaultRepository`] — repository semantics over the vault's document API.

use serde_json::Value;
use tracing::{debug, info, warn};

use ledgertail_core::repository::{DocQuery, DocumentRepository, HistoryEntry};

use crate::{
  Error, Result,
  api::{AuditRequest, CollectionSchema, DocumentApi, SearchRequest},
};

const DEFAULT_BATCH_SIZE: usize = 100;
const DEFAULT_PER_PAGE: u64 = 100;

/// Vault-backed document repository for one collection.
///
/// In batch mode, `write_batch` groups documents into vault batch calls;
/// otherwise every document is its own request. Document identity, indexing
/// and revision history live server-side.
pub struct VaultRepository<A> {
  api:        A,
  collection: String,
  batch_mode: bool,
  batch_size: usize,
  per_page:   u64,
}

impl<A: DocumentApi> VaultRepository<A> {
  pub fn new(api: A, collection: impl Into<String>, batch_mode: bool) -> Self {
    VaultRepository {
      api,
      collection: collection.into(),
      batch_mode,
      batch_size: DEFAULT_BATCH_SIZE,
      per_page: DEFAULT_PER_PAGE,
    }
  }

  /// Override batch and page sizes. Mostly useful in tests.
  pub fn with_sizes(mut self, batch_size: usize, per_page: u64) -> Self {
    self.batch_size = batch_size;
    self.per_page = per_page;
    self
  }
}

/// The vault reports transaction ids as strings; an unparseable one is logged
/// and treated as 0, never a write failure.
fn parse_tx(tx: Option<&str>) -> u64 {
  match tx {
    None => 0,
    Some(s) => s.parse().unwrap_or_else(|_| {
      warn!(tx_id = s, "could not parse vault transaction id");
      0
    }),
  }
}

impl<A: DocumentApi> DocumentRepository for VaultRepository<A> {
  type Error = Error;

  async fn write(&self, document: &Value) -> Result<u64> {
    let resp = self.api.create_document(&self.collection, document).await?;
    debug!(document_id = %resp.document_id, "created document");
    Ok(parse_tx(resp.transaction_id.as_deref()))
  }

  async fn write_batch(&self, documents: &[Vec<u8>]) -> Result<u64> {
    let mut parsed = Vec::with_capacity(documents.len());
    for bytes in documents {
      parsed.push(serde_json::from_slice::<Value>(bytes)?);
    }

    let mut tx_id = 0;
    if self.batch_mode {
      for chunk in parsed.chunks(self.batch_size) {
        let resp = self.api.create_documents(&self.collection, chunk).await?;
        debug!(count = resp.document_ids.len(), "created document batch");
        tx_id = parse_tx(resp.transaction_id.as_deref());
      }
    } else {
      for document in &parsed {
        tx_id = self.write(document).await?;
      }
    }

    Ok(tx_id)
  }

  /// The filter, when present, is an opaque vault query document. Pages are
  /// walked through the server's search cursor until the cursor disappears
  /// or a page comes back empty.
  async fn read(&self, query: &DocQuery) -> Result<Vec<Vec<u8>>> {
    let filter = if query.filter.is_empty() {
      None
    } else {
      Some(serde_json::from_str(&query.filter).map_err(Error::InvalidQuery)?)
    };

    let mut request = SearchRequest {
      query:     filter,
      page:      1,
      per_page:  self.per_page,
      search_id: None,
      keep_open: Some(true),
    };

    let mut documents = Vec::new();
    loop {
      let resp = self.api.search_documents(&self.collection, &request).await?;
      let count = resp.revisions.len();
      for revision in resp.revisions {
        documents.push(serde_json::to_vec(&revision.document)?);
      }

      if resp.search_id.is_empty() || count == 0 {
        debug!(total = documents.len(), "search exhausted");
        break;
      }
      request.page += 1;
      request.search_id = Some(resp.search_id);
    }

    Ok(documents)
  }

  /// The selector is a vault document id. Revisions are fetched newest-first
  /// in descending pages until a short page.
  async fn history(&self, selector: &str) -> Result<Vec<HistoryEntry>> {
    let mut request = AuditRequest { page: 1, per_page: self.per_page, desc: true };

    let mut entries = Vec::new();
    loop {
      let resp = self
        .api
        .audit_document(&self.collection, selector, &request)
        .await?;
      let count = resp.revisions.len();

      for revision in resp.revisions {
        entries.push(HistoryEntry {
          entry:    serde_json::to_vec(&revision.document)?,
          tx_id:    parse_tx(revision.transaction_id.as_deref()),
          revision: revision
            .revision
            .as_deref()
            .and_then(|r| r.parse().ok())
            .unwrap_or(0),
        });
      }

      if count == 0 || (count as u64) < self.per_page {
        debug!(document_id = selector, total = entries.len(), "audit exhausted");
        break;
      }
      request.page += 1;
    }

    Ok(entries)
  }
}

/// Idempotent collection setup: an existing collection is reused untouched,
/// a missing one is created with `schema` (or empty, letting the vault apply
/// its defaults).
pub async fn setup_collection<A: DocumentApi>(
  api: &A,
  collection: &str,
  schema: Option<CollectionSchema>,
) -> Result<()> {
  if let Some(existing) = api.get_collection(collection).await? {
    info!(collection, fields = existing.fields.len(), "using existing collection");
    return Ok(());
  }

  info!(collection, "collection does not exist, creating");
  api
    .create_collection(collection, &schema.unwrap_or_default())
    .await?;
  info!(collection, "collection created");
  Ok(())
}
