//! Tests for the vault repository against a scripted [`DocumentApi`] fake.

use std::{
  collections::VecDeque,
  sync::{Arc, Mutex},
};

use serde_json::{Value, json};

use ledgertail_core::repository::{DocQuery, DocumentRepository};

use crate::{
  Error, VaultRepository,
  api::{
    AuditRequest, AuditResponse, CollectionSchema, CreateDocumentResponse,
    CreateDocumentsResponse, DocumentApi, DocumentRevision, FieldDef, FieldType,
    SearchRequest, SearchResponse,
  },
  repository::setup_collection,
};

#[derive(Clone, Default)]
struct FakeVault {
  inner: Arc<Mutex<FakeVaultInner>>,
}

#[derive(Default)]
struct FakeVaultInner {
  singles:      Vec<Value>,
  batches:      Vec<Vec<Value>>,
  searches:     Vec<SearchRequest>,
  audits:       Vec<AuditRequest>,
  search_pages: VecDeque<SearchResponse>,
  audit_pages:  VecDeque<AuditResponse>,
  collection:   Option<CollectionSchema>,
  created:      Vec<CollectionSchema>,
  next_tx:      u64,
}

impl FakeVault {
  fn script_search(&self, search_id: &str, documents: &[Value]) {
    self.inner.lock().unwrap().search_pages.push_back(SearchResponse {
      search_id: search_id.to_owned(),
      revisions: documents
        .iter()
        .map(|d| DocumentRevision {
          document:       d.clone(),
          transaction_id: None,
          revision:       None,
        })
        .collect(),
    });
  }

  fn script_audit(&self, revisions: Vec<DocumentRevision>) {
    self.inner.lock().unwrap().audit_pages.push_back(AuditResponse { revisions });
  }

  fn with_collection(self, schema: CollectionSchema) -> Self {
    self.inner.lock().unwrap().collection = Some(schema);
    self
  }
}

impl DocumentApi for FakeVault {
  async fn create_document(
    &self,
    _collection: &str,
    document: &Value,
  ) -> crate::Result<CreateDocumentResponse> {
    let mut inner = self.inner.lock().unwrap();
    inner.singles.push(document.clone());
    inner.next_tx += 1;
    Ok(CreateDocumentResponse {
      document_id:    format!("doc-{}", inner.singles.len()),
      transaction_id: Some(inner.next_tx.to_string()),
    })
  }

  async fn create_documents(
    &self,
    _collection: &str,
    documents: &[Value],
  ) -> crate::Result<CreateDocumentsResponse> {
    let mut inner = self.inner.lock().unwrap();
    inner.batches.push(documents.to_vec());
    inner.next_tx += 1;
    Ok(CreateDocumentsResponse {
      document_ids:   (0..documents.len()).map(|i| format!("doc-{i}")).collect(),
      transaction_id: Some(inner.next_tx.to_string()),
    })
  }

  async fn search_documents(
    &self,
    _collection: &str,
    request: &SearchRequest,
  ) -> crate::Result<SearchResponse> {
    let mut inner = self.inner.lock().unwrap();
    inner.searches.push(request.clone());
    Ok(inner.search_pages.pop_front().unwrap_or(SearchResponse {
      search_id: String::new(),
      revisions: vec![],
    }))
  }

  async fn audit_document(
    &self,
    _collection: &str,
    _document_id: &str,
    request: &AuditRequest,
  ) -> crate::Result<AuditResponse> {
    let mut inner = self.inner.lock().unwrap();
    inner.audits.push(*request);
    Ok(inner.audit_pages.pop_front().unwrap_or(AuditResponse { revisions: vec![] }))
  }

  async fn get_collection(
    &self,
    _collection: &str,
  ) -> crate::Result<Option<CollectionSchema>> {
    Ok(self.inner.lock().unwrap().collection.clone())
  }

  async fn create_collection(
    &self,
    _collection: &str,
    schema: &CollectionSchema,
  ) -> crate::Result<()> {
    self.inner.lock().unwrap().created.push(schema.clone());
    Ok(())
  }
}

fn doc_bytes(docs: &[Value]) -> Vec<Vec<u8>> {
  docs.iter().map(|d| serde_json::to_vec(d).unwrap()).collect()
}

#[tokio::test]
async fn write_returns_parsed_transaction_id() {
  let vault = FakeVault::default();
  let repo = VaultRepository::new(vault.clone(), "logs", false);

  let tx = repo.write(&json!({"msg": "a"})).await.unwrap();
  assert_eq!(tx, 1);
  assert_eq!(vault.inner.lock().unwrap().singles.len(), 1);
}

#[tokio::test]
async fn write_batch_splits_at_batch_size() {
  let vault = FakeVault::default();
  let repo = VaultRepository::new(vault.clone(), "logs", true).with_sizes(2, 100);

  let docs: Vec<Value> = (0..5).map(|i| json!({"i": i})).collect();
  repo.write_batch(&doc_bytes(&docs)).await.unwrap();

  let batches = vault.inner.lock().unwrap().batches.clone();
  let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
  assert_eq!(sizes, [2, 2, 1]);
}

#[tokio::test]
async fn write_batch_without_batch_mode_writes_individually() {
  let vault = FakeVault::default();
  let repo = VaultRepository::new(vault.clone(), "logs", false);

  let docs: Vec<Value> = (0..3).map(|i| json!({"i": i})).collect();
  let tx = repo.write_batch(&doc_bytes(&docs)).await.unwrap();

  let inner = vault.inner.lock().unwrap();
  assert_eq!(inner.singles.len(), 3);
  assert!(inner.batches.is_empty());
  drop(inner);
  assert_eq!(tx, 3);
}

#[tokio::test]
async fn write_batch_rejects_non_json_line() {
  let vault = FakeVault::default();
  let repo = VaultRepository::new(vault, "logs", true);

  let err = repo.write_batch(&[b"not json".to_vec()]).await.unwrap_err();
  assert!(matches!(err, Error::Json(_)));
}

#[tokio::test]
async fn read_follows_search_cursor_until_empty_page() {
  let vault = FakeVault::default();
  vault.script_search("cur", &[json!({"i": 1}), json!({"i": 2})]);
  vault.script_search("cur", &[json!({"i": 3})]);
  vault.script_search("cur", &[]);

  let repo = VaultRepository::new(vault.clone(), "logs", false);
  let found = repo.read(&DocQuery::default()).await.unwrap();
  assert_eq!(found.len(), 3);

  let searches = vault.inner.lock().unwrap().searches.clone();
  assert_eq!(searches.len(), 3);
  assert_eq!(searches[0].page, 1);
  assert!(searches[0].search_id.is_none());
  assert_eq!(searches[0].keep_open, Some(true));
  assert_eq!(searches[1].page, 2);
  assert_eq!(searches[1].search_id.as_deref(), Some("cur"));
}

#[tokio::test]
async fn read_stops_when_server_drops_cursor() {
  let vault = FakeVault::default();
  vault.script_search("", &[json!({"i": 1})]);

  let repo = VaultRepository::new(vault.clone(), "logs", false);
  let found = repo.read(&DocQuery::default()).await.unwrap();
  assert_eq!(found.len(), 1);
  assert_eq!(vault.inner.lock().unwrap().searches.len(), 1);
}

#[tokio::test]
async fn read_passes_query_document_through() {
  let vault = FakeVault::default();
  vault.script_search("", &[]);

  let repo = VaultRepository::new(vault.clone(), "logs", false);
  let query = r#"{"expressions":[{"fieldComparisons":[{"field":"class","operator":"EQ","value":"WRITE"}]}]}"#;
  repo.read(&DocQuery::filter(query)).await.unwrap();

  let searches = vault.inner.lock().unwrap().searches.clone();
  let sent = searches[0].query.as_ref().unwrap();
  assert_eq!(sent["expressions"][0]["fieldComparisons"][0]["field"], "class");
}

#[tokio::test]
async fn read_rejects_malformed_query() {
  let repo = VaultRepository::new(FakeVault::default(), "logs", false);
  let err = repo.read(&DocQuery::filter("{not json")).await.unwrap_err();
  assert!(matches!(err, Error::InvalidQuery(_)));
}

#[tokio::test]
async fn history_pages_descending_until_short_page() {
  let vault = FakeVault::default();
  vault.script_audit(vec![
    DocumentRevision {
      document:       json!({"v": 3}),
      transaction_id: Some("30".into()),
      revision:       Some("3".into()),
    },
    DocumentRevision {
      document:       json!({"v": 2}),
      transaction_id: Some("20".into()),
      revision:       Some("2".into()),
    },
  ]);
  vault.script_audit(vec![DocumentRevision {
    document:       json!({"v": 1}),
    transaction_id: Some("10".into()),
    revision:       Some("1".into()),
  }]);

  let repo = VaultRepository::new(vault.clone(), "logs", false).with_sizes(100, 2);
  let history = repo.history("doc-1").await.unwrap();

  assert_eq!(history.len(), 3);
  assert_eq!(history[0].revision, 3);
  assert_eq!(history[0].tx_id, 30);
  assert_eq!(history[2].revision, 1);

  let audits = vault.inner.lock().unwrap().audits.clone();
  assert_eq!(audits.len(), 2);
  assert!(audits[0].desc);
  assert_eq!(audits[1].page, 2);
}

#[tokio::test]
async fn setup_reuses_existing_collection() {
  let vault = FakeVault::default().with_collection(CollectionSchema::default());

  setup_collection(&vault, "logs", None).await.unwrap();
  assert!(vault.inner.lock().unwrap().created.is_empty());
}

#[tokio::test]
async fn setup_creates_missing_collection_with_schema() {
  let vault = FakeVault::default();
  let schema = CollectionSchema {
    fields:  vec![FieldDef { name: "class".into(), ftype: FieldType::String }],
    indexes: vec![],
  };

  setup_collection(&vault, "logs", Some(schema)).await.unwrap();

  let created = vault.inner.lock().unwrap().created.clone();
  assert_eq!(created.len(), 1);
  assert_eq!(created[0].fields[0].name, "class");
}
