//! Wire contract of the document vault.
//!
//! [`DocumentApi`] is the collaborator trait the repository consumes; the
//! request/response bodies mirror the vault's JSON API. Field names are
//! camelCase on the wire.

use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Result;

/// Declared type of an indexed collection field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldType {
  String,
  Integer,
  Double,
  Boolean,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
  pub name: String,
  #[serde(rename = "type")]
  pub ftype: FieldType,
}

/// A secondary index over one or more declared fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexDef {
  pub fields: Vec<String>,
}

/// Collection schema for create, or as returned by get.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionSchema {
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub fields:  Vec<FieldDef>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub indexes: Vec<IndexDef>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDocumentResponse {
  pub document_id:    String,
  #[serde(default)]
  pub transaction_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDocumentsResponse {
  pub document_ids:   Vec<String>,
  #[serde(default)]
  pub transaction_id: Option<String>,
}

/// Cursor-paged search. The first page omits `search_id`; later pages echo
/// the server's cursor back with `keep_open` so the snapshot stays pinned.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub query:     Option<Value>,
  pub page:      u64,
  pub per_page:  u64,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub search_id: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub keep_open: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
  #[serde(default)]
  pub search_id: String,
  #[serde(default)]
  pub revisions: Vec<DocumentRevision>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRevision {
  pub document:       Value,
  #[serde(default)]
  pub transaction_id: Option<String>,
  #[serde(default)]
  pub revision:       Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRequest {
  pub page:     u64,
  pub per_page: u64,
  pub desc:     bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditResponse {
  #[serde(default)]
  pub revisions: Vec<DocumentRevision>,
}

/// The vault's document API, scoped to one ledger.
pub trait DocumentApi: Send + Sync {
  /// Store one document in `collection`.
  fn create_document<'a>(
    &'a self,
    collection: &'a str,
    document: &'a Value,
  ) -> impl Future<Output = Result<CreateDocumentResponse>> + Send + 'a;

  /// Store a batch of documents in one call.
  fn create_documents<'a>(
    &'a self,
    collection: &'a str,
    documents: &'a [Value],
  ) -> impl Future<Output = Result<CreateDocumentsResponse>> + Send + 'a;

  /// One page of a (possibly cursored) search.
  fn search_documents<'a>(
    &'a self,
    collection: &'a str,
    request: &'a SearchRequest,
  ) -> impl Future<Output = Result<SearchResponse>> + Send + 'a;

  /// One page of a document's revision audit.
  fn audit_document<'a>(
    &'a self,
    collection: &'a str,
    document_id: &'a str,
    request: &'a AuditRequest,
  ) -> impl Future<Output = Result<AuditResponse>> + Send + 'a;

  /// Schema of an existing collection, or `Ok(None)` when it does not exist.
  fn get_collection<'a>(
    &'a self,
    collection: &'a str,
  ) -> impl Future<Output = Result<Option<CollectionSchema>>> + Send + 'a;

  /// Create a collection with the given schema.
  fn create_collection<'a>(
    &'a self,
    collection: &'a str,
    schema: &'a CollectionSchema,
  ) -> impl Future<Output = Result<()>> + Send + 'a;
}
