//! Async HTTP client implementing [`DocumentApi`] against a vault instance.

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
  Error, Result,
  api::{
    AuditRequest, AuditResponse, CollectionSchema, CreateDocumentResponse,
    CreateDocumentsResponse, DocumentApi, SearchRequest, SearchResponse,
  },
};

pub const DEFAULT_BASE_URL: &str = "https://vault.immudb.io/ics/api/v1";

/// Connection settings for the vault API.
#[derive(Debug, Clone)]
pub struct VaultConfig {
  pub base_url: String,
  pub api_key:  String,
  pub ledger:   String,
}

/// Async HTTP client for the vault's JSON REST API.
///
/// Cheap to clone — the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct VaultClient {
  client: Client,
  config: VaultConfig,
}

impl VaultClient {
  pub fn new(config: VaultConfig) -> Result<Self> {
    let client = Client::builder()
      .timeout(Duration::from_secs(30))
      .build()?;
    Ok(Self { client, config })
  }

  fn url(&self, path: &str) -> String {
    format!(
      "{}/ledger/{}{}",
      self.config.base_url.trim_end_matches('/'),
      self.config.ledger,
      path
    )
  }

  fn auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    req.header("X-API-Key", &self.config.api_key)
  }

  async fn expect_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
      let body = resp.text().await.unwrap_or_default();
      return Err(Error::Status { status: status.as_u16(), body });
    }
    Ok(resp.json().await?)
  }
}

impl DocumentApi for VaultClient {
  /// `PUT /ledger/{ledger}/collection/{collection}/document`
  async fn create_document(
    &self,
    collection: &str,
    document: &Value,
  ) -> Result<CreateDocumentResponse> {
    let resp = self
      .auth(self.client.put(self.url(&format!("/collection/{collection}/document"))))
      .json(document)
      .send()
      .await?;
    Self::expect_json(resp).await
  }

  /// `PUT /ledger/{ledger}/collection/{collection}/documents`
  async fn create_documents(
    &self,
    collection: &str,
    documents: &[Value],
  ) -> Result<CreateDocumentsResponse> {
    let resp = self
      .auth(self.client.put(self.url(&format!("/collection/{collection}/documents"))))
      .json(&serde_json::json!({ "documents": documents }))
      .send()
      .await?;
    Self::expect_json(resp).await
  }

  /// `POST /ledger/{ledger}/collection/{collection}/documents/search`
  async fn search_documents(
    &self,
    collection: &str,
    request: &SearchRequest,
  ) -> Result<SearchResponse> {
    let resp = self
      .auth(
        self
          .client
          .post(self.url(&format!("/collection/{collection}/documents/search"))),
      )
      .json(request)
      .send()
      .await?;
    Self::expect_json(resp).await
  }

  /// `POST /ledger/{ledger}/collection/{collection}/document/{id}/audit`
  async fn audit_document(
    &self,
    collection: &str,
    document_id: &str,
    request: &AuditRequest,
  ) -> Result<AuditResponse> {
    let resp = self
      .auth(
        self
          .client
          .post(self.url(&format!("/collection/{collection}/document/{document_id}/audit"))),
      )
      .json(request)
      .send()
      .await?;
    Self::expect_json(resp).await
  }

  /// `GET /ledger/{ledger}/collection/{collection}` — a 404 is "does not
  /// exist", not an error.
  async fn get_collection(&self, collection: &str) -> Result<Option<CollectionSchema>> {
    let resp = self
      .auth(self.client.get(self.url(&format!("/collection/{collection}"))))
      .send()
      .await?;

    if resp.status().as_u16() == 404 {
      return Ok(None);
    }
    Ok(Some(Self::expect_json(resp).await?))
  }

  /// `PUT /ledger/{ledger}/collection/{collection}`
  async fn create_collection(
    &self,
    collection: &str,
    schema: &CollectionSchema,
  ) -> Result<()> {
    let resp = self
      .auth(self.client.put(self.url(&format!("/collection/{collection}"))))
      .json(schema)
      .send()
      .await?;

    let status = resp.status();
    if !status.is_success() {
      let body = resp.text().await.unwrap_or_default();
      return Err(Error::Status { status: status.as_u16(), body });
    }
    Ok(())
  }
}
