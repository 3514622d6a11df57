//! Async HTTP client binding the ledger collaborator traits to a remote
//! ledger's JSON gateway.
//!
//! A session is opened once at connect time; every subsequent request carries
//! the session id header. Values travel as JSON: keys and payloads are UTF-8
//! strings, SQL values use the gateway's tagged-field form.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use ledgertail_core::ledger::{
  KeyValue, KvEntry, KvHistoryEntry, LedgerError, SqlLedger, SqlParams, SqlRow,
  SqlValue, VersionedKv,
};

const SESSION_HEADER: &str = "sessionid";

/// Connection settings for the ledger gateway.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
  pub base_url: String,
  pub database: String,
  pub username: String,
  pub password: String,
}

/// Async HTTP client for the ledger's JSON gateway.
///
/// Cheap to clone — the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct LedgerClient {
  client:     Client,
  base_url:   String,
  database:   String,
  session_id: String,
}

#[derive(Serialize)]
struct OpenSessionRequest<'a> {
  database: &'a str,
  username: &'a str,
  password: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenSessionResponse {
  session_id: String,
}

#[derive(Serialize, Deserialize)]
struct WireKvEntry {
  key:   String,
  value: String,
  #[serde(default, rename = "txId")]
  tx_id: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireKvRevision {
  value:    String,
  #[serde(default)]
  tx_id:    u64,
  #[serde(default)]
  revision: u64,
}

#[derive(Deserialize)]
struct TxResponse {
  #[serde(rename = "txId")]
  tx_id: u64,
}

/// The gateway's tagged SQL value: exactly one field set, or none for NULL.
#[derive(Serialize, Deserialize, Default)]
struct WireSqlValue {
  #[serde(skip_serializing_if = "Option::is_none")]
  n:  Option<i64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  s:  Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  b:  Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  f:  Option<f64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  ts: Option<i64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  bs: Option<String>,
}

impl From<&SqlValue> for WireSqlValue {
  fn from(value: &SqlValue) -> Self {
    let mut wire = WireSqlValue::default();
    match value {
      SqlValue::Integer(n) => wire.n = Some(*n),
      SqlValue::Varchar(s) => wire.s = Some(s.clone()),
      SqlValue::Boolean(b) => wire.b = Some(*b),
      SqlValue::Float(f) => wire.f = Some(*f),
      SqlValue::Timestamp(ts) => wire.ts = Some(ts.timestamp_micros()),
      SqlValue::Blob(bytes) => wire.bs = Some(String::from_utf8_lossy(bytes).into_owned()),
      SqlValue::Null => {}
    }
    wire
  }
}

impl From<WireSqlValue> for SqlValue {
  fn from(wire: WireSqlValue) -> Self {
    if let Some(n) = wire.n {
      SqlValue::Integer(n)
    } else if let Some(s) = wire.s {
      SqlValue::Varchar(s)
    } else if let Some(b) = wire.b {
      SqlValue::Boolean(b)
    } else if let Some(f) = wire.f {
      SqlValue::Float(f)
    } else if let Some(micros) = wire.ts {
      SqlValue::Timestamp(
        chrono::DateTime::from_timestamp_micros(micros).unwrap_or_default(),
      )
    } else if let Some(bs) = wire.bs {
      SqlValue::Blob(bs.into_bytes())
    } else {
      SqlValue::Null
    }
  }
}

#[derive(Deserialize)]
struct WireSqlRow {
  values: Vec<WireSqlValue>,
}

fn transport(err: reqwest::Error) -> LedgerError {
  LedgerError::Transport(err.to_string())
}

impl LedgerClient {
  /// Open a session against the gateway.
  pub async fn connect(config: LedgerConfig) -> Result<Self, LedgerError> {
    let client = Client::builder()
      .timeout(Duration::from_secs(30))
      .build()
      .map_err(transport)?;

    let base_url = config.base_url.trim_end_matches('/').to_owned();
    let resp = client
      .post(format!("{base_url}/session/open"))
      .json(&OpenSessionRequest {
        database: &config.database,
        username: &config.username,
        password: &config.password,
      })
      .send()
      .await
      .map_err(transport)?;

    if !resp.status().is_success() {
      return Err(LedgerError::Transport(format!(
        "could not open session: {}",
        resp.status()
      )));
    }
    let session: OpenSessionResponse = resp.json().await.map_err(transport)?;

    Ok(LedgerClient {
      client,
      base_url,
      database: config.database,
      session_id: session.session_id,
    })
  }

  fn url(&self, path: &str) -> String {
    format!("{}/db/{}{}", self.base_url, self.database, path)
  }

  /// POST a request body under the session, expecting a JSON response.
  /// A 404 is surfaced as the engine's native key miss.
  async fn post<T: DeserializeOwned>(
    &self,
    path: &str,
    body: &impl Serialize,
    miss: impl FnOnce() -> String,
  ) -> Result<T, LedgerError> {
    let resp = self
      .client
      .post(self.url(path))
      .header(SESSION_HEADER, &self.session_id)
      .json(body)
      .send()
      .await
      .map_err(transport)?;

    let status = resp.status();
    if status.as_u16() == 404 {
      return Err(LedgerError::KeyNotFound(miss()));
    }
    if !status.is_success() {
      let body = resp.text().await.unwrap_or_default();
      return Err(LedgerError::Transport(format!("{path} returned {status}: {body}")));
    }
    resp.json().await.map_err(transport)
  }
}

fn utf8(bytes: &[u8]) -> String {
  String::from_utf8_lossy(bytes).into_owned()
}

impl VersionedKv for LedgerClient {
  async fn get(&self, key: &[u8]) -> Result<KvEntry, LedgerError> {
    let key = utf8(key);
    let entry: WireKvEntry = self
      .post("/kv/get", &serde_json::json!({ "key": &key }), || key.clone())
      .await?;
    Ok(KvEntry {
      key:   entry.key.into_bytes(),
      value: entry.value.into_bytes(),
      tx_id: entry.tx_id,
    })
  }

  async fn set(&self, key: &[u8], value: &[u8]) -> Result<u64, LedgerError> {
    self
      .set_all(vec![KeyValue { key: key.to_vec(), value: value.to_vec() }])
      .await
  }

  async fn set_all(&self, entries: Vec<KeyValue>) -> Result<u64, LedgerError> {
    let wire: Vec<WireKvEntry> = entries
      .iter()
      .map(|e| WireKvEntry { key: utf8(&e.key), value: utf8(&e.value), tx_id: 0 })
      .collect();
    let resp: TxResponse = self
      .post("/kv/setall", &serde_json::json!({ "entries": wire }), String::new)
      .await?;
    Ok(resp.tx_id)
  }

  async fn scan(
    &self,
    prefix: &[u8],
    seek_key: &[u8],
    limit: usize,
  ) -> Result<Vec<KvEntry>, LedgerError> {
    #[derive(Deserialize)]
    struct ScanResponse {
      #[serde(default)]
      entries: Vec<WireKvEntry>,
    }

    let resp: ScanResponse = self
      .post(
        "/kv/scan",
        &serde_json::json!({
          "prefix": utf8(prefix),
          "seekKey": utf8(seek_key),
          "limit": limit,
        }),
        String::new,
      )
      .await?;
    Ok(
      resp
        .entries
        .into_iter()
        .map(|e| KvEntry {
          key:   e.key.into_bytes(),
          value: e.value.into_bytes(),
          tx_id: e.tx_id,
        })
        .collect(),
    )
  }

  async fn history(
    &self,
    key: &[u8],
    offset: u64,
    limit: usize,
  ) -> Result<Vec<KvHistoryEntry>, LedgerError> {
    #[derive(Deserialize)]
    struct HistoryResponse {
      #[serde(default)]
      revisions: Vec<WireKvRevision>,
    }

    let key = utf8(key);
    let resp: HistoryResponse = self
      .post(
        "/kv/history",
        &serde_json::json!({ "key": &key, "offset": offset, "limit": limit }),
        || key.clone(),
      )
      .await?;
    Ok(
      resp
        .revisions
        .into_iter()
        .map(|r| KvHistoryEntry {
          value:    r.value.into_bytes(),
          tx_id:    r.tx_id,
          revision: r.revision,
        })
        .collect(),
    )
  }
}

impl SqlLedger for LedgerClient {
  async fn exec(&self, stmt: &str, params: SqlParams) -> Result<u64, LedgerError> {
    let params: serde_json::Map<String, serde_json::Value> = params
      .iter()
      .map(|(name, value)| {
        (name.clone(), serde_json::to_value(WireSqlValue::from(value)).unwrap_or_default())
      })
      .collect();
    let resp: TxResponse = self
      .post(
        "/sql/exec",
        &serde_json::json!({ "stmt": stmt, "params": params }),
        String::new,
      )
      .await?;
    Ok(resp.tx_id)
  }

  async fn query(&self, stmt: &str, params: SqlParams) -> Result<Vec<SqlRow>, LedgerError> {
    #[derive(Deserialize)]
    struct QueryResponse {
      #[serde(default)]
      rows: Vec<WireSqlRow>,
    }

    let params: serde_json::Map<String, serde_json::Value> = params
      .iter()
      .map(|(name, value)| {
        (name.clone(), serde_json::to_value(WireSqlValue::from(value)).unwrap_or_default())
      })
      .collect();
    let resp: QueryResponse = self
      .post(
        "/sql/query",
        &serde_json::json!({ "stmt": stmt, "params": params }),
        String::new,
      )
      .await?;
    Ok(
      resp
        .rows
        .into_iter()
        .map(|r| SqlRow { values: r.values.into_iter().map(SqlValue::from).collect() })
        .collect(),
    )
  }
}
