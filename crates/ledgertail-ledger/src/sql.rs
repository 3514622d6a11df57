//! [`SqlRepository`] — JSON documents as rows of a typed table.
//!
//! Every declared field becomes a column; the original document bytes ride
//! along in a hidden `__value__ BLOB` column. Reads page by descending keyset
//! on the primary column; history reads add the engine's temporal clause so
//! every row version is visited, not just the latest per primary key.

use serde_json::Value;
use tracing::{debug, info, trace, warn};

use ledgertail_core::{
  collection::{BackendKind, CollectionConfig, ColumnType, SqlColumn},
  document,
  ledger::{SqlLedger, SqlParams, SqlValue, VersionedKv},
  repository::{DocQuery, DocumentRepository, HistoryEntry},
  schema::SchemaStore,
};

use crate::{Error, Result};

const DEFAULT_PAGE_SIZE: usize = 999;

/// The hidden payload column present in every collection table.
const VALUE_COLUMN: &str = "__value__";

/// SQL-backed document repository for one collection.
///
/// Holds a column-schema snapshot loaded at construction; `columns[0]` is the
/// pagination (primary) column.
pub struct SqlRepository<C> {
  sql:        C,
  collection: String,
  columns:    Vec<SqlColumn>,
  page_size:  usize,
}

impl<C: SqlLedger> SqlRepository<C> {
  /// Create the collection: table, covering index over the non-primary
  /// declared columns, and the persisted column schema. Each step is
  /// idempotent, so a partial earlier run can be completed by re-running.
  pub async fn setup<K: VersionedKv>(
    sql: &C,
    schema: &SchemaStore<K>,
    collection: &str,
    primary_key: &str,
    column_defs: &[String],
    parser: Option<String>,
  ) -> Result<()> {
    if collection.is_empty() {
      return Err(Error::EmptyCollection);
    }

    let columns = SqlColumn::parse_list(primary_key, column_defs).map_err(Error::Core)?;
    if columns.is_empty() {
      return Err(Error::NoPrimaryIndex(collection.to_owned()));
    }

    let mut ddl = format!("CREATE TABLE IF NOT EXISTS {collection} ( ");
    for column in &columns {
      ddl.push_str(&format!("\"{}\" {},", column.name, column.ctype));
    }
    ddl.push_str(&format!(" {VALUE_COLUMN} BLOB, PRIMARY KEY ({primary_key}));"));

    info!(sql = %ddl, collection, "creating collection table");
    sql.exec(&ddl, vec![]).await?;

    let secondary: Vec<&str> = columns
      .iter()
      .filter(|c| !c.primary)
      .map(|c| c.name.as_str())
      .collect();
    if !secondary.is_empty() {
      let index = format!(
        "CREATE INDEX IF NOT EXISTS ON {collection}(\"{}\");",
        secondary.join("\",\"")
      );
      info!(sql = %index, collection, "creating covering index");
      sql.exec(&index, vec![]).await?;
    }

    let config = CollectionConfig {
      parser,
      backend: BackendKind::Sql,
      indexes: vec![],
      columns,
    };
    schema.write(collection, &config).await.map_err(Error::Core)?;

    Ok(())
  }

  /// Open a repository handle over an existing collection. Fails when the
  /// table is missing — callers must run [`SqlRepository::setup`] first.
  pub async fn open<K: VersionedKv>(
    sql: C,
    schema: &SchemaStore<K>,
    collection: &str,
  ) -> Result<Self> {
    let tables = sql
      .query(
        &format!("SELECT name FROM TABLES() WHERE name LIKE '{collection}';"),
        vec![],
      )
      .await?;
    if tables.len() != 1 {
      return Err(ledgertail_core::Error::CollectionNotFound(collection.to_owned()).into());
    }

    let config = schema.read(collection).await.map_err(Error::Core)?;
    if config.columns.is_empty() {
      return Err(Error::NoPrimaryIndex(collection.to_owned()));
    }

    debug!(collection, columns = ?config.columns, "loaded sql collection schema");
    Ok(SqlRepository {
      sql,
      collection: collection.to_owned(),
      columns: config.columns,
      page_size: DEFAULT_PAGE_SIZE,
    })
  }

  /// Override the read page size. Mostly useful in tests.
  pub fn with_page_size(mut self, page_size: usize) -> Self {
    self.page_size = page_size;
    self
  }

  fn pagination_column(&self) -> &SqlColumn {
    &self.columns[0]
  }

  async fn write_one(&self, bytes: &[u8]) -> Result<u64> {
    let doc: Value = serde_json::from_slice(bytes)?;

    let mut params: SqlParams =
      vec![(VALUE_COLUMN.to_owned(), SqlValue::Blob(bytes.to_vec()))];
    let mut names: Vec<&str> = Vec::new();
    let mut verb = "UPSERT";

    for column in &self.columns {
      if column.name == VALUE_COLUMN {
        continue;
      }
      // The engine assigns auto-increment values; plain INSERT is required
      // because UPSERT demands an explicit primary key.
      if column.ctype.is_auto_increment() {
        verb = "INSERT";
        continue;
      }

      let value = document::field(&doc, &column.name);
      if column.primary && value.is_none() {
        return Err(
          ledgertail_core::Error::MissingPrimaryKey(column.name.clone()).into(),
        );
      }

      names.push(column.name.as_str());
      params.push((column.name.clone(), coerce(value, column.ctype)));
    }

    let stmt = format!(
      "{verb} INTO {} (\"{}\", \"{VALUE_COLUMN}\") VALUES (@{},@{VALUE_COLUMN});",
      self.collection,
      names.join("\",\""),
      names.join(",@"),
    );

    trace!(sql = %stmt, collection = %self.collection, "inserting row");
    let tx_id = self.sql.exec(&stmt, params).await?;
    Ok(tx_id)
  }

  /// Shared keyset-pagination loop for `read` and `history`.
  ///
  /// `base` already contains any caller filter / temporal clause. Descending
  /// order on the primary column, next page predicate `primary < lastSeen`,
  /// conjoined with `AND` when the base already has a `WHERE`.
  async fn read_pages(&self, base: &str) -> Result<Vec<Vec<u8>>> {
    let primary = self.pagination_column();
    let has_where = base.to_lowercase().contains("where");

    let mut page = format!(
      " ORDER BY \"{}\" DESC LIMIT {}",
      primary.name, self.page_size
    );
    let mut documents = Vec::new();
    loop {
      let stmt = format!("{base}{page}");
      debug!(sql = %stmt, collection = %self.collection, "reading");
      let rows = self.sql.query(&stmt, vec![]).await?;
      let count = rows.len();
      let last = rows.last().and_then(|r| r.values.first().cloned());

      for row in rows {
        let blob = row
          .values
          .get(1)
          .and_then(SqlValue::as_blob)
          .ok_or_else(|| Error::MalformedRow(self.collection.clone()))?;
        documents.push(blob.to_vec());
      }

      if count < self.page_size {
        trace!(rows_total = documents.len(), "no more pages");
        break;
      }

      // `last` is present: count == page_size > 0.
      let literal = last
        .ok_or_else(|| Error::MalformedRow(self.collection.clone()))?
        .predicate_literal();
      let conjunction = if has_where { " AND " } else { " WHERE " };
      page = format!(
        "{conjunction}\"{0}\" < {1} ORDER BY \"{0}\" DESC LIMIT {2};",
        primary.name, literal, self.page_size
      );
    }

    Ok(documents)
  }
}

/// Coerce a document field to its declared column type. Absent non-primary
/// fields bind the type's zero value, mirroring the best-effort policy of the
/// KV backend.
fn coerce(value: Option<&Value>, ctype: ColumnType) -> SqlValue {
  match ctype {
    ColumnType::Integer | ColumnType::IntegerAutoInc => {
      SqlValue::Integer(value.map_or(0, json_i64))
    }
    ColumnType::Varchar(_) => SqlValue::Varchar(
      value.map_or_else(String::new, |v| match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
      }),
    ),
    ColumnType::Timestamp => SqlValue::Timestamp(
      value
        .and_then(Value::as_str)
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .unwrap_or_default(),
    ),
    ColumnType::Boolean => SqlValue::Boolean(
      value.map_or(false, |v| match v {
        Value::Bool(b) => *b,
        Value::String(s) => s == "true",
        _ => false,
      }),
    ),
    ColumnType::Float => SqlValue::Float(value.map_or(0.0, json_f64)),
  }
}

fn json_i64(value: &Value) -> i64 {
  match value {
    Value::Number(n) => n.as_i64().unwrap_or_else(|| n.as_f64().unwrap_or(0.0) as i64),
    Value::String(s) => s.parse().unwrap_or(0),
    Value::Bool(true) => 1,
    _ => 0,
  }
}

fn json_f64(value: &Value) -> f64 {
  match value {
    Value::Number(n) => n.as_f64().unwrap_or(0.0),
    Value::String(s) => s.parse().unwrap_or(0.0),
    _ => 0.0,
  }
}

impl<C: SqlLedger> DocumentRepository for SqlRepository<C> {
  type Error = Error;

  async fn write(&self, document: &Value) -> Result<u64> {
    let bytes = serde_json::to_vec(document)?;
    self.write_one(&bytes).await
  }

  /// As in the KV backend, a document without its primary key is logged and
  /// skipped in batch writes instead of aborting the batch.
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

  /// The filter clause is appended verbatim after `WHERE`: callers are
  /// trusted operators, not untrusted input. This is a documented trust
  /// boundary.
  async fn read(&self, query: &DocQuery) -> Result<Vec<Vec<u8>>> {
    let mut base = format!(
      "SELECT \"{}\",{VALUE_COLUMN} FROM {}",
      self.pagination_column().name,
      self.collection
    );
    if !query.filter.is_empty() {
      base.push_str(" WHERE ");
      base.push_str(&query.filter);
    }

    self.read_pages(&base).await
  }

  /// The selector is a temporal/filter clause; when empty, `SINCE TX 1 UNTIL
  /// NOW()` makes the scan visit every historical row version. The SQL
  /// backend has no per-row revision counter, so entries are numbered in
  /// returned (descending primary) order with a zero transaction id.
  async fn history(&self, selector: &str) -> Result<Vec<HistoryEntry>> {
    let mut base = format!(
      "SELECT \"{}\",{VALUE_COLUMN} FROM {} ",
      self.pagination_column().name,
      self.collection
    );
    if selector.is_empty() {
      base.push_str("SINCE TX 1 UNTIL NOW()");
    } else {
      base.push_str(selector);
    }

    let documents = self.read_pages(&base).await?;
    Ok(
      documents
        .into_iter()
        .zip(1u64..)
        .map(|(entry, revision)| HistoryEntry { entry, tx_id: 0, revision })
        .collect(),
    )
  }
}
