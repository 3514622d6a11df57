//! Collection metadata — the unit of schema in ledgertail.
//!
//! A collection names a logical document set together with the backend it is
//! stored in and the fields that are indexed (KV) or typed as columns (SQL).
//! The schema is immutable once created: every writer and reader resolves the
//! same stored config before operating.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::{Error, Result};

// ─── Backend kind ────────────────────────────────────────────────────────────

/// Which repository implementation serves a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
  Kv,
  Sql,
  Vault,
}

// ─── Column types ────────────────────────────────────────────────────────────

/// Declared on-disk type of a SQL column.
///
/// Parsed from the declared strings of the ledger's SQL dialect; an
/// unrecognised string fails with [`Error::UnsupportedType`] at schema load,
/// which makes write-time coercion total over this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
  Integer,
  /// `INTEGER AUTO_INCREMENT` — populated by the engine, never bound on write.
  IntegerAutoInc,
  /// `VARCHAR` with an optional declared length, e.g. `VARCHAR[256]`.
  Varchar(Option<u32>),
  Timestamp,
  Boolean,
  Float,
}

impl ColumnType {
  pub fn is_auto_increment(self) -> bool {
    self == ColumnType::IntegerAutoInc
  }

  /// Whether keyset-pagination literals of this type need single quotes.
  pub fn is_quoted(self) -> bool {
    matches!(self, ColumnType::Varchar(_))
  }
}

impl fmt::Display for ColumnType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ColumnType::Integer => write!(f, "INTEGER"),
      ColumnType::IntegerAutoInc => write!(f, "INTEGER AUTO_INCREMENT"),
      ColumnType::Varchar(None) => write!(f, "VARCHAR"),
      ColumnType::Varchar(Some(n)) => write!(f, "VARCHAR[{n}]"),
      ColumnType::Timestamp => write!(f, "TIMESTAMP"),
      ColumnType::Boolean => write!(f, "BOOLEAN"),
      ColumnType::Float => write!(f, "FLOAT"),
    }
  }
}

impl FromStr for ColumnType {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "INTEGER" => Ok(ColumnType::Integer),
      "INTEGER AUTO_INCREMENT" => Ok(ColumnType::IntegerAutoInc),
      "TIMESTAMP" => Ok(ColumnType::Timestamp),
      "BOOLEAN" => Ok(ColumnType::Boolean),
      "FLOAT" => Ok(ColumnType::Float),
      _ if s.starts_with("VARCHAR") => {
        let rest = &s["VARCHAR".len()..];
        if rest.is_empty() {
          return Ok(ColumnType::Varchar(None));
        }
        let n = rest
          .strip_prefix('[')
          .and_then(|r| r.strip_suffix(']'))
          .and_then(|r| r.parse().ok())
          .ok_or_else(|| Error::UnsupportedType(s.to_owned()))?;
        Ok(ColumnType::Varchar(Some(n)))
      }
      _ => Err(Error::UnsupportedType(s.to_owned())),
    }
  }
}

// Serialised as the declared string so stored configs stay readable and
// compatible with configs written by other tooling.
impl Serialize for ColumnType {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&self.to_string())
  }
}

impl<'de> Deserialize<'de> for ColumnType {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(de::Error::custom)
  }
}

/// One declared column of a SQL-backed collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlColumn {
  pub name:    String,
  #[serde(rename = "type")]
  pub ctype:   ColumnType,
  pub primary: bool,
}

impl SqlColumn {
  /// Parse `name=TYPE` definitions into a column config, marking the members
  /// of the comma-separated `primary_key` list as primary.
  pub fn parse_list(primary_key: &str, defs: &[String]) -> Result<Vec<SqlColumn>> {
    let primaries: Vec<&str> = primary_key.split(',').collect();
    defs
      .iter()
      .map(|def| {
        let (name, ctype) = def
          .split_once('=')
          .ok_or_else(|| Error::InvalidColumn(def.clone()))?;
        Ok(SqlColumn {
          name:    name.to_owned(),
          ctype:   ctype.parse()?,
          primary: primaries.contains(&name),
        })
      })
      .collect()
  }
}

// ─── Collection config ───────────────────────────────────────────────────────

/// Per-collection schema, stored once at creation time and never changed.
///
/// `indexes[0]` is the primary key; a composite primary key joins its parts
/// with `+` in the field name. SQL collections additionally carry the typed
/// column list; `columns[0]` is the pagination (primary) column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionConfig {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub parser:  Option<String>,
  #[serde(rename = "type")]
  pub backend: BackendKind,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub indexes: Vec<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub columns: Vec<SqlColumn>,
}

impl CollectionConfig {
  /// The primary index field (possibly `+`-composite). KV collections must
  /// have at least one index.
  pub fn primary_index(&self) -> Option<&str> {
    self.indexes.first().map(String::as_str)
  }
}
