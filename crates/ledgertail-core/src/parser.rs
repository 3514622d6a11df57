//! Line parsers — pure transforms from a raw log line to document bytes.
//!
//! A parse failure never stops ingestion; the service logs and drops the
//! line. Parsers may generate a synthetic identifier and capture timestamps,
//! but have no other side effects.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::{Error, Result};

/// `line → document bytes | error`.
pub trait LineParser: Send + Sync {
  fn parse(&self, line: &str) -> Result<Vec<u8>>;
}

/// Look up a parser by its configured name (`parser` field of the collection
/// config). An empty name means lines are already JSON documents.
pub fn by_name(name: &str) -> Result<Box<dyn LineParser>> {
  match name {
    "" | "json" => Ok(Box::new(JsonParser)),
    "wrap" => Ok(Box::new(WrapParser)),
    "pgaudit" => Ok(Box::new(PgAuditParser)),
    other => Err(Error::Parse(format!("not a supported parser: {other}"))),
  }
}

// ─── JSON pass-through ───────────────────────────────────────────────────────

/// Default parser: the line must already be a JSON object and is stored
/// unchanged.
pub struct JsonParser;

impl LineParser for JsonParser {
  fn parse(&self, line: &str) -> Result<Vec<u8>> {
    let value: Value = serde_json::from_str(line)
      .map_err(|e| Error::Parse(format!("not a json line: {e}")))?;
    if !value.is_object() {
      return Err(Error::Parse("not a json object".to_owned()));
    }
    Ok(line.as_bytes().to_vec())
  }
}

// ─── Wrap ────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct Wrap<'a> {
  uid:           String,
  log_timestamp: DateTime<Utc>,
  message:       &'a str,
}

/// Wraps any line into a document with a fresh uid and a capture timestamp.
/// Never fails.
pub struct WrapParser;

impl LineParser for WrapParser {
  fn parse(&self, line: &str) -> Result<Vec<u8>> {
    let wrapped = Wrap {
      uid:           Uuid::new_v4().to_string(),
      log_timestamp: Utc::now(),
      message:       line,
    };
    Ok(serde_json::to_vec(&wrapped)?)
  }
}

// ─── pgaudit ─────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct PgAuditEntry {
  uid:              String,
  timestamp:        DateTime<Utc>,
  server_timestamp: DateTime<Utc>,
  audit_type:       String,
  statement_id:     i64,
  substatement_id:  i64,
  class:            String,
  command:          String,
  object_type:      String,
  object_name:      String,
  statement:        String,
  parameter:        String,
}

/// Parses a stderr-format pgaudit line: a `%m [%p]` prefix followed by
/// `AUDIT:` and a CSV record of at least nine fields.
pub struct PgAuditParser;

// Minimum length of the `YYYY-MM-DD HH:MM:SS.mmm` timestamp that opens the
// default log_line_prefix.
const TS_LEN: usize = 23;
const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

impl LineParser for PgAuditParser {
  fn parse(&self, line: &str) -> Result<Vec<u8>> {
    // `get` also rejects a prefix whose 23rd byte falls inside a multibyte
    // character; such a line cannot start with a valid timestamp.
    let stamp = line
      .get(..TS_LEN)
      .ok_or_else(|| Error::Parse("invalid log line prefix".to_owned()))?;

    // The timezone abbreviation that follows carries no offset information we
    // can rely on; the timestamp is recorded as UTC.
    let naive = NaiveDateTime::parse_from_str(stamp, TS_FORMAT)
      .map_err(|e| Error::Parse(format!("could not parse timestamp: {e}")))?;
    let timestamp = naive.and_utc();

    let marker = "AUDIT: ";
    let pos = line
      .find(marker)
      .ok_or_else(|| Error::Parse("not a pgaudit line".to_owned()))?;
    let csv_part = &line[pos + marker.len()..];

    let mut reader = csv::ReaderBuilder::new()
      .has_headers(false)
      .from_reader(csv_part.as_bytes());
    let record = reader
      .records()
      .next()
      .ok_or_else(|| Error::Parse("empty csv line".to_owned()))?
      .map_err(|e| Error::Parse(format!("invalid csv line: {e}")))?;

    if record.len() < 9 {
      return Err(Error::Parse(format!(
        "invalid csv fields length: {}",
        record.len()
      )));
    }

    let int_field = |i: usize| -> Result<i64> {
      record[i]
        .parse()
        .map_err(|_| Error::Parse(format!("could not parse field {i}")))
    };

    let entry = PgAuditEntry {
      uid:              Uuid::new_v4().to_string(),
      timestamp,
      server_timestamp: Utc::now(),
      audit_type:       record[0].to_owned(),
      statement_id:     int_field(1)?,
      substatement_id:  int_field(2)?,
      class:            record[3].to_owned(),
      command:          record[4].to_owned(),
      object_type:      record[5].to_owned(),
      object_name:      record[6].to_owned(),
      statement:        record[7].to_owned(),
      parameter:        record[8].to_owned(),
    };

    Ok(serde_json::to_vec(&entry)?)
  }
}
