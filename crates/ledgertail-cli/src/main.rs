//! `ledgertail` — ship log lines into a tamper-evident ledger and query them
//! back, with full revision history.
//!
//! # Usage
//!
//! ```
//! ledgertail create kv pglogs --parser pgaudit
//! ledgertail tail pglogs "/var/log/postgresql/*.log" --follow
//! ledgertail read pglogs --field class --filter WRITE
//! ledgertail history pglogs 42
//! ```

mod client;
mod repo;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;

use ledgertail_core::{parser, repository::{DocQuery, DocumentRepository}, schema::SchemaStore};
use ledgertail_ingest::{FileSource, FileSourceConfig, IngestService};
use ledgertail_ledger::{KvRepository, SqlRepository};
use ledgertail_vault::{
  VaultClient, VaultConfig,
  api::{CollectionSchema, FieldDef, FieldType, IndexDef},
  setup_collection,
};

use client::{LedgerClient, LedgerConfig};
use repo::{open_repository, open_vault_repository};

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "ledgertail", version, about = "Store and audit log lines in a versioned ledger")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "ledgertail.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Create a collection.
  Create {
    #[command(subcommand)]
    backend: CreateBackend,
  },

  /// Tail files matching a glob pattern into a collection.
  Tail {
    collection: String,
    /// Glob pattern of files to tail.
    pattern:    String,

    /// Keep following files for appended data and new matches.
    #[arg(long)]
    follow: bool,

    /// Line parser override; defaults to the collection's configured parser.
    #[arg(long)]
    parser: Option<String>,

    /// Target the document vault instead of the ledger.
    #[arg(long)]
    vault: bool,

    /// Group vault writes into batched calls.
    #[arg(long)]
    batch_mode: bool,

    /// Persist per-file resume checkpoints.
    #[arg(long, default_value_t = true)]
    file_registry: bool,

    /// Directory for the checkpoint registry; current directory when unset.
    #[arg(long)]
    file_registry_dir: Option<PathBuf>,
  },

  /// Read the latest document versions from a collection.
  Read {
    collection: String,

    /// Indexed field to match on (KV backend); defaults to the primary key.
    #[arg(long)]
    field: Option<String>,

    /// Value prefix (KV), SQL condition (SQL), or query document (vault).
    #[arg(long, default_value = "")]
    filter: String,

    /// Target the document vault instead of the ledger.
    #[arg(long)]
    vault: bool,
  },

  /// Enumerate the revisions of a document.
  History {
    collection: String,
    /// Primary key value (KV), temporal clause (SQL), or document id (vault).
    #[arg(default_value = "")]
    selector:   String,

    /// Target the document vault instead of the ledger.
    #[arg(long)]
    vault: bool,
  },
}

#[derive(Subcommand)]
enum CreateBackend {
  /// Index documents as raw key-value entries.
  Kv {
    collection: String,

    /// Line parser for this collection: 'pgaudit', 'wrap', or none for
    /// plain JSON lines. pgaudit and wrap come with predefined indexes.
    #[arg(long)]
    parser: Option<String>,

    /// JSON fields to index. The first is the unique primary key; combine
    /// fields with '+' for a composite key.
    #[arg(long, value_delimiter = ',')]
    indexes: Vec<String>,
  },

  /// Map documents onto a typed SQL table.
  Sql {
    collection: String,

    /// Line parser for this collection; pgaudit and wrap come with
    /// predefined columns.
    #[arg(long)]
    parser: Option<String>,

    /// Primary key column(s), comma separated.
    #[arg(long, value_delimiter = ',')]
    primary_key: Vec<String>,

    /// Column definitions, `name=TYPE` each.
    #[arg(long, value_delimiter = ',')]
    columns: Vec<String>,
  },

  /// Create the collection in the document vault.
  Vault {
    collection: String,

    /// Line parser; pgaudit comes with a predefined field schema.
    #[arg(long)]
    parser: Option<String>,

    /// Collection schema as a JSON document (fields, indexes).
    #[arg(long)]
    schema: Option<String>,
  },
}

// ─── Config file ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, Default)]
struct Settings {
  #[serde(default)]
  ledger: LedgerSettings,
  #[serde(default)]
  vault:  VaultSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct LedgerSettings {
  url:      String,
  database: String,
  username: String,
  password: String,
}

impl Default for LedgerSettings {
  fn default() -> Self {
    LedgerSettings {
      url:      "http://localhost:8091/api/v2".to_owned(),
      database: "defaultdb".to_owned(),
      username: "immudb".to_owned(),
      password: "immudb".to_owned(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct VaultSettings {
  url:     String,
  api_key: String,
  ledger:  String,
}

impl Default for VaultSettings {
  fn default() -> Self {
    VaultSettings {
      url:     ledgertail_vault::client::DEFAULT_BASE_URL.to_owned(),
      api_key: String::new(),
      ledger:  "default".to_owned(),
    }
  }
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("LEDGERTAIL").separator("__"))
    .build()
    .context("failed to read config file")?;
  let settings: Settings = settings
    .try_deserialize()
    .context("failed to deserialise settings")?;

  match cli.command {
    Command::Create { backend } => create(backend, &settings).await,
    Command::Tail {
      collection,
      pattern,
      follow,
      parser,
      vault,
      batch_mode,
      file_registry,
      file_registry_dir,
    } => {
      tail(
        &settings,
        &collection,
        TailOptions {
          pattern,
          follow,
          parser,
          vault,
          batch_mode,
          file_registry,
          file_registry_dir,
        },
      )
      .await
    }
    Command::Read { collection, field, filter, vault } => {
      read(&settings, &collection, field, filter, vault).await
    }
    Command::History { collection, selector, vault } => {
      history(&settings, &collection, &selector, vault).await
    }
  }
}

async fn ledger_client(settings: &Settings) -> Result<LedgerClient> {
  LedgerClient::connect(LedgerConfig {
    base_url: settings.ledger.url.clone(),
    database: settings.ledger.database.clone(),
    username: settings.ledger.username.clone(),
    password: settings.ledger.password.clone(),
  })
  .await
  .context("could not connect to ledger")
}

fn vault_client(settings: &Settings) -> Result<VaultClient> {
  if settings.vault.api_key.is_empty() {
    bail!("vault api key is not configured");
  }
  VaultClient::new(VaultConfig {
    base_url: settings.vault.url.clone(),
    api_key:  settings.vault.api_key.clone(),
    ledger:   settings.vault.ledger.clone(),
  })
  .context("could not build vault client")
}

/// Validate a parser name by resolving it in the registry.
fn check_parser(name: &Option<String>) -> Result<()> {
  if let Some(name) = name {
    parser::by_name(name).with_context(|| format!("invalid line parser {name}"))?;
  }
  Ok(())
}

// ─── create ───────────────────────────────────────────────────────────────────

async fn create(backend: CreateBackend, settings: &Settings) -> Result<()> {
  match backend {
    CreateBackend::Kv { collection, parser, mut indexes } => {
      check_parser(&parser)?;
      if let Some(defaults) = default_kv_indexes(parser.as_deref()) {
        info!(indexes = ?defaults, "using default indexes for parser");
        indexes = defaults;
      }
      if indexes.is_empty() {
        bail!("at least the primary key needs to be specified");
      }

      let client = ledger_client(settings).await?;
      KvRepository::setup(&client, &collection, parser, indexes)
        .await
        .context("could not create kv collection")?;
    }

    CreateBackend::Sql { collection, parser, mut primary_key, mut columns } => {
      check_parser(&parser)?;
      if let Some((pk, cols)) = default_sql_columns(parser.as_deref()) {
        info!(columns = ?cols, primary_key = ?pk, "using default columns for parser");
        primary_key = pk;
        columns = cols;
      }
      if columns.is_empty() || primary_key.is_empty() {
        bail!("at least one column and the primary key need to be specified");
      }

      let client = ledger_client(settings).await?;
      let schema = SchemaStore::new(client.clone());
      SqlRepository::setup(
        &client,
        &schema,
        &collection,
        &primary_key.join(","),
        &columns,
        parser,
      )
      .await
      .context("could not create sql collection")?;
    }

    CreateBackend::Vault { collection, parser, schema } => {
      check_parser(&parser)?;
      let schema = match schema {
        Some(raw) => {
          Some(serde_json::from_str(&raw).context("invalid collection schema")?)
        }
        None => default_vault_schema(parser.as_deref()),
      };

      let client = vault_client(settings)?;
      setup_collection(&client, &collection, schema)
        .await
        .context("could not create vault collection")?;
    }
  }

  Ok(())
}

fn default_kv_indexes(parser: Option<&str>) -> Option<Vec<String>> {
  let fields: &[&str] = match parser {
    Some("pgaudit") => &[
      "uid",
      "statement_id",
      "substatement_id",
      "server_timestamp",
      "timestamp",
      "audit_type",
      "class",
      "command",
    ],
    Some("wrap") => &["uid", "log_timestamp"],
    _ => return None,
  };
  Some(fields.iter().map(|s| s.to_string()).collect())
}

fn default_sql_columns(parser: Option<&str>) -> Option<(Vec<String>, Vec<String>)> {
  let (pk, columns): (&str, &[&str]) = match parser {
    Some("pgaudit") => ("id", &[
      "id=INTEGER AUTO_INCREMENT",
      "statement_id=INTEGER",
      "substatement_id=INTEGER",
      "server_timestamp=TIMESTAMP",
      "timestamp=TIMESTAMP",
      "audit_type=VARCHAR[256]",
      "class=VARCHAR[256]",
      "command=VARCHAR[256]",
    ]),
    Some("wrap") => ("uid", &["uid=VARCHAR[36]", "log_timestamp=TIMESTAMP"]),
    _ => return None,
  };
  Some((
    vec![pk.to_owned()],
    columns.iter().map(|s| s.to_string()).collect(),
  ))
}

fn default_vault_schema(parser: Option<&str>) -> Option<CollectionSchema> {
  match parser {
    Some("pgaudit") => {
      let field = |name: &str, ftype| FieldDef { name: name.to_owned(), ftype };
      let index = |name: &str| IndexDef { fields: vec![name.to_owned()] };
      Some(CollectionSchema {
        fields:  vec![
          field("statement_id", FieldType::Integer),
          field("substatement_id", FieldType::Integer),
          field("timestamp", FieldType::String),
          field("audit_type", FieldType::String),
          field("class", FieldType::String),
          field("command", FieldType::String),
        ],
        indexes: vec![
          index("statement_id"),
          index("substatement_id"),
          index("audit_type"),
          index("class"),
          index("command"),
        ],
      })
    }
    _ => None,
  }
}

// ─── tail ─────────────────────────────────────────────────────────────────────

struct TailOptions {
  pattern:           String,
  follow:            bool,
  parser:            Option<String>,
  vault:             bool,
  batch_mode:        bool,
  file_registry:     bool,
  file_registry_dir: Option<PathBuf>,
}

async fn tail(settings: &Settings, collection: &str, options: TailOptions) -> Result<()> {
  let (repository, parser_name) = if options.vault {
    (
      open_vault_repository(vault_client(settings)?, collection, options.batch_mode),
      options.parser.clone(),
    )
  } else {
    let client = ledger_client(settings).await?;
    let (repository, configured) = open_repository(&client, collection)
      .await
      .with_context(|| format!("could not open collection {collection}"))?;
    (repository, options.parser.clone().or(configured))
  };

  let line_parser = parser::by_name(parser_name.as_deref().unwrap_or(""))
    .context("invalid line parser")?;

  let source = FileSource::new(FileSourceConfig {
    pattern:          options.pattern,
    follow:           options.follow,
    registry_enabled: options.file_registry,
    registry_dir:     options.file_registry_dir,
  })
  .await
  .context("invalid source")?;

  IngestService::new(source, line_parser, repository)
    .run()
    .await
    .context("ingestion failed")
}

// ─── read / history ───────────────────────────────────────────────────────────

async fn read(
  settings: &Settings,
  collection: &str,
  field: Option<String>,
  filter: String,
  vault: bool,
) -> Result<()> {
  let repository = if vault {
    open_vault_repository(vault_client(settings)?, collection, false)
  } else {
    let client = ledger_client(settings).await?;
    open_repository(&client, collection).await?.0
  };

  let query = DocQuery { field, filter };
  for document in repository.read(&query).await? {
    println!("{}", String::from_utf8_lossy(&document));
  }
  Ok(())
}

async fn history(
  settings: &Settings,
  collection: &str,
  selector: &str,
  vault: bool,
) -> Result<()> {
  let repository = if vault {
    open_vault_repository(vault_client(settings)?, collection, false)
  } else {
    let client = ledger_client(settings).await?;
    open_repository(&client, collection).await?.0
  };

  for entry in repository.history(selector).await? {
    println!(
      "revision {} (tx {}): {}",
      entry.revision,
      entry.tx_id,
      String::from_utf8_lossy(&entry.entry)
    );
  }
  Ok(())
}
