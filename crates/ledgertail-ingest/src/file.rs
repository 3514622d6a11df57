//! [`FileSource`] — glob-matched file tailing with a resume registry.
//!
//! Each matched file gets its own reader task; all of them feed one channel.
//! The registry remembers, per path, the first bytes of the file (an identity
//! fingerprint), how many of them were recorded, and the byte offset read so
//! far. On restart a file is resumed from its offset only when the stored
//! prefix still matches what is on disk; rotation or replacement therefore
//! re-reads from the start instead of skipping into a different file.

use std::{
  collections::{HashMap, HashSet},
  io::SeekFrom,
  path::{Path, PathBuf},
  sync::{Arc, Mutex},
  time::Duration,
};

use serde::{Deserialize, Serialize};
use tokio::{
  fs::File,
  io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, BufReader},
  sync::mpsc,
  task::JoinSet,
};
use tracing::{debug, error, info, warn};

use crate::{Error, Result, service::LineSource};

const REGISTRY_FILE: &str = "registry-file.json";
const PREFIX_LIMIT: usize = 1000;
const RESCAN_INTERVAL: Duration = Duration::from_secs(30);
const POLL_INTERVAL: Duration = Duration::from_millis(500);
const CHANNEL_CAPACITY: usize = 128;

/// Per-file resume checkpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Checkpoint {
  prefix:        String,
  prefix_length: usize,
  offset:        u64,
}

type Registry = Arc<Mutex<HashMap<String, Checkpoint>>>;

#[derive(Debug, Clone)]
pub struct FileSourceConfig {
  /// Glob pattern selecting the files to tail.
  pub pattern:          String,
  /// Keep polling for appended data and newly matching files.
  pub follow:           bool,
  /// Persist and honour the resume registry.
  pub registry_enabled: bool,
  /// Directory holding the registry file; current directory when unset.
  pub registry_dir:     Option<PathBuf>,
}

pub struct FileSource {
  rx:               mpsc::Receiver<String>,
  registry:         Registry,
  registry_enabled: bool,
  registry_path:    PathBuf,
}

impl FileSource {
  pub async fn new(config: FileSourceConfig) -> Result<Self> {
    let registry_path = match &config.registry_dir {
      Some(dir) => {
        let meta = tokio::fs::metadata(dir).await.map_err(|err| {
          Error::Source(format!("could not stat registry directory: {err}"))
        })?;
        if !meta.is_dir() {
          return Err(Error::Source("registry folder is not a directory".into()));
        }
        dir.join(REGISTRY_FILE)
      }
      None => PathBuf::from(REGISTRY_FILE),
    };

    let mut checkpoints = HashMap::new();
    if config.registry_enabled {
      match tokio::fs::read(&registry_path).await {
        Err(err) => {
          info!(path = %registry_path.display(), %err, "registry file cannot be read")
        }
        Ok(bytes) => match serde_json::from_slice(&bytes) {
          Err(err) => {
            info!(path = %registry_path.display(), %err, "registry file cannot be parsed, ignoring")
          }
          Ok(parsed) => checkpoints = parsed,
        },
      }
    }

    let registry: Registry = Arc::new(Mutex::new(checkpoints));
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    tokio::spawn(watch_files(
      config.pattern.clone(),
      config.follow,
      Arc::clone(&registry),
      tx,
    ));

    Ok(FileSource {
      rx,
      registry,
      registry_enabled: config.registry_enabled,
      registry_path,
    })
  }
}

impl LineSource for FileSource {
  async fn next_line(&mut self) -> Option<String> {
    // mpsc recv is cancellation-safe: a cancelled call consumes nothing.
    self.rx.recv().await
  }

  async fn save_state(&mut self) {
    if !self.registry_enabled {
      return;
    }

    let bytes = {
      let checkpoints = self.registry.lock().unwrap();
      serde_json::to_vec(&*checkpoints)
    };
    match bytes {
      Err(err) => error!(%err, "could not serialise file registry"),
      Ok(bytes) => match tokio::fs::write(&self.registry_path, bytes).await {
        Err(err) => {
          error!(path = %self.registry_path.display(), %err, "could not write file registry")
        }
        Ok(()) => info!(path = %self.registry_path.display(), "saved file source state"),
      },
    }
  }
}

/// Supervisor: scans the glob, spawns one reader task per matched file, and
/// (when following) rescans for newly appearing matches. The line channel
/// closes once every reader is done and no rescan is pending.
async fn watch_files(pattern: String, follow: bool, registry: Registry, tx: mpsc::Sender<String>) {
  let mut readers = JoinSet::new();
  let mut active: HashSet<PathBuf> = HashSet::new();

  loop {
    match glob::glob(&pattern) {
      Err(err) => error!(%err, pattern, "could not glob for pattern"),
      Ok(paths) => {
        for path in paths.filter_map(|p| p.ok()) {
          if !active.insert(path.clone()) {
            continue;
          }
          debug!(file = %path.display(), "monitoring new file");
          readers.spawn(tail_file(path, follow, Arc::clone(&registry), tx.clone()));
        }
      }
    }

    if !follow {
      break;
    }
    tokio::time::sleep(RESCAN_INTERVAL).await;
  }

  while readers.join_next().await.is_some() {}
  // tx drops here, closing the channel and draining the service.
}

/// Tail a single file, sending complete lines and advancing its checkpoint.
async fn tail_file(path: PathBuf, follow: bool, registry: Registry, tx: mpsc::Sender<String>) {
  let key = path.display().to_string();

  let file = match File::open(&path).await {
    Ok(file) => file,
    Err(err) => {
      warn!(file = %key, %err, "could not open file, skipping");
      return;
    }
  };

  let mut reader = BufReader::new(file);
  let mut checkpoint = match resume_point(&mut reader, &registry, &key).await {
    Ok(checkpoint) => checkpoint,
    Err(err) => {
      warn!(file = %key, %err, "could not position in file, skipping");
      return;
    }
  };

  let mut line = String::new();
  loop {
    line.clear();
    match reader.read_line(&mut line).await {
      Err(err) => {
        error!(file = %key, %err, "could not read line, closing");
        return;
      }
      Ok(0) => {
        if !follow {
          info!(file = %key, "file drained");
          return;
        }
        if truncated(&path, checkpoint.offset).await {
          debug!(file = %key, "detected truncation, restarting from top");
          checkpoint = Checkpoint::default();
          registry.lock().unwrap().insert(key.clone(), checkpoint.clone());
          if reader.seek(SeekFrom::Start(0)).await.is_err() {
            return;
          }
        }
        tokio::time::sleep(POLL_INTERVAL).await;
      }
      Ok(n) => {
        let text = line.trim_end_matches(['\n', '\r']).to_owned();
        if tx.send(text).await.is_err() {
          return; // receiver gone, stop tailing
        }

        checkpoint.offset += n as u64;
        if checkpoint.prefix_length < PREFIX_LIMIT {
          checkpoint.prefix.push_str(&line);
          checkpoint.prefix_length += line.len();
        }
        registry.lock().unwrap().insert(key.clone(), checkpoint.clone());
      }
    }
  }
}

/// Decide where to start reading: at the recorded offset when the stored
/// prefix still matches the bytes on disk, else from the beginning with a
/// fresh checkpoint.
async fn resume_point(
  reader: &mut BufReader<File>,
  registry: &Registry,
  key: &str,
) -> std::io::Result<Checkpoint> {
  let stored = registry.lock().unwrap().get(key).cloned();

  if let Some(stored) = stored
    && stored.offset > 0
    && stored.prefix_length > 0
  {
    let mut buf = vec![0u8; stored.prefix_length];
    match reader.read_exact(&mut buf).await {
      Ok(_) if buf == stored.prefix.as_bytes() => {
        debug!(file = key, offset = stored.offset, "resuming previous file");
        reader.seek(SeekFrom::Start(stored.offset)).await?;
        return Ok(stored);
      }
      Ok(_) => debug!(file = key, "prefix mismatch, reading from start"),
      Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
        debug!(file = key, "file shorter than stored prefix, reading from start")
      }
      Err(err) => return Err(err),
    }
  }

  reader.seek(SeekFrom::Start(0)).await?;
  let fresh = Checkpoint::default();
  registry.lock().unwrap().insert(key.to_owned(), fresh.clone());
  Ok(fresh)
}

/// A file whose size dropped below the recorded offset was truncated.
async fn truncated(path: &Path, offset: u64) -> bool {
  match tokio::fs::metadata(path).await {
    Ok(meta) => meta.len() < offset,
    Err(_) => false,
  }
}
