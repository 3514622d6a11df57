//! Tests for the ingestion service and the file source.

use std::{
  path::PathBuf,
  sync::{Arc, Mutex},
  time::Duration,
};

use serde_json::Value;
use tokio::sync::mpsc;

use ledgertail_core::{
  parser,
  repository::{DocQuery, DocumentRepository, HistoryEntry},
};

use crate::{
  Error, FileSource, FileSourceConfig, IngestService,
  service::LineSource,
};

// ─── Fakes ───────────────────────────────────────────────────────────────────

/// Shared event log asserting flush/save ordering.
type Events = Arc<Mutex<Vec<String>>>;

struct ChannelSource {
  rx:     mpsc::Receiver<String>,
  events: Events,
}

impl LineSource for ChannelSource {
  async fn next_line(&mut self) -> Option<String> {
    self.rx.recv().await
  }

  async fn save_state(&mut self) {
    self.events.lock().unwrap().push("save".to_owned());
  }
}

fn channel_source(events: Events) -> (mpsc::Sender<String>, ChannelSource) {
  let (tx, rx) = mpsc::channel(64);
  (tx, ChannelSource { rx, events })
}

#[derive(Clone)]
struct RecordingRepo {
  batches: Arc<Mutex<Vec<Vec<Vec<u8>>>>>,
  events:  Events,
  fail:    bool,
}

impl RecordingRepo {
  fn new(events: Events) -> Self {
    RecordingRepo { batches: Arc::default(), events, fail: false }
  }

  fn failing(events: Events) -> Self {
    RecordingRepo { fail: true, ..Self::new(events) }
  }

  fn lines(&self) -> Vec<String> {
    self
      .batches
      .lock()
      .unwrap()
      .iter()
      .flatten()
      .map(|b| String::from_utf8(b.clone()).unwrap())
      .collect()
  }
}

impl DocumentRepository for RecordingRepo {
  type Error = ledgertail_core::Error;

  async fn write(&self, document: &Value) -> Result<u64, Self::Error> {
    self.write_batch(&[serde_json::to_vec(document)?]).await
  }

  async fn write_batch(&self, documents: &[Vec<u8>]) -> Result<u64, Self::Error> {
    if self.fail {
      return Err(ledgertail_core::Error::Parse("store unavailable".into()));
    }
    let mut batches = self.batches.lock().unwrap();
    batches.push(documents.to_vec());
    self.events.lock().unwrap().push("flush".to_owned());
    Ok(batches.len() as u64)
  }

  async fn read(&self, _query: &DocQuery) -> Result<Vec<Vec<u8>>, Self::Error> {
    Ok(vec![])
  }

  async fn history(&self, _selector: &str) -> Result<Vec<HistoryEntry>, Self::Error> {
    Ok(vec![])
  }
}

fn service(
  source: ChannelSource,
  repo: RecordingRepo,
  buffer_size: usize,
) -> IngestService<ChannelSource, RecordingRepo> {
  IngestService::new(source, parser::by_name("json").unwrap(), repo)
    .with_buffering(buffer_size, Duration::from_secs(3600))
}

// ─── Service ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn flushes_at_buffer_threshold() {
  let events: Events = Arc::default();
  let (tx, source) = channel_source(Arc::clone(&events));
  let repo = RecordingRepo::new(events);

  for i in 0..5 {
    tx.send(format!(r#"{{"i":{i}}}"#)).await.unwrap();
  }
  drop(tx);

  service(source, repo.clone(), 2).run().await.unwrap();

  let sizes: Vec<usize> = repo.batches.lock().unwrap().iter().map(Vec::len).collect();
  assert_eq!(sizes, [2, 2, 1]);
}

#[tokio::test]
async fn malformed_lines_are_dropped() {
  let events: Events = Arc::default();
  let (tx, source) = channel_source(Arc::clone(&events));
  let repo = RecordingRepo::new(events);

  tx.send(r#"{"ok":1}"#.to_owned()).await.unwrap();
  tx.send("not json at all".to_owned()).await.unwrap();
  tx.send(r#"{"ok":2}"#.to_owned()).await.unwrap();
  drop(tx);

  service(source, repo.clone(), 100).run().await.unwrap();

  assert_eq!(repo.lines(), [r#"{"ok":1}"#, r#"{"ok":2}"#]);
}

#[tokio::test]
async fn drain_flushes_then_saves_state() {
  let events: Events = Arc::default();
  let (tx, source) = channel_source(Arc::clone(&events));
  let repo = RecordingRepo::new(Arc::clone(&events));

  tx.send(r#"{"i":1}"#.to_owned()).await.unwrap();
  drop(tx);

  service(source, repo, 100).run().await.unwrap();

  // The checkpoint must only be saved after the remainder reached the store.
  assert_eq!(*events.lock().unwrap(), ["flush", "save"]);
}

#[tokio::test]
async fn empty_source_saves_state_without_flushing() {
  let events: Events = Arc::default();
  let (tx, source) = channel_source(Arc::clone(&events));
  let repo = RecordingRepo::new(Arc::clone(&events));
  drop(tx);

  service(source, repo, 100).run().await.unwrap();
  assert_eq!(*events.lock().unwrap(), ["save"]);
}

#[tokio::test]
async fn write_failure_stops_ingestion() {
  let events: Events = Arc::default();
  let (tx, source) = channel_source(Arc::clone(&events));
  let repo = RecordingRepo::failing(Arc::clone(&events));

  tx.send(r#"{"i":1}"#.to_owned()).await.unwrap();
  drop(tx);

  let err = service(source, repo, 1).run().await.unwrap_err();
  assert!(matches!(err, Error::Store(_)));
  // No checkpoint save after a failed write.
  assert!(events.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn interval_tick_flushes_partial_buffer() {
  let events: Events = Arc::default();
  let (tx, source) = channel_source(Arc::clone(&events));
  let repo = RecordingRepo::new(events);

  let svc = IngestService::new(source, parser::by_name("json").unwrap(), repo.clone())
    .with_buffering(100, Duration::from_millis(50));
  let handle = tokio::spawn(svc.run());

  tx.send(r#"{"i":1}"#.to_owned()).await.unwrap();
  tokio::time::sleep(Duration::from_millis(120)).await;
  assert_eq!(repo.lines(), [r#"{"i":1}"#]);

  drop(tx);
  handle.await.unwrap().unwrap();
}

// ─── File source ─────────────────────────────────────────────────────────────

struct TempDir(PathBuf);

impl TempDir {
  fn new(tag: &str) -> Self {
    let dir = std::env::temp_dir().join(format!(
      "ledgertail-test-{tag}-{}",
      uuid_like()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    TempDir(dir)
  }

  fn path(&self, name: &str) -> PathBuf {
    self.0.join(name)
  }
}

impl Drop for TempDir {
  fn drop(&mut self) {
    let _ = std::fs::remove_dir_all(&self.0);
  }
}

fn uuid_like() -> String {
  use std::time::{SystemTime, UNIX_EPOCH};
  format!(
    "{}-{}",
    std::process::id(),
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos()
  )
}

async fn collect_lines(mut source: FileSource) -> (Vec<String>, FileSource) {
  let mut lines = Vec::new();
  while let Some(line) = source.next_line().await {
    lines.push(line);
  }
  (lines, source)
}

#[tokio::test]
async fn file_source_reads_matching_files_to_eof() {
  let dir = TempDir::new("read");
  std::fs::write(dir.path("a.log"), "one\ntwo\n").unwrap();
  std::fs::write(dir.path("b.log"), "three\n").unwrap();
  std::fs::write(dir.path("c.txt"), "ignored\n").unwrap();

  let source = FileSource::new(FileSourceConfig {
    pattern:          dir.path("*.log").display().to_string(),
    follow:           false,
    registry_enabled: false,
    registry_dir:     None,
  })
  .await
  .unwrap();

  let (mut lines, _) = collect_lines(source).await;
  lines.sort();
  assert_eq!(lines, ["one", "three", "two"]);
}

#[tokio::test]
async fn file_source_resumes_from_saved_checkpoint() {
  let dir = TempDir::new("resume");
  let log = dir.path("audit.log");
  std::fs::write(&log, "first\nsecond\n").unwrap();

  let config = FileSourceConfig {
    pattern:          log.display().to_string(),
    follow:           false,
    registry_enabled: true,
    registry_dir:     Some(dir.0.clone()),
  };

  let source = FileSource::new(config.clone()).await.unwrap();
  let (lines, mut source) = collect_lines(source).await;
  assert_eq!(lines, ["first", "second"]);
  source.save_state().await;

  // Append; a fresh source with the same registry must skip what was read.
  let mut content = std::fs::read(&log).unwrap();
  content.extend_from_slice(b"third\n");
  std::fs::write(&log, content).unwrap();

  let source = FileSource::new(config).await.unwrap();
  let (lines, _) = collect_lines(source).await;
  assert_eq!(lines, ["third"]);
}

#[tokio::test]
async fn file_source_rereads_replaced_file() {
  let dir = TempDir::new("replace");
  let log = dir.path("audit.log");
  std::fs::write(&log, "old-a\nold-b\n").unwrap();

  let config = FileSourceConfig {
    pattern:          log.display().to_string(),
    follow:           false,
    registry_enabled: true,
    registry_dir:     Some(dir.0.clone()),
  };

  let source = FileSource::new(config.clone()).await.unwrap();
  let (_, mut source) = collect_lines(source).await;
  source.save_state().await;

  // Different content at the same path: the prefix no longer matches, so
  // the stored offset must not be trusted.
  std::fs::write(&log, "new-a\nnew-b\n").unwrap();

  let source = FileSource::new(config).await.unwrap();
  let (lines, _) = collect_lines(source).await;
  assert_eq!(lines, ["new-a", "new-b"]);
}
