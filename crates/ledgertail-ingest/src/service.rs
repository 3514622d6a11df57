//! [`IngestService`] — the buffered line-to-repository pump.

use std::{future::Future, time::Duration};

use tracing::{debug, info, trace};

use ledgertail_core::{parser::LineParser, repository::DocumentRepository};

use crate::{Error, Result};

const DEFAULT_BUFFER_SIZE: usize = 100;
const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// A stream of log lines with a persistent resume checkpoint.
pub trait LineSource: Send {
  /// Next line, or `None` once the source is drained (all inputs at EOF and
  /// not following). Must be cancellation-safe: a cancelled call loses no
  /// line.
  fn next_line(&mut self) -> impl Future<Output = Option<String>> + Send + '_;

  /// Persist the resume checkpoint. Called once, after the final flush.
  fn save_state(&mut self) -> impl Future<Output = ()> + Send + '_;
}

/// Pulls lines from a source, parses them, and writes batches to a
/// repository.
///
/// The buffer flushes when full, on an interval tick, and once more on
/// drain; the checkpoint is saved only after the final flush succeeded, so a
/// crash re-reads lines rather than dropping them.
pub struct IngestService<S, R> {
  source:      S,
  parser:      Box<dyn LineParser>,
  repository:  R,
  buffer_size: usize,
  interval:    Duration,
}

impl<S: LineSource, R: DocumentRepository> IngestService<S, R> {
  pub fn new(source: S, parser: Box<dyn LineParser>, repository: R) -> Self {
    IngestService {
      source,
      parser,
      repository,
      buffer_size: DEFAULT_BUFFER_SIZE,
      interval: DEFAULT_FLUSH_INTERVAL,
    }
  }

  /// Override buffering. Mostly useful in tests.
  pub fn with_buffering(mut self, buffer_size: usize, interval: Duration) -> Self {
    self.buffer_size = buffer_size;
    self.interval = interval;
    self
  }

  /// Run until the source drains or a repository write fails.
  ///
  /// Malformed lines are logged at debug and dropped; a write failure is
  /// fatal and returned as-is, without retrying the batch.
  pub async fn run(self) -> Result<()> {
    let IngestService { mut source, parser, repository, buffer_size, interval } = self;

    // First tick after one full interval, not at startup.
    let mut ticker =
      tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let mut buffer: Vec<Vec<u8>> = Vec::with_capacity(buffer_size);
    loop {
      tokio::select! {
        line = source.next_line() => {
          let Some(line) = line else { break };

          match parser.parse(&line) {
            Ok(bytes) => buffer.push(bytes),
            Err(err) => {
              debug!(%err, line, "invalid line format, skipping");
              continue;
            }
          }

          if buffer.len() >= buffer_size {
            flush(&repository, &mut buffer).await?;
          }
        }
        _ = ticker.tick() => {
          flush(&repository, &mut buffer).await?;
        }
      }
    }

    info!("source drained");
    flush(&repository, &mut buffer).await?;
    source.save_state().await;
    Ok(())
  }
}

async fn flush<R: DocumentRepository>(
  repository: &R,
  buffer: &mut Vec<Vec<u8>>,
) -> Result<()> {
  if buffer.is_empty() {
    return Ok(());
  }

  let tx_id = repository
    .write_batch(buffer)
    .await
    .map_err(Error::store)?;
  trace!(tx_id, lines = buffer.len(), "stored batch");
  buffer.clear();
  Ok(())
}
