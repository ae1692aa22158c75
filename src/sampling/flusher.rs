use std::sync::Arc;

use tokio::{sync::mpsc, task::JoinHandle, time::Instant};

use crate::models::Sample;
use crate::sinks::{NotificationSink, PersistenceSink, Table, EVENT_NEW_DATA};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    pub batches_flushed: u64,
    pub samples_flushed: u64,
    pub batches_failed: u64,
    pub samples_dropped: u64,
}

/// Persistence off the sampling path.
///
/// Batches go through an unbounded queue so `submit` never waits on storage.
/// Batches are written one at a time in submission order. A failed batch is
/// logged and dropped, not retried.
pub struct FlushWorker {
    tx: mpsc::UnboundedSender<Vec<Sample>>,
    handle: JoinHandle<FlushStats>,
}

impl FlushWorker {
    pub fn spawn(
        sink: Arc<dyn PersistenceSink>,
        notifier: Arc<dyn NotificationSink>,
        verbose: bool,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(flush_loop(rx, sink, notifier, verbose));
        Self { tx, handle }
    }

    pub fn submit(&self, batch: Vec<Sample>) {
        let size = batch.len();
        if self.tx.send(batch).is_err() {
            log_error!("flush task is gone; dropping batch of {size} samples");
        }
    }

    /// Closes the queue and waits for every submitted batch to be attempted.
    pub async fn finish(self) -> FlushStats {
        drop(self.tx);
        match self.handle.await {
            Ok(stats) => stats,
            Err(err) => {
                log_error!("flush task failed to join: {err}");
                FlushStats::default()
            }
        }
    }
}

async fn flush_loop(
    mut rx: mpsc::UnboundedReceiver<Vec<Sample>>,
    sink: Arc<dyn PersistenceSink>,
    notifier: Arc<dyn NotificationSink>,
    verbose: bool,
) -> FlushStats {
    let mut stats = FlushStats::default();

    while let Some(batch) = rx.recv().await {
        let size = batch.len() as u64;
        let started = Instant::now();
        match sink.save_batch(batch, Table::RotationData).await {
            Ok(()) => {
                stats.batches_flushed += 1;
                stats.samples_flushed += size;
                if verbose {
                    log_debug!(
                        "Saved {size} rotation samples in {}ms",
                        started.elapsed().as_millis()
                    );
                }
                notifier.emit(EVENT_NEW_DATA);
            }
            Err(err) => {
                stats.batches_failed += 1;
                stats.samples_dropped += size;
                log_warn!("dropping batch of {size} rotation samples: {err:#}");
            }
        }
    }

    stats
}
