//! Hand-off of pipeline output to a persistence collaborator.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam::channel::{Sender, TrySendError, bounded};
use log::{info, warn};
use parking_lot::Mutex;

use crate::background::BackgroundSnapshot;

use super::pipeline::TrackEvent;

/// Anything the pipeline emits for persistence.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputRecord {
    Track(TrackEvent),
    Background(BackgroundSnapshot),
}

/// Storage backend for pipeline output.
///
/// Implement this trait to connect a database or file writer. Calls happen on
/// the writer thread, never on the pipeline thread, so implementations may
/// block.
///
/// # Example
///
/// ```ignore
/// use lidartrack_rs::{TrackStore, TrackEvent, BackgroundSnapshot};
///
/// struct LogStore;
///
/// impl TrackStore for LogStore {
///     type Error = std::io::Error;
///
///     fn store_track(&mut self, event: &TrackEvent) -> Result<(), Self::Error> {
///         println!("{:?} {}", event.kind, event.snapshot.track_id);
///         Ok(())
///     }
///
///     fn store_background(&mut self, _snapshot: &BackgroundSnapshot) -> Result<(), Self::Error> {
///         Ok(())
///     }
/// }
/// ```
pub trait TrackStore: Send + 'static {
    /// Error type for storage failures.
    type Error: std::fmt::Display;

    fn store_track(&mut self, event: &TrackEvent) -> Result<(), Self::Error>;

    fn store_background(&mut self, snapshot: &BackgroundSnapshot) -> Result<(), Self::Error>;

    /// Called once when the writer shuts down.
    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// In-memory store, mostly for replay analysis and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Arc<Mutex<Vec<OutputRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything stored so far, in arrival order.
    pub fn records(&self) -> Vec<OutputRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl TrackStore for MemoryStore {
    type Error = std::convert::Infallible;

    fn store_track(&mut self, event: &TrackEvent) -> Result<(), Self::Error> {
        self.records.lock().push(OutputRecord::Track(event.clone()));
        Ok(())
    }

    fn store_background(&mut self, snapshot: &BackgroundSnapshot) -> Result<(), Self::Error> {
        self.records
            .lock()
            .push(OutputRecord::Background(snapshot.clone()));
        Ok(())
    }
}

#[derive(Debug, Default)]
struct WriterCounters {
    written: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

/// Bounded queue in front of a [`TrackStore`] running on its own thread.
///
/// `try_write` never blocks: when the queue is full the record is dropped and
/// counted.
pub struct AsyncWriter {
    tx: Option<Sender<OutputRecord>>,
    worker: Option<thread::JoinHandle<()>>,
    counters: Arc<WriterCounters>,
}

impl AsyncWriter {
    pub fn spawn<S: TrackStore>(mut store: S, capacity: usize) -> Self {
        let (tx, rx) = bounded::<OutputRecord>(capacity.max(1));
        let counters = Arc::new(WriterCounters::default());
        let worker_counters = Arc::clone(&counters);

        let worker = thread::spawn(move || {
            info!("output writer started (capacity {})", capacity);

            while let Ok(record) = rx.recv() {
                let result = match &record {
                    OutputRecord::Track(event) => store.store_track(event),
                    OutputRecord::Background(snapshot) => store.store_background(snapshot),
                };
                match result {
                    Ok(()) => {
                        worker_counters.written.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        worker_counters.failed.fetch_add(1, Ordering::Relaxed);
                        warn!("output store failed: {}", e);
                    }
                }
            }

            if let Err(e) = store.flush() {
                warn!("output store flush failed: {}", e);
            }
            info!("output writer stopped");
        });

        Self {
            tx: Some(tx),
            worker: Some(worker),
            counters,
        }
    }

    /// Queue a record without blocking. Returns false if it was dropped.
    pub fn try_write(&self, record: OutputRecord) -> bool {
        let Some(tx) = &self.tx else {
            return false;
        };
        match tx.try_send(record) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let dropped = self.counters.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!("output queue full, dropped record ({} total)", dropped);
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("output writer gone, dropped record");
                false
            }
        }
    }

    /// Records waiting in the queue.
    pub fn pending(&self) -> usize {
        self.tx.as_ref().map_or(0, Sender::len)
    }

    pub fn written(&self) -> u64 {
        self.counters.written.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.counters.dropped.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.counters.failed.load(Ordering::Relaxed)
    }

    /// Stop accepting records, drain the queue and wait for the writer.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("output writer thread panicked");
            }
        }
    }
}

impl Drop for AsyncWriter {
    fn drop(&mut self) {
        self.shutdown();
    }
}
