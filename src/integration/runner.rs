//! Pipeline thread fed by a bounded command queue.

use std::thread;

use crossbeam::channel::{Receiver, Sender, TrySendError, bounded};
use log::{debug, info, warn};

use crate::background::BackgroundSnapshot;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::types::Frame;

use super::pipeline::{Pipeline, ResetMode};
use super::sink::{AsyncWriter, OutputRecord, TrackStore};
use super::status::StatusHandle;

/// Work items for the pipeline thread, applied strictly in arrival order.
#[derive(Debug, Clone)]
pub enum PipelineCommand {
    Frame(Frame),
    Reset(ResetMode),
    Reconfigure(Box<PipelineConfig>),
    ResetBackgroundCell { ring: usize, bin: usize },
    RestoreBackground(Box<BackgroundSnapshot>),
}

/// Drain `commands` into `pipeline` until every sender is dropped.
///
/// Track events and periodic background snapshots go to `writer`; the loop
/// itself never blocks on storage.
pub fn run(pipeline: &mut Pipeline, commands: &Receiver<PipelineCommand>, writer: &AsyncWriter) {
    let status = pipeline.status_handle();

    while let Ok(command) = commands.recv() {
        match command {
            PipelineCommand::Frame(frame) => {
                // Skipped frames are already logged by the pipeline.
                if let Ok(output) = pipeline.process_frame(&frame) {
                    for event in output.events {
                        writer.try_write(OutputRecord::Track(event));
                    }
                    let interval = pipeline.config().output.background_snapshot_interval_frames;
                    if interval > 0 && pipeline.frames_processed() % interval == 0 {
                        writer.try_write(OutputRecord::Background(pipeline.background_snapshot()));
                    }
                }
            }
            PipelineCommand::Reset(mode) => {
                for event in pipeline.reset(mode) {
                    writer.try_write(OutputRecord::Track(event));
                }
            }
            PipelineCommand::Reconfigure(config) => {
                if let Err(e) = pipeline.apply_config(*config) {
                    debug!("reconfigure command dropped: {}", e);
                }
            }
            PipelineCommand::ResetBackgroundCell { ring, bin } => {
                if !pipeline.reset_background_cell(ring, bin) {
                    warn!("no background cell at ring {} bin {}", ring, bin);
                }
            }
            PipelineCommand::RestoreBackground(snapshot) => {
                if let Err(e) = pipeline.restore_background(&snapshot) {
                    warn!("background restore rejected: {}", e);
                }
            }
        }
        status.set_records_dropped(writer.dropped());
    }

    debug!("command queue closed after {} frames", pipeline.frames_processed());
}

/// Owns the pipeline thread and its output writer.
pub struct PipelineRunner {
    tx: Option<Sender<PipelineCommand>>,
    status: StatusHandle,
    worker: Option<thread::JoinHandle<Pipeline>>,
}

impl PipelineRunner {
    /// Move `pipeline` onto its own thread, persisting output through `store`.
    pub fn spawn<S: TrackStore>(mut pipeline: Pipeline, store: S) -> Self {
        let output = pipeline.config().output.clone();
        let (tx, rx) = bounded::<PipelineCommand>(output.frame_queue_capacity.max(1));
        let status = pipeline.status_handle();

        let worker = thread::spawn(move || {
            info!("pipeline thread started");
            let writer = AsyncWriter::spawn(store, output.track_queue_capacity);
            run(&mut pipeline, &rx, &writer);
            writer.close();
            info!("pipeline thread stopped");
            pipeline
        });

        Self {
            tx: Some(tx),
            status,
            worker: Some(worker),
        }
    }

    /// Queue a command, waiting for room. Applies backpressure to the producer.
    pub fn submit(&self, command: PipelineCommand) -> Result<(), PipelineError> {
        let tx = self.tx.as_ref().ok_or(PipelineError::QueueClosed)?;
        tx.send(command).map_err(|_| PipelineError::QueueClosed)
    }

    /// Queue a command without waiting. Returns `Ok(false)` when the queue is
    /// full and the command was not accepted.
    pub fn try_submit(&self, command: PipelineCommand) -> Result<bool, PipelineError> {
        let tx = self.tx.as_ref().ok_or(PipelineError::QueueClosed)?;
        match tx.try_send(command) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(_)) => Ok(false),
            Err(TrySendError::Disconnected(_)) => Err(PipelineError::QueueClosed),
        }
    }

    /// Extra producer handle, e.g. for a parser thread.
    pub fn sender(&self) -> Option<Sender<PipelineCommand>> {
        self.tx.clone()
    }

    pub fn status(&self) -> StatusHandle {
        self.status.clone()
    }

    /// Close the queue, let the pipeline drain it and hand the pipeline back.
    ///
    /// Returns `None` if the pipeline thread panicked. Senders obtained from
    /// [`sender`](Self::sender) must be dropped first or this waits for them.
    pub fn shutdown(mut self) -> Option<Pipeline> {
        self.tx.take();
        let worker = self.worker.take()?;
        match worker.join() {
            Ok(pipeline) => Some(pipeline),
            Err(_) => {
                warn!("pipeline thread panicked");
                None
            }
        }
    }
}

impl Drop for PipelineRunner {
    fn drop(&mut self) {
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("pipeline thread panicked");
            }
        }
    }
}
