//! Pipeline driver and its connections to the outside: the command queue
//! fed by the frame parser, the asynchronous output writer and the
//! monitoring snapshot.

mod pipeline;
mod runner;
mod sink;
mod status;

pub use pipeline::{FrameOutput, Pipeline, ResetMode, TrackEvent, TrackEventKind};
pub use runner::{PipelineCommand, PipelineRunner, run};
pub use sink::{AsyncWriter, MemoryStore, OutputRecord, TrackStore};
pub use status::{PipelineStatus, StatusHandle, TrackSummary};
