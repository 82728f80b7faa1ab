//! Core library for the Block Visualiser application.
//!
//! The crate turns an ordered table of simulation block records into a
//! smooth, deterministic stream of animation frames. The [`BlockStore`] holds
//! the records, [`interpolate`] blends between them, the [`PlaybackClock`]
//! owns the play/pause/reset state machine, and the [`FrameScheduler`] ties
//! them together into one [`FrameSnapshot`] per output frame. Renderers and
//! recorders consume that stream through the [`Sink`] trait.

pub mod config;
pub mod error;
pub mod ingest;
pub mod interpolate;
pub mod record;
pub mod render;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod timeline;

pub use config::{AppConfig, ChartConfig, DataConfig, PlaybackConfig};
pub use error::{Result, VisualiserError};
pub use interpolate::{interpolate, sample};
pub use record::{record_session, Recorder, RecordingPlan, RecordingSettings};
pub use render::ChartFeed;
pub use scheduler::{FrameScheduler, FrameSchedulerBuilder, FrameSnapshot, Sink};
pub use session::SessionHandle;
pub use store::{BlockRecord, BlockStore, Metrics};
pub use timeline::{FramePacer, PlaybackClock, PlaybackCommand, PlaybackState, TickOutcome};
