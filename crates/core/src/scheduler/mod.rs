use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    interpolate::sample, BlockStore, Metrics, PlaybackClock, PlaybackCommand, PlaybackConfig,
    PlaybackState, Result, TickOutcome, VisualiserError,
};

/// Interpolated view of the simulation for one output frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSnapshot {
    pub position: f64,
    pub metrics: Metrics,
    pub frame_sequence: u64,
    pub is_final: bool,
}

impl FrameSnapshot {
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }

    /// Block the playhead is currently in.
    pub fn block(&self) -> u64 {
        self.position.max(0.0).floor() as u64
    }

    /// Simulated day, given how many blocks make up one day.
    pub fn day(&self, blocks_per_day: u64) -> u64 {
        self.block() / blocks_per_day.max(1)
    }

    pub fn label(&self, blocks_per_day: u64) -> String {
        format!("Day: {} / Block: {}", self.day(blocks_per_day), self.block())
    }
}

/// Consumer of the snapshot stream.
///
/// Sinks receive snapshots in strict sequence order. The same `Arc` is handed
/// to every sink registered for a frame.
pub trait Sink {
    fn accept(&mut self, frame: Arc<FrameSnapshot>) -> Result<()>;
}

/// Drives a [`PlaybackClock`] against a shared [`BlockStore`], handing out
/// one immutable [`FrameSnapshot`] per output frame.
#[derive(Debug, Clone)]
pub struct FrameScheduler {
    store: Arc<BlockStore>,
    clock: PlaybackClock,
}

/// Collects what a [`FrameScheduler`] needs before it may start.
#[derive(Debug, Clone, Default)]
pub struct FrameSchedulerBuilder {
    store: Option<Arc<BlockStore>>,
    playback: PlaybackConfig,
}

impl FrameSchedulerBuilder {
    pub fn store(mut self, store: Arc<BlockStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn playback(mut self, playback: PlaybackConfig) -> Self {
        self.playback = playback;
        self
    }

    /// Fails with [`VisualiserError::NoData`] when no populated store was
    /// attached.
    pub fn build(self) -> Result<FrameScheduler> {
        let store = self
            .store
            .filter(|store| !store.is_empty())
            .ok_or(VisualiserError::NoData)?;
        let clock = PlaybackClock::new(&self.playback, store.max_index())?;
        Ok(FrameScheduler { store, clock })
    }
}

impl FrameScheduler {
    pub fn builder() -> FrameSchedulerBuilder {
        FrameSchedulerBuilder::default()
    }

    pub fn new(store: Arc<BlockStore>, playback: &PlaybackConfig) -> Result<Self> {
        Self::builder().store(store).playback(playback.clone()).build()
    }

    pub fn store(&self) -> &Arc<BlockStore> {
        &self.store
    }

    pub fn clock(&self) -> &PlaybackClock {
        &self.clock
    }

    pub fn state(&self) -> PlaybackState {
        self.clock.state()
    }

    pub fn play(&mut self) {
        self.clock.play();
    }

    pub fn pause(&mut self) {
        self.clock.pause();
    }

    pub fn reset(&mut self) {
        self.clock.reset();
    }

    pub fn set_speed(&mut self, multiplier: f64) -> Result<()> {
        self.clock.set_speed(multiplier)
    }

    pub fn apply(&mut self, command: PlaybackCommand) -> Result<()> {
        self.clock.apply(command)
    }

    /// Produces the snapshot for the next output frame.
    ///
    /// Ticks the clock once, samples the store at the resulting position and
    /// stamps the snapshot with the next gap-free sequence number. Frames are
    /// still produced while paused or stopped; they just repeat the current
    /// position.
    pub fn next_frame(&mut self) -> FrameSnapshot {
        let outcome = self.clock.tick(1);
        let position = self.clock.position();
        let metrics = sample(&self.store, position);
        FrameSnapshot {
            position,
            metrics,
            frame_sequence: self.clock.take_sequence(),
            is_final: outcome == TickOutcome::Finished,
        }
    }

    /// Produces the next frame and pushes it to every sink, in order.
    pub fn emit(&mut self, sinks: &mut [&mut dyn Sink]) -> Result<Arc<FrameSnapshot>> {
        let frame = Arc::new(self.next_frame());
        for sink in sinks.iter_mut() {
            sink.accept(Arc::clone(&frame))?;
        }
        Ok(frame)
    }

    /// Plays from the current position until the final frame, emitting at
    /// most `max_frames` frames when a limit is given. Returns the number of
    /// frames emitted.
    pub fn run_to_end(
        &mut self,
        sinks: &mut [&mut dyn Sink],
        max_frames: Option<u64>,
    ) -> Result<u64> {
        self.play();
        let mut emitted = 0;
        while max_frames.map_or(true, |limit| emitted < limit) {
            let frame = self.emit(sinks)?;
            emitted += 1;
            if frame.is_final {
                break;
            }
        }
        Ok(emitted)
    }
}
