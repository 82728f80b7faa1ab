use std::sync::{Arc, Mutex, MutexGuard};

use crate::{
    FrameScheduler, FrameSnapshot, PlaybackClock, PlaybackCommand, PlaybackState, Result, Sink,
    VisualiserError,
};

/// Shared, thread-safe handle over one playback session.
///
/// Control threads and the frame loop each hold a clone; every operation takes
/// the same lock, so ticks and commands against the clock are serialised.
#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<Mutex<FrameScheduler>>,
}

impl SessionHandle {
    pub fn new(scheduler: FrameScheduler) -> Self {
        Self {
            shared: Arc::new(Mutex::new(scheduler)),
        }
    }

    pub fn play(&self) -> Result<()> {
        self.lock()?.play();
        Ok(())
    }

    pub fn pause(&self) -> Result<()> {
        self.lock()?.pause();
        Ok(())
    }

    pub fn reset(&self) -> Result<()> {
        self.lock()?.reset();
        Ok(())
    }

    pub fn set_speed(&self, multiplier: f64) -> Result<()> {
        self.lock()?.set_speed(multiplier)
    }

    pub fn apply(&self, command: PlaybackCommand) -> Result<()> {
        self.lock()?.apply(command)
    }

    pub fn next_frame(&self) -> Result<FrameSnapshot> {
        Ok(self.lock()?.next_frame())
    }

    /// Produces one frame and hands it to `sinks`. The lock is released
    /// before any sink runs.
    pub fn emit(&self, sinks: &mut [&mut dyn Sink]) -> Result<Arc<FrameSnapshot>> {
        let frame = Arc::new(self.next_frame()?);
        for sink in sinks.iter_mut() {
            sink.accept(Arc::clone(&frame))?;
        }
        Ok(frame)
    }

    pub fn state(&self) -> Result<PlaybackState> {
        Ok(self.lock()?.state())
    }

    /// Copy of the clock as it is right now.
    pub fn clock(&self) -> Result<PlaybackClock> {
        Ok(self.lock()?.clock().clone())
    }

    fn lock(&self) -> Result<MutexGuard<'_, FrameScheduler>> {
        self.shared
            .lock()
            .map_err(|_| VisualiserError::Poisoned("playback session"))
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle").finish()
    }
}
