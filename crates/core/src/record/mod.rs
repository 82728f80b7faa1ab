use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::{Deserialize, Serialize};

use crate::{
    config::is_positive, AppConfig, BlockStore, FrameScheduler, FrameSnapshot, PlaybackConfig,
    Result, Sink, VisualiserError,
};

/// Configuration options for the recording subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingSettings {
    pub output_path: PathBuf,
    /// Overrides the playback frame rate for exports.
    pub fps: Option<u32>,
    /// How many times faster than the duration hint the export plays.
    pub record_speed: f64,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from("simulation_animation.jsonl"),
            fps: None,
            record_speed: 2.0,
        }
    }
}

impl RecordingSettings {
    pub fn validate(&self) -> Result<()> {
        if self.fps == Some(0) {
            return Err(VisualiserError::InvalidConfig(
                "recording fps must be > 0".into(),
            ));
        }
        if !is_positive(self.record_speed) {
            return Err(VisualiserError::InvalidConfig(format!(
                "record_speed must be > 0, got {}",
                self.record_speed
            )));
        }
        Ok(())
    }
}

/// Frame budget and per-frame advance for an offline export.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordingPlan {
    pub fps: u32,
    pub frames_to_record: u64,
    pub block_increment: f64,
}

impl RecordingPlan {
    /// Spreads the block range over `duration * fps / record_speed` frames,
    /// never advancing more than `max_blocks_per_frame` per frame.
    pub fn new(settings: &RecordingSettings, playback: &PlaybackConfig, max_index: u64) -> Self {
        let fps = settings.fps.unwrap_or(playback.fps);
        let frames_to_record = playback.frame_budget(fps, settings.record_speed);
        let per_frame = max_index as f64 / frames_to_record as f64;
        let block_increment = if per_frame > 0.0 {
            per_frame.min(playback.max_blocks_per_frame)
        } else {
            playback.max_blocks_per_frame
        };

        Self {
            fps,
            frames_to_record,
            block_increment,
        }
    }
}

/// Sink that captures the snapshot stream while started and exports it as
/// JSON Lines, one snapshot per line.
#[derive(Debug, Default)]
pub struct Recorder {
    settings: RecordingSettings,
    is_recording: bool,
    frames: Vec<Arc<FrameSnapshot>>,
}

impl Recorder {
    pub fn new(settings: RecordingSettings) -> Self {
        Self {
            settings,
            is_recording: false,
            frames: Vec::new(),
        }
    }

    pub fn start(&mut self) -> Result<()> {
        self.frames.clear();
        self.is_recording = true;
        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        self.is_recording = false;
        Ok(())
    }

    pub fn is_recording(&self) -> bool {
        self.is_recording
    }

    pub fn frames(&self) -> &[Arc<FrameSnapshot>] {
        &self.frames
    }

    pub fn settings(&self) -> &RecordingSettings {
        &self.settings
    }

    pub fn write_jsonl(&self, mut writer: impl Write) -> Result<()> {
        for frame in &self.frames {
            serde_json::to_writer(&mut writer, frame.as_ref())?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Writes the captured frames to the configured output path.
    pub fn save(&self) -> Result<&Path> {
        if self.frames.is_empty() {
            return Err(VisualiserError::msg("no frames captured"));
        }
        let path = self.settings.output_path.as_path();
        let file = File::create(path)?;
        self.write_jsonl(BufWriter::new(file))?;
        tracing::info!(path = %path.display(), frames = self.frames.len(), "saved recording");
        Ok(path)
    }
}

impl Sink for Recorder {
    fn accept(&mut self, frame: Arc<FrameSnapshot>) -> Result<()> {
        if self.is_recording {
            self.frames.push(frame);
        }
        Ok(())
    }
}

/// Renders a whole session offline into a [`Recorder`].
///
/// Uses a fresh scheduler, so the captured stream is independent of any live
/// session sharing the same store.
pub fn record_session(store: Arc<BlockStore>, config: &AppConfig) -> Result<Recorder> {
    let plan = RecordingPlan::new(&config.recording, &config.playback, store.max_index());
    let playback = PlaybackConfig {
        fps: plan.fps,
        ..config.playback.clone()
    };

    let mut scheduler = FrameScheduler::new(store, &playback)?;
    scheduler.set_speed(plan.block_increment)?;

    let mut recorder = Recorder::new(config.recording.clone());
    recorder.start()?;
    let emitted = scheduler.run_to_end(&mut [&mut recorder], Some(plan.frames_to_record))?;
    recorder.stop()?;

    let finished = recorder.frames().last().is_some_and(|frame| frame.is_final);
    tracing::info!(
        emitted,
        finished,
        increment = plan.block_increment,
        "recording complete"
    );
    Ok(recorder)
}
