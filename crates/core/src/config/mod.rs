use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{RecordingSettings, Result, VisualiserError};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub playback: PlaybackConfig,
    pub data: DataConfig,
    pub recording: RecordingSettings,
    pub chart: ChartConfig,
}

impl AppConfig {
    /// Reads a JSON configuration file. Missing sections fall back to their
    /// defaults; the result is validated before being returned.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.playback.validate()?;
        self.data.validate()?;
        self.recording.validate()?;
        self.chart.validate()
    }
}

/// Pacing knobs for the playback engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Target output frame rate.
    pub fps: u32,
    /// Wall-clock budget hint for a full playthrough, in seconds.
    pub animation_duration_secs: f64,
    /// Upper bound on how many blocks a single tick may advance.
    pub max_blocks_per_frame: f64,
    /// Speed multiplier a fresh clock starts with.
    pub initial_speed: f64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            fps: 5,
            animation_duration_secs: 1800.0,
            max_blocks_per_frame: 150.0,
            initial_speed: 1.0,
        }
    }
}

impl PlaybackConfig {
    pub fn validate(&self) -> Result<()> {
        if self.fps == 0 {
            return Err(VisualiserError::InvalidConfig("fps must be > 0".into()));
        }
        if !is_positive(self.animation_duration_secs) {
            return Err(VisualiserError::InvalidConfig(format!(
                "animation_duration_secs must be > 0, got {}",
                self.animation_duration_secs
            )));
        }
        if !is_positive(self.max_blocks_per_frame) {
            return Err(VisualiserError::InvalidConfig(format!(
                "max_blocks_per_frame must be > 0, got {}",
                self.max_blocks_per_frame
            )));
        }
        if !is_positive(self.initial_speed) {
            return Err(VisualiserError::InvalidConfig(format!(
                "initial_speed must be > 0, got {}",
                self.initial_speed
            )));
        }
        Ok(())
    }

    /// Frames the duration hint allows for at `fps` when played `speedup`
    /// times faster. Never less than one.
    pub fn frame_budget(&self, fps: u32, speedup: f64) -> u64 {
        ((self.animation_duration_secs * f64::from(fps) / speedup).floor() as u64).max(1)
    }
}

/// Where block data comes from and how its columns are interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub data_file: PathBuf,
    pub blocks_per_day: u64,
    pub index_column: String,
    pub timestamp_column: Option<String>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_file: PathBuf::from("data/Sim_Results.csv"),
            blocks_per_day: 14_400,
            index_column: "block".to_string(),
            timestamp_column: None,
        }
    }
}

impl DataConfig {
    pub fn validate(&self) -> Result<()> {
        if self.blocks_per_day == 0 {
            return Err(VisualiserError::InvalidConfig(
                "blocks_per_day must be > 0".into(),
            ));
        }
        if self.index_column.trim().is_empty() {
            return Err(VisualiserError::InvalidConfig(
                "index_column must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Windowing for chart sinks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartConfig {
    /// Width of the visible window, in blocks, centred on the playhead.
    pub window_size: u64,
    /// Maximum number of points handed to a chart per metric.
    pub max_points: usize,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            window_size: 15_000,
            max_points: 40,
        }
    }
}

impl ChartConfig {
    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 || self.max_points == 0 {
            return Err(VisualiserError::InvalidConfig(
                "chart window_size and max_points must be > 0".into(),
            ));
        }
        Ok(())
    }
}

pub(crate) fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_stable_profile() {
        let config = AppConfig::default();
        assert_eq!(config.playback.fps, 5);
        assert_eq!(config.playback.max_blocks_per_frame, 150.0);
        assert_eq!(config.data.blocks_per_day, 14_400);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{ "playback": { "fps": 30 } }"#).unwrap();
        assert_eq!(config.playback.fps, 30);
        assert_eq!(config.playback.max_blocks_per_frame, 150.0);
        assert_eq!(config.chart.max_points, 40);
    }

    #[test]
    fn rejects_non_positive_block_cap() {
        let mut config = AppConfig::default();
        config.playback.max_blocks_per_frame = 0.0;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, VisualiserError::InvalidConfig(_)));

        config.playback.max_blocks_per_frame = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn frame_budget_uses_duration_and_fps() {
        let playback = PlaybackConfig {
            fps: 4,
            animation_duration_secs: 2.5,
            ..PlaybackConfig::default()
        };
        assert_eq!(playback.frame_budget(4, 1.0), 10);
        assert_eq!(playback.frame_budget(4, 2.0), 5);
        assert_eq!(playback.frame_budget(4, 100.0), 1);
    }
}
