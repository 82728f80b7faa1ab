/// Result alias that carries the custom [`VisualiserError`] type.
pub type Result<T> = std::result::Result<T, VisualiserError>;

/// Common error type for the core crate.
///
/// Variants fall into three groups: load-time errors that prevent a
/// [`BlockStore`](crate::BlockStore) from being built, control errors that
/// reject a single playback command, and scheduling errors that prevent a
/// [`FrameScheduler`](crate::FrameScheduler) from starting.
#[derive(Debug, thiserror::Error)]
pub enum VisualiserError {
    /// No block records were supplied.
    #[error("no block records supplied")]
    EmptyInput,
    /// Block indices must strictly increase through the input.
    #[error("block index {found} at position {position} does not follow {previous}")]
    NonMonotonicIndex {
        position: usize,
        previous: u64,
        found: u64,
    },
    /// A record's metric names differ from the first record's.
    #[error("block {block_index} has metrics {found:?}, expected {expected:?}")]
    InconsistentSchema {
        block_index: u64,
        expected: Vec<String>,
        found: Vec<String>,
    },
    /// Speed multipliers must be finite and strictly positive.
    #[error("invalid speed multiplier {0}; must be finite and > 0")]
    InvalidSpeed(f64),
    /// The scheduler was asked to start without any block data.
    #[error("no block data available to schedule frames from")]
    NoData,
    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Tabular input could not be parsed.
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },
    /// A shared lock was poisoned by a panicking holder.
    #[error("{0} has been poisoned")]
    Poisoned(&'static str),
    /// Free-form message for collaborators outside the engine.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Wrapper around JSON (de)serialisation errors.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl VisualiserError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub(crate) fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }

    /// Returns `true` for errors that make a session impossible to start.
    pub fn is_load_error(&self) -> bool {
        matches!(
            self,
            Self::EmptyInput | Self::NonMonotonicIndex { .. } | Self::InconsistentSchema { .. }
        )
    }
}

impl From<&str> for VisualiserError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for VisualiserError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
