use std::{
    fmt,
    str::FromStr,
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};

use crate::{config::is_positive, PlaybackConfig, Result, VisualiserError};

/// Fraction of a step within which a target short of the end counts as the end.
const END_SNAP: f64 = 1e-9;

/// Coarse playback state of a [`PlaybackClock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// What a single [`PlaybackClock::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The clock was not playing; nothing moved.
    Idle,
    /// The position moved forward and playback continues.
    Advanced,
    /// The position reached the last block and the clock stopped.
    Finished,
}

/// Control surface exposed to UI and recorder collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PlaybackCommand {
    Play,
    Pause,
    Reset,
    SetSpeed(f64),
}

impl FromStr for PlaybackCommand {
    type Err = VisualiserError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split_whitespace();
        let verb = parts.next().unwrap_or_default().to_ascii_lowercase();
        let command = match verb.as_str() {
            "play" => Self::Play,
            "pause" => Self::Pause,
            "reset" => Self::Reset,
            "speed" => {
                let raw = parts
                    .next()
                    .ok_or_else(|| VisualiserError::msg("`speed` needs a multiplier"))?;
                let value = raw
                    .trim_end_matches('x')
                    .parse::<f64>()
                    .map_err(|_| VisualiserError::msg(format!("invalid speed `{raw}`")))?;
                Self::SetSpeed(value)
            }
            _ => {
                return Err(VisualiserError::msg(format!(
                    "unknown playback command `{}`",
                    s.trim()
                )))
            }
        };

        if let Some(extra) = parts.next() {
            return Err(VisualiserError::msg(format!(
                "unexpected argument `{extra}` after `{verb}`"
            )));
        }
        Ok(command)
    }
}

/// Owns the playback position and the play/pause/reset state machine.
///
/// The position runs from `0` to the last block index of the store it was
/// created for. Each tick advances it by `min(max_blocks_per_frame, speed)`
/// blocks per elapsed frame; reaching the end stops the clock.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackClock {
    state: PlaybackState,
    position: f64,
    speed: f64,
    fps: u32,
    max_blocks_per_frame: f64,
    end: f64,
    frame_sequence: u64,
}

impl PlaybackClock {
    /// Creates a stopped clock at `t = 0` that ends at `max_index`.
    pub fn new(config: &PlaybackConfig, max_index: u64) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            state: PlaybackState::Stopped,
            position: 0.0,
            speed: config.initial_speed,
            fps: config.fps,
            max_blocks_per_frame: config.max_blocks_per_frame,
            end: max_index as f64,
            frame_sequence: 0,
        })
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn end(&self) -> f64 {
        self.end
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn max_blocks_per_frame(&self) -> f64 {
        self.max_blocks_per_frame
    }

    /// Sequence number the next emitted frame will carry.
    pub fn frame_sequence(&self) -> u64 {
        self.frame_sequence
    }

    /// Blocks advanced per elapsed frame while playing.
    pub fn blocks_per_tick(&self) -> f64 {
        self.speed.min(self.max_blocks_per_frame)
    }

    /// `Stopped | Paused -> Playing`. Playing again after the end was reached
    /// rewinds to the start first.
    pub fn play(&mut self) {
        match self.state {
            PlaybackState::Playing => {}
            PlaybackState::Stopped => {
                if self.position >= self.end {
                    self.position = 0.0;
                }
                self.transition(PlaybackState::Playing);
            }
            PlaybackState::Paused => self.transition(PlaybackState::Playing),
        }
    }

    /// `Playing -> Paused`; no-op in any other state.
    pub fn pause(&mut self) {
        if self.state == PlaybackState::Playing {
            self.transition(PlaybackState::Paused);
        }
    }

    /// Returns to `Stopped` at `t = 0` with the frame counter cleared. Safe to
    /// call from any state.
    pub fn reset(&mut self) {
        self.transition(PlaybackState::Stopped);
        self.position = 0.0;
        self.frame_sequence = 0;
    }

    pub fn set_speed(&mut self, multiplier: f64) -> Result<()> {
        if !is_positive(multiplier) {
            return Err(VisualiserError::InvalidSpeed(multiplier));
        }
        tracing::debug!(from = self.speed, to = multiplier, "speed changed");
        self.speed = multiplier;
        Ok(())
    }

    /// Dispatches a [`PlaybackCommand`]. Rejected commands leave the clock
    /// untouched.
    pub fn apply(&mut self, command: PlaybackCommand) -> Result<()> {
        match command {
            PlaybackCommand::Play => self.play(),
            PlaybackCommand::Pause => self.pause(),
            PlaybackCommand::Reset => self.reset(),
            PlaybackCommand::SetSpeed(multiplier) => self.set_speed(multiplier)?,
        }
        Ok(())
    }

    /// Advances the position by `elapsed_frames` frames worth of blocks.
    ///
    /// Does nothing unless playing. Reaching the last block clamps the
    /// position there and stops the clock.
    pub fn tick(&mut self, elapsed_frames: u32) -> TickOutcome {
        if self.state != PlaybackState::Playing {
            return TickOutcome::Idle;
        }

        let step = self.blocks_per_tick() * f64::from(elapsed_frames);
        let target = self.position + step;
        // Repeated addition of `end / n` can land a few ulps short of `end`.
        if target >= self.end || self.end - target <= step * END_SNAP {
            self.position = self.end;
            self.transition(PlaybackState::Stopped);
            tracing::info!(position = self.position, "reached end of block stream");
            TickOutcome::Finished
        } else {
            self.position = target;
            TickOutcome::Advanced
        }
    }

    /// Hands out the current frame sequence number and moves to the next.
    pub(crate) fn take_sequence(&mut self) -> u64 {
        let sequence = self.frame_sequence;
        self.frame_sequence += 1;
        sequence
    }

    fn transition(&mut self, next: PlaybackState) {
        if self.state != next {
            tracing::debug!(from = %self.state, to = %next, position = self.position, "playback state");
            self.state = next;
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Stopped => "stopped",
            Self::Playing => "playing",
            Self::Paused => "paused",
        };
        f.write_str(label)
    }
}

/// Maps wall-clock time onto a fixed output frame cadence.
///
/// Frame `k` is due at `k / fps` seconds after [`FramePacer::start`]. When a
/// frame is emitted late, the frames whose deadlines already passed are
/// dropped rather than caught up, so the data advance per rendered frame stays
/// bounded.
#[derive(Debug, Clone)]
pub struct FramePacer {
    fps: u32,
    started: Instant,
    frames_emitted: u64,
}

impl FramePacer {
    pub fn start(fps: u32) -> Self {
        Self {
            fps: fps.max(1),
            started: Instant::now(),
            frames_emitted: 0,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted
    }

    /// Offset from the start at which the next frame is due.
    pub fn next_deadline(&self) -> Duration {
        Duration::from_secs_f64(self.frames_emitted as f64 / f64::from(self.fps))
    }

    pub fn time_until_next(&self) -> Duration {
        self.time_until_next_at(self.elapsed())
    }

    pub fn time_until_next_at(&self, elapsed: Duration) -> Duration {
        self.next_deadline().saturating_sub(elapsed)
    }

    /// Records that a frame was emitted now. Returns the number of frames
    /// that were skipped because their deadlines had already passed.
    pub fn mark_frame(&mut self) -> u64 {
        let elapsed = self.elapsed();
        self.mark_frame_at(elapsed)
    }

    pub fn mark_frame_at(&mut self, elapsed: Duration) -> u64 {
        let deadlines_passed = (elapsed.as_secs_f64() * f64::from(self.fps)).floor() as u64 + 1;
        let due = deadlines_passed.saturating_sub(self.frames_emitted);
        let skipped = due.saturating_sub(1);
        self.frames_emitted += due.max(1);
        if skipped > 0 {
            tracing::warn!(skipped, fps = self.fps, "frame deadline overrun");
        }
        skipped
    }

    pub fn restart(&mut self) {
        self.started = Instant::now();
        self.frames_emitted = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock(max_index: u64) -> PlaybackClock {
        PlaybackClock::new(&PlaybackConfig::default(), max_index).unwrap()
    }

    #[test]
    fn starts_stopped_at_zero() {
        let clock = clock(100);
        assert_eq!(clock.state(), PlaybackState::Stopped);
        assert_eq!(clock.position(), 0.0);
        assert_eq!(clock.frame_sequence(), 0);
    }

    #[test]
    fn play_and_pause_transitions() {
        let mut clock = clock(100);
        clock.play();
        assert_eq!(clock.state(), PlaybackState::Playing);
        clock.play();
        assert_eq!(clock.state(), PlaybackState::Playing);

        clock.tick(1);
        clock.pause();
        assert_eq!(clock.state(), PlaybackState::Paused);
        let position = clock.position();

        clock.pause();
        assert_eq!(clock.state(), PlaybackState::Paused);
        assert_eq!(clock.position(), position);

        clock.play();
        assert_eq!(clock.state(), PlaybackState::Playing);
        assert_eq!(clock.position(), position);
    }

    #[test]
    fn pause_while_stopped_is_noop() {
        let mut clock = clock(100);
        clock.pause();
        assert_eq!(clock.state(), PlaybackState::Stopped);
    }

    #[test]
    fn tick_is_idle_unless_playing() {
        let mut clock = clock(100);
        assert_eq!(clock.tick(1), TickOutcome::Idle);
        assert_eq!(clock.position(), 0.0);

        clock.play();
        clock.tick(1);
        clock.pause();
        let position = clock.position();
        assert_eq!(clock.tick(3), TickOutcome::Idle);
        assert_eq!(clock.position(), position);
    }

    #[test]
    fn advance_is_capped_by_max_blocks_per_frame() {
        let config = PlaybackConfig {
            max_blocks_per_frame: 2.0,
            ..PlaybackConfig::default()
        };
        let mut clock = PlaybackClock::new(&config, 1_000).unwrap();
        clock.set_speed(10.0).unwrap();
        clock.play();
        assert_eq!(clock.tick(1), TickOutcome::Advanced);
        assert_eq!(clock.position(), 2.0);

        clock.set_speed(0.5).unwrap();
        clock.tick(1);
        assert_eq!(clock.position(), 2.5);

        clock.tick(4);
        assert_eq!(clock.position(), 4.5);
    }

    #[test]
    fn reaching_the_end_stops_and_clamps() {
        let mut clock = clock(10);
        clock.set_speed(4.0).unwrap();
        clock.play();
        assert_eq!(clock.tick(1), TickOutcome::Advanced);
        assert_eq!(clock.tick(1), TickOutcome::Advanced);
        assert_eq!(clock.tick(1), TickOutcome::Finished);
        assert_eq!(clock.position(), 10.0);
        assert_eq!(clock.state(), PlaybackState::Stopped);

        assert_eq!(clock.tick(1), TickOutcome::Idle);
        assert_eq!(clock.position(), 10.0);
    }

    #[test]
    fn uneven_step_still_lands_on_the_end() {
        let config = PlaybackConfig {
            max_blocks_per_frame: 1e6,
            ..PlaybackConfig::default()
        };
        let mut clock = PlaybackClock::new(&config, 1_234).unwrap();
        clock.set_speed(1_234.0 / 7.0).unwrap();
        clock.play();
        for _ in 0..6 {
            assert_eq!(clock.tick(1), TickOutcome::Advanced);
        }
        assert_eq!(clock.tick(1), TickOutcome::Finished);
        assert_eq!(clock.position(), 1_234.0);
    }

    #[test]
    fn play_after_finish_rewinds() {
        let mut clock = clock(1);
        clock.play();
        assert_eq!(clock.tick(1), TickOutcome::Finished);
        clock.play();
        assert_eq!(clock.position(), 0.0);
        assert!(clock.is_playing());
    }

    #[test]
    fn reset_from_any_state() {
        for setup in 0..3 {
            let mut clock = clock(100);
            clock.play();
            clock.tick(1);
            clock.take_sequence();
            match setup {
                0 => {}
                1 => clock.pause(),
                _ => {
                    clock.set_speed(500.0).unwrap();
                    clock.tick(1);
                }
            }
            clock.reset();
            assert_eq!(clock.state(), PlaybackState::Stopped);
            assert_eq!(clock.position(), 0.0);
            assert_eq!(clock.frame_sequence(), 0);
        }
    }

    #[test]
    fn rejected_speed_leaves_state_unchanged() {
        let mut clock = clock(100);
        clock.play();
        clock.tick(1);
        let before = clock.clone();

        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = clock.set_speed(bad).unwrap_err();
            assert!(matches!(err, VisualiserError::InvalidSpeed(_)));
        }
        assert!(clock.apply(PlaybackCommand::SetSpeed(-3.0)).is_err());
        assert_eq!(clock, before);
    }

    #[test]
    fn parses_commands() {
        assert_eq!("play".parse::<PlaybackCommand>().unwrap(), PlaybackCommand::Play);
        assert_eq!(" Pause ".parse::<PlaybackCommand>().unwrap(), PlaybackCommand::Pause);
        assert_eq!(
            "speed 2.5x".parse::<PlaybackCommand>().unwrap(),
            PlaybackCommand::SetSpeed(2.5)
        );
        assert!("speed".parse::<PlaybackCommand>().is_err());
        assert!("rewind".parse::<PlaybackCommand>().is_err());
        assert!("play now".parse::<PlaybackCommand>().is_err());
    }

    #[test]
    fn pacer_schedules_deadlines() {
        let mut pacer = FramePacer::start(10);
        assert_eq!(pacer.time_until_next_at(Duration::ZERO), Duration::ZERO);

        assert_eq!(pacer.mark_frame_at(Duration::ZERO), 0);
        assert_eq!(
            pacer.time_until_next_at(Duration::from_millis(40)),
            pacer.next_deadline() - Duration::from_millis(40)
        );

        assert_eq!(pacer.mark_frame_at(Duration::from_millis(100)), 0);
        assert_eq!(pacer.frames_emitted(), 2);
    }

    #[test]
    fn pacer_drops_overrun_frames() {
        let mut pacer = FramePacer::start(10);
        pacer.mark_frame_at(Duration::ZERO);
        assert_eq!(pacer.mark_frame_at(Duration::from_millis(350)), 2);
        assert_eq!(pacer.frames_emitted(), 4);
        assert!(pacer.time_until_next_at(Duration::from_millis(350)) > Duration::ZERO);
    }

    #[test]
    fn restarted_pacer_is_due_immediately() {
        let mut pacer = FramePacer::start(10);
        pacer.mark_frame_at(Duration::ZERO);
        pacer.mark_frame_at(Duration::from_millis(350));

        pacer.restart();
        assert_eq!(pacer.frames_emitted(), 0);
        assert_eq!(pacer.next_deadline(), Duration::ZERO);
        assert_eq!(pacer.time_until_next(), Duration::ZERO);
    }
}
