use std::{
    io::BufRead,
    path::{Path, PathBuf},
    sync::Arc,
    thread,
};

use block_visualiser_core::{
    ingest, record_session, AppConfig, BlockStore, ChartFeed, FramePacer, FrameScheduler,
    FrameSnapshot, PlaybackCommand, SessionHandle, Sink,
};
use clap::{Args, Parser, Subcommand};
use crossbeam_channel::{Receiver, TryRecvError};
use tracing_subscriber::EnvFilter;

fn main() -> block_visualiser_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::from_json_file(path)?,
        None => AppConfig::default(),
    };

    match cli.command {
        Commands::Play {
            source,
            speed,
            max_frames,
        } => run_play(&config, &source, speed, max_frames),
        Commands::Record { source, output } => run_record(config, &source, output),
        Commands::Validate { source, require } => run_validate(&config, &source, &require),
    }
}

fn run_play(
    config: &AppConfig,
    source: &SourceArgs,
    speed: Option<f64>,
    max_frames: Option<u64>,
) -> block_visualiser_core::Result<()> {
    let store = load(config, source)?;
    let mut scheduler = FrameScheduler::new(store, &config.playback)?;
    if let Some(speed) = speed {
        scheduler.set_speed(speed)?;
    }

    let session = SessionHandle::new(scheduler);
    let control = spawn_control_reader();
    let mut console = ConsoleSink::new(config.data.blocks_per_day);
    let mut chart = ChartFeed::new(config.chart.clone())?;
    let mut pacer = FramePacer::start(config.playback.fps);
    let mut emitted = 0_u64;

    tracing::info!(
        fps = config.playback.fps,
        "playing; type play, pause, reset, speed <x> or quit"
    );
    session.play()?;

    loop {
        match drain_control(&control, &session, &mut pacer) {
            Flow::Continue => {}
            Flow::Quit => break,
        }

        thread::sleep(pacer.time_until_next());
        let frame = session.emit(&mut [&mut console, &mut chart])?;
        pacer.mark_frame();
        emitted += 1;

        if frame.is_final || max_frames.is_some_and(|limit| emitted >= limit) {
            break;
        }
    }

    if let Some(latest) = chart.latest() {
        for name in latest.metrics.keys() {
            tracing::debug!(metric = %name, points = chart.downsampled(name).len(), "chart series");
        }
    }
    tracing::info!(emitted, "playback finished");
    Ok(())
}

fn run_record(
    mut config: AppConfig,
    source: &SourceArgs,
    output: Option<PathBuf>,
) -> block_visualiser_core::Result<()> {
    let store = load(&config, source)?;
    if let Some(output) = output {
        config.recording.output_path = output;
    }

    tracing::info!(path = ?config.recording.output_path, "recording session");
    let recorder = record_session(store, &config)?;
    recorder.save()?;
    Ok(())
}

fn run_validate(
    config: &AppConfig,
    source: &SourceArgs,
    require: &[String],
) -> block_visualiser_core::Result<()> {
    let store = load(config, source)?;
    tracing::info!(
        records = store.len(),
        first = store.first_index(),
        last = store.max_index(),
        metrics = ?store.metric_names(),
        "data file is valid"
    );

    let required: Vec<&str> = require.iter().map(String::as_str).collect();
    let missing = ingest::missing_metrics(&store, &required);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(block_visualiser_core::VisualiserError::msg(format!(
            "missing required columns: {}",
            missing.join(", ")
        )))
    }
}

fn load(config: &AppConfig, source: &SourceArgs) -> block_visualiser_core::Result<Arc<BlockStore>> {
    let path: &Path = source.data.as_deref().unwrap_or(&config.data.data_file);
    Ok(Arc::new(ingest::load_store(path, &config.data)?))
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

enum Control {
    Command(PlaybackCommand),
    Quit,
}

enum Flow {
    Continue,
    Quit,
}

/// Reads playback commands from stdin on a background thread.
fn spawn_control_reader() -> Receiver<Control> {
    let (tx, rx) = crossbeam_channel::unbounded();
    thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            let text = line.trim();
            if text.is_empty() {
                continue;
            }
            let message = if matches!(text, "quit" | "q" | "exit") {
                Control::Quit
            } else {
                match text.parse::<PlaybackCommand>() {
                    Ok(command) => Control::Command(command),
                    Err(err) => {
                        tracing::warn!(%err, "ignoring input");
                        continue;
                    }
                }
            };
            if tx.send(message).is_err() {
                break;
            }
        }
    });
    rx
}

fn drain_control(
    control: &Receiver<Control>,
    session: &SessionHandle,
    pacer: &mut FramePacer,
) -> Flow {
    loop {
        match control.try_recv() {
            Ok(Control::Command(command)) => match session.apply(command) {
                // Frame deadlines follow the sequence numbers back to zero.
                Ok(()) if command == PlaybackCommand::Reset => pacer.restart(),
                Ok(()) => {}
                Err(err) => tracing::warn!(%err, ?command, "command rejected"),
            },
            Ok(Control::Quit) => return Flow::Quit,
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => return Flow::Continue,
        }
    }
}

/// Logs each frame's day/block label and metric values.
struct ConsoleSink {
    blocks_per_day: u64,
}

impl ConsoleSink {
    fn new(blocks_per_day: u64) -> Self {
        Self { blocks_per_day }
    }
}

impl Sink for ConsoleSink {
    fn accept(&mut self, frame: Arc<FrameSnapshot>) -> block_visualiser_core::Result<()> {
        let values = frame
            .metrics
            .iter()
            .map(|(name, value)| format!("{name}={value:.4}"))
            .collect::<Vec<_>>()
            .join(" ");
        tracing::info!(
            frame = frame.frame_sequence,
            final_frame = frame.is_final,
            "{} {values}",
            frame.label(self.blocks_per_day)
        );
        Ok(())
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Animated playback of block simulation results", long_about = None)]
struct Cli {
    /// JSON configuration file; defaults are used when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct SourceArgs {
    /// CSV file with one row per block. Overrides `data.data_file`.
    #[arg(short, long)]
    data: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play the simulation in real time, reading commands from stdin.
    Play {
        #[command(flatten)]
        source: SourceArgs,
        /// Initial speed multiplier.
        #[arg(short, long)]
        speed: Option<f64>,
        /// Stop after this many frames.
        #[arg(long)]
        max_frames: Option<u64>,
    },
    /// Render the whole session offline and write it as JSON Lines.
    Record {
        #[command(flatten)]
        source: SourceArgs,
        /// Output path. Overrides `recording.output_path`.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Load a data file and report what the playback engine sees.
    Validate {
        #[command(flatten)]
        source: SourceArgs,
        /// Metric columns that must be present.
        #[arg(long, value_delimiter = ',')]
        require: Vec<String>,
    },
}
