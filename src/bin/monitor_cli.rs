use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use audio_monitor::audio::{latency::LatencyEstimate, ConfigurationLadder, LatencyTier};
use audio_monitor::config::AppConfig;
use audio_monitor::engine::backend::FailPoint;
use audio_monitor::engine::{EngineHandle, MockBackend, MockPermissions};
use audio_monitor::error::ErrorCode;
use audio_monitor::managers::EngineState;
use audio_monitor::telemetry::MetricEvent;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(
    name = "monitor_cli",
    about = "Inspect and exercise the audio monitoring engine"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the configuration ladder with derived buffer sizes and latency
    Ladder {
        /// Platform minimum buffer size in frames
        #[arg(long, default_value_t = 2048)]
        platform_min: usize,
        /// Buffer floor in frames
        #[arg(long, default_value_t = 1024)]
        floor: usize,
        #[arg(long, default_value_t = 2.0)]
        overhead_ms: f64,
    },
    /// Run the engine against the mock backend and print a JSON report
    Simulate {
        /// Number of leading ladder candidates that fail to open
        #[arg(long, default_value_t = 0)]
        fail_first: usize,
        #[arg(long, value_enum, default_value_t = CliFailPoint::OutputOpen)]
        fail_point: CliFailPoint,
        #[arg(long, default_value_t = 2048)]
        platform_min: usize,
        #[arg(long, default_value_t = 200)]
        millis: u64,
        #[arg(long, default_value_t = 1.0)]
        volume: f64,
        /// Simulate a denied microphone permission
        #[arg(long)]
        deny_permission: bool,
    },
    /// Monitor through the platform backend and print level/latency lines
    Run {
        #[arg(long, default_value_t = 5)]
        seconds: u64,
        #[arg(long, default_value_t = 1.0)]
        volume: f64,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliFailPoint {
    InputOpen,
    OutputOpen,
    InputStart,
    OutputStart,
}

impl From<CliFailPoint> for FailPoint {
    fn from(point: CliFailPoint) -> Self {
        match point {
            CliFailPoint::InputOpen => FailPoint::InputOpen,
            CliFailPoint::OutputOpen => FailPoint::OutputOpen,
            CliFailPoint::InputStart => FailPoint::InputStart,
            CliFailPoint::OutputStart => FailPoint::OutputStart,
        }
    }
}

#[derive(Serialize)]
struct LadderRow {
    tier: LatencyTier,
    sample_rate_hz: u32,
    buffer_divisor: usize,
    buffer_frames: usize,
    latency: LatencyEstimate,
}

#[derive(Serialize)]
struct SimulationReport {
    started: bool,
    error_code: Option<String>,
    error: Option<String>,
    tier: Option<LatencyTier>,
    sample_rate_hz: Option<u32>,
    attempts: usize,
    latency_ms: f64,
    level: f64,
    volume: f64,
    state_while_running: EngineState,
    open_handles_after_stop: usize,
    events: Vec<MetricEvent>,
}

#[derive(Serialize)]
struct RunSample {
    elapsed_ms: u128,
    monitoring: bool,
    level: f64,
    latency_ms: f64,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Ladder {
            platform_min,
            floor,
            overhead_ms,
        } => run_ladder(platform_min, floor, overhead_ms),
        Commands::Simulate {
            fail_first,
            fail_point,
            platform_min,
            millis,
            volume,
            deny_permission,
        } => run_simulate(
            fail_first,
            fail_point.into(),
            platform_min,
            Duration::from_millis(millis),
            volume,
            deny_permission,
        ),
        Commands::Run { seconds, volume } => run_live(Duration::from_secs(seconds), volume),
    }
}

fn run_ladder(platform_min: usize, floor: usize, overhead_ms: f64) -> Result<ExitCode> {
    let rows: Vec<LadderRow> = ConfigurationLadder::standard()
        .iter()
        .map(|config| {
            let frames = config.buffer_frames(platform_min, floor);
            LadderRow {
                tier: config.tier,
                sample_rate_hz: config.sample_rate_hz,
                buffer_divisor: config.buffer_divisor,
                buffer_frames: frames,
                latency: LatencyEstimate::from_frames(
                    config.sample_rate_hz,
                    frames,
                    frames,
                    overhead_ms,
                ),
            }
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(ExitCode::from(0))
}

fn run_simulate(
    fail_first: usize,
    fail_point: FailPoint,
    platform_min: usize,
    duration: Duration,
    volume: f64,
    deny_permission: bool,
) -> Result<ExitCode> {
    let backend = MockBackend::with_min_buffer(platform_min, platform_min)
        .failing_first(fail_first, fail_point)
        .with_noise(8000);
    let permissions = if deny_permission {
        MockPermissions::denied()
    } else {
        MockPermissions::granted()
    };

    let engine = EngineHandle::with_backend(
        AppConfig::default(),
        Arc::new(backend.clone()),
        Arc::new(permissions),
    );
    engine
        .set_volume(volume)
        .context("applying simulated volume")?;

    let started = engine.start();
    if started.is_ok() {
        thread::sleep(duration);
    }

    let active = engine.active_config();
    let state_while_running = engine.state();
    let latency_ms = engine.latency_ms();
    let level = engine.audio_level();
    engine.stop();

    let (error_code, error) = match &started {
        Ok(()) => (None, None),
        Err(err) => (Some(err.channel_code().to_string()), Some(err.message())),
    };

    let report = SimulationReport {
        started: started.is_ok(),
        error_code,
        error,
        tier: active.map(|c| c.tier),
        sample_rate_hz: active.map(|c| c.sample_rate_hz),
        attempts: backend.attempts(),
        latency_ms,
        level,
        volume: engine.volume(),
        state_while_running,
        open_handles_after_stop: backend.open_handles(),
        events: engine.telemetry_snapshot().recent,
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(if report.started {
        ExitCode::from(0)
    } else {
        ExitCode::from(2)
    })
}

fn run_live(duration: Duration, volume: f64) -> Result<ExitCode> {
    audio_monitor::init_logging();

    let engine = EngineHandle::new();
    engine.set_volume(volume).context("applying volume")?;
    engine.start().context("starting monitoring")?;

    let started_at = Instant::now();
    while started_at.elapsed() < duration {
        thread::sleep(Duration::from_millis(250));
        let sample = RunSample {
            elapsed_ms: started_at.elapsed().as_millis(),
            monitoring: engine.is_monitoring(),
            level: engine.audio_level(),
            latency_ms: engine.latency_ms(),
        };
        println!("{}", serde_json::to_string(&sample)?);
        if !sample.monitoring {
            break;
        }
    }

    engine.stop();
    Ok(ExitCode::from(0))
}
