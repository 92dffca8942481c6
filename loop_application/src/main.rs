mod console;
mod controller;

use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use loop_engine::generator::{Generator, SineGenerator};
use loop_engine::{list_devices, Engine, EngineConfig, LevelMeter, Mode, SAMPLE_RATE};
use tracing_subscriber::EnvFilter;

use crate::console::{ConsoleCommand, HELP};
use crate::controller::LoopController;

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Devices => run_devices(),
        Commands::Run { device, meter } => run_console(config, device, meter),
        Commands::Demo { output } => run_demo(config, &output),
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

fn run_devices() -> anyhow::Result<()> {
    for (id, name) in list_devices()? {
        println!("{:>3}  {}", id, name);
    }

    Ok(())
}

fn run_console(config: EngineConfig, device: Option<usize>, meter: bool) -> anyhow::Result<()> {
    let mut engine = Engine::new(config)?;
    if let Some(id) = device {
        engine.set_device_id(id);
    }

    if meter {
        spawn_meter(engine.level_meter());
    }

    let mut controller = LoopController::new(engine);
    println!("{}", HELP);

    for line in io::stdin().lock().lines() {
        let line = line.context("failed to read from stdin")?;
        let command = match console::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                eprintln!("{}", e);
                continue;
            }
        };

        match command {
            ConsoleCommand::Gesture(gesture) => match controller.on_gesture(gesture) {
                Ok(()) => println!("{:?}", controller.mode()),
                Err(e) => tracing::error!(?gesture, error = %e, "gesture failed"),
            },
            ConsoleCommand::Undo => {
                if let Err(e) = controller.control_mut().undo() {
                    tracing::error!(error = %e, "undo failed");
                }
            }
            ConsoleCommand::Redo => {
                if let Err(e) = controller.control_mut().redo() {
                    tracing::error!(error = %e, "redo failed");
                }
            }
            ConsoleCommand::Level => println!("{:.4}", controller.control().level()),
            ConsoleCommand::Export(path) => match controller.control().export_to_file(&path) {
                Ok(report) => println!("wrote {} frames to {}", report.frames, path.display()),
                Err(e) => eprintln!("export failed: {}", e),
            },
            ConsoleCommand::Help => println!("{}", HELP),
            ConsoleCommand::Quit => break,
        }
    }

    let engine = controller.control_mut();
    if engine.missed_periods() > 0 {
        tracing::warn!(missed = engine.missed_periods(), "periods were played as silence");
    }
    engine.stop();
    Ok(())
}

fn spawn_meter(meter: LevelMeter) {
    let spawned = thread::Builder::new()
        .name("level-meter".into())
        .spawn(move || loop {
            tracing::info!(level = meter.load(), "input");
            thread::sleep(Duration::from_millis(100));
        });

    if let Err(e) = spawned {
        tracing::warn!(error = %e, "failed to start level meter");
    }
}

/// Records a take, overdubs a second one at half the length and exports the result, all without
/// touching audio hardware.
fn run_demo(config: EngineConfig, output: &Path) -> anyhow::Result<()> {
    let mut engine = Engine::new(config)?;
    let period = engine.config().period_frames;
    let take_periods = (SAMPLE_RATE as usize / period).max(1);

    let mut low = SineGenerator::new(SAMPLE_RATE, 440.0, 0.6);
    let mut high = SineGenerator::new(SAMPLE_RATE, 660.0, 0.6);

    tracing::info!(?output, "rendering demo loop");

    engine.set_mode(Mode::Recording)?;
    drive(&engine, Some(&mut low), period, take_periods)?;
    engine.set_mode(Mode::Playing)?;
    drive(&engine, None, period, take_periods / 2)?;
    engine.set_mode(Mode::Overdubbing)?;
    drive(&engine, Some(&mut high), period, take_periods / 2)?;
    engine.set_mode(Mode::Playing)?;
    drive(&engine, None, period, take_periods)?;
    engine.set_mode(Mode::Stopped)?;

    let report = engine.export_to_file(output)?;
    println!(
        "wrote {} frames to {} (peak {:.3}{})",
        report.frames,
        output.display(),
        report.peak,
        if report.normalized() { ", normalized" } else { "" },
    );

    engine.stop();
    Ok(())
}

fn drive(engine: &Engine, mut source: Option<&mut SineGenerator>, period: usize, periods: usize) -> anyhow::Result<()> {
    let mut input = vec![0.0f32; period];
    let mut output = vec![0.0f32; period];

    for _ in 0..periods {
        match source.as_deref_mut() {
            Some(generator) => generator.fill(&mut input),
            None => input.fill(0.0),
        }
        engine.render_offline(&input, &mut output)?;
    }

    Ok(())
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Real-time audio looper", long_about = None)]
struct Cli {
    /// JSON engine configuration. Defaults are used when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List audio devices and their ids.
    Devices,
    /// Run the looper on an audio device, driven from the console.
    Run {
        /// Device id from `devices`. Host defaults are used when omitted.
        #[arg(short, long)]
        device: Option<usize>,
        /// Log the input level every 100 ms.
        #[arg(short, long)]
        meter: bool,
    },
    /// Render a two layer loop offline and export it.
    Demo {
        /// Destination wav file.
        output: PathBuf,
    },
}
