//! Organum Player - command line pipe organ
//!
//! This is the main entry point. It:
//! 1. Starts the audio backend (JACK or CPAL)
//! 2. Builds the demo organ on a background thread
//! 3. Engages each stop once the engine has installed it
//! 4. Routes MIDI keyboards to the engine
//!
//! ## Command line flags
//!
//! - `--config <path>`: Configuration file (default ~/.config/organum/organum.yaml)
//! - `--layout stereo|bformat|binaural`: Override the output layout
//! - `--no-midi`: Do not open a MIDI input
//! - `--render <file.wav>`: Render a short demo offline instead of playing live
//! - `--sample-rate <hz>`: Sample rate for `--render` (default 48000)
//! - `--list-devices`: Print audio devices and MIDI ports, then exit
//! - `--write-config`: Save the effective configuration to the config path, then exit

mod config;
mod organ;
mod render;

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use organum_core::audio::{get_output_devices, start_audio_system, DEFAULT_SAMPLE_RATE};
use organum_core::config::{default_config_path, load_config, save_config};
use organum_core::engine::{AudioParam, Command, OutputLayout};
use organum_core::synth::RankBuilder;
use organum_midi::{list_input_ports, MidiInputHandler};

use config::OrganConfig;
use organ::{demo_organ, request_build, Registration};

/// Main loop poll interval
const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    layout: Option<OutputLayout>,
    no_midi: bool,
    render: Option<PathBuf>,
    sample_rate: Option<u32>,
    list_devices: bool,
    write_config: bool,
}

impl Args {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let mut parsed = Args::default();
        while let Some(arg) = args.next() {
            let mut value = || args.next().with_context(|| format!("{} needs a value", arg));
            match arg.as_str() {
                "--config" => parsed.config = Some(PathBuf::from(value()?)),
                "--layout" => parsed.layout = Some(value()?.parse().map_err(anyhow::Error::msg)?),
                "--render" => parsed.render = Some(PathBuf::from(value()?)),
                "--sample-rate" => parsed.sample_rate = Some(value()?.parse().context("Invalid sample rate")?),
                "--no-midi" => parsed.no_midi = true,
                "--list-devices" => parsed.list_devices = true,
                "--write-config" => parsed.write_config = true,
                other => bail!("Unknown argument '{}'", other),
            }
        }
        Ok(parsed)
    }
}

fn main() -> Result<()> {
    // Set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse(std::env::args().skip(1))?;

    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let mut config: OrganConfig = load_config(&config_path);
    if let Some(layout) = args.layout {
        config.audio.layout = layout;
    }

    if args.write_config {
        save_config(&config, &config_path)?;
        println!("Wrote {}", config_path.display());
        return Ok(());
    }

    if args.list_devices {
        list_devices();
        return Ok(());
    }

    if let Some(path) = &args.render {
        let sample_rate = args
            .sample_rate
            .or(config.audio.sample_rate)
            .unwrap_or(DEFAULT_SAMPLE_RATE);
        return render::render_demo(path, &config, sample_rate, config.audio.layout);
    }

    run_live(&config, args.no_midi)
}

fn list_devices() {
    println!("Audio output devices:");
    match get_output_devices() {
        Ok(devices) => devices.iter().for_each(|d| println!("  {}", d)),
        Err(e) => println!("  ({})", e),
    }
    println!("MIDI input ports:");
    match list_input_ports() {
        Ok(ports) => ports.iter().for_each(|p| println!("  {}", p)),
        Err(e) => println!("  ({})", e),
    }
}

fn run_live(config: &OrganConfig, no_midi: bool) -> Result<()> {
    let audio = start_audio_system(&config.audio).context("Failed to start audio")?;
    log::info!(
        "Audio running: {} Hz, {} channels, {} frames (~{:.1}ms)",
        audio.sample_rate,
        audio.info.channels,
        audio.buffer_size,
        audio.latency_ms
    );

    let handle = audio.handle;
    let mut controls = audio.controls;
    let mut events = audio.events;

    controls.send(Command::AudioParam {
        param: AudioParam::ReverbSize,
        value: config.reverb.size,
    })?;
    controls.send(Command::AudioParam {
        param: AudioParam::ReverbTime,
        value: config.reverb.time,
    })?;

    let builder = RankBuilder::spawn(audio.sample_rate as f32, config.cache_dir.clone(), audio.messages)
        .context("Failed to start rank builder")?;
    let plans = demo_organ();
    let mut registration = Registration::new(request_build(&builder, &plans, config.tuning)?);

    // The MIDI callback takes over the note queue
    let _midi = match (&config.midi.port, no_midi) {
        (Some(port), false) => {
            match MidiInputHandler::connect(port, config.midi.channels.clone(), audio.notes) {
                Ok(handler) => Some(handler),
                Err(e) => {
                    log::warn!("MIDI disabled: {}", e);
                    None
                }
            }
        }
        _ => {
            log::info!("MIDI disabled");
            None
        }
    };

    let quit = Arc::new(AtomicBool::new(false));
    {
        let quit = quit.clone();
        thread::Builder::new()
            .name("organum-stdin".to_string())
            .spawn(move || {
                for line in std::io::stdin().lock().lines().map_while(Result::ok) {
                    if line.trim() == "q" {
                        quit.store(true, Ordering::Release);
                        break;
                    }
                }
            })
            .context("Failed to spawn input thread")?;
    }

    println!("Organum running. Type 'q' and Enter to quit.");

    while handle.is_running() {
        while let Ok(event) = events.pop() {
            registration.handle(event, &mut controls);
        }
        if quit.load(Ordering::Acquire) {
            let _ = controls.send(Command::all_sound_off());
            handle.stop();
        }
        thread::sleep(POLL_INTERVAL);
    }

    log::info!("Audio stopped, shutting down");
    builder.shutdown();
    Ok(())
}
