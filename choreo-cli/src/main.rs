//! Demo binary for the choreography engine: a live microphone mode, an offline file-decode
//! playback mode, a `plan` mode that writes a song map to disk, and a synthesized metronome
//! `demo` mode for testing without a real audio device.

mod audio_pipeline;
mod config;
mod decode;
mod package_io;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{info, warn};

use audio_pipeline::SpectrumPipeline;
use choreo_engine::{Engine, EngineCommand};

#[derive(Parser)]
#[command(name = "choreo", about = "Audio-reactive choreography engine demo")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture the default microphone and drive the engine live.
    Live {
        /// Frame-set package directory (contains meta.json + manifest.json).
        package: PathBuf,
        /// RNG seed for reproducible selection.
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
    /// Decode an audio file and drive the engine against it.
    File {
        /// Audio file to decode.
        audio: PathBuf,
        /// Frame-set package directory.
        package: PathBuf,
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
    /// Analyze an audio file offline and write a song map as JSON.
    Plan {
        /// Audio file to analyze.
        audio: PathBuf,
        /// Frame-set package directory (choreography needs frame affinities to plan against).
        package: PathBuf,
        /// Output path for the song map JSON.
        #[arg(long, default_value = "song_map.json")]
        out: PathBuf,
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
    /// Synthesize a metronome click track and drive the engine against it, no audio device
    /// or input file required.
    Demo {
        package: PathBuf,
        #[arg(long, default_value_t = 120.0)]
        bpm: f32,
        #[arg(long, default_value_t = 8)]
        bars: u32,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let mut config = config::Config::load();

    match cli.command {
        Commands::Live { package, seed } => {
            config.last_package_dir = Some(package.clone());
            let _ = config.save();
            run_live(&package, seed)
        }
        Commands::File { audio, package, seed } => {
            config.last_package_dir = Some(package.clone());
            let _ = config.save();
            run_file(&audio, &package, seed)
        }
        Commands::Plan { audio, package, out, seed } => {
            config.last_plan_output = Some(out.clone());
            let _ = config.save();
            run_plan(&audio, &package, &out, seed)
        }
        Commands::Demo { package, bpm, bars } => run_demo(&package, bpm, bars),
    }
}

/// Builds an engine with deck 0 loaded from `package` and kinetic mode selected.
fn engine_with_pool(package: &Path, seed: u64) -> anyhow::Result<Engine> {
    let pool = package_io::load_pool(package)?;
    info!(frames = pool.len(), "loaded frame pool");
    let mut engine = Engine::new(seed);
    engine.handle_command(EngineCommand::LoadDeckPool(0, Arc::new(pool)))?;
    Ok(engine)
}

fn run_live(package: &Path, seed: u64) -> anyhow::Result<()> {
    let mut engine = engine_with_pool(package, seed)?;

    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow::anyhow!("no default input device found"))?;
    let config = device.default_input_config()?;
    let sample_rate = config.sample_rate().0;
    let channels = config.channels() as usize;

    let (tx, rx): (Sender<Vec<f32>>, Receiver<Vec<f32>>) = bounded(64);
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_stream = shutdown.clone();

    let stream = device.build_input_stream(
        &config.into(),
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            if shutdown_stream.load(Ordering::Acquire) {
                return;
            }
            let mono: Vec<f32> = data
                .chunks(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels.max(1) as f32)
                .collect();
            let _ = tx.try_send(mono);
        },
        |err| warn!(%err, "audio input stream error"),
        None,
    )?;
    stream.play()?;

    let mut pipeline = SpectrumPipeline::new(sample_rate);

    info!("listening, press ctrl-c to stop");
    while !shutdown.load(Ordering::Acquire) {
        match rx.recv_timeout(Duration::from_millis(200)) {
            Ok(chunk) => {
                for frame in pipeline.push(&chunk) {
                    let decision = engine.update(frame.sample);
                    if !decision.sequencer_frames.is_empty() {
                        info!(?decision.sequencer_frames, ?decision.transition_mode, "tick");
                    }
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
    }

    let telemetry = engine.get_telemetry();
    info!(bpm = telemetry.bpm, ticks = telemetry.uptime_ticks, "stopped");
    Ok(())
}

fn run_file(audio: &Path, package: &Path, seed: u64) -> anyhow::Result<()> {
    let mut engine = engine_with_pool(package, seed)?;
    let decoded = decode::decode_file(audio)?;
    let mut pipeline = SpectrumPipeline::new(decoded.sample_rate);

    let started = Instant::now();
    let chunk_size = 4096;
    for chunk in decoded.samples.chunks(chunk_size) {
        for frame in pipeline.push(chunk) {
            let decision = engine.update(frame.sample);
            if !decision.sequencer_frames.is_empty() {
                info!(?decision.sequencer_frames, ?decision.transition_mode, "tick");
            }
        }
    }

    let telemetry = engine.get_telemetry();
    info!(
        bpm = telemetry.bpm,
        ticks = telemetry.uptime_ticks,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "playback finished"
    );
    Ok(())
}

fn run_plan(audio: &Path, package: &Path, out: &Path, seed: u64) -> anyhow::Result<()> {
    let pool = package_io::load_pool(package)?;
    let decoded = decode::decode_file(audio)?;

    // Not wired to a signal handler yet; a future caller can flip this from another thread to
    // abort a long analysis.
    let cancel = Arc::new(AtomicBool::new(false));

    info!(samples = decoded.samples.len(), sample_rate = decoded.sample_rate, "analyzing song");
    let mut song_map = choreo_planner::analyze_song(&decoded.samples, decoded.sample_rate, &cancel)?;
    choreo_planner::plan_song(&mut song_map, &pool, seed)?;

    let json = serde_json::to_string_pretty(&song_map)?;
    std::fs::write(out, json)?;
    info!(path = %out.display(), bpm = song_map.bpm, beats = song_map.beats.len(), "wrote song map");
    Ok(())
}

fn run_demo(package: &Path, bpm: f32, bars: u32) -> anyhow::Result<()> {
    let mut engine = engine_with_pool(package, 0)?;
    let sample_rate = 44_100u32;
    let samples = synth_metronome(sample_rate, bpm, bars);
    let mut pipeline = SpectrumPipeline::new(sample_rate);

    for chunk in samples.chunks(4096) {
        for frame in pipeline.push(chunk) {
            let decision = engine.update(frame.sample);
            if !decision.sequencer_frames.is_empty() {
                info!(?decision.sequencer_frames, ?decision.transition_mode, "tick");
            }
        }
    }

    let telemetry = engine.get_telemetry();
    info!(bpm = telemetry.bpm, ticks = telemetry.uptime_ticks, "demo finished");
    Ok(())
}

/// Synthesizes a click track: a short burst of energy on every beat, silence between.
/// Also writes the same buffer to a scratch WAV file via `hound`, mirroring how fixture audio
/// gets generated for manual listening checks.
fn synth_metronome(sample_rate: u32, bpm: f32, bars: u32) -> Vec<f32> {
    let beats_per_bar = 4;
    let total_beats = bars * beats_per_bar;
    let samples_per_beat = ((sample_rate as f32 * 60.0) / bpm) as usize;
    let click_len = (sample_rate as f32 * 0.02) as usize;

    let mut samples = vec![0.0f32; samples_per_beat * total_beats as usize];
    for beat in 0..total_beats {
        let start = beat as usize * samples_per_beat;
        for i in 0..click_len.min(samples.len().saturating_sub(start)) {
            let decay = 1.0 - (i as f32 / click_len as f32);
            let tone = (2.0 * std::f32::consts::PI * 1000.0 * i as f32 / sample_rate as f32).sin();
            samples[start + i] = tone * decay;
        }
    }

    if let Ok(spec_writer) = hound::WavWriter::create(
        "choreo_demo.wav",
        hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        },
    ) {
        let mut writer = spec_writer;
        for &s in &samples {
            let _ = writer.write_sample(s);
        }
        let _ = writer.finalize();
    }

    samples
}
