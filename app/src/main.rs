use clap::{Parser, Subcommand};
use fmbridge_core::{
    channel_for, export_diagnostics, Event, PendingReply, PlaybackMode, ReadyInfo, RenderHost,
    Request, SynthClient,
};
use fmbridge_infra_engine_sim::SimEngineLoader;
use fmbridge_infra_storage_fs::FsStorage;
use fmbridge_ports::storage::{BridgeConfig, StoragePort};
use hound::{WavSpec, WavWriter};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{info, warn};

/// Headless driver for the FM synthesis bridge
#[derive(Parser)]
#[command(name = "fmbridge")]
#[command(about = "Drive the FM synthesis bridge without an audio device")]
#[command(version)]
struct Cli {
    /// Directory holding config.json (default: platform config dir)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print engine version and session state as JSON
    Info,

    /// Render a MIDI file into a 32-bit float stereo WAV file
    Render {
        midi: PathBuf,
        output: PathBuf,

        /// WOPL bank file loaded before playback
        #[arg(long)]
        bank: Option<PathBuf>,

        /// Embedded bank number
        #[arg(long)]
        embedded_bank: Option<u32>,

        /// Playback speed multiplier
        #[arg(long, default_value = "1.0")]
        tempo: f64,

        /// Stop after this many seconds even if the file has not ended
        #[arg(long, default_value = "600")]
        max_seconds: f64,
    },

    /// Write the effective configuration to config.json
    SaveConfig,

    /// Write a diagnostics bundle into DIR
    ExportDiagnostics { dir: PathBuf },
}

/// Client and render host driven from one thread. Each answered request is
/// applied by draining the host before its reply is read.
struct Bridge {
    client: SynthClient,
    host: RenderHost,
}

impl Bridge {
    fn start(config: &BridgeConfig) -> Result<(Self, ReadyInfo), String> {
        let (mut client, link) = channel_for(config);
        let ready = client
            .begin_init(Duration::from_millis(config.init_timeout_ms))
            .map_err(|e| e.to_string())?;
        let host = RenderHost::start(&SimEngineLoader::default(), config, link);
        client.poll();

        let ready = settled(ready)?;
        let host = host.ok_or_else(|| "render host did not start".to_string())?;
        Ok((Self { client, host }, ready))
    }

    fn call<T>(&mut self, reply: PendingReply<T>) -> Result<T, String> {
        self.host.drain_commands();
        self.client.poll();
        settled(reply)
    }

    fn send(&mut self, request: Request) -> Result<(), String> {
        self.client.send(request).map_err(|e| e.to_string())
    }

    fn log_events(&mut self) -> bool {
        let mut ended = false;
        for event in self.client.drain_events() {
            match event {
                Event::PlaybackEnded => ended = true,
                Event::Diagnostic { message } => warn!(%message, "render side diagnostic"),
            }
        }
        ended
    }
}

fn settled<T>(reply: PendingReply<T>) -> Result<T, String> {
    match reply.try_take() {
        Some(result) => result.map_err(|e| e.to_string()),
        None => Err("render side did not answer".to_string()),
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, String> {
    fs::read(path).map_err(|e| format!("{}: {e}", path.display()))
}

fn main() -> ExitCode {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), String> {
    let storage = match cli.config_dir {
        Some(dir) => FsStorage::new(dir),
        None => FsStorage::default(),
    };
    let config = storage.load_config().map_err(|e| e.to_string())?;

    match cli.command {
        Commands::Info => info_command(&config),
        Commands::Render {
            midi,
            output,
            bank,
            embedded_bank,
            tempo,
            max_seconds,
        } => {
            let (mut bridge, _) = Bridge::start(&config)?;
            if let Some(path) = bank {
                let reply = bridge
                    .client
                    .load_bank(read_file(&path)?)
                    .map_err(|e| e.to_string())?;
                bridge.call(reply)?;
            }
            if let Some(bank) = embedded_bank {
                let reply = bridge.client.set_bank(bank).map_err(|e| e.to_string())?;
                bridge.call(reply)?;
            }
            render_command(&mut bridge, &config, &midi, &output, tempo, max_seconds)
        }
        Commands::SaveConfig => {
            storage.save_config(&config).map_err(|e| e.to_string())?;
            println!("{}", storage.config_path().display());
            Ok(())
        }
        Commands::ExportDiagnostics { dir } => diagnostics_command(&config, &dir),
    }
}

fn info_command(config: &BridgeConfig) -> Result<(), String> {
    let (mut bridge, ready) = Bridge::start(config)?;
    let version = bridge.client.query_version().map_err(|e| e.to_string())?;
    let version = bridge.call(version)?;
    let state = bridge.client.query_state().map_err(|e| e.to_string())?;
    let state = bridge.call(state)?;

    let report = serde_json::json!({
        "ready": ready,
        "version": version,
        "state": state,
    });
    let text = serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?;
    println!("{text}");
    Ok(())
}

fn render_command(
    bridge: &mut Bridge,
    config: &BridgeConfig,
    midi: &Path,
    output: &Path,
    tempo: f64,
    max_seconds: f64,
) -> Result<(), String> {
    let reply = bridge
        .client
        .load_midi(read_file(midi)?)
        .map_err(|e| e.to_string())?;
    let duration = bridge.call(reply)?;
    info!(path = %midi.display(), duration, "MIDI file loaded");

    bridge.send(Request::SetLoop { enabled: false })?;
    bridge.send(Request::SetTempo { tempo })?;
    bridge.send(Request::Play)?;
    bridge.host.drain_commands();
    bridge.client.poll();
    bridge.log_events();
    if bridge.host.session().mode() != PlaybackMode::File {
        return Err("playback did not start".to_string());
    }

    let sample_rate = config.sample_rate_hz;
    let spec = WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = WavWriter::create(output, spec).map_err(|e| e.to_string())?;

    let block = config.block_frames.max(1) as usize;
    let max_frames = (max_seconds.max(0.0) * sample_rate as f64) as u64;
    let mut left = vec![0.0f32; block];
    let mut right = vec![0.0f32; block];
    let mut frames = 0u64;

    while frames < max_frames {
        bridge.host.process(&mut left, &mut right);
        for (l, r) in left.iter().zip(&right) {
            writer.write_sample(*l).map_err(|e| e.to_string())?;
            writer.write_sample(*r).map_err(|e| e.to_string())?;
        }
        frames += block as u64;

        bridge.client.poll();
        if bridge.log_events() {
            break;
        }
    }
    writer.finalize().map_err(|e| e.to_string())?;

    info!(
        path = %output.display(),
        frames,
        seconds = frames as f64 / sample_rate.max(1) as f64,
        "render finished"
    );
    Ok(())
}

fn diagnostics_command(config: &BridgeConfig, dir: &Path) -> Result<(), String> {
    let (state, recent) = match Bridge::start(config) {
        Ok((mut bridge, _)) => {
            let state = bridge.client.query_state().map_err(|e| e.to_string())?;
            let state = bridge.call(state)?;
            bridge.log_events();
            (Some(state), bridge.client.recent_diagnostics())
        }
        Err(err) => {
            warn!(%err, "bridge did not start, exporting without state");
            (None, vec![err])
        }
    };

    export_diagnostics(dir, config, state.as_ref(), recent).map_err(|e| e.to_string())?;
    println!("{}", dir.display());
    Ok(())
}
