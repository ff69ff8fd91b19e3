//! Thin CLI driver. All fallible plumbing here is `anyhow`; the library
//! crate's `SabiError` is converted at this boundary, mirroring the
//! pack's convention of a `thiserror` library behind an `anyhow` binary.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sabi::config::Config;
use sabi::recognizer::Recognizer;
use sabi::registrar;
use sabi::sink::{ChannelSink, EventSink, LoggingSink};
use sabi::store::memory::InMemoryStore;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};

#[derive(Parser)]
#[command(name = "sabi", about = "Acoustic fingerprinting and recognition engine")]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Registers a reference recording from an audio file.
    Register {
        audio_path: PathBuf,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "{}")]
        metadata: String,
    },
    /// Registers a reference from a pre-computed fingerprint file.
    RegisterFile {
        fingerprint_path: PathBuf,
        #[arg(long)]
        force: bool,
    },
    /// Writes a fingerprint file for an audio file (§4.6 export path).
    ExportFingerprint {
        audio_path: PathBuf,
        output_path: PathBuf,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "{}")]
        metadata: String,
    },
    /// Runs a batch of reference metadata YAML descriptors from a directory.
    RegisterBatch {
        descriptor_dir: PathBuf,
        audio_base_dir: PathBuf,
        #[arg(long, default_value_t = 4)]
        workers: usize,
    },
    /// Listens on the default microphone and logs/emits recognitions.
    Listen,
    /// Lists registered references.
    List,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Command::Register {
            audio_path,
            name,
            metadata,
        } => {
            let metadata: serde_json::Value =
                serde_json::from_str(&metadata).context("parsing --metadata as JSON")?;
            let mut store = InMemoryStore::new();
            let reference_id = registrar::register_from_audio(
                &mut store,
                &name,
                &audio_path,
                metadata,
                None,
            )
            .context("registering reference")?;
            println!("registered {name} as reference {reference_id}");
        }
        Command::RegisterFile {
            fingerprint_path,
            force,
        } => {
            let mut store = InMemoryStore::new();
            match registrar::register_from_fingerprint_file(&mut store, &fingerprint_path, force)
                .context("registering from fingerprint file")?
            {
                Some(reference_id) => println!("registered reference {reference_id}"),
                None => println!("skipped: reference already registered"),
            }
        }
        Command::ExportFingerprint {
            audio_path,
            output_path,
            name,
            metadata,
        } => {
            let metadata: serde_json::Value =
                serde_json::from_str(&metadata).context("parsing --metadata as JSON")?;
            let wrote = registrar::export_fingerprint(
                &name,
                &audio_path,
                &output_path,
                metadata,
                None,
            )
            .context("exporting fingerprint")?;
            if wrote {
                println!("wrote {}", output_path.display());
            } else {
                println!("skipped (unchanged content digest): {}", output_path.display());
            }
        }
        Command::RegisterBatch {
            descriptor_dir,
            audio_base_dir,
            workers,
        } => {
            let mut store = InMemoryStore::new();
            let summary =
                registrar::run_batch(&mut store, &descriptor_dir, &audio_base_dir, workers)
                    .context("running batch registration")?;
            println!(
                "total={} succeeded={} skipped={} failed={}",
                summary.total, summary.succeeded, summary.skipped, summary.failed
            );
            for (item, reason) in &summary.failures {
                println!("  failed: {item}: {reason}");
            }
        }
        Command::Listen => {
            let store = InMemoryStore::new();
            let mut recognizer = Recognizer::new(store, config.recognition.clone());
            let logging_sink = LoggingSink;
            let (detection_tx, detection_rx) = mpsc::channel();
            let channel_sink = ChannelSink::new(detection_tx);

            let (audio_tx, audio_rx) = mpsc::channel();
            let _stream = sabi::capture::start_capture(audio_tx).context("starting capture")?;

            let running = Arc::new(AtomicBool::new(true));
            let ctrlc_flag = running.clone();
            ctrlc::set_handler(move || ctrlc_flag.store(false, Ordering::SeqCst))
                .context("installing Ctrl-C handler")?;

            while running.load(Ordering::SeqCst) {
                match audio_rx.recv_timeout(std::time::Duration::from_millis(200)) {
                    Ok(chunk) => {
                        recognizer.push_chunk(&chunk);
                        if let Some(record) = recognizer.recognize_once(&logging_sink)? {
                            channel_sink.emit(record);
                        }
                        while let Ok(record) = detection_rx.try_recv() {
                            println!(
                                "{}: confidence={:.2} offset={:.2}s",
                                record.song_name, record.confidence, record.offset
                            );
                        }
                    }
                    Err(mpsc::RecvTimeoutError::Timeout) => continue,
                    Err(mpsc::RecvTimeoutError::Disconnected) => break,
                }
            }
            let stats = recognizer.stats();
            println!(
                "chunks={} windows={} skipped_silent={} detections={} suppressed={}",
                stats.chunks_received,
                stats.windows_processed,
                stats.windows_skipped_silent,
                stats.detections_produced,
                stats.emissions_suppressed_by_debounce
            );
        }
        Command::List => {
            let mut store = InMemoryStore::new();
            for reference in sabi::store::FingerprintStore::list_references(&mut store)? {
                println!("{}: {}", reference.reference_id, reference.name);
            }
        }
    }

    Ok(())
}
