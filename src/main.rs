//! CLI entry point: `ingest`, `identify`, and `listen` subcommands.
//!
//! This binary is the only place `anyhow` and `std::process::exit` appear;
//! every other module returns the core's [`stria::Error`] and lets its
//! caller decide what to do about it.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use stria::capture::CpalSource;
use stria::catalog::TrackMeta;
use stria::config::Config;
use stria::decode::SymphoniaSource;
use stria::store::Store;
use stria::{pipeline, MatchOutcome};

#[derive(Parser, Debug)]
#[command(name = "stria")]
#[command(about = "Acoustic fingerprinting and matching engine", long_about = None)]
struct Cli {
    /// Path to the SQLite fingerprint store.
    #[arg(long, default_value = "stria.sqlite")]
    store: PathBuf,

    /// Path to a TOML config file. Defaults to built-in parameters.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fingerprints an audio file and adds it to the store.
    Ingest {
        path: PathBuf,
        #[arg(long)]
        title: String,
        #[arg(long)]
        artist: String,
    },
    /// Fingerprints an audio file and looks it up against the store.
    Identify { path: PathBuf },
    /// Records from the default microphone and looks up the result.
    Listen {
        /// Capture duration in seconds.
        #[arg(long, default_value_t = 10)]
        seconds: u64,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(Config::default()),
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let config = load_config(cli.config.as_ref())?;

    let mut store = match Store::open(&cli.store, &config) {
        Ok(store) => store,
        Err(stria::Error::SchemaMismatch(detail)) => {
            eprintln!("store schema mismatch: {detail}");
            return Ok(3);
        }
        Err(err) => {
            return Err(err).with_context(|| format!("opening store at {}", cli.store.display()))
        }
    };

    store
        .check_integrity()
        .with_context(|| format!("checking integrity of store at {}", cli.store.display()))?;

    match cli.command {
        Command::Ingest { path, title, artist } => {
            let mut source = match SymphoniaSource::open(&path) {
                Ok(source) => source,
                Err(err) => return report_decode_error(err),
            };
            let meta = TrackMeta {
                title,
                artist,
                duration_ms: source.duration_ms(),
            };
            resolve(pipeline::ingest(&mut store, &mut source, &meta, &config), |track_id| {
                println!("ingested track {}", track_id.get());
                0
            })
        }
        Command::Identify { path } => {
            let mut source = match SymphoniaSource::open(&path) {
                Ok(source) => source,
                Err(err) => return report_decode_error(err),
            };
            resolve(pipeline::identify(&store, &mut source, &config), report_match_outcome)
        }
        Command::Listen { seconds } => {
            let mut source = CpalSource::record(Duration::from_secs(seconds))
                .context("recording from the default input device")?;
            resolve(pipeline::identify(&store, &mut source, &config), report_match_outcome)
        }
    }
}

/// A decode failure (unreadable or unsupported audio) always maps to exit
/// code `2`, independent of which subcommand triggered it.
fn report_decode_error(err: stria::Error) -> Result<i32> {
    eprintln!("error: {err}");
    Ok(2)
}

fn report_match_outcome(outcome: MatchOutcome) -> i32 {
    match outcome {
        MatchOutcome::Matched { candidate, confidence } => {
            println!(
                "matched track {} (confidence {:.2}, score {})",
                candidate.track_id.get(),
                confidence,
                candidate.score
            );
            0
        }
        MatchOutcome::NoMatch { ranked } => {
            println!("no match ({} candidates considered)", ranked.len());
            1
        }
    }
}

/// Runs a core operation and turns its outcome into an exit code.
/// `InvalidAudio`/`EmptyAudio` (the pipeline can surface these too, not
/// just the initial decode) map to exit code `2`; every other error is an
/// unexpected failure that `main` reports and exits `1` for.
fn resolve<T>(result: Result<T, stria::Error>, on_ok: impl FnOnce(T) -> i32) -> Result<i32> {
    match result {
        Ok(value) => Ok(on_ok(value)),
        Err(err @ (stria::Error::InvalidAudio(_) | stria::Error::EmptyAudio)) => {
            report_decode_error(err)
        }
        Err(err) => Err(anyhow::Error::new(err)),
    }
}
