//! Streamgate CLI - relay a result stream through a gateway buffer

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use std::thread;

use clap::{Parser, Subcommand};
use colored::Colorize;
use parking_lot::Mutex;

use streamgate::completion::Notification;
use streamgate::{
    BufferKind, EventAcceptor, EventRouter, FixSuggestion, GatewayConfig, GatewayError,
    OperationId, RecordingNotifier, ResultSink, ResultStore, Status,
};

#[derive(Parser)]
#[command(name = "streamgate")]
#[command(about = "Stream query results through a gateway buffer")]
#[command(version)]
struct Cli {
    /// Path to config.toml (defaults to ~/.config/streamgate/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy stdin to stdout through a result buffer, writer and reader on separate threads
    Relay {
        /// Buffer backend (file, memory)
        #[arg(short, long)]
        backend: Option<BufferKind>,

        /// Media type recorded for the result
        #[arg(short, long, default_value = "application/octet-stream")]
        media_type: String,

        /// Bytes per engine write
        #[arg(long, default_value_t = 8192)]
        chunk: usize,
    },

    /// Print the effective configuration
    Config,
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();

    let result = load_config(cli.config.as_deref()).and_then(|config| match cli.command {
        Commands::Relay {
            backend,
            media_type,
            chunk,
        } => relay(config, backend, &media_type, chunk),
        Commands::Config => print_config(&config),
    });

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        if let Some(suggestion) = e.fix_suggestion() {
            eprintln!("  {} {}", "Fix:".yellow(), suggestion);
        }
        std::process::exit(1);
    }
}

fn load_config(path: Option<&Path>) -> Result<GatewayConfig, GatewayError> {
    let config = match path {
        Some(path) => GatewayConfig::load_from(path)?,
        None => GatewayConfig::load()?,
    };
    config.with_env()
}

fn print_config(config: &GatewayConfig) -> Result<(), GatewayError> {
    print!("{}", config.to_toml()?);
    Ok(())
}

fn relay(
    mut config: GatewayConfig,
    backend: Option<BufferKind>,
    media_type: &str,
    chunk: usize,
) -> Result<(), GatewayError> {
    if let Some(backend) = backend {
        config.storage.backend = backend;
    }
    config.validate()?;

    let store = ResultStore::from_config(&config)?;
    let recorder = RecordingNotifier::new();

    let (stopped_tx, stopped_rx) = mpsc::channel();
    let stopped_tx = Mutex::new(stopped_tx);
    let router = Arc::new(EventRouter::new().with_stop_hook(move |id| {
        let _ = stopped_tx.lock().send(id.clone());
    }));

    let operation_id = OperationId::new(format!("relay-{}", std::process::id()));
    router.track(EventAcceptor::new(operation_id.clone(), recorder.clone()))?;
    router.on_status(&operation_id, Status::Pending);

    let handler = store.new_handler_for(operation_id.clone(), media_type)?;
    let mut result = store.obtain_readable_result(&operation_id)?;
    tracing::info!(operation = %operation_id, media_type = %result.media_type, backend = %store.kind(), "relay started");

    let engine = {
        let router = Arc::clone(&router);
        let operation_id = operation_id.clone();
        let sink = handler.into_sink();
        thread::spawn(move || {
            router.on_status(&operation_id, Status::Processing);
            match produce(io::stdin().lock(), sink, chunk.max(1)) {
                Ok(written) => {
                    tracing::debug!(operation = %operation_id, written, "engine finished");
                    router.on_status(&operation_id, Status::Completed);
                }
                Err(e) => {
                    router.on_cause(&operation_id, GatewayError::engine(e));
                    router.on_status(&operation_id, Status::Error);
                }
            }
        })
    };

    let delivered = {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        io::copy(&mut result.source, &mut out).and_then(|n| out.flush().map(|_| n))
    };
    // dropping the source abandons the buffer; further engine writes fail
    drop(result);

    if engine.join().is_err() {
        return Err(GatewayError::Internal {
            reason: "engine thread panicked".to_string(),
        });
    }

    // every event was delivered on the engine thread, so a stop is already queued
    if stopped_rx.try_recv().is_ok() {
        store.release(&operation_id)?;
    }
    store.dispose_all()?;

    let delivered = delivered.map_err(delivery_error)?;
    tracing::info!(operation = %operation_id, delivered, "relay finished");

    match recorder.take().into_iter().next() {
        Some(Notification::Failed(cause)) => Err(cause),
        Some(Notification::Succeeded) => Ok(()),
        None => Err(GatewayError::Internal {
            reason: "operation ended without a completion".to_string(),
        }),
    }
}

/// A closed stdout means the client went away, not a storage problem
fn delivery_error(e: io::Error) -> GatewayError {
    match e.kind() {
        io::ErrorKind::BrokenPipe => GatewayError::Closed,
        _ => GatewayError::Io(e),
    }
}

/// Engine side: copy `input` into the sink in `chunk` sized writes
fn produce(mut input: impl Read, mut sink: ResultSink, chunk: usize) -> io::Result<u64> {
    let mut buf = vec![0u8; chunk];
    let mut written = 0u64;
    loop {
        let n = match input.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        sink.write_all(&buf[..n])?;
        written += n as u64;
    }
    sink.close()?;
    Ok(written)
}
