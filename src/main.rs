#![forbid(unsafe_code)]

//! `shelltitle`: resolve the innermost process of a terminal session.
//!
//! `resolve` prints the innermost process under a root pid once. `watch`
//! runs the full shell-name service: every line read from stdin counts as
//! terminal activity, and each detected title is printed to stdout.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use shelltitle::config::{QueryBackend, ShellTitleConfig};
use shelltitle::models::{ProcessId, ProcessSnapshot};
use shelltitle::orchestrator::ShellNameService;
use shelltitle::platform::Platform;
use shelltitle::resolver::{innermost_process, resolve_shell_name};
use shelltitle::source::{
    spawn_line_reader, ConsoleTerminal, OutstandingQueries, ProcessInfoSource, SysinfoSource,
    TerminalSession, WmicSource,
};
use shelltitle::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "shelltitle", about = "Detect the innermost process of a terminal session", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json). Logs go to stderr.
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the innermost process under a root pid once.
    Resolve {
        /// Root shell process of the terminal.
        #[arg(long)]
        root_pid: ProcessId,
        /// Name printed when the root process is not running.
        #[arg(long)]
        fallback: Option<String>,
        /// Print the full process record as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Track the innermost process, treating each stdin line as terminal output.
    ///
    /// A line `:user` pins the title; `:process` hands it back to detection.
    Watch {
        /// Root shell process of the terminal.
        #[arg(long)]
        root_pid: ProcessId,
        /// Shell executable reported when the root process cannot be found.
        #[arg(long)]
        fallback: String,
    },
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let config = match args.config {
        Some(ref path) => ShellTitleConfig::load_from_path(path)?,
        None => ShellTitleConfig::default(),
    };
    let source = build_source(&config);

    match args.command {
        Command::Resolve {
            root_pid,
            fallback,
            json,
        } => resolve_once(root_pid, fallback, json, source.as_ref()).await,
        Command::Watch { root_pid, fallback } => watch(root_pid, fallback, source, &config).await,
    }
}

fn build_source(config: &ShellTitleConfig) -> Arc<dyn ProcessInfoSource> {
    match config.query.backend {
        QueryBackend::Sysinfo => Arc::new(SysinfoSource::new()),
        QueryBackend::Wmic => Arc::new(WmicSource::new(config.query.wmic_path.clone())),
    }
}

async fn resolve_once(
    root_pid: ProcessId,
    fallback: Option<String>,
    json: bool,
    source: &dyn ProcessInfoSource,
) -> Result<()> {
    let ids = tokio::task::spawn_blocking(move || SysinfoSource::descendant_ids(root_pid))
        .await
        .map_err(|err| AppError::Query(format!("process enumeration task panicked: {err}")))?;
    let queries = OutstandingQueries::new();
    let snapshot = ProcessSnapshot::new(source.lookup(&ids, &queries).await?);
    info!(root_pid, processes = snapshot.len(), "snapshot taken");

    if json {
        let record = innermost_process(&snapshot, root_pid)
            .ok_or_else(|| AppError::Query(format!("process {root_pid} is not running")))?;
        let rendered = serde_json::to_string_pretty(record)
            .map_err(|err| AppError::Io(format!("failed to encode record: {err}")))?;
        println!("{rendered}");
        return Ok(());
    }

    let name = match fallback {
        Some(ref fallback) => resolve_shell_name(&snapshot, root_pid, fallback),
        None => innermost_process(&snapshot, root_pid)
            .map(|record| record.name.clone())
            .ok_or_else(|| AppError::Query(format!("process {root_pid} is not running")))?,
    };
    println!("{name}");
    Ok(())
}

async fn watch(
    root_pid: ProcessId,
    fallback: String,
    source: Arc<dyn ProcessInfoSource>,
    config: &ShellTitleConfig,
) -> Result<()> {
    let terminal = Arc::new(ConsoleTerminal::new(root_pid));
    let session: Arc<dyn TerminalSession> = Arc::clone(&terminal) as Arc<dyn TerminalSession>;
    let service = ShellNameService::spawn(
        Platform::current(),
        root_pid,
        fallback,
        session,
        source,
        config,
    )
    .map_err(|err| {
        error!(%err, "cannot start shell name service");
        err
    })?;

    // Resolve once up front so the title is correct before any output.
    service.notify_activity();

    let mut lines = spawn_line_reader(std::io::BufReader::new(std::io::stdin()));
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(err) = result {
                    warn!(%err, "ctrl-c handler failed");
                }
                info!("interrupt received");
                break;
            }
            line = lines.recv() => match line.transpose()? {
                Some(line) => match line.trim() {
                    ":user" => terminal.set_title_managed_by_process(false),
                    ":process" => {
                        terminal.set_title_managed_by_process(true);
                        service.notify_activity();
                    }
                    _ => service.notify_activity(),
                },
                None => {
                    info!("stdin closed");
                    break;
                }
            },
        }
    }

    service.shutdown().await;
    info!("shelltitle watch stopped");
    Ok(())
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
