//! Live Preview CLI
//!
//! Single-shot mode:
//!   live-preview [--html FILE] [--css FILE] [--js FILE] [--query QUERY]
//!
//!   Applies the local fragments and the startup query (`html`, `css`,
//!   `menu`, `autorender`), renders, prints the composed document to stdout
//!   and relayed diagnostics to stderr.
//!
//! Session mode (persistent process, reads commands from stdin):
//!   live-preview --session [--state-file FILE]
//!
//! Protocol (session mode):
//!   Request (stdin, one JSON object per line):
//!     {"cmd":"edit","kind":"html","text":"<p>hi</p>"}
//!     {"cmd":"render"}
//!     {"cmd":"auto_render","enabled":true}
//!     {"cmd":"load","kind":"css","url":"https://example.com/styles.css"}
//!     {"cmd":"select_tab","kind":"js"}
//!
//!   Response (stdout):
//!     Status:Ok
//!     Kind:document
//!     Length:1234
//!
//!     <!DOCTYPE html>...
//!
//!   `Kind:status` responses carry the status line instead of a document.

use anyhow::{Context, Result};
use clap::Parser;
use live_preview::{
    message_channel, run_bootstrap, BootstrapParams, Chrome, DiagnosticMessage, FetchConfig,
    FileStorage, FragmentKind, HeadlessSurface, HttpFetcher, KeyValueStorage, LogSink,
    MemoryStorage, PreviewConfig, PreviewHost, RuntimeLimits, SourceStore, StatusLine, Workbench,
};
use serde::Deserialize;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "live-preview",
    version,
    about = "Compose HTML/CSS/JS and run it in an isolated preview"
)]
struct Cli {
    /// Local HTML fragment
    #[arg(long)]
    html: Option<PathBuf>,

    /// Local CSS fragment
    #[arg(long)]
    css: Option<PathBuf>,

    /// Local JavaScript fragment
    #[arg(long)]
    js: Option<PathBuf>,

    /// Startup query string, e.g. "html=https://host/page.html&autorender=1"
    #[arg(long, default_value = "")]
    query: String,

    /// JSON file persisting sources between runs (in-memory when omitted)
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Read commands from stdin instead of rendering once
    #[arg(long)]
    session: bool,

    /// Script time limit per document in milliseconds (0 = unlimited)
    #[arg(long, default_value_t = 5_000)]
    timeout_ms: u64,

    /// Isolate heap limit in MiB (0 = unlimited)
    #[arg(long, default_value_t = 64)]
    max_heap_mb: usize,

    /// Origin remote sources may be loaded from (repeatable; none = any)
    #[arg(long = "allow-origin")]
    allowed_origins: Vec<String>,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    fn config(&self) -> PreviewConfig {
        PreviewConfig {
            storage_path: self.state_file.clone(),
            timeout_ms: (self.timeout_ms > 0).then_some(self.timeout_ms),
            max_heap_size: (self.max_heap_mb > 0).then_some(self.max_heap_mb * 1024 * 1024),
            allowed_origins: self.allowed_origins.clone(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum SessionCommand {
    Edit { kind: FragmentKind, text: String },
    Render,
    AutoRender { enabled: bool },
    Load { kind: FragmentKind, url: String },
    SelectTab { kind: FragmentKind },
}

/// Prints relayed diagnostics to stderr; stdout carries documents.
struct StderrLog;

impl LogSink for StderrLog {
    fn record(&mut self, message: &DiagnosticMessage) {
        eprintln!("{}", message);
    }
}

/// Initialize the tracing subscriber, logging to stderr.
fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn build_workbench(config: &PreviewConfig) -> Workbench<HeadlessSurface> {
    let storage: Arc<dyn KeyValueStorage> = match &config.storage_path {
        Some(path) => Arc::new(FileStorage::new(path)),
        None => Arc::new(MemoryStorage::new()),
    };
    let status = StatusLine::default();
    let store = SourceStore::restore(storage, config.save_debounce(), status.clone());

    let (port, inbox) = message_channel();
    let surface = HeadlessSurface::new(RuntimeLimits::from(config), port);
    let host = PreviewHost::new(surface, inbox, Box::new(StderrLog));

    Workbench::new(store, host, Chrome::new(status))
}

fn read_fragment(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

/// Render once and print the composed document.
async fn run_single_shot(cli: &Cli, config: &PreviewConfig) -> Result<()> {
    let mut workbench = build_workbench(config);
    let fetcher = HttpFetcher::new(
        FetchConfig {
            allowed_origins: config.allowed_origins.clone(),
        },
        config.fetch_timeout(),
    )?;

    for (kind, path) in [
        (FragmentKind::Html, &cli.html),
        (FragmentKind::Css, &cli.css),
        (FragmentKind::Js, &cli.js),
    ] {
        if let Some(path) = path {
            workbench.store_mut().set(kind, read_fragment(path)?);
        }
    }

    let params = BootstrapParams::from_query(&cli.query);
    let outcome = run_bootstrap(&params, &mut workbench, &fetcher).await?;
    for (kind, error) in &outcome.failures {
        eprintln!("[fetch] failed to load {kind}: {error}");
    }

    let document = match outcome.document {
        Some(document) => document,
        None => workbench.render().await?,
    };
    eprintln!("[status] {}", workbench.chrome().status.get());
    println!("{}", document);

    workbench.flush();
    Ok(())
}

/// Run in session mode (persistent process, reads commands from stdin)
async fn run_session(config: &PreviewConfig) -> Result<()> {
    let mut workbench = build_workbench(config);
    let fetcher = HttpFetcher::new(
        FetchConfig {
            allowed_origins: config.allowed_origins.clone(),
        },
        config.fetch_timeout(),
    )?;

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    let mut reader = stdin.lock();

    info!("session ready, reading commands from stdin");

    loop {
        let mut line = String::new();
        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            // EOF - stdin closed, exit gracefully
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let command: SessionCommand = match serde_json::from_str(line) {
            Ok(command) => command,
            Err(e) => {
                write_response(&mut stdout, false, "status", &format!("Invalid command: {}", e))?;
                continue;
            }
        };

        let rendered = match command {
            SessionCommand::Edit { kind, text } => workbench.edit(kind, text).await,
            SessionCommand::Render => workbench.render().await.map(Some),
            SessionCommand::AutoRender { enabled } => workbench.set_auto_render(enabled).await,
            SessionCommand::Load { kind, url } => workbench
                .load_remote(kind, &url, &fetcher)
                .await
                .map(|loaded| loaded.ok()),
            SessionCommand::SelectTab { kind } => {
                if !workbench.select_tab(kind) {
                    workbench.chrome().status.set(format!("{kind} tab is hidden"));
                }
                Ok(None)
            }
        };
        workbench.relay();

        match rendered {
            Ok(Some(document)) => write_response(&mut stdout, true, "document", &document)?,
            Ok(None) => {
                let status = workbench.chrome().status.get();
                write_response(&mut stdout, true, "status", &status)?
            }
            Err(e) => write_response(&mut stdout, false, "status", &e.to_string())?,
        }
    }

    workbench.flush();
    info!("session shutting down");
    Ok(())
}

/// Write response in length-prefixed protocol
fn write_response(stdout: &mut std::io::Stdout, ok: bool, kind: &str, body: &str) -> Result<()> {
    let status = if ok { "Ok" } else { "Error" };

    writeln!(stdout, "Status:{}", status)?;
    writeln!(stdout, "Kind:{}", kind)?;
    writeln!(stdout, "Length:{}", body.len())?;
    writeln!(stdout)?; // Empty line separator
    write!(stdout, "{}", body)?;
    stdout.flush()?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);
    let config = cli.config();

    if cli.session {
        return run_session(&config).await;
    }
    run_single_shot(&cli, &config).await
}
