mod config;

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use clap::{Args, Parser, Subcommand};
use console::style;
use tracing_subscriber::{fmt, EnvFilter};

use hwm_core::{
    Credentials, CursorStart, HttpStatusClient, Messenger, Notifier, PollOutcome, Poller,
    PollerConfig, SendError, TelegramMessenger,
};

use crate::config::AppConfig;

fn version_string() -> &'static str {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    const GIT_HASH: &str = env!("GIT_HASH");

    if GIT_HASH.is_empty() {
        // Called once, lives for the program's lifetime.
        Box::leak(VERSION.to_string().into_boxed_str())
    } else {
        Box::leak(format!("{VERSION} ({GIT_HASH})").into_boxed_str())
    }
}

/// Homework review status monitor: polls the status API and reports changes to Telegram.
#[derive(Parser)]
#[command(name = "homework-monitor", version = version_string(), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll forever, notifying on every status change.
    Run {
        #[command(flatten)]
        opts: PollArgs,

        /// Log to stderr instead of the log file.
        #[arg(long, default_value_t = false)]
        log_stderr: bool,
    },
    /// Run a single poll cycle and print the result.
    Once {
        #[command(flatten)]
        opts: PollArgs,

        /// Print notifications instead of sending them to Telegram.
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
}

#[derive(Args)]
struct PollArgs {
    /// Path to TOML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Status endpoint URL. Overrides config file.
    #[arg(long)]
    endpoint: Option<String>,

    /// Seconds between polls. Overrides config file.
    #[arg(long)]
    interval_secs: Option<u64>,

    /// Where the first fetch window starts: now, lookback, or lookback:<days>.
    #[arg(long)]
    cursor_start: Option<CursorStart>,

    /// Extra delivery attempts for a failed notification (at most 10).
    #[arg(long, value_parser = clap::value_parser!(u32).range(0..=i64::from(hwm_core::MAX_NOTIFY_RETRIES)))]
    notify_retries: Option<u32>,
}

impl PollArgs {
    fn resolve(&self) -> Result<(AppConfig, PollerConfig), hwm_core::ConfigError> {
        let app_config = match self.config {
            Some(ref path) => AppConfig::load(path)?,
            None => AppConfig::default(),
        };

        let mut poller = app_config.poller.to_poller_config()?;
        if let Some(ref endpoint) = self.endpoint {
            poller = poller.with_endpoint(endpoint);
        }
        if let Some(secs) = self.interval_secs {
            poller = poller.with_poll_interval(secs);
        }
        if let Some(start) = self.cursor_start {
            poller = poller.with_cursor_start(start);
        }
        if let Some(retries) = self.notify_retries {
            poller = poller.with_notify_retries(retries);
        }
        Ok((app_config, poller))
    }
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { opts, log_stderr } => run_forever(opts, log_stderr).await,
        Commands::Once { opts, dry_run } => run_once(opts, dry_run).await,
    }
}

async fn run_forever(opts: PollArgs, log_stderr: bool) {
    let (app_config, poller_config) = match opts.resolve() {
        Ok(resolved) => resolved,
        Err(e) => {
            init_tracing_stderr("info");
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };

    if log_stderr {
        init_tracing_stderr("info");
    } else if let Err(e) = init_tracing_file(&app_config) {
        eprintln!("{} {}", style("error:").red().bold(), e);
        std::process::exit(1);
    }

    let credentials = match Credentials::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "Stopping before the first poll");
            eprintln!("{} {}", style("error:").red().bold(), e);
            std::process::exit(1);
        }
    };

    let mut poller = match build_poller(&app_config, poller_config, &credentials, None) {
        Ok(p) => p,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build HTTP clients");
            std::process::exit(1);
        }
    };

    if poller.config().cursor_start != CursorStart::Now {
        tracing::warn!(
            cursor_start = %poller.config().cursor_start,
            "Cursor starts in the past; statuses updated in that window will be announced again"
        );
    }

    poller.run(shutdown_signal()).await;
    tracing::info!(iterations = poller.iterations(), "Shutdown complete");
}

async fn run_once(opts: PollArgs, dry_run: bool) {
    init_tracing_stderr("warn");

    let (app_config, poller_config) = match opts.resolve() {
        Ok(resolved) => resolved,
        Err(e) => {
            eprintln!("{} {}", style("error:").red().bold(), e);
            std::process::exit(1);
        }
    };

    let credentials = match Credentials::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{} {}", style("error:").red().bold(), e);
            std::process::exit(1);
        }
    };

    let console_sink: Option<Arc<dyn Messenger>> = if dry_run {
        Some(Arc::new(ConsoleMessenger))
    } else {
        None
    };

    let endpoint = poller_config.endpoint.clone();
    let cursor_start = poller_config.cursor_start;
    let mut poller = match build_poller(&app_config, poller_config, &credentials, console_sink) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("{} {}", style("error:").red().bold(), e);
            std::process::exit(1);
        }
    };

    println!(
        "{} {}",
        style("homework-monitor").bold(),
        style(version_string()).dim()
    );
    println!("  {} {}", style("endpoint:").dim(), style(&endpoint).bold());
    println!(
        "  {} {} ({})",
        style("cursor:  ").dim(),
        poller.cursor(),
        cursor_start
    );
    if dry_run {
        println!("  {} {}", style("mode:    ").dim(), style("dry run").yellow());
    }
    println!();

    let report = poller.poll_once().await;
    match report.outcome {
        PollOutcome::Unchanged => {
            println!("  {}", style("No status changes").green());
        }
        PollOutcome::Notified { delivered, failed } => {
            for change in poller.changes_chronological() {
                let mark = if change.delivered {
                    style("SENT  ").green()
                } else {
                    style("FAILED").red().bold()
                };
                println!("  {}  {:<24} {}", mark, change.name, change.current);
            }
            println!();
            println!("  delivered={} failed={}", delivered, failed);
        }
        PollOutcome::Faulted(ref e) => {
            println!(
                "  {} {:<16} {}",
                style("ERROR").red().bold(),
                style(e.kind()).red(),
                e
            );
            std::process::exit(2);
        }
    }
}

fn build_poller(
    app_config: &AppConfig,
    poller_config: PollerConfig,
    credentials: &Credentials,
    messenger: Option<Arc<dyn Messenger>>,
) -> Result<Poller, Box<dyn std::error::Error>> {
    let source = Arc::new(HttpStatusClient::from_config(
        &poller_config,
        &credentials.practicum_token,
    )?);

    let messenger = match messenger {
        Some(m) => m,
        None => Arc::new(
            TelegramMessenger::new(
                &credentials.telegram_token,
                Duration::from_secs(app_config.telegram.timeout_secs),
            )?
            .with_api_base(&app_config.telegram.api_base),
        ),
    };

    let notifier = Notifier::from_config(messenger, &credentials.chat_id, &poller_config);
    Ok(Poller::new(source, notifier, poller_config))
}

/// Prints notifications to stdout for `once --dry-run`.
struct ConsoleMessenger;

#[async_trait]
impl Messenger for ConsoleMessenger {
    fn type_name(&self) -> &str {
        "console"
    }

    async fn send(&self, chat_id: &str, text: &str) -> Result<(), SendError> {
        println!("  {} {}", style(format!("[chat {}]", chat_id)).dim(), text);
        Ok(())
    }
}

fn init_tracing_stderr(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Appends to `logging.file` with call-site metadata on every line.
fn init_tracing_file(app_config: &AppConfig) -> Result<(), String> {
    let path = &app_config.logging.file;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| format!("Failed to open log file {}: {}", path.display(), e))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    match app_config.logging.format.as_str() {
        "json" => builder.json().init(),
        _ => builder.init(),
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
