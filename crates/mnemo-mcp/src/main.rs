//! Mnemo Server
//!
//! Long-term memory for agents over JSON-RPC:
//! - remember / recall / pin / unpin / forget tools plus admin operations
//! - hybrid lexical + vector retrieval with adaptive weights
//! - policy-driven forgetting on a background schedule
//!
//! stdio is the default transport (stdout carries only JSON-RPC; logs go
//! to stderr); `--http` serves the same router over HTTP POST.

mod context;
mod protocol;
mod server;
mod tools;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use mnemo_core::observability::process_rss_mb;
use mnemo_core::{
    spawn_workers, AlertLevel, BatchScheduler, Config, ErrorCategory, ErrorSeverity, JobSpec,
};

use crate::context::AppContext;
use crate::protocol::http::{HttpTransport, HttpTransportConfig};
use crate::protocol::stdio::StdioTransport;
use crate::server::McpServer;

struct Args {
    data_dir: Option<PathBuf>,
    http: bool,
    port: Option<u16>,
}

/// Parse command-line arguments; exits for `--help`/`--version`.
fn parse_args() -> Args {
    let argv: Vec<String> = std::env::args().collect();
    let mut args = Args {
        data_dir: None,
        http: false,
        port: None,
    };

    let mut i = 1;
    while i < argv.len() {
        match argv[i].as_str() {
            "--help" | "-h" => {
                println!("Mnemo Server v{}", env!("CARGO_PKG_VERSION"));
                println!();
                println!("Agent long-term memory over JSON-RPC.");
                println!();
                println!("USAGE:");
                println!("    mnemo-mcp [OPTIONS]");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help              Print help information");
                println!("    -V, --version           Print version information");
                println!("    --stdio                 Serve line-delimited JSON-RPC on stdio (default)");
                println!("    --http                  Serve JSON-RPC over HTTP POST /rpc");
                println!("    --port <PORT>           HTTP port (default: MNEMO_HTTP_PORT or 4100)");
                println!("    --data-dir <PATH>       Directory for the database file");
                println!();
                println!("ENVIRONMENT:");
                println!("    MNEMO_*                 See the configuration reference");
                println!("    RUST_LOG                Log level filter");
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("mnemo-mcp {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--stdio" => {}
            "--http" => args.http = true,
            "--port" => {
                i += 1;
                match argv.get(i).and_then(|p| p.parse().ok()) {
                    Some(port) => args.port = Some(port),
                    None => {
                        eprintln!("error: --port requires a number");
                        std::process::exit(1);
                    }
                }
            }
            "--data-dir" => {
                i += 1;
                match argv.get(i) {
                    Some(path) => args.data_dir = Some(PathBuf::from(path)),
                    None => {
                        eprintln!("error: --data-dir requires a path argument");
                        std::process::exit(1);
                    }
                }
            }
            arg => {
                eprintln!("error: unknown argument '{arg}'");
                eprintln!("Try 'mnemo-mcp --help' for more information.");
                std::process::exit(1);
            }
        }
        i += 1;
    }

    args
}

/// Initialize tracing to stderr, or to the configured log file.
/// Returns the appender guard that must outlive the process.
fn init_logging(config: &Config) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    match &config.log_file {
        Some(path) => {
            let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
            let file = path
                .file_name()
                .map(|f| f.to_string_lossy().to_string())
                .unwrap_or_else(|| "mnemo.log".to_string());
            let appender = tracing_appender::rolling::never(dir, file);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_ansi(false)
                .init();
            None
        }
    }
}

/// Register the built-in periodic jobs.
fn build_scheduler(ctx: &Arc<AppContext>) -> BatchScheduler {
    let config = &ctx.config.scheduler;
    let mut scheduler = BatchScheduler::new(config.clone()).with_storage(ctx.storage.clone());

    let forgetting = ctx.forgetting.clone();
    scheduler.register(JobSpec::new(
        "cleanup",
        config.cleanup_interval,
        0,
        move || {
            let forgetting = forgetting.clone();
            Box::pin(async move {
                let outcome = forgetting
                    .run_cleanup(false, Utc::now())
                    .map_err(|e| e.to_string())?;
                if outcome.hard_deleted + outcome.soft_deleted > 0 {
                    info!(
                        "cleanup: {} hard-deleted, {} demoted ({} scanned)",
                        outcome.hard_deleted, outcome.soft_deleted, outcome.plan.scanned
                    );
                }
                Ok(())
            })
        },
    ));

    let monitor_ctx = ctx.clone();
    scheduler.register(JobSpec::new(
        "monitoring",
        config.monitoring_interval,
        1,
        move || {
            let ctx = monitor_ctx.clone();
            Box::pin(async move {
                let sample = ctx.health_sample();
                for alert in ctx.alerts.check(&sample) {
                    let severity = match alert.level {
                        AlertLevel::Warning => ErrorSeverity::Medium,
                        AlertLevel::Critical => ErrorSeverity::Critical,
                    };
                    ctx.errors.record(
                        severity,
                        ErrorCategory::Performance,
                        alert.message.clone(),
                        Some(alert.metric.clone()),
                    );
                }
                Ok(())
            })
        },
    ));

    let health_ctx = ctx.clone();
    scheduler.register(JobSpec::new(
        "healthcheck",
        config.health_interval,
        2,
        move || {
            let ctx = health_ctx.clone();
            Box::pin(async move {
                let started = Instant::now();
                let result = ctx.storage.liveness();
                ctx.metrics
                    .record_timing("db.liveness", started.elapsed(), result.is_ok());
                result.map_err(|e| e.to_string())?;
                if let Some(rss) = process_rss_mb() {
                    if rss > 1024.0 {
                        warn!("memory pressure: process RSS is {rss:.0} MB");
                    }
                }
                Ok(())
            })
        },
    ));

    scheduler
}

#[tokio::main]
async fn main() {
    let args = parse_args();

    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(1);
        }
    };
    if let Some(dir) = args.data_dir {
        config.db_path = Some(dir.join("mnemo.db"));
    }
    if let Some(port) = args.port {
        config.http_port = port;
    }

    let _log_guard = init_logging(&config);
    info!("Mnemo server v{} starting...", env!("CARGO_PKG_VERSION"));

    let ctx = match AppContext::initialize(config) {
        Ok(ctx) => ctx,
        Err(e) => {
            error!("initialization failed: {e}");
            eprintln!("initialization failed: {e}");
            std::process::exit(1);
        }
    };
    info!(
        "storage ready at {} (vector dimension {})",
        ctx.storage.path().display(),
        ctx.storage.dimensions()
    );

    // Signal handling: remember whether we exited because of a signal
    let (shutdown_tx, _) = broadcast::channel::<()>(4);
    let signal_seen = Arc::new(AtomicBool::new(false));
    {
        let shutdown_tx = shutdown_tx.clone();
        let signal_seen = signal_seen.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("received interrupt, shutting down");
                signal_seen.store(true, Ordering::SeqCst);
                let _ = shutdown_tx.send(());
            }
        });
    }

    // Background substrate: task workers and the periodic scheduler
    let workers = spawn_workers(
        ctx.queue.clone(),
        ctx.worker_context(),
        ctx.config.queue.max_workers,
        &shutdown_tx,
    );
    let scheduler = build_scheduler(&ctx).spawn();

    // Serve
    let served = if args.http {
        let transport = HttpTransport::new(HttpTransportConfig {
            host: "127.0.0.1".to_string(),
            port: ctx.config.http_port,
        });
        transport.run(ctx.clone(), shutdown_tx.subscribe()).await
    } else {
        let server = McpServer::new(ctx.clone());
        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::select! {
            result = StdioTransport::new().run(server) => result,
            _ = shutdown_rx.recv() => Ok(()),
        }
    };

    if let Err(e) = served {
        error!("transport error: {e}");
    }

    // Drain background work
    let _ = shutdown_tx.send(());
    scheduler.stop().await;
    for worker in workers {
        let _ = worker.await;
    }
    info!("shutdown complete");

    let code = if signal_seen.load(Ordering::SeqCst) {
        130
    } else {
        0
    };
    std::process::exit(code);
}
