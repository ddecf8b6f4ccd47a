use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use colored::Colorize;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use port_probe_rs::ports::load_port_spec;
use port_probe_rs::report::write_report;
use port_probe_rs::server;
use port_probe_rs::types::{
    ScanConfig, ScanPhase, DEFAULT_CONCURRENCY, DEFAULT_PORT_SPEC, DEFAULT_TIMEOUT_MS,
};
use port_probe_rs::{ProbeResult, Scanner};

mod output;

/// port-probe: fast async TCP connect scanner for a single host, with banner capture.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "port-probe",
    version,
    about = "Fast async TCP connect scanner for a single host, with banner capture.",
    long_about = None
)]
struct Cli {
    /// Hostname or IPv4 address to scan.
    #[arg(required_unless_present = "serve")]
    target: Option<String>,

    /// Port specification: `1-1024`, `80,443,8080`, `1-100,443,8000-9000`.
    #[arg(short = 'p', long, default_value = DEFAULT_PORT_SPEC)]
    ports: String,

    /// Read the port specification from a file (one token per line, `#` comments).
    #[arg(long = "ports-file", conflicts_with = "ports")]
    ports_file: Option<PathBuf>,

    /// Number of concurrent workers (max 500).
    #[arg(short = 't', long = "threads", default_value_t = DEFAULT_CONCURRENCY)]
    threads: usize,

    /// Connect timeout in milliseconds.
    #[arg(short = 'T', long = "timeout", default_value_t = DEFAULT_TIMEOUT_MS)]
    timeout_ms: u64,

    /// Save results to this file (`.json` for JSON, plain-text report otherwise).
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Show closed ports too; repeat for engine logs (-vv info, -vvv debug).
    #[arg(short = 'v', long, action = ArgAction::Count)]
    verbose: u8,

    /// Skip banner grabbing on open ports.
    #[arg(long = "no-banner", default_value_t = false)]
    no_banner: bool,

    /// Serve the HTTP scan API on this address instead of running a scan.
    #[arg(long, value_name = "ADDR")]
    serve: Option<String>,
}

impl Cli {
    fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            target: self.target.clone().unwrap_or_default(),
            ports: self.ports.clone(),
            timeout_ms: self.timeout_ms,
            concurrency: self.threads,
            banner: !self.no_banner,
            verbose: self.verbose > 0,
            output: self.output.clone(),
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 | 1 => "warn",
        2 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Some(bind) = cli.serve.as_deref() {
        tokio::select! {
            res = server::spawn_server(bind) => res?,
            _ = tokio::signal::ctrl_c() => {}
        }
        return Ok(());
    }

    let config = cli.scan_config();

    // Configuration problems are fatal before any network activity.
    let (scanner, port_source) = match cli.ports_file.as_deref() {
        Some(path) => {
            let ports = load_port_spec(path)
                .with_context(|| format!("invalid ports file: {}", path.display()))?;
            (Scanner::with_ports(config.clone(), ports)?, path.display().to_string())
        }
        None => (Scanner::new(config.clone())?, config.ports.clone()),
    };

    output::print_title();
    output::print_scan_info(&config, scanner.ports().len(), &port_source);

    let state = scanner.state();
    let cancel = scanner.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let (tx, mut rx) = mpsc::unbounded_channel::<ProbeResult>();
    let pb = output::progress_bar(state.total() as u64);
    let render = {
        let pb = pb.clone();
        let state = state.clone();
        let verbose = config.verbose;
        tokio::spawn(async move {
            while let Some(r) = rx.recv().await {
                if r.open {
                    pb.println(output::open_line(&r));
                } else if verbose {
                    pb.println(output::closed_line(&r));
                }
                let progress = state.progress();
                pb.set_position(progress.scanned);
                pb.set_message(progress.open.to_string());
            }
        })
    };

    let report = scanner.with_events(tx).run().await;
    // The pool dropped its sender on return, so the renderer drains and stops.
    let _ = render.await;
    pb.finish_and_clear();
    let report = report.context("scan failed")?;

    output::print_summary(&report);

    if let Some(path) = config.output.as_deref() {
        match write_report(path, &report) {
            Ok(()) => println!(
                "  {} Results saved to: {}",
                "[✓]".green().bold(),
                path.display()
            ),
            Err(e) => {
                tracing::warn!("export failed: {e:#}");
                eprintln!("  {} {e:#}", "[!]".red().bold());
            }
        }
    }
    state.set_phase(ScanPhase::Reported);

    Ok(())
}
