//! Terminal rendering for the CLI: live result lines, progress bar, summary.

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use port_probe_rs::report::format_elapsed;
use port_probe_rs::types::{ProbeResult, ScanConfig, ScanReport};

pub fn print_title() {
    println!("{}", "port-probe :: TCP connect scanner".bold().cyan());
    println!("{}", "=".repeat(64).white());
}

pub fn print_scan_info(config: &ScanConfig, port_count: usize, port_source: &str) {
    let item = |label: &str, value: String| {
        println!("  {} {:<17}: {}", "[*]".cyan(), label, value.white());
    };
    item("Target", config.target.clone());
    item("Ports to scan", format!("{port_count} ({port_source})"));
    item("Threads", config.concurrency.to_string());
    item("Timeout", format!("{} ms", config.timeout_ms));
    item(
        "Banner grabbing",
        if config.banner { "enabled" } else { "disabled" }.to_string(),
    );
    println!();
    println!("  {}", "PORT        SERVICE         LATENCY   BANNER".bold());
    println!("  {}", "-".repeat(64));
}

pub fn progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::with_template(
        "  [{bar:40.cyan/blue}] {percent:>3}% | Scanned: {pos}/{len} | Open: {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("█░");
    pb.set_style(style);
    pb.set_message("0");
    pb
}

pub fn open_line(r: &ProbeResult) -> String {
    let mut line = format!(
        "  {}  {:>6}/tcp  {:<14}  {:<8}",
        "[OPEN]".green().bold(),
        r.port.to_string().bold(),
        r.service.cyan().bold(),
        format!("{}ms", r.latency.as_millis()).yellow(),
    );
    if !r.banner.is_empty() {
        line.push_str(&format!("  │ {}", r.banner.white()));
    }
    line
}

pub fn closed_line(r: &ProbeResult) -> String {
    format!(
        "  {}  {:>6}/tcp  {:<14}",
        "[CLSD]".red(),
        r.port.to_string().white(),
        r.service.white(),
    )
}

pub fn print_summary(report: &ScanReport) {
    let row = |label: colored::ColoredString, value: String| {
        println!("  |  {} {:<26}|", label, value);
    };
    println!();
    println!("  {}", "-".repeat(64));
    println!("{}", "\n  +============  SCAN SUMMARY  ============+".bold());
    row("Target        :".cyan(), report.target.host.clone());
    row("IP Address    :".cyan(), report.target.addr.to_string());
    row("Ports Scanned :".cyan(), report.results.len().to_string());
    row("Open Ports    :".green().bold(), report.open_count().to_string());
    row("Closed Ports  :".red(), report.closed_count().to_string());
    row("Duration      :".yellow(), format_elapsed(report.elapsed));
    println!("  +=========================================+");
    if report.cancelled {
        println!(
            "  {} scan cancelled, {} of {} ports not scanned",
            "[!]".yellow().bold(),
            report.total_ports - report.results.len(),
            report.total_ports
        );
    }
    println!();
}
