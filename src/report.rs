use std::fmt::Write as _;
use std::fs::File;
use std::io::Write as _;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::types::ScanReport;

/// Format a duration as seconds with millisecond precision, e.g. `3.042s`.
pub fn format_elapsed(d: Duration) -> String {
    format!("{}.{:03}s", d.as_secs(), d.subsec_millis())
}

/// Render the plain-text report: scan parameters, one row per open port, summary.
pub fn render_text_report(report: &ScanReport) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_text_report(&mut out, report);
    out
}

fn write_text_report(out: &mut String, r: &ScanReport) -> std::fmt::Result {
    writeln!(out, "Port Scan Report")?;
    writeln!(out, "================")?;
    writeln!(out, "Target      : {}", r.target.host)?;
    writeln!(out, "IP Address  : {}", r.target.addr)?;
    writeln!(out, "Scan Time   : {}", r.started_at)?;
    writeln!(out, "Total Ports : {}", r.total_ports)?;
    writeln!(out, "Threads     : {}", r.options.concurrency)?;
    writeln!(out, "Timeout     : {} ms", r.options.timeout.as_millis())?;
    writeln!(out)?;
    writeln!(
        out,
        "{:<10}{:<10}{:<15}{:<12}{}",
        "PORT", "STATE", "SERVICE", "RESPONSE", "BANNER"
    )?;
    writeln!(
        out,
        "{:<10}{:<10}{:<15}{:<12}{}",
        "----", "-----", "-------", "--------", "------"
    )?;
    for p in r.open_ports() {
        writeln!(
            out,
            "{:<10}{:<10}{:<15}{:<12}{}",
            p.port,
            "OPEN",
            p.service,
            format!("{} ms", p.latency.as_millis()),
            p.banner
        )?;
    }
    writeln!(out)?;
    writeln!(out, "Summary:")?;
    writeln!(out, "  Open ports    : {}", r.open_count())?;
    writeln!(out, "  Closed ports  : {}", r.closed_count())?;
    writeln!(out, "  Total scanned : {}", r.results.len())?;
    writeln!(out, "  Duration      : {}", format_elapsed(r.elapsed))?;
    if r.cancelled {
        writeln!(
            out,
            "  Cancelled     : yes ({} of {} ports not scanned)",
            r.total_ports - r.results.len(),
            r.total_ports
        )?;
    }
    Ok(())
}

/// Write the report to `path`: pretty JSON for `.json` files, plain text otherwise.
pub fn write_report(path: &Path, report: &ScanReport) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("cannot open output file: {}", path.display()))?;

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        serde_json::to_writer_pretty(file, report)
            .with_context(|| format!("failed to write JSON to {}", path.display()))?;
    } else {
        let mut file = file;
        file.write_all(render_text_report(report).as_bytes())
            .with_context(|| format!("failed to write report to {}", path.display()))?;
    }
    Ok(())
}
