use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, ScanError};

/// Upper bound on concurrent workers for one scan.
pub const MAX_CONCURRENCY: usize = 500;

pub const DEFAULT_PORT_SPEC: &str = "1-1024";
pub const DEFAULT_TIMEOUT_MS: u64 = 2000;
pub const DEFAULT_CONCURRENCY: usize = 100;

/// Scan configuration as handed over by the CLI or the HTTP API.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ScanConfig {
    pub target: String,
    /// Port specification, e.g. `1-100,443,8000-9000`.
    pub ports: String,
    pub timeout_ms: u64,
    pub concurrency: usize,
    pub banner: bool,
    pub verbose: bool,
    /// Export destination. Never accepted from API clients.
    #[serde(skip)]
    pub output: Option<PathBuf>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            target: String::new(),
            ports: DEFAULT_PORT_SPEC.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            concurrency: DEFAULT_CONCURRENCY,
            banner: true,
            verbose: false,
            output: None,
        }
    }
}

impl ScanConfig {
    /// Validate the tunables. Concurrency above [`MAX_CONCURRENCY`] is clamped.
    pub fn options(&self) -> Result<ScanOptions> {
        if self.timeout_ms == 0 {
            return Err(ScanError::InvalidOptions("timeout must be at least 1 ms".into()));
        }
        if self.concurrency == 0 {
            return Err(ScanError::InvalidOptions("concurrency must be at least 1".into()));
        }
        Ok(ScanOptions {
            timeout: Duration::from_millis(self.timeout_ms),
            concurrency: self.concurrency.min(MAX_CONCURRENCY),
            banner: self.banner,
            verbose: self.verbose,
        })
    }
}

/// Immutable tunables for the duration of one scan.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions {
    #[serde(rename = "timeout_ms", with = "duration_ms")]
    pub timeout: Duration,
    pub concurrency: usize,
    pub banner: bool,
    pub verbose: bool,
}

impl ScanOptions {
    /// Banner reads get half the connect budget.
    pub fn banner_timeout(&self) -> Duration {
        self.timeout / 2
    }
}

/// Host as given by the operator plus the IPv4 address it resolved to.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ScanTarget {
    pub host: String,
    pub addr: Ipv4Addr,
}

/// Outcome of scanning a single port.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub port: u16,
    pub open: bool,
    #[serde(rename = "latency_ms", with = "duration_ms")]
    pub latency: Duration,
    pub service: String,
    /// Sanitized banner text; empty when not captured.
    pub banner: String,
}

/// Running counters, readable while workers are still writing.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub total: u64,
    pub scanned: u64,
    pub open: u64,
}

/// Lifecycle of one scan run.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
    #[default]
    Idle,
    Resolving,
    Scanning,
    Drained,
    Reported,
    /// Terminal: the target did not resolve, nothing was scanned.
    Failed,
}

impl ScanPhase {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            ScanPhase::Idle => 0,
            ScanPhase::Resolving => 1,
            ScanPhase::Scanning => 2,
            ScanPhase::Drained => 3,
            ScanPhase::Reported => 4,
            ScanPhase::Failed => 5,
        }
    }

    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            1 => ScanPhase::Resolving,
            2 => ScanPhase::Scanning,
            3 => ScanPhase::Drained,
            4 => ScanPhase::Reported,
            5 => ScanPhase::Failed,
            _ => ScanPhase::Idle,
        }
    }
}

/// Everything the reporting and export collaborators need after drain.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub target: ScanTarget,
    pub options: ScanOptions,
    /// RFC 3339 wall-clock time the scan phase started.
    pub started_at: String,
    #[serde(rename = "elapsed_ms", with = "duration_ms")]
    pub elapsed: Duration,
    /// Number of ports requested; may exceed `results.len()` when cancelled.
    pub total_ports: usize,
    pub workers: usize,
    pub cancelled: bool,
    /// Ordered by port, ascending.
    pub results: Vec<ProbeResult>,
}

impl ScanReport {
    pub fn open_count(&self) -> usize {
        self.results.iter().filter(|r| r.open).count()
    }

    pub fn closed_count(&self) -> usize {
        self.results.len() - self.open_count()
    }

    pub fn open_ports(&self) -> impl Iterator<Item = &ProbeResult> {
        self.results.iter().filter(|r| r.open)
    }
}

/// Serialize a `Duration` as whole milliseconds.
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
