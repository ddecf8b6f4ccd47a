//! Library crate for port-probe-rs: a single-host TCP connect scanner.
pub mod banner;
pub mod error;
pub mod pool;
pub mod ports;
pub mod probe;
pub mod report;
pub mod scanner;
pub mod server;
pub mod services;
pub mod state;
pub mod types;

pub use error::{Result, ScanError};
pub use scanner::{scan, Scanner};
pub use types::{ProbeResult, ScanConfig, ScanReport};
