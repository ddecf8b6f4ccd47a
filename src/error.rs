use thiserror::Error;

/// Errors that abort a whole scan.
///
/// Per-port outcomes (refused, filtered, timed out, banner failures) are never
/// represented here; they are folded into the port's `ProbeResult`.
#[derive(Debug, Error)]
pub enum ScanError {
    /// A token in the port specification is not a number.
    #[error("invalid port value: {0:?}")]
    InvalidPort(String),

    /// The specification parsed but contained no port in 1..=65535.
    #[error("no valid ports specified")]
    NoValidPorts,

    /// Scan options outside their accepted bounds.
    #[error("invalid scan options: {0}")]
    InvalidOptions(String),

    /// The target did not resolve to any IPv4 address.
    #[error("cannot resolve host {host:?}")]
    Resolution {
        host: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ScanError {
    /// True for errors raised before any network activity happens.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            ScanError::InvalidPort(_) | ScanError::NoValidPorts | ScanError::InvalidOptions(_)
        )
    }
}

pub type Result<T, E = ScanError> = std::result::Result<T, E>;
