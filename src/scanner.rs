use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use ::time::{format_description::well_known, OffsetDateTime};
use tokio::net::lookup_host;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::banner::grab_banner;
use crate::error::{Result, ScanError};
use crate::pool::run_pool;
use crate::ports::parse_port_spec;
use crate::probe::probe_port;
use crate::services::service_name;
use crate::state::ScanState;
use crate::types::{ProbeResult, ScanConfig, ScanOptions, ScanPhase, ScanReport, ScanTarget};

/// Resolve and scan `config.target` in one call.
pub async fn scan(config: ScanConfig) -> Result<ScanReport> {
    Scanner::new(config)?.run().await
}

/// Resolve a hostname or dotted-quad literal to its first IPv4 address.
pub async fn resolve_target(host: &str) -> Result<ScanTarget> {
    let host = host.trim();
    let unresolved = |source: Option<std::io::Error>| ScanError::Resolution {
        host: host.to_string(),
        source,
    };

    if host.is_empty() {
        return Err(unresolved(None));
    }
    if let Ok(addr) = host.parse::<Ipv4Addr>() {
        return Ok(ScanTarget { host: host.to_string(), addr });
    }

    let addrs = lookup_host((host, 0)).await.map_err(|e| unresolved(Some(e)))?;
    addrs
        .filter_map(|sa| match sa.ip() {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(_) => None,
        })
        .next()
        .map(|addr| ScanTarget { host: host.to_string(), addr })
        .ok_or_else(|| unresolved(None))
}

/// Probe one port and, when it is open and banners are enabled, read its banner.
pub async fn scan_port(target: &ScanTarget, port: u16, options: &ScanOptions) -> ProbeResult {
    let outcome = probe_port(target.addr, port, options.timeout).await;

    let banner = if outcome.open && options.banner {
        grab_banner(&target.host, target.addr, port, options.banner_timeout()).await
    } else {
        String::new()
    };

    debug!(
        port,
        open = outcome.open,
        latency_ms = outcome.latency.as_millis() as u64,
        "probe finished"
    );

    ProbeResult {
        port,
        open: outcome.open,
        latency: outcome.latency,
        service: service_name(port).to_string(),
        banner,
    }
}

/// One scan run against a single host.
///
/// Construction validates the configuration, so a `Scanner` never touches the
/// network with an unusable port set or options. Progress can be observed
/// through [`Scanner::state`] and live results through an event channel.
#[derive(Debug)]
pub struct Scanner {
    config: ScanConfig,
    options: ScanOptions,
    ports: Arc<[u16]>,
    state: Arc<ScanState>,
    cancel: CancellationToken,
    events: Option<UnboundedSender<ProbeResult>>,
}

impl Scanner {
    /// Parse `config.ports` and validate the options.
    pub fn new(config: ScanConfig) -> Result<Self> {
        let ports = parse_port_spec(&config.ports)?;
        Self::with_ports(config, ports)
    }

    /// Use an already resolved port list instead of `config.ports`.
    pub fn with_ports(config: ScanConfig, mut ports: Vec<u16>) -> Result<Self> {
        ports.retain(|&p| p != 0);
        ports.sort_unstable();
        ports.dedup();
        if ports.is_empty() {
            return Err(ScanError::NoValidPorts);
        }
        let options = config.options()?;
        let state = Arc::new(ScanState::new(ports.len()));
        Ok(Self {
            config,
            options,
            ports: ports.into(),
            state,
            cancel: CancellationToken::new(),
            events: None,
        })
    }

    /// Send every result to `tx` as soon as its port is done.
    pub fn with_events(mut self, tx: UnboundedSender<ProbeResult>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> Arc<ScanState> {
        self.state.clone()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn ports(&self) -> &[u16] {
        &self.ports
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Resolve the target, scan every port and wait for the pool to drain.
    pub async fn run(self) -> Result<ScanReport> {
        let Scanner { config, options, ports, state, cancel, events } = self;

        state.set_phase(ScanPhase::Resolving);
        let target = match resolve_target(&config.target).await {
            Ok(t) => t,
            Err(e) => {
                state.set_phase(ScanPhase::Failed);
                return Err(e);
            }
        };
        info!(host = %target.host, addr = %target.addr, "target resolved");

        state.set_phase(ScanPhase::Scanning);
        let started_at = now_rfc3339();
        let start = Instant::now();
        info!(
            ports = ports.len(),
            concurrency = options.concurrency,
            timeout_ms = options.timeout.as_millis() as u64,
            banner = options.banner,
            "scan started"
        );

        let unit_target = Arc::new(target.clone());
        let unit_state = state.clone();
        let workers = run_pool(ports.clone(), options.concurrency, cancel.clone(), move |idx, port| {
            let target = unit_target.clone();
            let state = unit_state.clone();
            let events = events.clone();
            async move {
                let result = scan_port(&target, port, &options).await;
                match &events {
                    Some(tx) => {
                        state.record(idx, result.clone());
                        // Receiver gone only means nobody is watching live output.
                        let _ = tx.send(result);
                    }
                    None => {
                        state.record(idx, result);
                    }
                }
            }
        })
        .await;

        let elapsed = start.elapsed();
        state.set_phase(ScanPhase::Drained);

        let cancelled = !state.is_complete();
        let results = state.results();
        info!(
            scanned = results.len(),
            open = results.iter().filter(|r| r.open).count(),
            elapsed_ms = elapsed.as_millis() as u64,
            cancelled,
            "scan drained"
        );

        Ok(ScanReport {
            target,
            options,
            started_at,
            elapsed,
            total_ports: ports.len(),
            workers,
            cancelled,
            results,
        })
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn literal_ipv4_resolves_without_lookup() {
        let t = resolve_target(" 10.1.2.3 ").await.unwrap();
        assert_eq!(t.addr, Ipv4Addr::new(10, 1, 2, 3));
        assert_eq!(t.host, "10.1.2.3");
    }

    #[tokio::test]
    async fn empty_host_is_a_resolution_error() {
        let err = resolve_target("").await.unwrap_err();
        assert!(matches!(err, ScanError::Resolution { .. }));
        assert!(!err.is_config());
    }

    #[tokio::test]
    async fn bad_host_is_a_resolution_error() {
        let err = resolve_target("no-such-host.invalid").await.unwrap_err();
        assert!(matches!(err, ScanError::Resolution { .. }));
    }

    #[test]
    fn empty_port_set_rejected_before_scanning() {
        let cfg = ScanConfig { target: "127.0.0.1".into(), ports: "0,70000".into(), ..Default::default() };
        assert!(matches!(Scanner::new(cfg).unwrap_err(), ScanError::NoValidPorts));
    }

    #[test]
    fn malformed_spec_rejected_before_scanning() {
        let cfg = ScanConfig { target: "127.0.0.1".into(), ports: "22,ssh".into(), ..Default::default() };
        let err = Scanner::new(cfg).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn explicit_port_list_is_normalized() {
        let cfg = ScanConfig { target: "127.0.0.1".into(), ..Default::default() };
        let s = Scanner::with_ports(cfg, vec![443, 22, 443, 0]).unwrap();
        assert_eq!(s.ports(), &[22, 443]);
        assert_eq!(s.state().phase(), ScanPhase::Idle);
    }
}
