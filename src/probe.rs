use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::net::TcpSocket;
use tokio::time::{self, Instant};
use tracing::trace;

/// Connection outcome of a single probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub open: bool,
    pub latency: Duration,
}

/// Attempt one TCP connection to `addr:port`, giving up after `timeout`.
///
/// Refused, unreachable and timed-out connections all report `open = false`.
/// The socket is dropped (closed) before returning on every path.
pub async fn probe_port(addr: Ipv4Addr, port: u16, timeout: Duration) -> ProbeOutcome {
    let target = SocketAddr::from((addr, port));
    let start = Instant::now();

    let socket = match TcpSocket::new_v4() {
        Ok(s) => s,
        Err(e) => {
            trace!(%target, error = %e, "socket creation failed");
            return ProbeOutcome { open: false, latency: start.elapsed() };
        }
    };

    let open = match time::timeout(timeout, socket.connect(target)).await {
        // A completed connect can still carry a pending error; only a clean socket counts.
        Ok(Ok(stream)) => matches!(stream.take_error(), Ok(None)),
        Ok(Err(e)) => {
            trace!(%target, error = %e, "connect failed");
            false
        }
        Err(_) => {
            trace!(%target, "connect timed out");
            false
        }
    };

    ProbeOutcome { open, latency: start.elapsed() }
}
