use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time;
use tracing::trace;

/// Most bytes taken from a single read.
pub const BANNER_READ_LIMIT: usize = 512;
/// Longest banner handed to reporting, truncation marker included.
pub const BANNER_DISPLAY_LIMIT: usize = 80;

const TRUNCATION_MARKER: &str = "...";

/// Ports that stay silent until spoken to over HTTP.
const HTTP_GREETING_PORTS: &[u16] = &[80, 8000, 8080, 8888];

/// Open a fresh connection to `addr:port` and capture a short identifying banner.
///
/// The whole exchange (connect, optional greeting, one read) is bounded by `timeout`.
/// Any failure yields an empty string.
pub async fn grab_banner(host: &str, addr: Ipv4Addr, port: u16, timeout: Duration) -> String {
    let target = SocketAddr::from((addr, port));
    read_banner(target, greeting_for(port, host), timeout).await
}

/// Connect to `target`, send `greeting` if any, and sanitize the first read.
async fn read_banner(target: SocketAddr, greeting: Option<String>, timeout: Duration) -> String {
    let exchange = async move {
        let mut stream = TcpStream::connect(target).await?;
        if let Some(req) = greeting {
            stream.write_all(req.as_bytes()).await?;
        }
        let mut buf = [0u8; BANNER_READ_LIMIT];
        let n = stream.read(&mut buf).await?;
        Ok::<_, std::io::Error>(buf[..n].to_vec())
    };

    match time::timeout(timeout, exchange).await {
        Ok(Ok(raw)) => sanitize_banner(&raw),
        Ok(Err(e)) => {
            trace!(%target, error = %e, "banner read failed");
            String::new()
        }
        Err(_) => {
            trace!(%target, "banner read timed out");
            String::new()
        }
    }
}

/// Request sent before reading, for ports that expect the client to talk first.
pub fn greeting_for(port: u16, host: &str) -> Option<String> {
    HTTP_GREETING_PORTS
        .contains(&port)
        .then(|| format!("HEAD / HTTP/1.0\r\nHost: {host}\r\n\r\n"))
}

/// Reduce raw bytes to a single printable ASCII line of at most
/// [`BANNER_DISPLAY_LIMIT`] characters.
pub fn sanitize_banner(raw: &[u8]) -> String {
    let mut clean: String = raw
        .iter()
        .filter_map(|&b| match b {
            b'\n' | b'\r' => Some(' '),
            0x20..=0x7e => Some(b as char),
            _ => None,
        })
        .collect();

    clean.truncate(clean.trim_end().len());

    if clean.len() > BANNER_DISPLAY_LIMIT {
        clean.truncate(BANNER_DISPLAY_LIMIT - TRUNCATION_MARKER.len());
        clean.push_str(TRUNCATION_MARKER);
    }
    clean
}
