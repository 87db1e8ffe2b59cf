//! One-shot anonymous FTP probe: connect, pipeline the login commands, read
//! replies until the peer closes or the deadline passes, classify.

mod classify;

pub use classify::{announces_tls, login_accepted, Capabilities, LOGIN_OK, TLS_MARKER};

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Written in one go without waiting for any reply.
pub const COMMANDS: &[u8] = b"USER anonymous\r\nPASS anonymous\r\nSYST anonymous\r\nFEAT anonymous\r\nQUIT\r\n";

/// Reply bytes read per session before giving up on the peer ever closing.
pub const MAX_REPLY_BYTES: u64 = 64 * 1024;

#[derive(Debug, Clone)]
pub struct ProbeOptions {
    pub port: u16,
    pub dial_timeout: Duration,
    pub read_timeout: Duration,
    pub capture_transcript: bool,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        ProbeOptions {
            port: 21,
            dial_timeout: Duration::from_secs(1),
            read_timeout: Duration::from_secs(1),
            capture_transcript: true,
        }
    }
}

/// Whether a connect failure is routine internet noise or worth reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectFailure {
    Expected,
    Unexpected,
}

impl ConnectFailure {
    pub fn classify(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset => ConnectFailure::Expected,
            _ if err.raw_os_error().map_or(false, expected_os_error) => ConnectFailure::Expected,
            _ => ConnectFailure::Unexpected,
        }
    }
}

#[cfg(unix)]
fn expected_os_error(code: i32) -> bool {
    matches!(code, libc::ENETUNREACH | libc::EHOSTUNREACH | libc::ENOPROTOOPT)
}

#[cfg(not(unix))]
fn expected_os_error(_code: i32) -> bool {
    false
}

#[derive(Debug, thiserror::Error)]
#[error("connect to {addr} failed: {source}")]
pub struct ConnectError {
    pub addr: SocketAddr,
    pub kind: ConnectFailure,
    #[source]
    pub source: io::Error,
}

impl ConnectError {
    pub fn is_expected(&self) -> bool {
        self.kind == ConnectFailure::Expected
    }
}

#[derive(Debug)]
pub enum ProbeOutcome {
    /// The TCP handshake did not complete.
    Unreachable(ConnectError),
    /// Connected, but the peer neither closed nor hit the read cap before the deadline.
    TimedOut,
    /// Connected and the peer closed (or errored, or hit the read cap) in time.
    Completed(Capabilities),
}

impl ProbeOutcome {
    pub fn is_available(&self) -> bool {
        matches!(self, ProbeOutcome::Completed(_))
    }

    pub fn connected(&self) -> bool {
        !matches!(self, ProbeOutcome::Unreachable(_))
    }
}

/// TCP connect bounded by `dial_timeout`.
pub async fn connect(addr: SocketAddr, dial_timeout: Duration) -> Result<TcpStream, ConnectError> {
    let res = timeout(dial_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timeout"))
        .and_then(|r| r);
    res.map_err(|source| ConnectError { addr, kind: ConnectFailure::classify(&source), source })
}

/// Connect to `ip` and run a full session against it.
pub async fn probe(ip: Ipv4Addr, opts: &ProbeOptions) -> ProbeOutcome {
    let addr = SocketAddr::from((ip, opts.port));
    match connect(addr, opts.dial_timeout).await {
        Ok(stream) => run_session(stream, opts).await,
        Err(e) => ProbeOutcome::Unreachable(e),
    }
}

/// Drive the command pipeline over an established connection.
///
/// The write and the whole read loop run inside one deadline; when it passes
/// the exchange future is dropped along with its read. The stream is shut
/// down and closed on every path.
pub async fn run_session(mut stream: TcpStream, opts: &ProbeOptions) -> ProbeOutcome {
    let outcome = match timeout(opts.read_timeout, exchange(&mut stream, opts.capture_transcript)).await {
        Ok(caps) => ProbeOutcome::Completed(caps),
        Err(_) => ProbeOutcome::TimedOut,
    };
    if let Err(e) = stream.shutdown().await {
        debug!(error = %e, "shutdown after probe");
    }
    outcome
}

async fn exchange(stream: &mut TcpStream, capture: bool) -> Capabilities {
    if let Err(e) = stream.write_all(COMMANDS).await {
        // peer may already be gone; whatever it sent is still readable
        debug!(error = %e, "command pipeline write failed");
    }
    let mut reader = BufReader::new((&mut *stream).take(MAX_REPLY_BYTES));
    let mut caps = Capabilities::default();
    let mut buf = Vec::with_capacity(256);
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf);
                caps.observe(text.trim_end_matches(|c| c == '\r' || c == '\n'), capture);
            }
            Err(e) => {
                debug!(error = %e, "reply stream ended with error");
                break;
            }
        }
    }
    caps
}
