//! Client for the upsd network protocol (RFC 9271).
//!
//! Every request opens a fresh TCP connection, writes one command line and
//! reads until the response is complete:
//!
//! - listing commands (`LIST ...`) end with a line starting `END <command>`
//! - single-value commands (`GET ...`) end at the first newline
//!
//! A line starting `ERR ` also ends the exchange. Bytes that are not valid
//! UTF-8 are replaced rather than rejected.

pub mod parser;

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::trace;

pub use parser::{parse_line, parse_response};

/// Variable (or device) name to value map, ordered by name.
pub type VarMap = BTreeMap<String, String>;

/// Errors raised while talking to upsd.
#[derive(Debug, thiserror::Error)]
pub enum UpsdError {
    #[error("Connection to {addr} failed: {message}")]
    Connection { addr: String, message: String },
    #[error("Request '{command}' to {addr} timed out after {timeout_ms}ms")]
    Timeout {
        addr: String,
        command: String,
        timeout_ms: u64,
    },
    #[error("Framing error: {0}")]
    Framing(String),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("upsd rejected '{command}': {reason}")]
    Server { command: String, reason: String },
    #[error("Don't know how to issue upsd command: {0}")]
    Unsupported(String),
    #[error("Cannot interpret upsd response line '{line}': {reason}")]
    Parse { line: String, reason: String },
}

/// The commands the bridge knows how to issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `LIST UPS`
    ListUps,
    /// `LIST VAR <ups>`
    ListVar(String),
    /// `GET VAR <ups> <var>`
    GetVar(String, String),
    /// Any other `LIST ...` or `GET ...` command, sent verbatim.
    Other(String),
}

impl Command {
    /// Whether the response is framed by BEGIN/END sentinels.
    pub fn is_listing(&self) -> bool {
        match self {
            Command::ListUps | Command::ListVar(_) => true,
            Command::GetVar(..) => false,
            Command::Other(text) => text.starts_with("LIST"),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::ListUps => write!(f, "LIST UPS"),
            Command::ListVar(ups) => write!(f, "LIST VAR {}", ups),
            Command::GetVar(ups, var) => write!(f, "GET VAR {} {}", ups, var),
            Command::Other(text) => f.write_str(text),
        }
    }
}

impl FromStr for Command {
    type Err = UpsdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tokens: Vec<&str> = s.split_whitespace().collect();
        match tokens.as_slice() {
            ["LIST", "UPS"] => Ok(Command::ListUps),
            ["LIST", "VAR", ups] => Ok(Command::ListVar(ups.to_string())),
            ["GET", "VAR", ups, var] => Ok(Command::GetVar(ups.to_string(), var.to_string())),
            ["LIST" | "GET", ..] => Ok(Command::Other(tokens.join(" "))),
            _ => Err(UpsdError::Unsupported(s.to_string())),
        }
    }
}

/// A single upsd server the bridge can query.
///
/// Implemented by [`TcpUpsdClient`] and by canned-response doubles in tests.
pub trait UpsdClient: Send + Sync {
    /// Host name, used as part of device identity.
    fn host(&self) -> &str;

    /// Server port.
    fn port(&self) -> u16;

    /// Perform one request/response exchange and return the raw response text.
    fn request(&self, command: &Command) -> impl Future<Output = Result<String, UpsdError>> + Send;
}

/// Issue a command given as text and parse the response.
///
/// Any `LIST` or `GET` command is accepted; everything else is `Unsupported`.
pub async fn command<C: UpsdClient>(client: &C, text: &str) -> Result<VarMap, UpsdError> {
    let cmd: Command = text.parse()?;
    execute(client, &cmd).await
}

/// Issue a typed command and parse the response.
pub async fn execute<C: UpsdClient>(client: &C, cmd: &Command) -> Result<VarMap, UpsdError> {
    let raw = client.request(cmd).await?;
    parse_response(&raw, &cmd.to_string())
}

/// upsd client speaking plain TCP.
#[derive(Debug, Clone)]
pub struct TcpUpsdClient {
    host: String,
    port: u16,
    timeout: Option<Duration>,
}

impl TcpUpsdClient {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout: None,
        }
    }

    /// Bound every exchange by `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    async fn exchange(&self, command: &str, listing: bool) -> Result<String, UpsdError> {
        let addr = self.addr();
        let io_err = |e: std::io::Error| UpsdError::Connection {
            addr: addr.clone(),
            message: e.to_string(),
        };

        let stream = TcpStream::connect(&addr).await.map_err(io_err)?;
        let (reader, mut writer) = stream.into_split();

        writer
            .write_all(format!("{}\n", command).as_bytes())
            .await
            .map_err(io_err)?;

        let end_marker = format!("END {}", command);
        let mut reader = BufReader::new(reader);
        let mut response = String::new();
        let mut buf = Vec::new();

        loop {
            buf.clear();
            let n = reader.read_until(b'\n', &mut buf).await.map_err(io_err)?;
            if n == 0 {
                // Peer closed the connection
                break;
            }
            // Descriptions may carry non-UTF-8 bytes (e.g. Latin-1 from ups.conf)
            let line = String::from_utf8_lossy(&buf);
            response.push_str(&line);

            if !listing || line.starts_with(&end_marker) || line.starts_with("ERR ") {
                break;
            }
        }

        trace!(addr = %addr, command, bytes = response.len(), "upsd response");

        // Dropping both halves closes the connection
        Ok(response)
    }
}

impl UpsdClient for TcpUpsdClient {
    fn host(&self) -> &str {
        &self.host
    }

    fn port(&self) -> u16 {
        self.port
    }

    async fn request(&self, command: &Command) -> Result<String, UpsdError> {
        let text = command.to_string();
        let exchange = self.exchange(&text, command.is_listing());

        match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, exchange)
                .await
                .map_err(|_| UpsdError::Timeout {
                    addr: self.addr(),
                    command: text.clone(),
                    timeout_ms: timeout.as_millis() as u64,
                })?,
            None => exchange.await,
        }
    }
}
