//! SCPI request/response transport.
//!
//! Drivers talk to instruments through [`ScpiTransport`], a synchronous
//! write/query channel. [`TcpScpiTransport`] carries it over the LXI raw
//! socket most LAN instruments expose.
//!
//! # Example
//!
//! ```no_run
//! use rf_bench::instrument::scpi::{ScpiTransport, TcpScpiTransportBuilder};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), rf_bench::error::DriverError> {
//! let transport = TcpScpiTransportBuilder::new("DSA-815")
//!     .with_port(5555)
//!     .with_timeout(Duration::from_secs(5))
//!     .connect()
//!     .await?;
//!
//! let idn = transport.query("*IDN?").await?;
//! println!("Instrument: {}", idn);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{trace, warn};

use crate::error::DriverError;

/// Port used by LXI raw-socket SCPI servers when none is given.
pub const DEFAULT_SCPI_PORT: u16 = 5025;

/// Synchronous request/response channel to one instrument.
#[async_trait]
pub trait ScpiTransport: Send + Sync {
    /// Send a command without reading a reply.
    async fn write(&self, cmd: &str) -> Result<(), DriverError>;

    /// Send a command and read one reply line (terminator stripped).
    async fn query(&self, cmd: &str) -> Result<String, DriverError>;

    /// Like [`query`](Self::query), but waits as long as the instrument takes.
    ///
    /// For queries that only answer once queued operations have finished,
    /// such as a peak count behind two `*WAI`-gated sweeps.
    async fn query_unbounded(&self, cmd: &str) -> Result<String, DriverError> {
        self.query(cmd).await
    }

    /// Send a command and read a definite-length binary block, returning the
    /// `#<n><len>` header together with the payload.
    async fn query_raw(&self, cmd: &str) -> Result<Vec<u8>, DriverError>;

    /// `false` once an exchange was abandoned part way and replies can no
    /// longer be paired with their commands.
    fn is_in_sync(&self) -> bool {
        true
    }
}

/// Split `host[:port]` into its parts.
pub fn split_address(address: &str) -> (&str, Option<u16>) {
    match address.rsplit_once(':') {
        Some((host, port)) => match port.parse::<u16>() {
            Ok(port) => (host, Some(port)),
            Err(_) => (address, None),
        },
        None => (address, None),
    }
}

/// Builder for [`TcpScpiTransport`].
pub struct TcpScpiTransportBuilder {
    address: String,
    port: u16,
    timeout: Duration,
}

impl TcpScpiTransportBuilder {
    /// `address` is a hostname, optionally with an explicit `:port`.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            port: DEFAULT_SCPI_PORT,
            timeout: Duration::from_secs(5),
        }
    }

    /// Port used when the address does not carry one.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Timeout applied to connect and to every bounded exchange.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Open the socket.
    ///
    /// # Errors
    /// `DriverError::Transport` if the connection is refused, `Timeout` if it
    /// does not complete in time.
    pub async fn connect(self) -> Result<TcpScpiTransport, DriverError> {
        let (host, port) = split_address(&self.address);
        let port = port.unwrap_or(self.port);
        let target = format!("{}:{}", host, port);

        let stream = tokio::time::timeout(self.timeout, TcpStream::connect(&target))
            .await
            .map_err(|_| DriverError::Timeout {
                command: format!("connect {}", target),
                timeout_ms: self.timeout.as_millis() as u64,
            })??;
        stream.set_nodelay(true)?;

        Ok(TcpScpiTransport {
            stream: Mutex::new(BufStream::new(stream)),
            target,
            timeout: self.timeout,
            in_sync: AtomicBool::new(true),
        })
    }
}

/// Marks the connection out of sync unless the exchange it guards runs to
/// completion, whether it is cut short by a deadline, an I/O error or the
/// caller dropping the future.
struct ExchangeGuard<'a> {
    target: &'a str,
    in_sync: &'a AtomicBool,
    completed: bool,
}

impl ExchangeGuard<'_> {
    fn complete(mut self) {
        self.completed = true;
    }
}

impl Drop for ExchangeGuard<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.in_sync.store(false, Ordering::SeqCst);
            warn!(instrument = self.target, "SCPI exchange abandoned, connection out of sync");
        }
    }
}

/// SCPI over a raw TCP socket.
///
/// An exchange that does not finish leaves an unread reply on the socket;
/// from then on every call fails with [`DriverError::OutOfSync`].
pub struct TcpScpiTransport {
    stream: Mutex<BufStream<TcpStream>>,
    target: String,
    timeout: Duration,
    in_sync: AtomicBool,
}

impl TcpScpiTransport {
    /// `host:port` this transport is connected to.
    pub fn target(&self) -> &str {
        &self.target
    }

    fn timeout_error(&self, cmd: &str) -> DriverError {
        DriverError::Timeout {
            command: cmd.to_string(),
            timeout_ms: self.timeout.as_millis() as u64,
        }
    }

    /// Fails fast on a desynchronized connection, otherwise arms a guard.
    fn begin_exchange(&self) -> Result<ExchangeGuard<'_>, DriverError> {
        if !self.in_sync.load(Ordering::SeqCst) {
            return Err(DriverError::OutOfSync(self.target.clone()));
        }
        Ok(ExchangeGuard {
            target: &self.target,
            in_sync: &self.in_sync,
            completed: false,
        })
    }

    async fn send(stream: &mut BufStream<TcpStream>, cmd: &str) -> Result<(), DriverError> {
        stream.write_all(cmd.as_bytes()).await?;
        stream.write_all(b"\n").await?;
        stream.flush().await?;
        Ok(())
    }

    async fn read_reply(stream: &mut BufStream<TcpStream>) -> Result<String, DriverError> {
        let mut line = String::new();
        let read = stream.read_line(&mut line).await?;
        if read == 0 {
            return Err(DriverError::Transport(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed by instrument",
            )));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    async fn line_exchange(
        &self,
        cmd: &str,
        deadline: Option<Duration>,
    ) -> Result<String, DriverError> {
        let mut stream = self.stream.lock().await;
        let guard = self.begin_exchange()?;
        let exchange = async {
            Self::send(&mut stream, cmd).await?;
            Self::read_reply(&mut stream).await
        };
        let reply = match deadline {
            Some(limit) => tokio::time::timeout(limit, exchange)
                .await
                .map_err(|_| self.timeout_error(cmd))??,
            None => exchange.await?,
        };
        guard.complete();
        trace!(instrument = %self.target, command = cmd, reply = %reply, "SCPI query");
        Ok(reply)
    }
}

#[async_trait]
impl ScpiTransport for TcpScpiTransport {
    async fn write(&self, cmd: &str) -> Result<(), DriverError> {
        trace!(instrument = %self.target, command = cmd, "SCPI write");
        let mut stream = self.stream.lock().await;
        let guard = self.begin_exchange()?;
        tokio::time::timeout(self.timeout, Self::send(&mut stream, cmd))
            .await
            .map_err(|_| self.timeout_error(cmd))??;
        guard.complete();
        Ok(())
    }

    async fn query(&self, cmd: &str) -> Result<String, DriverError> {
        self.line_exchange(cmd, Some(self.timeout)).await
    }

    async fn query_unbounded(&self, cmd: &str) -> Result<String, DriverError> {
        self.line_exchange(cmd, None).await
    }

    async fn query_raw(&self, cmd: &str) -> Result<Vec<u8>, DriverError> {
        let mut stream = self.stream.lock().await;
        let guard = self.begin_exchange()?;
        let exchange = async {
            Self::send(&mut stream, cmd).await?;

            let mut prefix = [0u8; 2];
            stream.read_exact(&mut prefix).await?;
            if prefix[0] != b'#' || !prefix[1].is_ascii_digit() {
                return Err(DriverError::MalformedResponse(format!(
                    "binary block header starts with {:?}",
                    prefix
                )));
            }
            let digits = usize::from(prefix[1] - b'0');
            let mut length_field = vec![0u8; digits];
            stream.read_exact(&mut length_field).await?;
            let length: usize = std::str::from_utf8(&length_field)
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| {
                    DriverError::MalformedResponse("binary block length is not numeric".into())
                })?;

            let mut block = Vec::with_capacity(2 + digits + length);
            block.extend_from_slice(&prefix);
            block.extend_from_slice(&length_field);
            let mut payload = vec![0u8; length];
            stream.read_exact(&mut payload).await?;
            block.extend_from_slice(&payload);

            // Block is followed by a line terminator.
            let mut rest = Vec::new();
            stream.read_until(b'\n', &mut rest).await?;
            Ok::<Vec<u8>, DriverError>(block)
        };
        let block = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| self.timeout_error(cmd))??;
        guard.complete();
        trace!(instrument = %self.target, command = cmd, bytes = block.len(), "SCPI raw query");
        Ok(block)
    }

    fn is_in_sync(&self) -> bool {
        self.in_sync.load(Ordering::SeqCst)
    }
}
