//! Memcached text-protocol transport over TCP.
//!
//! Each call opens its own connection, so one transport can be shared by any
//! number of consumers. A server whose connection fails is skipped for
//! `dead_timeout` before it is tried again.

use crate::command::wait_millis;
use crate::error::TransportError;
use crate::transport::Transport;
use async_trait::async_trait;
use bytes::Bytes;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::{debug, warn};

#[cfg(test)]
#[path = "tcp_tests.rs"]
mod tests;

/// Longest key the protocol accepts
pub const MAX_KEY_LENGTH: usize = 250;

/// Largest value accepted from a server
pub const MAX_VALUE_LENGTH: usize = 64 * 1024 * 1024;

// ============================================================================
// Server State
// ============================================================================

struct ServerState {
    address: String,
    dead_until: Mutex<Option<Instant>>,
}

impl ServerState {
    fn new(address: String) -> Self {
        Self {
            address,
            dead_until: Mutex::new(None),
        }
    }

    fn check_alive(&self) -> Result<(), TransportError> {
        let mut dead_until = self
            .dead_until
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        match *dead_until {
            Some(until) if Instant::now() < until => Err(TransportError::ServerDown {
                server: self.address.clone(),
            }),
            Some(_) => {
                *dead_until = None;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn mark_dead(&self, dead_timeout: Duration) {
        if dead_timeout.is_zero() {
            return;
        }

        warn!(
            server = %self.address,
            dead_for_ms = dead_timeout.as_millis() as u64,
            "Marking server dead"
        );
        *self
            .dead_until
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Instant::now() + dead_timeout);
    }
}

// ============================================================================
// Connection
// ============================================================================

struct Connection {
    stream: BufReader<TcpStream>,
    server: String,
}

impl Connection {
    fn new(stream: TcpStream, server: String) -> Self {
        Self {
            stream: BufReader::new(stream),
            server,
        }
    }

    async fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let written = async {
            let stream = self.stream.get_mut();
            stream.write_all(data).await?;
            stream.flush().await
        }
        .await;
        written.map_err(|e| self.write_failure(e))
    }

    async fn read_line(&mut self) -> Result<String, TransportError> {
        let mut line = String::new();
        let read = self
            .stream
            .read_line(&mut line)
            .await
            .map_err(|e| self.read_failure(e))?;

        if read == 0 {
            return Err(TransportError::UnknownReadFailure {
                server: self.server.clone(),
            });
        }

        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    async fn read_data(&mut self, len: usize) -> Result<Bytes, TransportError> {
        let block = len
            .checked_add(2)
            .filter(|_| len <= MAX_VALUE_LENGTH)
            .ok_or_else(|| oversized_value(len))?;
        let mut data = vec![0u8; block];
        self.stream
            .read_exact(&mut data)
            .await
            .map_err(|e| self.read_failure(e))?;

        if !data.ends_with(b"\r\n") {
            return Err(TransportError::Protocol {
                message: "value block not terminated by CRLF".to_string(),
            });
        }

        data.truncate(len);
        Ok(Bytes::from(data))
    }

    fn write_failure(&self, error: std::io::Error) -> TransportError {
        TransportError::WriteFailure {
            server: self.server.clone(),
            message: error.to_string(),
        }
    }

    fn read_failure(&self, error: std::io::Error) -> TransportError {
        TransportError::ReadFailure {
            server: self.server.clone(),
            message: error.to_string(),
        }
    }

    async fn get(mut self, key: String) -> Result<Option<Bytes>, TransportError> {
        self.send(format!("get {}\r\n", key).as_bytes()).await?;

        let header = self.read_line().await?;
        if header == "END" {
            return Ok(None);
        }

        let len = parse_value_header(&header)?;
        let data = self.read_data(len).await?;

        let trailer = self.read_line().await?;
        if trailer != "END" {
            return Err(unexpected_reply(&trailer));
        }

        Ok(Some(data))
    }

    async fn set(mut self, key: String, value: Bytes, expiry: u32) -> Result<(), TransportError> {
        let mut request = format!("set {} 0 {} {}\r\n", key, expiry, value.len()).into_bytes();
        request.extend_from_slice(&value);
        request.extend_from_slice(b"\r\n");
        self.send(&request).await?;

        match self.read_line().await?.as_str() {
            "STORED" => Ok(()),
            "NOT_STORED" => Err(TransportError::NotStored),
            other => Err(unexpected_reply(other)),
        }
    }

    async fn delete(mut self, key: String) -> Result<(), TransportError> {
        self.send(format!("delete {}\r\n", key).as_bytes()).await?;

        match self.read_line().await?.as_str() {
            "DELETED" => Ok(()),
            "NOT_FOUND" => Err(TransportError::NotFound),
            other => Err(unexpected_reply(other)),
        }
    }

    async fn stats(mut self) -> Result<Vec<(String, String)>, TransportError> {
        self.send(b"stats\r\n").await?;

        let mut stats = Vec::new();
        loop {
            let line = self.read_line().await?;
            if line == "END" {
                return Ok(stats);
            }

            let mut parts = line.splitn(3, ' ');
            match (parts.next(), parts.next(), parts.next()) {
                (Some("STAT"), Some(name), Some(value)) => {
                    stats.push((name.to_string(), value.to_string()));
                }
                _ => return Err(unexpected_reply(&line)),
            }
        }
    }
}

/// Length of the data block announced by `VALUE <key> <flags> <bytes>`
fn parse_value_header(header: &str) -> Result<usize, TransportError> {
    let parts: Vec<&str> = header.split(' ').collect();
    match parts.as_slice() {
        ["VALUE", _key, _flags, len, ..] => {
            let len: usize = len.parse().map_err(|_| TransportError::Protocol {
                message: format!("invalid value length in '{}'", header),
            })?;
            if len > MAX_VALUE_LENGTH {
                return Err(oversized_value(len));
            }
            Ok(len)
        }
        _ => Err(unexpected_reply(header)),
    }
}

fn oversized_value(len: usize) -> TransportError {
    TransportError::Protocol {
        message: format!(
            "value of {} bytes exceeds the {} byte limit",
            len, MAX_VALUE_LENGTH
        ),
    }
}

/// Map a reply line that does not fit the expected grammar
fn unexpected_reply(line: &str) -> TransportError {
    if line == "ERROR" {
        TransportError::Protocol {
            message: "server rejected command".to_string(),
        }
    } else if let Some(message) = line.strip_prefix("SERVER_ERROR ") {
        TransportError::ServerError {
            message: message.to_string(),
        }
    } else if let Some(message) = line.strip_prefix("CLIENT_ERROR ") {
        TransportError::Protocol {
            message: message.to_string(),
        }
    } else {
        TransportError::Protocol {
            message: format!("unexpected reply '{}'", line),
        }
    }
}

fn validate_wire_key(key: &str) -> Result<(), TransportError> {
    if key.is_empty()
        || key.len() > MAX_KEY_LENGTH
        || key.chars().any(|c| c.is_whitespace() || c.is_control())
    {
        return Err(TransportError::BadKey {
            key: key.to_string(),
        });
    }
    Ok(())
}

// ============================================================================
// TcpTransport
// ============================================================================

/// Transport speaking the memcached text protocol to a fixed list of servers
pub struct TcpTransport {
    servers: Vec<ServerState>,
    io_timeout: Duration,
    dead_timeout: Duration,
}

impl TcpTransport {
    /// Create a transport for `servers` (`host:port`).
    ///
    /// `io_timeout` bounds each call, on top of any server-side wait carried
    /// in a read key. Servers that refuse connections are skipped for
    /// `dead_timeout`; zero disables this.
    pub fn new(servers: Vec<String>, io_timeout: Duration, dead_timeout: Duration) -> Self {
        Self {
            servers: servers.into_iter().map(ServerState::new).collect(),
            io_timeout,
            dead_timeout,
        }
    }

    async fn exchange<T, F, Fut>(
        &self,
        server: usize,
        wait: Duration,
        operation: F,
    ) -> Result<T, TransportError>
    where
        F: FnOnce(Connection) -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let state = self.servers.get(server).ok_or(TransportError::NoServers)?;
        state.check_alive()?;

        let address = state.address.clone();
        let attempt = async {
            let stream = TcpStream::connect(address.as_str()).await.map_err(|e| {
                TransportError::ConnectionFailure {
                    server: address.clone(),
                    message: e.to_string(),
                }
            })?;
            operation(Connection::new(stream, address.clone())).await
        };

        match tokio::time::timeout(self.io_timeout + wait, attempt).await {
            Ok(Err(error @ TransportError::ConnectionFailure { .. })) => {
                state.mark_dead(self.dead_timeout);
                Err(error)
            }
            Ok(result) => result,
            Err(_) => {
                debug!(server = %state.address, "Transport call timed out");
                Err(TransportError::Timeout {
                    server: state.address.clone(),
                })
            }
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn server_count(&self) -> usize {
        self.servers.len()
    }

    fn server_name(&self, server: usize) -> String {
        self.servers
            .get(server)
            .map(|s| s.address.clone())
            .unwrap_or_else(|| format!("#{}", server))
    }

    async fn get(&self, server: usize, key: &str) -> Result<Option<Bytes>, TransportError> {
        validate_wire_key(key)?;
        let wait = Duration::from_millis(wait_millis(key).unwrap_or(0));
        let key = key.to_string();
        self.exchange(server, wait, |connection| connection.get(key))
            .await
    }

    async fn set(
        &self,
        server: usize,
        key: &str,
        value: Bytes,
        expiry: u32,
    ) -> Result<(), TransportError> {
        validate_wire_key(key)?;
        let key = key.to_string();
        self.exchange(server, Duration::ZERO, |connection| {
            connection.set(key, value, expiry)
        })
        .await
    }

    async fn delete(&self, server: usize, key: &str) -> Result<(), TransportError> {
        validate_wire_key(key)?;
        let key = key.to_string();
        self.exchange(server, Duration::ZERO, |connection| connection.delete(key))
            .await
    }

    async fn stats(&self, server: usize) -> Result<Vec<(String, String)>, TransportError> {
        self.exchange(server, Duration::ZERO, |connection| connection.stats())
            .await
    }
}
