//! Common test utilities for kestrel-client integration tests
//!
//! This module provides:
//! - A queue server speaking the memcached text protocol, backed by the
//!   in-memory transport so tests can seed and inspect queues directly
//! - Helpers for building clients against it

use bytes::Bytes;
use kestrel_client::{Client, ClientConfig, InMemoryTransport, Transport};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

// ============================================================================
// Fake Queue Server
// ============================================================================

/// Local queue server for end-to-end tests
pub struct FakeKestrelServer {
    address: String,
    backend: InMemoryTransport,
    accept_task: JoinHandle<()>,
}

impl FakeKestrelServer {
    /// Bind to an ephemeral port and start serving
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let backend = InMemoryTransport::new(1);

        let shared = backend.clone();
        let accept_task = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let backend = shared.clone();
                tokio::spawn(async move {
                    let _ = serve_connection(socket, backend).await;
                });
            }
        });

        Self {
            address,
            backend,
            accept_task,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Queue storage behind the server
    pub fn backend(&self) -> &InMemoryTransport {
        &self.backend
    }

    /// Stop accepting connections. The port is closed once this returns.
    #[allow(dead_code)]
    pub async fn stop(&mut self) {
        self.accept_task.abort();
        let _ = (&mut self.accept_task).await;
    }
}

impl Drop for FakeKestrelServer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn serve_connection(socket: TcpStream, backend: InMemoryTransport) -> std::io::Result<()> {
    let mut stream = BufReader::new(socket);
    let mut line = String::new();

    loop {
        line.clear();
        if stream.read_line(&mut line).await? == 0 {
            return Ok(());
        }

        let parts: Vec<&str> = line.trim_end().split(' ').collect();
        let reply = match parts.as_slice() {
            ["get", key] => match backend.get(0, key).await {
                Ok(Some(value)) => {
                    let mut reply = format!("VALUE {} 0 {}\r\n", key, value.len()).into_bytes();
                    reply.extend_from_slice(&value);
                    reply.extend_from_slice(b"\r\nEND\r\n");
                    reply
                }
                Ok(None) => b"END\r\n".to_vec(),
                Err(error) => format!("SERVER_ERROR {}\r\n", error).into_bytes(),
            },
            ["set", key, _flags, expiry, len] => {
                let len: usize = len.parse().unwrap_or(0);
                let mut data = vec![0u8; len + 2];
                stream.read_exact(&mut data).await?;
                data.truncate(len);

                let expiry = expiry.parse().unwrap_or(0);
                match backend.set(0, key, Bytes::from(data), expiry).await {
                    Ok(()) => b"STORED\r\n".to_vec(),
                    Err(_) => b"NOT_STORED\r\n".to_vec(),
                }
            }
            ["delete", key] => match backend.delete(0, key).await {
                Ok(()) => b"DELETED\r\n".to_vec(),
                Err(_) => b"NOT_FOUND\r\n".to_vec(),
            },
            ["stats"] => {
                let mut reply = String::new();
                for (name, value) in backend.stats(0).await.unwrap_or_default() {
                    reply.push_str(&format!("STAT {} {}\r\n", name, value));
                }
                reply.push_str("END\r\n");
                reply.into_bytes()
            }
            _ => b"ERROR\r\n".to_vec(),
        };

        stream.get_mut().write_all(&reply).await?;
    }
}

// ============================================================================
// Client Helpers
// ============================================================================

/// Client settings for `servers` without a server-side read wait
#[allow(dead_code)]
pub fn client_config(servers: &[&FakeKestrelServer]) -> ClientConfig {
    ClientConfig {
        no_wait: true,
        ..ClientConfig::new(
            servers
                .iter()
                .map(|server| server.address().to_string())
                .collect(),
        )
    }
}

/// TCP client connected to `servers`
pub fn connect(servers: &[&FakeKestrelServer]) -> Client {
    Client::from_config(&client_config(servers)).unwrap()
}
