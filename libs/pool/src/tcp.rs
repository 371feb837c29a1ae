//! TCP backend connector
//!
//! Dials the host and port named in a `BACKEND_DSN` such as
//! `postgres://user@db.internal:5432/app` or `tcp://127.0.0.1:6432`.
//! Any I/O error marks the connection broken so the pool discards it.

use crate::{Connection, Connector, PoolError};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;
use url::Url;

/// Opens TCP connections to one backend
#[derive(Debug, Clone)]
pub struct TcpConnector {
    host: String,
    port: u16,
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new(host: impl Into<String>, port: u16, connect_timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout,
        }
    }

    /// Parse host and port out of a connection string
    pub fn from_dsn(dsn: &str, connect_timeout: Duration) -> Result<Self, PoolError> {
        let url = Url::parse(dsn)
            .map_err(|e| PoolError::invalid_config(format!("invalid BACKEND_DSN: {}", e)))?;

        let host = url
            .host_str()
            .ok_or_else(|| PoolError::invalid_config("BACKEND_DSN has no host"))?;
        let port = url
            .port()
            .or_else(|| default_port(url.scheme()))
            .ok_or_else(|| PoolError::invalid_config("BACKEND_DSN has no port"))?;

        Ok(Self::new(host, port, connect_timeout))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "postgres" | "postgresql" => Some(5432),
        "mysql" => Some(3306),
        "redis" => Some(6379),
        _ => None,
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Connection = TcpConnection;

    async fn connect(&self) -> Result<TcpConnection, PoolError> {
        let stream = tokio::time::timeout(
            self.connect_timeout,
            TcpStream::connect((self.host.as_str(), self.port)),
        )
        .await
        .map_err(|_| {
            PoolError::connect(format!(
                "timed out connecting to {}:{} after {:?}",
                self.host, self.port, self.connect_timeout
            ))
        })?
        .map_err(|e| PoolError::connect(format!("{}:{}: {}", self.host, self.port, e)))?;

        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        debug!(%peer, "Opened backend connection");

        Ok(TcpConnection {
            stream,
            peer,
            broken: false,
        })
    }

    fn describe(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// One TCP connection to the backend
#[derive(Debug)]
pub struct TcpConnection {
    stream: TcpStream,
    peer: SocketAddr,
    broken: bool,
}

impl TcpConnection {
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Write a full request frame
    pub async fn send(&mut self, bytes: &[u8]) -> Result<(), PoolError> {
        let result = self.stream.write_all(bytes).await;
        self.track(result)
    }

    /// Read whatever the backend has sent, up to `buf.len()` bytes
    pub async fn recv(&mut self, buf: &mut [u8]) -> Result<usize, PoolError> {
        match self.stream.read(buf).await {
            Ok(0) if !buf.is_empty() => {
                self.broken = true;
                Err(PoolError::Io("backend closed the connection".to_string()))
            }
            other => self.track(other),
        }
    }

    /// Direct access for protocol code; callers should `mark_broken` the
    /// owning handle on transport errors
    pub fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    fn track<T>(&mut self, result: std::io::Result<T>) -> Result<T, PoolError> {
        result.map_err(|e| {
            self.broken = true;
            PoolError::from(e)
        })
    }
}

#[async_trait]
impl Connection for TcpConnection {
    fn is_broken(&self) -> bool {
        self.broken
    }

    async fn ping(&mut self) -> Result<(), PoolError> {
        if let Some(e) = self.stream.take_error()? {
            self.broken = true;
            return Err(PoolError::health_check(e.to_string()));
        }

        // A readable socket with nothing to read means the peer hung up
        let mut buf = [0u8; 1];
        match tokio::time::timeout(Duration::from_millis(1), self.stream.peek(&mut buf)).await {
            Err(_) => Ok(()),
            Ok(Ok(0)) => {
                self.broken = true;
                Err(PoolError::health_check(format!("{} closed the connection", self.peer)))
            }
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => {
                self.broken = true;
                Err(PoolError::health_check(e.to_string()))
            }
        }
    }
}
