//! UDP driver
//!
//! Talks to the emulator's network command interface, one ASCII command
//! per datagram:
//!
//! ```text
//! READ_CORE_MEMORY d158 4          ->  READ_CORE_MEMORY d158 11 22 33 44
//! READ_CORE_MEMORY 5 1             ->  READ_CORE_MEMORY 5 -1   (rejected)
//! WRITE_CORE_MEMORY d158 0a 0b        (no response)
//! ```
//!
//! A background task receives every datagram and files read responses in a
//! table keyed by address. A read sends its request, then polls the table
//! until its address shows up or the timeout passes.

use super::{Driver, DriverError, MemoryBlock};
use crate::platform::ReadRange;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

const DRIVER_NAME: &str = "udp";
const READ_COMMAND: &str = "READ_CORE_MEMORY";
const WRITE_COMMAND: &str = "WRITE_CORE_MEMORY";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UdpDriverConfig {
    pub host: String,
    pub port: u16,
    /// How long a read waits for its response
    pub timeout_ms: u64,
    /// Pause between ticks
    pub delay_ms: u64,
    /// Largest block requested in one command
    pub max_read_size: u32,
    /// How often a pending read checks the response table
    pub poll_interval_ms: u64,
}

impl Default for UdpDriverConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 55355,
            timeout_ms: 64,
            delay_ms: 5,
            max_read_size: 2048,
            poll_interval_ms: 1,
        }
    }
}

/// A read response as filed by the receive loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadResponse {
    Bytes(Vec<u8>),
    /// The emulator answered `-1`
    Rejected,
}

/// Addresses up to 9 go out as decimal, everything else as bare lowercase hex
pub fn format_address(address: u32) -> String {
    if address <= 9 {
        address.to_string()
    } else {
        format!("{:x}", address)
    }
}

/// Parse a `READ_CORE_MEMORY` response datagram.
///
/// The address is always read as hex; for the decimal form (0-9) that is
/// the same number. Returns `None` for anything that isn't a read response.
pub fn parse_response(datagram: &str) -> Option<(u32, ReadResponse)> {
    let mut parts = datagram.split_whitespace();
    if parts.next()? != READ_COMMAND {
        return None;
    }
    let address = parts.next()?;
    let address = u32::from_str_radix(address.trim_start_matches("0x"), 16).ok()?;

    let rest: Vec<&str> = parts.collect();
    if rest.first() == Some(&"-1") {
        return Some((address, ReadResponse::Rejected));
    }
    let bytes = rest
        .iter()
        .map(|b| u8::from_str_radix(b, 16))
        .collect::<Result<Vec<u8>, _>>()
        .ok()?;
    Some((address, ReadResponse::Bytes(bytes)))
}

struct Connection {
    socket: Arc<UdpSocket>,
    cancel: CancellationToken,
    receiver: JoinHandle<()>,
}

pub struct UdpDriver {
    config: UdpDriverConfig,
    responses: Arc<DashMap<u32, ReadResponse>>,
    connection: Option<Connection>,
}

impl UdpDriver {
    pub fn new(config: UdpDriverConfig) -> Self {
        Self {
            config,
            responses: Arc::new(DashMap::new()),
            connection: None,
        }
    }

    pub fn config(&self) -> &UdpDriverConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    fn socket(&self) -> Result<&UdpSocket, DriverError> {
        self.connection
            .as_ref()
            .map(|c| c.socket.as_ref())
            .ok_or_else(|| DriverError::NotConnected(DRIVER_NAME.to_string()))
    }

    fn protocol_error(message: impl Into<String>) -> DriverError {
        DriverError::Protocol {
            driver: DRIVER_NAME.to_string(),
            message: message.into(),
        }
    }

    async fn receive_loop(
        socket: Arc<UdpSocket>,
        responses: Arc<DashMap<u32, ReadResponse>>,
        cancel: CancellationToken,
        backoff: Duration,
    ) {
        let mut buf = vec![0u8; 65536];
        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => break,
                r = socket.recv(&mut buf) => r,
            };

            match received {
                Ok(n) => {
                    let datagram = String::from_utf8_lossy(&buf[..n]);
                    trace!(datagram = %datagram.trim_end(), "received");
                    match parse_response(&datagram) {
                        Some((address, response)) => {
                            responses.insert(address, response);
                        }
                        None => debug!(datagram = %datagram.trim_end(), "ignoring datagram"),
                    }
                }
                Err(e) => {
                    // Nobody listening yet shows up as a receive error on a connected socket
                    trace!(error = %e, "receive failed");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
        debug!("receive loop stopped");
    }

    /// Send one read command and wait for its response
    async fn read_chunk(&self, address: u32, length: u32) -> Result<Vec<u8>, DriverError> {
        let socket = self.socket()?;
        self.responses.remove(&address);

        let command = format!("{} {} {}", READ_COMMAND, format_address(address), length);
        trace!(%command, "send");
        socket.send(command.as_bytes()).await?;

        let poll = Duration::from_millis(self.config.poll_interval_ms.max(1));
        let wait = async {
            loop {
                if let Some((_, response)) = self.responses.remove(&address) {
                    return response;
                }
                tokio::time::sleep(poll).await;
            }
        };

        let response = tokio::time::timeout(Duration::from_millis(self.config.timeout_ms), wait)
            .await
            .map_err(|_| DriverError::Timeout {
                driver: DRIVER_NAME.to_string(),
                address,
            })?;

        match response {
            ReadResponse::Bytes(bytes) if bytes.len() == length as usize => Ok(bytes),
            ReadResponse::Bytes(bytes) => Err(Self::protocol_error(format!(
                "asked for {} bytes at {:#x}, got {}",
                length,
                address,
                bytes.len()
            ))),
            ReadResponse::Rejected => {
                warn!("emulator rejected read at {:#x}", address);
                Err(Self::protocol_error(format!(
                    "emulator rejected read of {} bytes at {:#x}",
                    length, address
                )))
            }
        }
    }

    async fn read_range(&self, range: &ReadRange) -> Result<Vec<u8>, DriverError> {
        let chunk = self.config.max_read_size.max(1);
        let mut data = Vec::with_capacity(range.length as usize);
        let mut offset = 0u32;
        while offset < range.length {
            let length = chunk.min(range.length - offset);
            let address = range
                .start
                .checked_add(offset)
                .ok_or_else(|| Self::protocol_error(format!("block at {:#x} wraps", range.start)))?;
            data.extend(self.read_chunk(address, length).await?);
            offset += length;
        }
        Ok(data)
    }
}

#[async_trait]
impl Driver for UdpDriver {
    fn name(&self) -> &str {
        DRIVER_NAME
    }

    fn delay_between_reads(&self) -> Duration {
        Duration::from_millis(self.config.delay_ms)
    }

    async fn establish_connection(&mut self) -> Result<(), DriverError> {
        if self.connection.is_some() {
            return Ok(());
        }

        let socket = UdpSocket::bind(("0.0.0.0", 0)).await?;
        socket
            .connect((self.config.host.as_str(), self.config.port))
            .await?;
        let socket = Arc::new(socket);

        let cancel = CancellationToken::new();
        let receiver = tokio::spawn(Self::receive_loop(
            Arc::clone(&socket),
            Arc::clone(&self.responses),
            cancel.clone(),
            Duration::from_millis(self.config.poll_interval_ms.max(1)),
        ));

        info!(
            host = %self.config.host,
            port = self.config.port,
            "connected to emulator"
        );
        self.connection = Some(Connection {
            socket,
            cancel,
            receiver,
        });
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), DriverError> {
        if let Some(connection) = self.connection.take() {
            connection.cancel.cancel();
            if let Err(e) = connection.receiver.await {
                warn!(error = %e, "receive loop ended abnormally");
            }
            self.responses.clear();
            info!("disconnected from emulator");
        }
        Ok(())
    }

    async fn read_bytes(&self, blocks: &[ReadRange]) -> Result<Vec<MemoryBlock>, DriverError> {
        let mut out = Vec::with_capacity(blocks.len());
        for range in blocks {
            let data = self.read_range(range).await?;
            out.push(MemoryBlock::new(range, data));
        }
        Ok(out)
    }

    async fn write_bytes(&mut self, address: u32, bytes: &[u8]) -> Result<(), DriverError> {
        let socket = self.socket()?;
        let mut command = format!("{} {}", WRITE_COMMAND, format_address(address));
        for b in bytes {
            command.push_str(&format!(" {:02x}", b));
        }
        trace!(%command, "send");
        socket.send(command.as_bytes()).await?;
        Ok(())
    }
}

impl Drop for UdpDriver {
    fn drop(&mut self) {
        if let Some(connection) = &self.connection {
            connection.cancel.cancel();
        }
    }
}
