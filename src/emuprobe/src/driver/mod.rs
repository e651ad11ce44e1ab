//! Emulator drivers
//!
//! A driver supplies bytes for the blocks the instance polls every tick and
//! accepts writes. Drivers are interchangeable:
//! - `UdpDriver` speaks the emulator's textual UDP protocol
//! - `SharedMemoryDriver` maps a file holding a linear memory image
//! - `StaticDriver` serves an in-memory image, for tests and offline use

mod shared;
mod static_image;
mod udp;

pub use shared::{SharedMemoryConfig, SharedMemoryDriver};
pub use static_image::{StaticDriver, StaticImage};
pub use udp::{format_address, parse_response, ReadResponse, UdpDriver, UdpDriverConfig};

use crate::platform::ReadRange;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("{driver}: no response for address {address:#x}")]
    Timeout { driver: String, address: u32 },

    #[error("{driver}: {message}")]
    Protocol { driver: String, message: String },

    #[error("{driver}: {length} bytes at {address:#x} are outside the memory image")]
    OutOfRange {
        driver: String,
        address: u32,
        length: u32,
    },

    #[error("{0} is not connected")]
    NotConnected(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Bytes returned for one requested block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryBlock {
    pub namespace: String,
    pub start: u32,
    pub data: Vec<u8>,
}

impl MemoryBlock {
    pub fn new(range: &ReadRange, data: Vec<u8>) -> Self {
        Self {
            namespace: range.namespace().to_string(),
            start: range.start,
            data,
        }
    }
}

/// Anything that can read and write emulator memory
#[async_trait]
pub trait Driver: Send + Sync {
    /// Short name used in logs and errors
    fn name(&self) -> &str;

    /// Pause between two ticks
    fn delay_between_reads(&self) -> Duration;

    async fn establish_connection(&mut self) -> Result<(), DriverError>;

    async fn disconnect(&mut self) -> Result<(), DriverError>;

    /// Fetch every block. Either all blocks are returned or the read fails.
    async fn read_bytes(&self, blocks: &[ReadRange]) -> Result<Vec<MemoryBlock>, DriverError>;

    async fn write_bytes(&mut self, address: u32, bytes: &[u8]) -> Result<(), DriverError>;
}
