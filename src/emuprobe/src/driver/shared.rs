//! Shared-memory driver
//!
//! Some emulator front ends expose guest RAM as a file (a `/dev/shm` object
//! or a plain file on disk). The file is a linear image: file offset 0 is
//! emulator address `base_address`.

use super::{Driver, DriverError, MemoryBlock};
use crate::platform::ReadRange;

use async_trait::async_trait;
use memmap2::MmapMut;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::ops::Range;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

const DRIVER_NAME: &str = "shared-memory";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedMemoryConfig {
    pub path: PathBuf,
    /// Emulator address of the first byte of the file
    #[serde(default)]
    pub base_address: u32,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

fn default_delay_ms() -> u64 {
    5
}

impl SharedMemoryConfig {
    pub fn new(path: impl Into<PathBuf>, base_address: u32) -> Self {
        Self {
            path: path.into(),
            base_address,
            delay_ms: default_delay_ms(),
        }
    }
}

pub struct SharedMemoryDriver {
    config: SharedMemoryConfig,
    map: Option<MmapMut>,
}

impl SharedMemoryDriver {
    pub fn new(config: SharedMemoryConfig) -> Self {
        Self { config, map: None }
    }

    fn map(&self) -> Result<&MmapMut, DriverError> {
        self.map
            .as_ref()
            .ok_or_else(|| DriverError::NotConnected(DRIVER_NAME.to_string()))
    }

    /// File offsets covered by `length` bytes at emulator address `address`
    fn span(&self, address: u32, length: usize, map_len: usize) -> Result<Range<usize>, DriverError> {
        let out_of_range = || DriverError::OutOfRange {
            driver: DRIVER_NAME.to_string(),
            address,
            length: length as u32,
        };
        let start = address
            .checked_sub(self.config.base_address)
            .ok_or_else(out_of_range)? as usize;
        let end = start.checked_add(length).ok_or_else(out_of_range)?;
        if end > map_len {
            return Err(out_of_range());
        }
        Ok(start..end)
    }
}

#[async_trait]
impl Driver for SharedMemoryDriver {
    fn name(&self) -> &str {
        DRIVER_NAME
    }

    fn delay_between_reads(&self) -> Duration {
        Duration::from_millis(self.config.delay_ms)
    }

    async fn establish_connection(&mut self) -> Result<(), DriverError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.config.path)?;

        // SAFETY: the emulator may write the file concurrently; we only ever
        // copy bytes in and out of the mapping, never hand out references.
        let map = unsafe { MmapMut::map_mut(&file) }?;

        info!(
            path = %self.config.path.display(),
            size = map.len(),
            base = %format!("{:#x}", self.config.base_address),
            "mapped shared memory"
        );
        self.map = Some(map);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), DriverError> {
        if let Some(map) = self.map.take() {
            map.flush()?;
            info!(path = %self.config.path.display(), "unmapped shared memory");
        }
        Ok(())
    }

    async fn read_bytes(&self, blocks: &[ReadRange]) -> Result<Vec<MemoryBlock>, DriverError> {
        let map = self.map()?;
        blocks
            .iter()
            .map(|range| {
                let span = self.span(range.start, range.length as usize, map.len())?;
                Ok(MemoryBlock::new(range, map[span].to_vec()))
            })
            .collect()
    }

    async fn write_bytes(&mut self, address: u32, bytes: &[u8]) -> Result<(), DriverError> {
        let map_len = self.map()?.len();
        let span = self.span(address, bytes.len(), map_len)?;
        let map = self
            .map
            .as_mut()
            .ok_or_else(|| DriverError::NotConnected(DRIVER_NAME.to_string()))?;
        map[span.clone()].copy_from_slice(bytes);
        map.flush_range(span.start, span.len())?;
        Ok(())
    }
}
