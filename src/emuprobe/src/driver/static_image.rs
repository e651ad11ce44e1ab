//! Static Driver
//!
//! Serves reads from an in-memory image and records every write. Writes are
//! applied to the image too, so the next read sees them like a real emulator
//! would. A `StaticImage` handle stays usable after the driver has been
//! moved into an instance.

use super::{Driver, DriverError, MemoryBlock};
use crate::memory::ByteSpace;
use crate::platform::ReadRange;

use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

const DRIVER_NAME: &str = "static";

#[derive(Debug, Default)]
struct Image {
    regions: Vec<ByteSpace>,
    writes: Vec<(u32, Vec<u8>)>,
    connected: bool,
}

impl Image {
    fn region_mut(&mut self, address: u32, length: usize) -> Option<&mut ByteSpace> {
        self.regions
            .iter_mut()
            .find(|r| r.contains_range(address, length))
    }
}

/// Shared view of a `StaticDriver`'s memory
#[derive(Debug, Clone, Default)]
pub struct StaticImage {
    inner: Arc<Mutex<Image>>,
}

impl StaticImage {
    fn lock(&self) -> MutexGuard<'_, Image> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Change bytes as if the game had written them
    pub fn poke(&self, address: u32, bytes: &[u8]) -> bool {
        let mut image = self.lock();
        match image.region_mut(address, bytes.len()) {
            Some(region) => region.fill((address - region.start) as usize, bytes),
            None => false,
        }
    }

    pub fn peek(&self, address: u32, length: usize) -> Option<Vec<u8>> {
        let image = self.lock();
        image
            .regions
            .iter()
            .find_map(|r| r.slice(address, length))
            .map(<[u8]>::to_vec)
    }

    /// Drop every region, as if the emulator had closed the game
    pub fn clear(&self) {
        self.lock().regions.clear();
    }

    /// Every write the driver received, oldest first
    pub fn writes(&self) -> Vec<(u32, Vec<u8>)> {
        self.lock().writes.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticDriver {
    image: StaticImage,
    delay: Duration,
}

impl StaticDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a region of memory starting at `start`
    pub fn with_region(self, start: u32, data: Vec<u8>) -> Self {
        self.image.lock().regions.push(ByteSpace::new(start, data));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn image(&self) -> StaticImage {
        self.image.clone()
    }

    fn out_of_range(address: u32, length: usize) -> DriverError {
        DriverError::OutOfRange {
            driver: DRIVER_NAME.to_string(),
            address,
            length: length as u32,
        }
    }
}

#[async_trait]
impl Driver for StaticDriver {
    fn name(&self) -> &str {
        DRIVER_NAME
    }

    fn delay_between_reads(&self) -> Duration {
        self.delay
    }

    async fn establish_connection(&mut self) -> Result<(), DriverError> {
        self.image.lock().connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), DriverError> {
        self.image.lock().connected = false;
        Ok(())
    }

    async fn read_bytes(&self, blocks: &[ReadRange]) -> Result<Vec<MemoryBlock>, DriverError> {
        let image = self.image.lock();
        if !image.connected {
            return Err(DriverError::NotConnected(DRIVER_NAME.to_string()));
        }
        blocks
            .iter()
            .map(|range| {
                let length = range.length as usize;
                image
                    .regions
                    .iter()
                    .find_map(|r| r.slice(range.start, length))
                    .map(|data| MemoryBlock::new(range, data.to_vec()))
                    .ok_or_else(|| Self::out_of_range(range.start, length))
            })
            .collect()
    }

    async fn write_bytes(&mut self, address: u32, bytes: &[u8]) -> Result<(), DriverError> {
        let mut image = self.image.lock();
        if !image.connected {
            return Err(DriverError::NotConnected(DRIVER_NAME.to_string()));
        }
        let region = image
            .region_mut(address, bytes.len())
            .ok_or_else(|| Self::out_of_range(address, bytes.len()))?;
        region.fill((address - region.start) as usize, bytes);
        image.writes.push((address, bytes.to_vec()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn connected(driver: StaticDriver) -> StaticDriver {
        let mut driver = driver;
        driver.establish_connection().await.unwrap();
        driver
    }

    #[tokio::test]
    async fn test_read_regions() {
        let driver = connected(
            StaticDriver::new()
                .with_region(0xC000, vec![0x41, 0x42, 0x43, 0x44])
                .with_region(0xFF80, vec![0x01, 0x02]),
        )
        .await;

        let blocks = driver
            .read_bytes(&[ReadRange::new(0xC001, 2), ReadRange::new(0xFF80, 2)])
            .await
            .unwrap();
        assert_eq!(blocks[0].data, vec![0x42, 0x43]);
        assert_eq!(blocks[1].data, vec![0x01, 0x02]);
    }

    #[tokio::test]
    async fn test_read_out_of_range() {
        let driver = connected(StaticDriver::new().with_region(0x1000, vec![0; 4])).await;
        assert!(driver.read_bytes(&[ReadRange::new(0x1002, 10)]).await.is_err());
        assert!(driver.read_bytes(&[ReadRange::new(0x500, 4)]).await.is_err());
    }

    #[tokio::test]
    async fn test_writes_are_recorded_and_applied() {
        let mut driver = connected(StaticDriver::new().with_region(0x1000, vec![0; 4])).await;
        let image = driver.image();

        driver.write_bytes(0x1001, &[0xAA, 0xBB]).await.unwrap();
        assert_eq!(image.writes(), vec![(0x1001, vec![0xAA, 0xBB])]);
        assert_eq!(image.peek(0x1000, 4), Some(vec![0, 0xAA, 0xBB, 0]));
    }

    #[tokio::test]
    async fn test_poke_is_visible_to_reads() {
        let driver = connected(StaticDriver::new().with_region(0x1000, vec![0; 4])).await;
        assert!(driver.image().poke(0x1003, &[0x7F]));
        assert!(!driver.image().poke(0x1003, &[0x7F, 0x7F]));

        let blocks = driver.read_bytes(&[ReadRange::new(0x1000, 4)]).await.unwrap();
        assert_eq!(blocks[0].data, vec![0, 0, 0, 0x7F]);
    }

    #[tokio::test]
    async fn test_requires_connection() {
        let mut driver = StaticDriver::new().with_region(0, vec![0; 4]);
        assert!(matches!(
            driver.read_bytes(&[ReadRange::new(0, 1)]).await,
            Err(DriverError::NotConnected(_))
        ));
        assert!(matches!(
            driver.write_bytes(0, &[1]).await,
            Err(DriverError::NotConnected(_))
        ));
    }
}
