//! Memory Store
//!
//! Named namespaces of emulator memory, filled by the driver every tick.

use super::{MemoryError, MemoryNamespace, DEFAULT_NAMESPACE};
use crate::platform::Endian;

use byteorder::{ByteOrder, BE, LE};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct MemoryStore {
    namespaces: HashMap<String, MemoryNamespace>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let mut namespaces = HashMap::new();
        namespaces.insert(DEFAULT_NAMESPACE.to_string(), MemoryNamespace::new());
        Self { namespaces }
    }

    pub fn namespace(&self, name: &str) -> Option<&MemoryNamespace> {
        self.namespaces.get(name)
    }

    pub fn namespace_names(&self) -> impl Iterator<Item = &str> {
        self.namespaces.keys().map(String::as_str)
    }

    /// Absorb bytes from the driver, creating the namespace on first use
    pub fn fill(&mut self, namespace: &str, address: u32, bytes: &[u8]) {
        self.namespaces
            .entry(namespace.to_string())
            .or_default()
            .fill(address, bytes);
    }

    /// Borrow `length` bytes at `address`. The range must lie inside one fragment.
    pub fn get_bytes(
        &self,
        namespace: &str,
        address: u32,
        length: usize,
    ) -> Result<&[u8], MemoryError> {
        let space = self
            .namespaces
            .get(namespace)
            .and_then(|ns| ns.find(address))
            .ok_or_else(|| MemoryError::AddressNotMapped {
                namespace: namespace.to_string(),
                address,
            })?;

        space
            .slice(address, length)
            .ok_or_else(|| MemoryError::OutOfBounds {
                namespace: namespace.to_string(),
                address,
                length,
            })
    }

    pub fn get_byte(&self, namespace: &str, address: u32) -> Result<u8, MemoryError> {
        Ok(self.get_bytes(namespace, address, 1)?[0])
    }

    pub fn get_u16(&self, namespace: &str, address: u32, endian: Endian) -> Result<u16, MemoryError> {
        let bytes = self.get_bytes(namespace, address, 2)?;
        Ok(match endian {
            Endian::Little => LE::read_u16(bytes),
            Endian::Big => BE::read_u16(bytes),
        })
    }

    pub fn get_u32(&self, namespace: &str, address: u32, endian: Endian) -> Result<u32, MemoryError> {
        let bytes = self.get_bytes(namespace, address, 4)?;
        Ok(match endian {
            Endian::Little => LE::read_u32(bytes),
            Endian::Big => BE::read_u32(bytes),
        })
    }

    pub fn get_u64(&self, namespace: &str, address: u32, endian: Endian) -> Result<u64, MemoryError> {
        let bytes = self.get_bytes(namespace, address, 8)?;
        Ok(match endian {
            Endian::Little => LE::read_u64(bytes),
            Endian::Big => BE::read_u64(bytes),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_always_has_default_namespace() {
        let store = MemoryStore::new();
        assert!(store.namespace(DEFAULT_NAMESPACE).is_some());
    }

    #[test]
    fn test_fill_then_read() {
        let mut store = MemoryStore::new();
        store.fill("default", 0xD472, &[0x01]);
        assert_eq!(store.get_bytes("default", 0xD472, 1).unwrap(), &[0x01]);
        assert_eq!(store.get_byte("default", 0xD472).unwrap(), 0x01);
    }

    #[test]
    fn test_fill_creates_namespace_lazily() {
        let mut store = MemoryStore::new();
        assert!(store.namespace("party").is_none());
        store.fill("party", 0x100, &[7, 8]);
        assert_eq!(store.get_bytes("party", 0x101, 1).unwrap(), &[8]);
        assert!(store.get_bytes("default", 0x101, 1).is_err());
    }

    #[test]
    fn test_unmapped_address() {
        let store = MemoryStore::new();
        let err = store.get_bytes("default", 0x1234, 1).unwrap_err();
        assert!(matches!(err, MemoryError::AddressNotMapped { address: 0x1234, .. }));
    }

    #[test]
    fn test_read_past_fragment_is_out_of_bounds() {
        let mut store = MemoryStore::new();
        store.fill("default", 0x1000, &[0; 4]);
        store.fill("default", 0x1004, &[0; 4]);
        let err = store.get_bytes("default", 0x1002, 4).unwrap_err();
        assert!(matches!(err, MemoryError::OutOfBounds { length: 4, .. }));
        assert!(store.get_u32("default", 0x1002, Endian::Little).is_err());
    }

    #[test]
    fn test_integer_reads() {
        let mut store = MemoryStore::new();
        store.fill("default", 0, &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]);
        assert_eq!(store.get_u16("default", 0, Endian::Little).unwrap(), 0x0201);
        assert_eq!(store.get_u16("default", 0, Endian::Big).unwrap(), 0x0102);
        assert_eq!(store.get_u32("default", 4, Endian::Little).unwrap(), 0x08070605);
        assert_eq!(
            store.get_u64("default", 0, Endian::Big).unwrap(),
            0x0102030405060708
        );
    }

    #[test]
    fn test_later_fill_overwrites() {
        let mut store = MemoryStore::new();
        store.fill("default", 0x10, &[1, 2, 3]);
        store.fill("default", 0x10, &[4, 5, 6]);
        assert_eq!(store.get_bytes("default", 0x10, 3).unwrap(), &[4, 5, 6]);
    }
}
