//! Byte Space
//!
//! A contiguous fragment of known emulator memory.

/// A fragment of memory starting at `start` and covering `data.len()` bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteSpace {
    pub start: u32,
    pub data: Vec<u8>,
}

impl ByteSpace {
    pub fn new(start: u32, data: Vec<u8>) -> Self {
        Self { start, data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// One past the last address, widened so fragments ending at `u32::MAX` don't wrap
    pub fn end(&self) -> u64 {
        self.start as u64 + self.data.len() as u64
    }

    pub fn contains(&self, address: u32) -> bool {
        address >= self.start && (address as u64) < self.end()
    }

    /// Whether `[address, address + length)` lies entirely inside this fragment
    pub fn contains_range(&self, address: u32, length: usize) -> bool {
        self.contains(address) && address as u64 + length as u64 <= self.end()
    }

    /// Whether `[address, address + length)` shares at least one byte with this fragment
    pub fn overlaps(&self, address: u32, length: usize) -> bool {
        let end = address as u64 + length as u64;
        (address as u64) < self.end() && end > self.start as u64
    }

    /// Slice `length` bytes starting at `address`, if the whole range is inside
    pub fn slice(&self, address: u32, length: usize) -> Option<&[u8]> {
        if !self.contains_range(address, length) {
            return None;
        }
        let offset = (address - self.start) as usize;
        Some(&self.data[offset..offset + length])
    }

    /// Overwrite bytes at `offset` in place. Returns false if the write would
    /// run past the end; the fragment never grows here.
    pub fn fill(&mut self, offset: usize, bytes: &[u8]) -> bool {
        let Some(end) = offset.checked_add(bytes.len()) else {
            return false;
        };
        if end > self.data.len() {
            return false;
        }
        self.data[offset..end].copy_from_slice(bytes);
        true
    }
}
