//! Memory Namespace
//!
//! An ordered set of non-overlapping fragments.

use super::ByteSpace;

#[derive(Debug, Clone, Default)]
pub struct MemoryNamespace {
    spaces: Vec<ByteSpace>,
}

impl MemoryNamespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spaces(&self) -> &[ByteSpace] {
        &self.spaces
    }

    /// Find the fragment containing `address`
    pub fn find(&self, address: u32) -> Option<&ByteSpace> {
        self.spaces.iter().find(|s| s.contains(address))
    }

    /// Write `bytes` at `address`.
    ///
    /// A fill that fits inside an existing fragment overwrites it in place.
    /// A fill that touches no fragment is appended as a new one. A fill that
    /// straddles existing fragments absorbs them into a single fragment so the
    /// namespace never holds two fragments sharing an address. Adjacent
    /// fragments that don't overlap are left alone.
    pub fn fill(&mut self, address: u32, bytes: &[u8]) {
        let room = u32::MAX as u64 + 1 - address as u64;
        let bytes = &bytes[..(bytes.len() as u64).min(room) as usize];
        if bytes.is_empty() {
            return;
        }

        if let Some(space) = self
            .spaces
            .iter_mut()
            .find(|s| s.contains_range(address, bytes.len()))
        {
            let offset = (address - space.start) as usize;
            space.fill(offset, bytes);
            return;
        }

        let (overlapping, rest): (Vec<ByteSpace>, Vec<ByteSpace>) = std::mem::take(&mut self.spaces)
            .into_iter()
            .partition(|s| s.overlaps(address, bytes.len()));
        self.spaces = rest;

        if overlapping.is_empty() {
            self.spaces.push(ByteSpace::new(address, bytes.to_vec()));
            return;
        }

        let mut start = address as u64;
        let mut end = address as u64 + bytes.len() as u64;
        for space in &overlapping {
            start = start.min(space.start as u64);
            end = end.max(space.end());
        }

        let mut data = vec![0u8; (end - start) as usize];
        for space in &overlapping {
            let offset = (space.start as u64 - start) as usize;
            data[offset..offset + space.len()].copy_from_slice(&space.data);
        }
        let offset = (address as u64 - start) as usize;
        data[offset..offset + bytes.len()].copy_from_slice(bytes);

        self.spaces.push(ByteSpace::new(start as u32, data));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_self_overlap(ns: &MemoryNamespace) -> bool {
        let spaces = ns.spaces();
        spaces.iter().enumerate().all(|(i, a)| {
            spaces
                .iter()
                .skip(i + 1)
                .all(|b| !a.overlaps(b.start, b.len()))
        })
    }

    #[test]
    fn test_fill_appends_new_fragment() {
        let mut ns = MemoryNamespace::new();
        ns.fill(0x1000, &[1, 2, 3]);
        ns.fill(0x2000, &[4, 5]);
        assert_eq!(ns.spaces().len(), 2);
        assert_eq!(ns.find(0x2001).map(|s| s.start), Some(0x2000));
    }

    #[test]
    fn test_fill_overwrites_in_place() {
        let mut ns = MemoryNamespace::new();
        ns.fill(0x1000, &[0; 8]);
        ns.fill(0x1002, &[0xAA, 0xBB]);
        assert_eq!(ns.spaces().len(), 1);
        assert_eq!(ns.spaces()[0].data, vec![0, 0, 0xAA, 0xBB, 0, 0, 0, 0]);
    }

    #[test]
    fn test_adjacent_fragments_stay_separate() {
        let mut ns = MemoryNamespace::new();
        ns.fill(0x1000, &[1, 1]);
        ns.fill(0x1002, &[2, 2]);
        assert_eq!(ns.spaces().len(), 2);
    }

    #[test]
    fn test_straddling_fill_absorbs_overlapped_fragments() {
        let mut ns = MemoryNamespace::new();
        ns.fill(0x10, &[1, 1, 1, 1]);
        ns.fill(0x18, &[2, 2, 2, 2]);
        ns.fill(0x12, &[9; 8]);

        assert!(no_self_overlap(&ns));
        assert_eq!(ns.spaces().len(), 1);
        let space = &ns.spaces()[0];
        assert_eq!(space.start, 0x10);
        assert_eq!(space.data, vec![1, 1, 9, 9, 9, 9, 9, 9, 9, 9, 2, 2]);
    }

    #[test]
    fn test_fill_clamps_at_top_of_address_space() {
        let mut ns = MemoryNamespace::new();
        ns.fill(u32::MAX - 1, &[1, 2, 3, 4]);
        assert_eq!(ns.spaces()[0].data, vec![1, 2]);
    }
}
