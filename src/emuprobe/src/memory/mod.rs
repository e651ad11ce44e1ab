//! Memory model
//!
//! Emulator memory held as named, possibly overlapping address spaces:
//! - `ByteSpace` - a contiguous fragment of known bytes
//! - `MemoryNamespace` - non-overlapping fragments under one name
//! - `MemoryStore` - every namespace of one session, always including `"default"`

mod namespace;
mod space;
mod store;

pub use namespace::MemoryNamespace;
pub use space::ByteSpace;
pub use store::MemoryStore;

use thiserror::Error;

/// Namespace that read ranges land in when they don't name one
pub const DEFAULT_NAMESPACE: &str = "default";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    #[error("Address {address:#x} is not mapped in namespace '{namespace}'")]
    AddressNotMapped { namespace: String, address: u32 },

    #[error("Read of {length} bytes at {address:#x} runs past its fragment in namespace '{namespace}'")]
    OutOfBounds {
        namespace: String,
        address: u32,
        length: usize,
    },
}
