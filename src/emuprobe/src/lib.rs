//! # emuprobe
//!
//! Live, typed views over the memory of a running emulator.
//!
//! This library provides functionality to:
//! - Hold emulator memory as named address spaces built from polled fragments
//! - Decode byte ranges into named properties (integers, strings, bit fields,
//!   BCD, glossary-mapped values) and encode values back
//! - Freeze properties so their bytes are written back every tick
//! - Run the read/process/notify tick loop against a UDP, shared-memory or
//!   static driver
//!
//! ## Example
//!
//! ```no_run
//! use emuprobe::{Instance, InstanceHandle, Mapper, NoopHooks, UdpDriver, UdpDriverConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mapper = Mapper::from_path("pokemon-red.json")?;
//! let driver = UdpDriver::new(UdpDriverConfig::default());
//! let instance = Instance::load(mapper, Box::new(driver), Box::new(NoopHooks::new())).await?;
//!
//! let handle = InstanceHandle::spawn(instance);
//! let mut events = handle.subscribe();
//! handle.write_value("player.money", 999999.into(), true).await?;
//!
//! while let Ok(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! # Ok(())
//! # }
//! ```

pub mod driver;
pub mod glossary;
pub mod hook;
pub mod instance;
pub mod mapper;
pub mod memory;
pub mod numbers;
pub mod platform;
pub mod property;

// Re-export commonly used items
#[doc(inline)]
pub use driver::{
    Driver, DriverError, MemoryBlock, SharedMemoryConfig, SharedMemoryDriver, StaticDriver,
    StaticImage, UdpDriver, UdpDriverConfig,
};
#[doc(inline)]
pub use glossary::{Glossary, GlossaryEntry, GlossaryTable};
#[doc(inline)]
pub use hook::{HookError, HookInvoker, NoopHooks, Variables};
#[doc(inline)]
pub use instance::{Instance, InstanceError, InstanceEvent, InstanceHandle};
#[doc(inline)]
pub use mapper::{Mapper, MapperError, MetadataSection};
#[doc(inline)]
pub use memory::{ByteSpace, MemoryError, MemoryNamespace, MemoryStore};
#[doc(inline)]
pub use platform::{Endian, Platform, ReadRange};
#[doc(inline)]
pub use property::{
    PendingWrite, Property, PropertyChange, PropertyDefinition, PropertyError, PropertyField,
    PropertyType,
};
