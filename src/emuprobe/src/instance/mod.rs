//! Instance (orchestrator)
//!
//! An `Instance` owns everything belonging to one loaded mapper: the driver,
//! the memory store and one live property per definition. Each tick it
//! pulls the polled blocks from the driver, runs every property against
//! the refreshed memory and broadcasts the properties that changed.
//!
//! Any error inside a tick resets the whole session; a mapper has to be
//! loaded again to resume. Writes report their errors to the caller and
//! leave the session running.

mod handle;

pub use handle::InstanceHandle;

use crate::driver::{Driver, DriverError};
use crate::glossary::Glossary;
use crate::hook::{is_veto, HookError, HookInvoker, POSTPROCESSOR, PREPROCESSOR};
use crate::mapper::{Mapper, MapperError, MetadataSection};
use crate::memory::{MemoryError, MemoryStore};
use crate::platform::ReadRange;
use crate::property::{PendingWrite, Property, PropertyChange, PropertyError, TickContext};

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

const EVENT_CAPACITY: usize = 256;

#[derive(Error, Debug)]
pub enum InstanceError {
    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error(transparent)]
    Property(#[from] PropertyError),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Mapper(#[from] MapperError),

    #[error(transparent)]
    Hook(#[from] HookError),

    #[error("Unknown property: {0}")]
    UnknownProperty(String),

    #[error("No mapper is loaded")]
    Stopped,
}

/// Notifications sent to subscribers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum InstanceEvent {
    MapperLoaded(MetadataSection),
    /// Every property that changed during one tick, as one batch
    PropertiesChanged(Vec<PropertyChange>),
    /// The session failed and was torn down
    InstanceReset,
}

struct Session {
    metadata: MetadataSection,
    driver: Box<dyn Driver>,
    memory: MemoryStore,
    glossary: Glossary,
    ranges: Vec<ReadRange>,
    properties: IndexMap<String, Property>,
    /// Variables generation seen by the previous tick; `None` forces a reload
    last_generation: Option<u64>,
}

impl Session {
    fn property_mut(&mut self, path: &str) -> Result<&mut Property, InstanceError> {
        self.properties
            .get_mut(path)
            .ok_or_else(|| InstanceError::UnknownProperty(path.to_string()))
    }
}

pub struct Instance {
    session: Option<Session>,
    hooks: Box<dyn HookInvoker>,
    events: broadcast::Sender<InstanceEvent>,
}

impl Instance {
    /// Connect the driver and build the live properties for `mapper`
    pub async fn load(
        mapper: Mapper,
        driver: Box<dyn Driver>,
        hooks: Box<dyn HookInvoker>,
    ) -> Result<Self, InstanceError> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self::load_with_events(mapper, driver, hooks, events).await
    }

    /// Like `load`, announcing on an existing channel so early subscribers
    /// see `MapperLoaded`
    pub async fn load_with_events(
        mapper: Mapper,
        mut driver: Box<dyn Driver>,
        hooks: Box<dyn HookInvoker>,
        events: broadcast::Sender<InstanceEvent>,
    ) -> Result<Self, InstanceError> {
        mapper.validate()?;
        let endian = mapper.metadata.platform.endian();

        let mut properties = IndexMap::with_capacity(mapper.properties.len());
        for definition in &mapper.properties {
            let property = Property::new(definition.clone(), endian)?;
            properties.insert(definition.path.clone(), property);
        }

        driver.establish_connection().await?;

        info!(
            game = %mapper.metadata.game_name,
            platform = %mapper.metadata.platform,
            driver = driver.name(),
            properties = properties.len(),
            "mapper loaded"
        );
        for (kind, count) in mapper.type_counts() {
            debug!(?kind, count, "property types");
        }

        let session = Session {
            metadata: mapper.metadata.clone(),
            glossary: mapper.glossary(),
            ranges: mapper.read_ranges(),
            driver,
            memory: MemoryStore::new(),
            properties,
            last_generation: None,
        };
        let _ = events.send(InstanceEvent::MapperLoaded(mapper.metadata));

        Ok(Self {
            session: Some(session),
            hooks,
            events,
        })
    }

    pub fn is_loaded(&self) -> bool {
        self.session.is_some()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<InstanceEvent> {
        self.events.subscribe()
    }

    pub(crate) fn events(&self) -> broadcast::Sender<InstanceEvent> {
        self.events.clone()
    }

    pub fn metadata(&self) -> Option<&MetadataSection> {
        self.session.as_ref().map(|s| &s.metadata)
    }

    pub fn property(&self, path: &str) -> Option<&Property> {
        self.session.as_ref()?.properties.get(path)
    }

    pub fn memory(&self) -> Option<&MemoryStore> {
        self.session.as_ref().map(|s| &s.memory)
    }

    pub fn delay_between_reads(&self) -> Option<Duration> {
        self.session.as_ref().map(|s| s.driver.delay_between_reads())
    }

    /// Current state of every property, in mapper order
    pub fn snapshot(&self) -> Vec<PropertyChange> {
        self.session
            .as_ref()
            .map(|s| s.properties.values().map(Property::snapshot).collect())
            .unwrap_or_default()
    }

    /// Resolve dynamic addresses again on the next tick
    pub fn reload_addresses(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.last_generation = None;
        }
    }

    /// Run one tick and return the properties that changed.
    ///
    /// On error the session is reset and `InstanceReset` is broadcast
    /// before the error is returned.
    pub async fn tick(&mut self) -> Result<Vec<PropertyChange>, InstanceError> {
        match self.run_tick().await {
            Ok(batch) => Ok(batch),
            Err(InstanceError::Stopped) => Err(InstanceError::Stopped),
            Err(e) => {
                error!(error = %e, "tick failed, resetting instance");
                self.reset().await;
                Err(e)
            }
        }
    }

    async fn run_tick(&mut self) -> Result<Vec<PropertyChange>, InstanceError> {
        let session = self.session.as_mut().ok_or(InstanceError::Stopped)?;

        for property in session.properties.values_mut() {
            property.clear_dirty();
        }

        let blocks = session.driver.read_bytes(&session.ranges).await?;
        for block in &blocks {
            session.memory.fill(&block.namespace, block.start, &block.data);
        }

        if is_veto(&self.hooks.call_hook(PREPROCESSOR, None)?) {
            debug!("preprocessor skipped tick");
            return Ok(Vec::new());
        }

        let generation = self.hooks.variables().generation();
        let force_reload_address = session.last_generation != Some(generation);
        session.last_generation = Some(generation);

        let writes = process_properties(session, self.hooks.as_mut(), force_reload_address)?;
        for write in &writes {
            session.driver.write_bytes(write.address, &write.bytes).await?;
        }

        if is_veto(&self.hooks.call_hook(POSTPROCESSOR, None)?) {
            debug!("postprocessor suppressed notification");
            return Ok(Vec::new());
        }

        let batch: Vec<PropertyChange> = session
            .properties
            .values()
            .filter(|p| p.is_dirty())
            .map(Property::snapshot)
            .collect();

        debug!(
            blocks = blocks.len(),
            changed = batch.len(),
            write_backs = writes.len(),
            "tick"
        );
        if !batch.is_empty() {
            let _ = self.events.send(InstanceEvent::PropertiesChanged(batch.clone()));
        }
        Ok(batch)
    }

    async fn reset(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.driver.disconnect().await {
                warn!(error = %e, "disconnect during reset failed");
            }
        }
        let _ = self.events.send(InstanceEvent::InstanceReset);
    }

    /// Write a value through a property. With `freeze` the value is held
    /// every tick instead of being written once.
    pub async fn write_value(&mut self, path: &str, value: &Value, freeze: bool) -> Result<(), InstanceError> {
        let session = self.session.as_mut().ok_or(InstanceError::Stopped)?;
        let property = session
            .properties
            .get_mut(path)
            .ok_or_else(|| InstanceError::UnknownProperty(path.to_string()))?;

        let pending = property.write_value(value, freeze, &session.glossary, self.hooks.as_mut())?;
        if let Some(PendingWrite { address, bytes }) = pending {
            debug!(path, address = %format!("{:#x}", address), bytes = %hex::encode(&bytes), "write");
            session.driver.write_bytes(address, &bytes).await?;
        }
        if freeze {
            info!(path, %value, "frozen");
        }

        publish(&self.events, property);
        Ok(())
    }

    pub fn unfreeze(&mut self, path: &str) -> Result<(), InstanceError> {
        let session = self.session.as_mut().ok_or(InstanceError::Stopped)?;
        let property = session.property_mut(path)?;
        property.unfreeze();
        publish(&self.events, property);
        Ok(())
    }

    /// Raw write, bypassing every property
    pub async fn write_bytes(&mut self, address: u32, bytes: &[u8]) -> Result<(), InstanceError> {
        let session = self.session.as_mut().ok_or(InstanceError::Stopped)?;
        session.driver.write_bytes(address, bytes).await?;
        Ok(())
    }

    /// Tear the session down and disconnect the driver
    pub async fn unload(&mut self) -> Result<(), InstanceError> {
        if let Some(mut session) = self.session.take() {
            session.driver.disconnect().await?;
            info!(game = %session.metadata.game_name, "mapper unloaded");
        }
        Ok(())
    }
}

/// Broadcast changes made between ticks (writes, freezes) right away
fn publish(events: &broadcast::Sender<InstanceEvent>, property: &mut Property) {
    if property.is_dirty() {
        let _ = events.send(InstanceEvent::PropertiesChanged(vec![property.snapshot()]));
        property.clear_dirty();
    }
}

/// Run every property against the refreshed memory, collecting write-backs
fn process_properties(
    session: &mut Session,
    hooks: &mut dyn HookInvoker,
    force_reload_address: bool,
) -> Result<Vec<PendingWrite>, InstanceError> {
    let Session {
        memory,
        glossary,
        properties,
        ..
    } = session;

    let mut ctx = TickContext {
        memory,
        glossary,
        hooks,
        force_reload_address,
    };

    let mut writes = Vec::new();
    for property in properties.values_mut() {
        if let Some(write) = property.process_tick(&mut ctx)? {
            writes.push(write);
        }
    }
    Ok(writes)
}
