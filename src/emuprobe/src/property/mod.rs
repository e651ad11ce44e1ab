//! Property engine
//!
//! A `Property` is one live, named, typed view over a byte range of emulator
//! memory. Every tick it resolves its address, pulls its bytes from the
//! `MemoryStore`, decodes them and records which of its fields changed.
//!
//! ## Module Structure
//!
//! - `definition` - the immutable description produced by the mapper loader
//! - `address` - address expressions over runtime variables
//! - `bits` - bit selection (`bits="2-5"`)
//! - `codec` - per-type byte <-> value conversion

mod address;
mod bits;
mod codec;
mod definition;

pub use address::AddressExpr;
pub use bits::BitSelection;
pub use codec::{decode, encode, CodecParams};
pub use definition::{PropertyDefinition, PropertyType};

use crate::glossary::{Glossary, GlossaryTable};
use crate::hook::{is_veto, HookError, HookInvoker};
use crate::memory::{MemoryError, MemoryStore};
use crate::platform::Endian;

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PropertyError {
    #[error("Invalid bit specification '{spec}': {reason}")]
    InvalidBitSpecification { spec: String, reason: String },

    #[error("Glossary '{glossary}' has no entry with key {key}")]
    GlossaryKeyNotFound { glossary: String, key: u64 },

    #[error("Glossary '{glossary}' has no entry with value {value}")]
    GlossaryValueNotFound { glossary: String, value: Value },

    #[error("Glossary not found: {0}")]
    GlossaryNotFound(String),

    #[error("{operation} is not supported for {kind:?} properties")]
    NotSupported {
        kind: PropertyType,
        operation: &'static str,
    },

    #[error("{length} bytes is too wide for a {kind:?} property")]
    UnsupportedLength { kind: PropertyType, length: usize },

    #[error("Invalid address expression '{expression}' on {path}: {reason}")]
    InvalidAddressExpression {
        path: String,
        expression: String,
        reason: String,
    },

    #[error("Property {0} has no address and is read-only")]
    ReadOnly(String),

    #[error("Address of {0} can't be resolved right now")]
    AddressUnresolved(String),

    #[error("Value {value} can't be written to a {kind:?} property")]
    InvalidValue { kind: PropertyType, value: Value },

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error(transparent)]
    Hook(#[from] HookError),
}

/// Fields whose change is reported to subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyField {
    Address,
    Bytes,
    Value,
    Frozen,
}

/// Bytes a property wants sent to the driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingWrite {
    pub address: u32,
    pub bytes: Vec<u8>,
}

/// Read-only inputs to one tick, plus the hook collaborator
pub struct TickContext<'a> {
    pub memory: &'a MemoryStore,
    pub glossary: &'a Glossary,
    pub hooks: &'a mut dyn HookInvoker,
    /// Re-resolve addresses that depend on runtime variables
    pub force_reload_address: bool,
}

/// Serializable view of a property, sent to subscribers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyChange {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: PropertyType,
    pub address: Option<u32>,
    pub length: usize,
    pub value: Value,
    #[serde(serialize_with = "serialize_hex")]
    pub bytes: Option<Vec<u8>>,
    pub frozen: bool,
    pub read_only: bool,
    pub fields: Vec<PropertyField>,
}

fn serialize_hex<S: serde::Serializer>(bytes: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
    match bytes {
        Some(b) => s.serialize_some(&hex::encode(b)),
        None => s.serialize_none(),
    }
}

#[derive(Debug, Clone)]
pub struct Property {
    definition: Arc<PropertyDefinition>,
    address_expr: Option<AddressExpr>,
    /// `None` until the first tick that needs it; parse errors surface there
    bit_selection: Option<BitSelection>,
    endian: Endian,
    address: Option<u32>,
    address_evaluated: bool,
    bytes: Option<Vec<u8>>,
    frozen_bytes: Option<Vec<u8>>,
    value: Value,
    dirty: BTreeSet<PropertyField>,
}

impl Property {
    /// Build a live property. Malformed address expressions are rejected here.
    pub fn new(definition: impl Into<Arc<PropertyDefinition>>, platform_endian: Endian) -> Result<Self, PropertyError> {
        let definition = definition.into();
        let address_expr = definition
            .address_expr
            .as_deref()
            .map(|expr| {
                AddressExpr::parse(expr).map_err(|reason| PropertyError::InvalidAddressExpression {
                    path: definition.path.clone(),
                    expression: expr.to_string(),
                    reason,
                })
            })
            .transpose()?;

        Ok(Self {
            endian: definition.endian_or(platform_endian),
            definition,
            address_expr,
            bit_selection: None,
            address: None,
            address_evaluated: false,
            bytes: None,
            frozen_bytes: None,
            value: Value::Null,
            dirty: BTreeSet::new(),
        })
    }

    pub fn definition(&self) -> &PropertyDefinition {
        &self.definition
    }

    pub fn path(&self) -> &str {
        &self.definition.path
    }

    pub fn address(&self) -> Option<u32> {
        self.address
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        self.bytes.as_deref()
    }

    pub fn frozen_bytes(&self) -> Option<&[u8]> {
        self.frozen_bytes.as_deref()
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen_bytes.is_some()
    }

    pub fn is_read_only(&self) -> bool {
        self.definition.is_read_only()
    }

    pub fn dirty_fields(&self) -> &BTreeSet<PropertyField> {
        &self.dirty
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    pub fn clear_dirty(&mut self) {
        self.dirty.clear();
    }

    /// Set the value directly. This is how hooks drive read-only properties.
    pub fn set_value(&mut self, value: Value) {
        if self.value != value {
            self.value = value;
            self.dirty.insert(PropertyField::Value);
        }
    }

    pub fn snapshot(&self) -> PropertyChange {
        PropertyChange {
            path: self.definition.path.clone(),
            kind: self.definition.kind,
            address: self.address,
            length: self.definition.length,
            value: self.value.clone(),
            bytes: self.bytes.clone(),
            frozen: self.is_frozen(),
            read_only: self.is_read_only(),
            fields: self.dirty.iter().copied().collect(),
        }
    }

    fn set_address(&mut self, address: Option<u32>) {
        if self.address != address {
            self.address = address;
            self.dirty.insert(PropertyField::Address);
        }
    }

    fn set_bytes(&mut self, bytes: Vec<u8>) {
        if self.bytes.as_deref() != Some(bytes.as_slice()) {
            self.bytes = Some(bytes);
            self.dirty.insert(PropertyField::Bytes);
        }
    }

    fn bits(&mut self) -> Result<Option<&BitSelection>, PropertyError> {
        if self.bit_selection.is_none() {
            if let Some(spec) = self.definition.bits.as_deref() {
                self.bit_selection = Some(BitSelection::parse(spec)?);
            }
        }
        Ok(self.bit_selection.as_ref())
    }

    /// Bit-selected values are packed low-bit-first, so they always decode little-endian
    fn codec_endian(&self) -> Endian {
        if self.definition.bits.is_some() {
            Endian::Little
        } else {
            self.endian
        }
    }

    fn table<'g>(&self, glossary: &'g Glossary) -> Result<Option<&'g GlossaryTable>, PropertyError> {
        match self.definition.glossary_name() {
            Some(name) => glossary
                .get(name)
                .map(Some)
                .ok_or_else(|| PropertyError::GlossaryNotFound(name.to_string())),
            None => Ok(None),
        }
    }

    fn resolve_address(&mut self, ctx: &TickContext<'_>) {
        let Some(expr) = &self.address_expr else {
            return;
        };
        let due = !self.address_evaluated || (ctx.force_reload_address && expr.has_variables());
        if !due {
            return;
        }
        let address = expr.evaluate(ctx.hooks.variables());
        self.address_evaluated = true;
        self.set_address(address);
    }

    /// Recompute this property from memory.
    ///
    /// Returns a write-back when the property is frozen and memory drifted
    /// away from the frozen bytes.
    pub fn process_tick(&mut self, ctx: &mut TickContext<'_>) -> Result<Option<PendingWrite>, PropertyError> {
        let definition = Arc::clone(&self.definition);

        if let Some(hook) = definition.read_hook.as_deref() {
            let result = ctx.hooks.call_hook(hook, Some(&mut *self))?;
            if is_veto(&result) {
                return Ok(None);
            }
        }

        if let Some(value) = &definition.static_value {
            self.set_value(value.clone());
            return Ok(None);
        }

        self.resolve_address(ctx);
        let Some(address) = self.address else {
            return Ok(None);
        };

        let memory = ctx.memory;
        let fetched = memory.get_bytes(definition.namespace(), address, definition.length)?;

        // Identical bytes can't decode to a different value
        if self.bytes.as_deref() == Some(fetched) {
            return Ok(None);
        }

        if let Some(frozen) = &self.frozen_bytes {
            if frozen.as_slice() != fetched {
                return Ok(Some(PendingWrite {
                    address,
                    bytes: frozen.clone(),
                }));
            }
        }

        let fetched = fetched.to_vec();
        let selected = match self.bits()? {
            Some(selection) => selection.extract(&fetched)?,
            None => fetched.clone(),
        };

        let params = CodecParams {
            endian: self.codec_endian(),
            char_size: definition.char_size(),
            table: match definition.kind {
                PropertyType::String => self.table(ctx.glossary)?,
                _ => None,
            },
        };
        let mut value = decode(definition.kind, &selected, &params)?;

        if let Some(expr) = definition.after_read_expr.as_deref() {
            value = ctx.hooks.evaluate_expression(expr, &value)?;
        }

        let previous = std::mem::replace(&mut self.value, value);
        self.set_bytes(fetched);

        if let Some(hook) = definition.after_read_hook.as_deref() {
            let result = ctx.hooks.call_hook(hook, Some(&mut *self))?;
            if !result.is_null() {
                self.value = result;
            }
        }

        if definition.kind.is_reference_eligible() {
            if let Some(table) = self.table(ctx.glossary)? {
                self.value = reference_lookup(table, &self.value);
            }
        }

        if self.value != previous {
            self.dirty.insert(PropertyField::Value);
        }

        Ok(None)
    }

    /// Encode `value` into the bytes this property should hold.
    ///
    /// Only the selected bits are overlaid onto the current bytes, so bits
    /// shared with other properties survive the write.
    pub fn encode_value(&mut self, value: &Value, glossary: &Glossary) -> Result<Vec<u8>, PropertyError> {
        let definition = Arc::clone(&self.definition);
        let table = self.table(glossary)?;

        let raw_value = match table {
            Some(table) if definition.kind.is_reference_eligible() => {
                reverse_lookup(table, value)?
            }
            _ => value.clone(),
        };

        let params = CodecParams {
            endian: self.codec_endian(),
            char_size: definition.char_size(),
            table,
        };
        let mut encoded = encode(definition.kind, &raw_value, definition.length, &params)?;

        let current = self
            .bytes
            .clone()
            .unwrap_or_else(|| vec![0u8; definition.length]);

        if let Some(selection) = self.bits()? {
            return selection.overlay(&current, &encoded);
        }

        // Short encodings (strings) keep the tail of what's already there
        if encoded.len() < current.len() {
            encoded.extend_from_slice(&current[encoded.len()..]);
        }
        Ok(encoded)
    }

    /// Write a new value.
    ///
    /// Returns the bytes to send to the driver, or `None` when a hook vetoed
    /// the write or the value was frozen instead of written.
    pub fn write_value(
        &mut self,
        value: &Value,
        freeze: bool,
        glossary: &Glossary,
        hooks: &mut dyn HookInvoker,
    ) -> Result<Option<PendingWrite>, PropertyError> {
        let definition = Arc::clone(&self.definition);
        if definition.is_read_only() {
            return Err(PropertyError::ReadOnly(definition.path.clone()));
        }
        let address = self
            .address
            .ok_or_else(|| PropertyError::AddressUnresolved(definition.path.clone()))?;

        if let Some(hook) = definition.write_hook.as_deref() {
            if is_veto(&hooks.call_hook(hook, Some(&mut *self))?) {
                return Ok(None);
            }
        }

        let bytes = self.encode_value(value, glossary)?;

        if let Some(hook) = definition.before_write_hook.as_deref() {
            if is_veto(&hooks.call_hook(hook, Some(&mut *self))?) {
                return Ok(None);
            }
        }

        if freeze {
            self.freeze_bytes(bytes, value.clone());
            return Ok(None);
        }

        // A plain write lets memory move freely again
        self.unfreeze();
        Ok(Some(PendingWrite { address, bytes }))
    }

    fn freeze_bytes(&mut self, bytes: Vec<u8>, value: Value) {
        self.frozen_bytes = Some(bytes.clone());
        self.dirty.insert(PropertyField::Frozen);
        self.set_bytes(bytes);
        self.set_value(value);
    }

    /// Freeze at whatever the property currently holds
    pub fn freeze(&mut self) -> Result<(), PropertyError> {
        if self.is_read_only() {
            return Err(PropertyError::ReadOnly(self.definition.path.clone()));
        }
        let bytes = self
            .bytes
            .clone()
            .ok_or_else(|| PropertyError::AddressUnresolved(self.definition.path.clone()))?;
        let value = self.value.clone();
        self.freeze_bytes(bytes, value);
        Ok(())
    }

    pub fn unfreeze(&mut self) {
        if self.frozen_bytes.take().is_some() {
            self.dirty.insert(PropertyField::Frozen);
        }
    }
}

fn reference_lookup(table: &GlossaryTable, value: &Value) -> Value {
    let key = match value {
        Value::Bool(b) => Some(*b as u64),
        Value::Number(n) => n.as_u64(),
        _ => None,
    };
    key.and_then(|k| table.get_by_key(k))
        .map(|e| e.value.clone())
        .unwrap_or(Value::Null)
}

/// Glossary value -> numeric key. Raw numbers are accepted if they are keys.
fn reverse_lookup(table: &GlossaryTable, value: &Value) -> Result<Value, PropertyError> {
    if let Some(entry) = table.get_by_value(value) {
        return Ok(Value::from(entry.key));
    }
    let key = match value {
        Value::Number(n) => n.as_u64(),
        Value::Bool(b) => Some(*b as u64),
        _ => None,
    };
    match key {
        Some(key) if table.get_by_key(key).is_some() => Ok(Value::from(key)),
        Some(key) => Err(PropertyError::GlossaryKeyNotFound {
            glossary: table.name.clone(),
            key,
        }),
        None => Err(PropertyError::GlossaryValueNotFound {
            glossary: table.name.clone(),
            value: value.clone(),
        }),
    }
}
