//! Property definitions as produced by the mapper loader.

use crate::glossary::DEFAULT_CHARACTER_MAP;
use crate::memory::DEFAULT_NAMESPACE;
use crate::platform::Endian;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyType {
    #[serde(rename = "bcd", alias = "BCD")]
    Bcd,
    #[serde(rename = "bitArray", alias = "bitarray", alias = "BitArray")]
    BitArray,
    #[serde(rename = "bit", alias = "Bit")]
    Bit,
    #[serde(rename = "bool", alias = "Bool")]
    Bool,
    #[serde(rename = "int", alias = "Int")]
    Int,
    #[serde(rename = "uint", alias = "UInt")]
    UInt,
    #[serde(rename = "string", alias = "String")]
    String,
}

impl PropertyType {
    /// Types whose decoded number can be swapped for a glossary value
    pub fn is_reference_eligible(self) -> bool {
        matches!(
            self,
            PropertyType::Bool | PropertyType::Bit | PropertyType::Int | PropertyType::UInt
        )
    }
}

fn default_length() -> usize {
    1
}

/// Immutable description of one property.
///
/// One definition yields exactly one live `Property` for as long as its
/// mapper stays loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDefinition {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: PropertyType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, alias = "address", skip_serializing_if = "Option::is_none")]
    pub address_expr: Option<String>,
    #[serde(default = "default_length")]
    pub length: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bits: Option<String>,
    #[serde(default, alias = "reference", skip_serializing_if = "Option::is_none")]
    pub reference_name: Option<String>,
    #[serde(default, alias = "value", skip_serializing_if = "Option::is_none")]
    pub static_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endian: Option<Endian>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_hook: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_hook: Option<String>,
    #[serde(default, alias = "afterReadExpression", skip_serializing_if = "Option::is_none")]
    pub after_read_expr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_read_hook: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_write_hook: Option<String>,
}

impl PropertyDefinition {
    /// A bare definition with no address, hooks or reference
    pub fn new(path: impl Into<String>, kind: PropertyType, length: usize) -> Self {
        Self {
            path: path.into(),
            kind,
            namespace: None,
            address_expr: None,
            length,
            size: None,
            bits: None,
            reference_name: None,
            static_value: None,
            endian: None,
            description: None,
            read_hook: None,
            write_hook: None,
            after_read_expr: None,
            after_read_hook: None,
            before_write_hook: None,
        }
    }

    pub fn at(mut self, address: impl Into<String>) -> Self {
        self.address_expr = Some(address.into());
        self
    }

    pub fn with_reference(mut self, name: impl Into<String>) -> Self {
        self.reference_name = Some(name.into());
        self
    }

    pub fn with_bits(mut self, bits: impl Into<String>) -> Self {
        self.bits = Some(bits.into());
        self
    }

    pub fn namespace(&self) -> &str {
        self.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE)
    }

    /// Without an address only hooks or a static value can set the value
    pub fn is_read_only(&self) -> bool {
        self.address_expr.is_none()
    }

    /// Glossary this property looks values up in, if any
    pub fn glossary_name(&self) -> Option<&str> {
        match self.kind {
            PropertyType::String => Some(
                self.reference_name
                    .as_deref()
                    .unwrap_or(DEFAULT_CHARACTER_MAP),
            ),
            kind if kind.is_reference_eligible() => self.reference_name.as_deref(),
            _ => None,
        }
    }

    /// Bytes per character for `String` properties
    pub fn char_size(&self) -> usize {
        self.size.unwrap_or(1).max(1)
    }

    pub fn endian_or(&self, platform: Endian) -> Endian {
        self.endian.unwrap_or(platform)
    }
}
