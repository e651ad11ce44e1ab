//! Glossary (reference) tables
//!
//! Bidirectional key <-> value lookups used to turn raw numeric codes into
//! readable values and back. A `null` value conventionally marks a string
//! terminator. Tables are read-only once a mapper is loaded.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Glossary used by `String` properties that don't name one
pub const DEFAULT_CHARACTER_MAP: &str = "defaultCharacterMap";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlossaryEntry {
    #[serde(deserialize_with = "crate::numbers::deserialize_u64")]
    pub key: u64,
    #[serde(default)]
    pub value: Value,
}

impl GlossaryEntry {
    pub fn new(key: u64, value: impl Into<Value>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }

    pub fn is_terminator(&self) -> bool {
        self.value.is_null()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlossaryTable {
    pub name: String,
    #[serde(default)]
    pub entries: Vec<GlossaryEntry>,
}

impl GlossaryTable {
    pub fn new(name: impl Into<String>, entries: Vec<GlossaryEntry>) -> Self {
        Self {
            name: name.into(),
            entries,
        }
    }

    /// First entry with this key
    pub fn get_by_key(&self, key: u64) -> Option<&GlossaryEntry> {
        self.entries.iter().find(|e| e.key == key)
    }

    /// First entry with this value
    pub fn get_by_value(&self, value: &Value) -> Option<&GlossaryEntry> {
        self.entries.iter().find(|e| &e.value == value)
    }

    /// The entry marking the end of a string
    pub fn terminator(&self) -> Option<&GlossaryEntry> {
        self.entries.iter().find(|e| e.is_terminator())
    }

    /// A key used by more than one entry, if any
    pub fn duplicate_key(&self) -> Option<u64> {
        let mut seen = HashSet::new();
        self.entries.iter().map(|e| e.key).find(|k| !seen.insert(*k))
    }
}

/// All glossary tables of one mapper, by name
#[derive(Debug, Clone, Default)]
pub struct Glossary {
    tables: HashMap<String, GlossaryTable>,
}

impl Glossary {
    pub fn new(tables: impl IntoIterator<Item = GlossaryTable>) -> Self {
        Self {
            tables: tables.into_iter().map(|t| (t.name.clone(), t)).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&GlossaryTable> {
        self.tables.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
