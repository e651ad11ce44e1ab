//! Mapper loading
//!
//! A mapper is the complete description of one game's memory layout. The
//! engine consumes mappers in their already-expanded form: a flat list of
//! property definitions plus glossary tables, as JSON or YAML.

use crate::glossary::{Glossary, GlossaryTable};
use crate::platform::{Platform, ReadRange};
use crate::property::{PropertyDefinition, PropertyType};

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MapperError {
    #[error("Failed to read mapper: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse JSON mapper: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to parse YAML mapper: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Property path defined more than once: {0}")]
    DuplicatePath(String),

    #[error("Glossary '{glossary}' defines key {key} more than once")]
    DuplicateGlossaryKey { glossary: String, key: u64 },

    #[error("Property {path} references unknown glossary '{glossary}'")]
    UnknownGlossary { path: String, glossary: String },

    #[error("Property {path} is a bool and must be 1 byte long, not {length}")]
    InvalidBoolLength { path: String, length: usize },

    #[error("Unknown mapper format: {0} (expected .json, .yaml or .yml)")]
    UnknownFormat(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataSection {
    pub id: String,
    pub game_name: String,
    pub platform: Platform,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mapper {
    pub metadata: MetadataSection,
    /// Blocks polled every tick; empty means the platform defaults
    #[serde(default)]
    pub memory: Vec<ReadRange>,
    #[serde(default)]
    pub properties: Vec<PropertyDefinition>,
    #[serde(default)]
    pub glossary: Vec<GlossaryTable>,
}

impl Mapper {
    /// Load a mapper, picking the format from the file extension
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, MapperError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        let text = std::fs::read_to_string(path)?;
        match extension.as_str() {
            "json" => Self::from_json_str(&text),
            "yaml" | "yml" => Self::from_yaml_str(&text),
            _ => Err(MapperError::UnknownFormat(path.display().to_string())),
        }
    }

    pub fn from_json_str(text: &str) -> Result<Self, MapperError> {
        let mapper: Self = serde_json::from_str(text)?;
        mapper.validate()?;
        Ok(mapper)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, MapperError> {
        let mapper: Self = serde_yaml::from_str(text)?;
        mapper.validate()?;
        Ok(mapper)
    }

    /// Reject mappers that break the loader contract.
    ///
    /// Bit specifications are deliberately left alone; they fail on first use.
    pub fn validate(&self) -> Result<(), MapperError> {
        let mut paths = HashSet::new();
        for property in &self.properties {
            if !paths.insert(property.path.as_str()) {
                return Err(MapperError::DuplicatePath(property.path.clone()));
            }
            if property.kind == PropertyType::Bool && property.length != 1 {
                return Err(MapperError::InvalidBoolLength {
                    path: property.path.clone(),
                    length: property.length,
                });
            }
        }

        for table in &self.glossary {
            if let Some(key) = table.duplicate_key() {
                return Err(MapperError::DuplicateGlossaryKey {
                    glossary: table.name.clone(),
                    key,
                });
            }
        }

        let names: HashSet<&str> = self.glossary.iter().map(|t| t.name.as_str()).collect();
        for property in &self.properties {
            let Some(name) = property.reference_name.as_deref() else {
                continue;
            };
            if !names.contains(name) {
                return Err(MapperError::UnknownGlossary {
                    path: property.path.clone(),
                    glossary: name.to_string(),
                });
            }
        }

        Ok(())
    }

    /// Ranges to poll: the mapper's own, or the platform defaults
    pub fn read_ranges(&self) -> Vec<ReadRange> {
        if self.memory.is_empty() {
            self.metadata.platform.default_ranges()
        } else {
            self.memory.clone()
        }
    }

    pub fn glossary(&self) -> Glossary {
        Glossary::new(self.glossary.iter().cloned())
    }

    pub fn property(&self, path: &str) -> Option<&PropertyDefinition> {
        self.properties.iter().find(|p| p.path == path)
    }

    /// Number of properties of each type, for load-time logging
    pub fn type_counts(&self) -> Vec<(PropertyType, usize)> {
        let mut counts: Vec<(PropertyType, usize)> = Vec::new();
        for property in &self.properties {
            match counts.iter_mut().find(|(kind, _)| *kind == property.kind) {
                Some((_, n)) => *n += 1,
                None => counts.push((property.kind, 1)),
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const RED_JSON: &str = r#"{
        "metadata": { "id": "pokemon-red", "gameName": "Pokemon Red", "platform": "GB" },
        "properties": [
            { "path": "player.gender", "type": "uint", "address": "0xD472", "reference": "gender" },
            { "path": "player.name", "type": "string", "address": "0xD158", "length": 11 },
            { "path": "bag.money", "type": "bcd", "address": "0xD347", "length": 3 }
        ],
        "glossary": [
            { "name": "gender", "entries": [ { "key": 0, "value": "Male" }, { "key": 1, "value": "Female" } ] },
            { "name": "defaultCharacterMap", "entries": [ { "key": "0x50", "value": null }, { "key": "0x80", "value": "A" } ] }
        ]
    }"#;

    const RED_YAML: &str = r#"
metadata:
  id: pokemon-red
  gameName: Pokemon Red
  platform: GB
memory:
  - start: 0xD000
    length: 0x1000
properties:
  - path: player.gender
    type: uint
    address: "0xD472"
    reference: gender
glossary:
  - name: gender
    entries:
      - { key: 0, value: Male }
      - { key: 1, value: Female }
"#;

    #[test]
    fn test_load_json() {
        let mapper = Mapper::from_json_str(RED_JSON).unwrap();
        assert_eq!(mapper.metadata.game_name, "Pokemon Red");
        assert_eq!(mapper.metadata.platform, Platform::Gb);
        assert_eq!(mapper.properties.len(), 3);
        assert_eq!(mapper.property("player.name").unwrap().length, 11);
        assert!(mapper.glossary().contains("defaultCharacterMap"));
        // No declared ranges: platform defaults apply
        assert_eq!(mapper.read_ranges(), Platform::Gb.default_ranges());
    }

    #[test]
    fn test_load_yaml() {
        let mapper = Mapper::from_yaml_str(RED_YAML).unwrap();
        assert_eq!(mapper.read_ranges(), vec![ReadRange::new(0xD000, 0x1000)]);
        assert_eq!(
            mapper.property("player.gender").unwrap().reference_name.as_deref(),
            Some("gender")
        );
    }

    #[test]
    fn test_duplicate_path_rejected() {
        let mut mapper = Mapper::from_json_str(RED_JSON).unwrap();
        mapper.properties.push(mapper.properties[0].clone());
        assert!(matches!(
            mapper.validate(),
            Err(MapperError::DuplicatePath(path)) if path == "player.gender"
        ));
    }

    #[test]
    fn test_bool_must_be_one_byte() {
        let text = RED_JSON.replace(
            r#"{ "path": "bag.money", "type": "bcd", "address": "0xD347", "length": 3 }"#,
            r#"{ "path": "flags.seen", "type": "bool", "address": "0xD347", "length": 2 }"#,
        );
        assert!(matches!(
            Mapper::from_json_str(&text),
            Err(MapperError::InvalidBoolLength { path, length: 2 }) if path == "flags.seen"
        ));

        let text = RED_JSON.replace(
            r#"{ "path": "bag.money", "type": "bcd", "address": "0xD347", "length": 3 }"#,
            r#"{ "path": "flags.seen", "type": "bool", "address": "0xD347" }"#,
        );
        assert!(Mapper::from_json_str(&text).is_ok());
    }

    #[test]
    fn test_duplicate_glossary_key_rejected() {
        let text = RED_JSON.replace(r#"{ "key": 1, "value": "Female" }"#, r#"{ "key": 0, "value": "Female" }"#);
        assert!(matches!(
            Mapper::from_json_str(&text),
            Err(MapperError::DuplicateGlossaryKey { key: 0, .. })
        ));
    }

    #[test]
    fn test_unknown_glossary_rejected() {
        let text = RED_JSON.replace(r#""reference": "gender""#, r#""reference": "species""#);
        assert!(matches!(
            Mapper::from_json_str(&text),
            Err(MapperError::UnknownGlossary { glossary, .. }) if glossary == "species"
        ));
    }

    #[test]
    fn test_malformed_bits_load_fine() {
        let text = RED_JSON.replace(r#""reference": "gender""#, r#""reference": "gender", "bits": "9-2""#);
        assert!(Mapper::from_json_str(&text).is_ok());
    }

    #[test]
    fn test_from_path_dispatches_on_extension() {
        let dir = tempfile::tempdir().unwrap();

        let yaml = dir.path().join("red.yml");
        std::fs::File::create(&yaml)
            .unwrap()
            .write_all(RED_YAML.as_bytes())
            .unwrap();
        assert_eq!(Mapper::from_path(&yaml).unwrap().metadata.id, "pokemon-red");

        let xml = dir.path().join("red.xml");
        std::fs::write(&xml, "<mapper/>").unwrap();
        assert!(matches!(
            Mapper::from_path(&xml),
            Err(MapperError::UnknownFormat(_))
        ));
    }

    #[test]
    fn test_type_counts() {
        let mapper = Mapper::from_json_str(RED_JSON).unwrap();
        let counts = mapper.type_counts();
        assert!(counts.contains(&(PropertyType::UInt, 1)));
        assert!(counts.contains(&(PropertyType::Bcd, 1)));
    }
}
