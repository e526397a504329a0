//! Pipeline index decoding.

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeMap;

/// Parsed `model_index.json`.
///
/// The index mixes structural and scalar fields: keys starting with `_`
/// are metadata, values that are JSON arrays name components, and
/// everything else is scalar configuration to ignore.
#[derive(Debug, Clone, Default)]
pub struct ModelIndex {
    pub class_name: Option<String>,
    pub diffusers_version: Option<String>,
    /// Component name -> `[library, class]` descriptor.
    pub components: BTreeMap<String, Vec<String>>,
    /// Repo IDs of connected sub-pipelines to materialize alongside.
    pub connected_pipes: Vec<String>,
}

impl<'de> Deserialize<'de> for ModelIndex {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let map = serde_json::Map::deserialize(deserializer)?;
        let mut index = ModelIndex::default();

        for (key, value) in map {
            if let Some(meta) = key.strip_prefix('_') {
                match meta {
                    "class_name" => index.class_name = value.as_str().map(String::from),
                    "diffusers_version" => {
                        index.diffusers_version = value.as_str().map(String::from)
                    }
                    "connected_pipes" => {
                        index.connected_pipes =
                            serde_json::from_value(value).map_err(D::Error::custom)?;
                    }
                    _ => {}
                }
                continue;
            }

            if let Value::Array(_) = value {
                let component: Vec<String> =
                    serde_json::from_value(value).map_err(D::Error::custom)?;
                if component.len() != 2 {
                    return Err(D::Error::custom(format!(
                        "component {} must be a [library, class] pair, got {} entries",
                        key,
                        component.len()
                    )));
                }
                index.components.insert(key, component);
            }
            // Booleans and other scalars are configuration, not components.
        }

        Ok(index)
    }
}

/// Options for a pipeline download.
#[derive(Debug, Clone, Default)]
pub struct DownloadOptions {
    /// Require `.safetensors` weights instead of falling back across
    /// formats.
    pub use_safetensors: bool,
}
