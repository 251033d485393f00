// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! JSON manifest of bundled models.
//!
//! # Format
//! ```json
//! {
//!   "models": [
//!     {
//!       "id": 0,
//!       "class": "autopilot_f",
//!       "kind": "autopilot",
//!       "name": "AUTOPILOT_F",
//!       "path": "networks/autopilot_float.tflite",
//!       "input": { "width": 256, "height": 96 }
//!     }
//!   ]
//! }
//! ```

use crate::{ModelClass, ModelDescriptor, ModelKind, RegistryError, SourceKind};
use frame_geometry::Size;
use std::path::Path;

/// Manifest shipped with the application when none is supplied.
pub const DEFAULT_MANIFEST: &str = r#"{
  "models": [
    {
      "id": 0,
      "class": "autopilot_f",
      "kind": "autopilot",
      "name": "AUTOPILOT_F",
      "path": "networks/autopilot_float.tflite",
      "input": { "width": 256, "height": 96 }
    },
    {
      "id": 2,
      "class": "mobilenet",
      "kind": "detector",
      "name": "MOBILENET_V1_1_0_Q",
      "path": "networks/lite-model_ssd_mobilenet_v1_1_metadata_2.tflite",
      "input": { "width": 300, "height": 300 }
    },
    {
      "id": 3,
      "class": "yolov4",
      "kind": "detector",
      "name": "YOLO_V4_TINY_F",
      "path": "networks/yolo-v4-tiny-224-metadata.tflite",
      "input": { "width": 224, "height": 224 }
    }
  ]
}"#;

/// Top-level manifest.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RegistryManifest {
    pub models: Vec<ManifestModel>,
}

/// One bundled model entry.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ManifestModel {
    pub id: u32,
    /// Class string, parsed loosely (see [`ModelClass::from_str_loose`]).
    pub class: String,
    pub kind: ModelKind,
    pub name: String,
    /// Path relative to the assets directory.
    pub path: String,
    pub input: Size,
}

impl RegistryManifest {
    /// Loads a manifest from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, RegistryError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parses a manifest from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, RegistryError> {
        Ok(serde_json::from_str(json)?)
    }

    /// The built-in manifest.
    pub fn builtin() -> Self {
        // The built-in manifest is a compile-time constant covered by tests.
        Self::from_json(DEFAULT_MANIFEST).unwrap_or(Self { models: Vec::new() })
    }

    /// Checks that names are unique (case-insensitively), classes are known,
    /// and every declared input size is non-empty.
    pub fn validate(&self) -> Result<(), RegistryError> {
        let mut seen = std::collections::HashSet::new();
        for model in &self.models {
            if !seen.insert(model.name.to_uppercase()) {
                return Err(RegistryError::InvalidManifest(format!(
                    "duplicate model name '{}'",
                    model.name
                )));
            }
            if ModelClass::from_str_loose(&model.class).is_none() {
                return Err(RegistryError::InvalidManifest(format!(
                    "model '{}' has unknown class '{}'",
                    model.name, model.class
                )));
            }
            if model.input.is_empty() {
                return Err(RegistryError::InvalidManifest(format!(
                    "model '{}' declares empty input {}",
                    model.name, model.input
                )));
            }
        }
        Ok(())
    }

    /// Converts the entries into bundled descriptors. Entries with an
    /// unknown class are skipped with a warning.
    pub fn descriptors(&self) -> Vec<ModelDescriptor> {
        self.models
            .iter()
            .filter_map(|m| {
                let Some(class) = ModelClass::from_str_loose(&m.class) else {
                    tracing::warn!("skipping model '{}': unknown class '{}'", m.name, m.class);
                    return None;
                };
                Some(ModelDescriptor {
                    id: m.id,
                    class,
                    kind: m.kind,
                    name: m.name.clone(),
                    source_kind: SourceKind::Bundled,
                    locator: m.path.clone(),
                    input_size: m.input,
                })
            })
            .collect()
    }
}
