// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Pipeline configuration loaded from TOML files or constructed programmatically.
//!
//! # TOML Format
//! ```toml
//! frame_width = 1280
//! frame_height = 720
//! screen_rotation = 0
//! assets_dir = "./assets"
//! models_dir = "./models"
//! safety_stop_ms = 500
//!
//! [inference]
//! model = "AUTOPILOT_F"
//! device = "cpu"
//! threads = 4
//! ```

use crate::error::PipelineError;
use crate::preferences::StoredSettings;
use frame_geometry::{SensorOrientation, Size};
use model_registry::{Device, DeviceConfig, ModelDescriptor, ModelRegistry};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default delay before the forced stop after autonomy is switched off.
pub const DEFAULT_SAFETY_STOP_MS: u64 = 500;

/// Configuration for an autopilot pipeline.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PipelineConfig {
    /// Camera frame width in pixels.
    pub frame_width: u32,
    /// Camera frame height in pixels.
    pub frame_height: u32,
    /// Display rotation in degrees (0, 90, 180, 270).
    #[serde(default)]
    pub screen_rotation: i32,
    /// Directory bundled model locators are relative to.
    pub assets_dir: PathBuf,
    /// Directory holding imported model files.
    pub models_dir: PathBuf,
    /// Delay before the forced stop on a plain autonomy toggle.
    #[serde(default = "default_safety_stop_ms")]
    pub safety_stop_ms: u64,
    /// Initial model and device.
    #[serde(default)]
    pub inference: InferenceSettings,
}

/// The `[inference]` table.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct InferenceSettings {
    /// Bundled model name or imported file name.
    pub model: String,
    #[serde(default)]
    pub device: Device,
    #[serde(default = "default_threads")]
    pub threads: u32,
}

fn default_safety_stop_ms() -> u64 {
    DEFAULT_SAFETY_STOP_MS
}

fn default_threads() -> u32 {
    DeviceConfig::default().threads
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            model: "AUTOPILOT_F".to_string(),
            device: Device::Cpu,
            threads: default_threads(),
        }
    }
}

impl PipelineConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, PipelineError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("cannot read config '{}': {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, PipelineError> {
        let config: Self = toml::from_str(toml_str)
            .map_err(|e| PipelineError::Config(format!("TOML parse error: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialises configuration to TOML.
    pub fn to_toml(&self) -> Result<String, PipelineError> {
        toml::to_string_pretty(self)
            .map_err(|e| PipelineError::Config(format!("TOML serialise error: {e}")))
    }

    /// Checks frame size, rotation and thread count.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.frame_size().is_empty() {
            return Err(PipelineError::Config(format!(
                "frame size {} has a zero dimension",
                self.frame_size()
            )));
        }
        if self.screen_rotation.rem_euclid(90) != 0 {
            return Err(PipelineError::Config(format!(
                "screen_rotation must be a multiple of 90, got {}",
                self.screen_rotation
            )));
        }
        if self.inference.device == Device::Cpu && self.inference.threads == 0 {
            return Err(PipelineError::Config(
                "inference.threads must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn frame_size(&self) -> Size {
        Size::new(self.frame_width, self.frame_height)
    }

    pub fn orientation(&self) -> SensorOrientation {
        SensorOrientation::from_screen_rotation(self.screen_rotation)
    }

    pub fn safety_stop_delay(&self) -> Duration {
        Duration::from_millis(self.safety_stop_ms)
    }

    /// Registry over the built-in manifest and this config's models directory.
    pub fn registry(&self) -> ModelRegistry {
        ModelRegistry::with_defaults(&self.models_dir)
    }

    /// Initial inference config: the `[inference]` table, overridden by any
    /// stored preferences. A stored model that no longer resolves is ignored.
    pub fn initial_inference(
        &self,
        registry: &ModelRegistry,
        stored: &StoredSettings,
    ) -> Result<InferenceConfig, PipelineError> {
        let descriptor = match stored.model.as_deref().map(|m| registry.resolve(m)) {
            Some(Ok(d)) => d,
            Some(Err(e)) => {
                tracing::warn!("ignoring stored model: {e}");
                registry.resolve(&self.inference.model)?
            }
            None => registry.resolve(&self.inference.model)?,
        };
        let device = DeviceConfig::new(
            stored.device.unwrap_or(self.inference.device),
            stored.threads.unwrap_or(self.inference.threads),
        );
        Ok(InferenceConfig::new(descriptor, device))
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frame_width: 1280,
            frame_height: 720,
            screen_rotation: 0,
            assets_dir: PathBuf::from("./assets"),
            models_dir: PathBuf::from("./models"),
            safety_stop_ms: DEFAULT_SAFETY_STOP_MS,
            inference: InferenceSettings::default(),
        }
    }
}

/// The unit of reconfiguration: which model, on which device.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceConfig {
    pub descriptor: ModelDescriptor,
    pub device: DeviceConfig,
}

impl InferenceConfig {
    pub fn new(descriptor: ModelDescriptor, device: DeviceConfig) -> Self {
        Self { descriptor, device }
    }

    pub fn with_descriptor(&self, descriptor: ModelDescriptor) -> Self {
        Self {
            descriptor,
            ..self.clone()
        }
    }

    pub fn with_device(&self, device: Device) -> Self {
        Self {
            device: DeviceConfig::new(device, self.device.threads),
            ..self.clone()
        }
    }

    pub fn with_threads(&self, threads: u32) -> Self {
        Self {
            device: DeviceConfig::new(self.device.device, threads),
            ..self.clone()
        }
    }
}

impl fmt::Display for InferenceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}", self.descriptor.name, self.device)
    }
}
