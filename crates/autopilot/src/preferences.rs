// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Persisted operator settings.
//!
//! # TOML Format
//! ```toml
//! model = "AUTOPILOT_F"
//! device = "cpu"
//! threads = 4
//! speed_mode = "normal"
//! control_mode = "gamepad"
//! drive_mode = "game"
//! ```
//! Every key is optional; missing keys fall back to the pipeline config.

use crate::control::{ControlMode, DriveMode, SpeedMode};
use crate::error::PipelineError;
use model_registry::Device;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Settings remembered between runs.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StoredSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<Device>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threads: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed_mode: Option<SpeedMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub control_mode: Option<ControlMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drive_mode: Option<DriveMode>,
}

/// Key/value store for [`StoredSettings`].
pub trait Preferences: Send + Sync {
    /// Current settings.
    fn settings(&self) -> StoredSettings;

    /// Applies `edit` and persists the result.
    fn update(&self, edit: &mut dyn FnMut(&mut StoredSettings)) -> Result<(), PipelineError>;

    fn set_speed_mode(&self, mode: SpeedMode) -> Result<(), PipelineError> {
        self.update(&mut |s| s.speed_mode = Some(mode))
    }

    fn set_control_mode(&self, mode: ControlMode) -> Result<(), PipelineError> {
        self.update(&mut |s| s.control_mode = Some(mode))
    }

    fn set_drive_mode(&self, mode: DriveMode) -> Result<(), PipelineError> {
        self.update(&mut |s| s.drive_mode = Some(mode))
    }
}

/// Preferences kept in memory only.
#[derive(Debug, Default)]
pub struct MemoryPreferences {
    settings: Mutex<StoredSettings>,
}

impl MemoryPreferences {
    pub fn new(initial: StoredSettings) -> Self {
        Self {
            settings: Mutex::new(initial),
        }
    }
}

impl Preferences for MemoryPreferences {
    fn settings(&self) -> StoredSettings {
        self.settings
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    fn update(&self, edit: &mut dyn FnMut(&mut StoredSettings)) -> Result<(), PipelineError> {
        let mut s = self
            .settings
            .lock()
            .map_err(|_| PipelineError::Preferences("settings lock poisoned".into()))?;
        edit(&mut s);
        Ok(())
    }
}

/// Preferences stored in a TOML file, rewritten on every update.
#[derive(Debug)]
pub struct TomlPreferences {
    path: PathBuf,
    settings: Mutex<StoredSettings>,
}

impl TomlPreferences {
    /// Opens the store at `path`. A missing file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PipelineError> {
        let path = path.into();
        let settings = if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| {
                PipelineError::Preferences(format!("cannot read '{}': {e}", path.display()))
            })?;
            toml::from_str(&content).map_err(|e| {
                PipelineError::Preferences(format!("TOML parse error in '{}': {e}", path.display()))
            })?
        } else {
            StoredSettings::default()
        };
        Ok(Self {
            path,
            settings: Mutex::new(settings),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, settings: &StoredSettings) -> Result<(), PipelineError> {
        let text = toml::to_string_pretty(settings)
            .map_err(|e| PipelineError::Preferences(format!("TOML serialise error: {e}")))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                PipelineError::Preferences(format!("cannot create '{}': {e}", parent.display()))
            })?;
        }
        std::fs::write(&self.path, text).map_err(|e| {
            PipelineError::Preferences(format!("cannot write '{}': {e}", self.path.display()))
        })
    }
}

impl Preferences for TomlPreferences {
    fn settings(&self) -> StoredSettings {
        self.settings
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    fn update(&self, edit: &mut dyn FnMut(&mut StoredSettings)) -> Result<(), PipelineError> {
        let mut s = self
            .settings
            .lock()
            .map_err(|_| PipelineError::Preferences("settings lock poisoned".into()))?;
        edit(&mut s);
        self.write(&s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_preferences() {
        let p = MemoryPreferences::default();
        p.update(&mut |s| {
            s.model = Some("AUTOPILOT_F".into());
            s.threads = Some(2);
        })
        .unwrap();
        let s = p.settings();
        assert_eq!(s.model.as_deref(), Some("AUTOPILOT_F"));
        assert_eq!(s.threads, Some(2));
        assert_eq!(s.device, None);
    }

    #[test]
    fn test_toml_preferences_persist() {
        let path = std::env::temp_dir()
            .join(format!("autopilot_prefs_{}", std::process::id()))
            .join("prefs.toml");
        let _ = std::fs::remove_file(&path);

        let p = TomlPreferences::open(&path).unwrap();
        assert_eq!(p.settings(), StoredSettings::default());
        p.update(&mut |s| s.device = Some(Device::Gpu)).unwrap();
        p.set_speed_mode(SpeedMode::Fast).unwrap();
        p.set_drive_mode(DriveMode::Dual).unwrap();

        let reopened = TomlPreferences::open(&path).unwrap();
        let s = reopened.settings();
        assert_eq!(s.device, Some(Device::Gpu));
        assert_eq!(s.speed_mode, Some(SpeedMode::Fast));
        assert_eq!(s.drive_mode, Some(DriveMode::Dual));
        assert_eq!(s.model, None);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_toml_preferences_rejects_garbage() {
        let dir = std::env::temp_dir().join(format!("autopilot_prefs_bad_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("prefs.toml");
        std::fs::write(&path, "threads = \"many\"").unwrap();
        assert!(matches!(
            TomlPreferences::open(&path),
            Err(PipelineError::Preferences(_))
        ));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
