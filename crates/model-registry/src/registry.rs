// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Model lookup and import.

use crate::{ModelDescriptor, ModelKind, RegistryError, RegistryManifest};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Extension of model files the registry lists from the models directory.
pub const MODEL_FILE_EXTENSION: &str = "tflite";

/// Bundled models plus the directory holding user-imported model files.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    bundled: Vec<ModelDescriptor>,
    models_dir: PathBuf,
}

impl ModelRegistry {
    /// Builds a registry from a validated manifest.
    pub fn new(
        manifest: &RegistryManifest,
        models_dir: impl Into<PathBuf>,
    ) -> Result<Self, RegistryError> {
        manifest.validate()?;
        Ok(Self {
            bundled: manifest.descriptors(),
            models_dir: models_dir.into(),
        })
    }

    /// Registry over the built-in manifest.
    pub fn with_defaults(models_dir: impl Into<PathBuf>) -> Self {
        Self {
            bundled: RegistryManifest::builtin().descriptors(),
            models_dir: models_dir.into(),
        }
    }

    /// All bundled models.
    pub fn bundled(&self) -> &[ModelDescriptor] {
        &self.bundled
    }

    /// Bundled models that drive the vehicle.
    pub fn bundled_autopilots(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.bundled.iter().filter(|d| d.kind == ModelKind::Autopilot)
    }

    /// Directory holding imported model files.
    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// Looks up a bundled model by name, ignoring case.
    pub fn descriptor_from_id(&self, name: &str) -> Result<ModelDescriptor, RegistryError> {
        self.bundled
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(name.trim()))
            .cloned()
            .ok_or_else(|| RegistryError::NotFound {
                name: name.to_string(),
            })
    }

    /// Looks up a bundled model, falling back to a file-backed autopilot
    /// descriptor for names that are not bundled.
    pub fn resolve(&self, name: &str) -> Result<ModelDescriptor, RegistryError> {
        match self.descriptor_from_id(name) {
            Ok(d) => Ok(d),
            Err(RegistryError::NotFound { .. }) => {
                validate_file_name(name)?;
                tracing::debug!("'{name}' is not bundled, treating it as a model file");
                Ok(ModelDescriptor::file(name))
            }
            Err(e) => Err(e),
        }
    }

    /// Names of imported `*.tflite` files, sorted. A missing models
    /// directory yields an empty list.
    pub fn model_files(&self) -> Result<Vec<String>, RegistryError> {
        if !self.models_dir.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.models_dir)? {
            let path = entry?.path();
            let is_model = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(MODEL_FILE_EXTENSION));
            if is_model && path.is_file() {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Everything the operator can choose from: bundled autopilots first,
    /// then imported files.
    pub fn choices(&self) -> Result<Vec<String>, RegistryError> {
        let mut choices: Vec<String> = self.bundled_autopilots().map(|d| d.name.clone()).collect();
        choices.extend(self.model_files()?);
        Ok(choices)
    }

    /// Copies `data` into the models directory as `file_name` and returns
    /// the file-backed descriptor for it. An existing file is replaced.
    ///
    /// The bytes are written to a temporary sibling first and renamed into
    /// place, so a failed copy never leaves a truncated model behind.
    pub fn import(
        &self,
        file_name: &str,
        data: &mut impl Read,
    ) -> Result<ModelDescriptor, RegistryError> {
        validate_file_name(file_name)?;
        std::fs::create_dir_all(&self.models_dir)?;

        let target = self.models_dir.join(file_name);
        let partial = self.models_dir.join(format!(".{file_name}.partial"));
        let copied = (|| -> std::io::Result<u64> {
            let mut out = std::fs::File::create(&partial)?;
            let n = std::io::copy(data, &mut out)?;
            out.flush()?;
            Ok(n)
        })();
        let bytes = match copied {
            Ok(n) => n,
            Err(e) => {
                let _ = std::fs::remove_file(&partial);
                return Err(e.into());
            }
        };
        std::fs::rename(&partial, &target)?;

        tracing::info!(
            "imported model '{file_name}' ({bytes} bytes) into {}",
            self.models_dir.display()
        );
        Ok(ModelDescriptor::file(file_name))
    }

    /// Deletes an imported model file. Returns `false` if it did not exist.
    pub fn remove(&self, file_name: &str) -> Result<bool, RegistryError> {
        validate_file_name(file_name)?;
        let path = self.models_dir.join(file_name);
        if !path.is_file() {
            return Ok(false);
        }
        std::fs::remove_file(&path)?;
        tracing::info!("removed model '{file_name}'");
        Ok(true)
    }
}

/// Rejects names that are empty or could point outside the models directory.
fn validate_file_name(name: &str) -> Result<(), RegistryError> {
    let invalid = name.trim().is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if invalid {
        return Err(RegistryError::InvalidFileName(name.to_string()));
    }
    Ok(())
}
