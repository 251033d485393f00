// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for model lookup and import.

/// Errors that can occur when resolving or importing models.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// No bundled model is registered under this name.
    #[error("no bundled model named '{name}'")]
    NotFound { name: String },

    /// Reading or writing model files failed.
    #[error("model file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The bundled-model manifest is malformed.
    #[error("failed to parse model manifest: {0}")]
    ManifestParse(#[from] serde_json::Error),

    /// The manifest parsed but is inconsistent.
    #[error("invalid model manifest: {0}")]
    InvalidManifest(String),

    /// An imported file name is empty or would escape the models directory.
    #[error("invalid model file name '{0}'")]
    InvalidFileName(String),

    /// A device string is not one of `cpu`, `gpu`, `nnapi`.
    #[error("unknown compute device '{0}'")]
    UnknownDevice(String),
}
