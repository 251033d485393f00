// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # model-registry
//!
//! Identifies the models an autopilot can load and the compute devices it
//! can load them on.
//!
//! - [`ModelDescriptor`]: the immutable record naming one loadable model
//!   (class, kind, display name, file location, declared input size). Two
//!   descriptors with the same name may still differ.
//! - [`DeviceConfig`]: compute device plus CPU thread count.
//! - [`RegistryManifest`]: the JSON list of models bundled with the
//!   application.
//! - [`ModelRegistry`]: name lookup over bundled models, the fallback to
//!   user-imported files, and the import path itself.
//!
//! # Example
//! ```
//! use model_registry::{ModelRegistry, SourceKind};
//!
//! let registry = ModelRegistry::with_defaults(std::env::temp_dir());
//! let bundled = registry.descriptor_from_id("autopilot_f").unwrap();
//! assert_eq!(bundled.source_kind, SourceKind::Bundled);
//!
//! // Unknown names are treated as user-provided model files.
//! let imported = registry.resolve("my_run.tflite").unwrap();
//! assert_eq!(imported.source_kind, SourceKind::File);
//! assert_eq!(imported.input_size.to_string(), "256x96");
//! ```

mod descriptor;
mod device;
mod error;
pub mod manifest;
mod registry;

pub use descriptor::{ModelClass, ModelDescriptor, ModelKind, SourceKind};
pub use device::{Device, DeviceConfig, MAX_UI_THREADS, MIN_UI_THREADS};
pub use error::RegistryError;
pub use manifest::RegistryManifest;
pub use registry::ModelRegistry;
