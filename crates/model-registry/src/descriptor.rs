// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Model descriptors.
//!
//! A [`ModelDescriptor`] says *what* to load, never *how*: the inference
//! backend decides how to turn the locator into a running model. Descriptors
//! compare by full value, so a user file named `AUTOPILOT_F` is a different
//! model from the bundled `AUTOPILOT_F`.

use frame_geometry::Size;
use std::fmt;

/// Default input size of autopilot networks.
pub const AUTOPILOT_INPUT: Size = Size::new(256, 96);

/// Numeric id given to descriptors built for user-provided files.
pub const FILE_MODEL_ID: u32 = 1;

/// Network family a model belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelClass {
    /// Float autopilot network (image + indicator → wheel controls).
    AutopilotF,
    /// MobileNet SSD object detector.
    Mobilenet,
    /// YOLOv4 object detector.
    Yolov4,
    /// EfficientDet object detector.
    Efficientdet,
}

impl ModelClass {
    /// Parses a class from a manifest or user string.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "autopilot_f" | "autopilot" | "autopilot_float" => Some(Self::AutopilotF),
            "mobilenet" | "mobilenet_v1" | "ssd_mobilenet" => Some(Self::Mobilenet),
            "yolov4" | "yolo_v4" | "yolo" => Some(Self::Yolov4),
            "efficientdet" | "efficient_det" => Some(Self::Efficientdet),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AutopilotF => "AUTOPILOT_F",
            Self::Mobilenet => "MOBILENET",
            Self::Yolov4 => "YOLOV4",
            Self::Efficientdet => "EFFICIENTDET",
        }
    }
}

/// What a model produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Produces differential-drive controls.
    Autopilot,
    /// Produces bounding boxes.
    Detector,
}

/// Where a model's bytes come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Shipped with the application; the locator is relative to the assets directory.
    Bundled,
    /// Imported by the user; the locator is a file name in the models directory.
    File,
}

/// Identifies one loadable model.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ModelDescriptor {
    /// Registry id.
    pub id: u32,
    pub class: ModelClass,
    pub kind: ModelKind,
    /// Display name shown to the operator.
    pub name: String,
    pub source_kind: SourceKind,
    /// Path of the model file, interpreted according to `source_kind`.
    pub locator: String,
    /// Input size the model declares.
    pub input_size: Size,
}

impl ModelDescriptor {
    /// Descriptor for a user-provided autopilot file with the default input size.
    pub fn file(file_name: impl Into<String>) -> Self {
        let file_name = file_name.into();
        Self {
            id: FILE_MODEL_ID,
            class: ModelClass::AutopilotF,
            kind: ModelKind::Autopilot,
            name: file_name.clone(),
            source_kind: SourceKind::File,
            locator: file_name,
            input_size: AUTOPILOT_INPUT,
        }
    }

    /// Overrides the declared input size.
    pub fn with_input_size(mut self, size: Size) -> Self {
        self.input_size = size;
        self
    }

    /// Returns `true` if this model drives the vehicle.
    pub fn is_autopilot(&self) -> bool {
        self.kind == ModelKind::Autopilot
    }
}

impl fmt::Display for ModelDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match self.source_kind {
            SourceKind::Bundled => "bundled",
            SourceKind::File => "file",
        };
        write!(
            f,
            "{} ({}, {source}:{}, {})",
            self.name,
            self.class.as_str(),
            self.locator,
            self.input_size,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_descriptor_defaults() {
        let d = ModelDescriptor::file("a.tflite");
        assert_eq!(d.class, ModelClass::AutopilotF);
        assert_eq!(d.source_kind, SourceKind::File);
        assert_eq!(d.input_size, Size::new(256, 96));
        assert!(d.is_autopilot());
    }

    #[test]
    fn test_equality_is_by_value() {
        let a = ModelDescriptor::file("AUTOPILOT_F");
        let mut b = a.clone();
        b.source_kind = SourceKind::Bundled;
        assert_eq!(a.name, b.name);
        assert_ne!(a, b);
    }

    #[test]
    fn test_class_loose_parse() {
        assert_eq!(ModelClass::from_str_loose("AUTOPILOT_F"), Some(ModelClass::AutopilotF));
        assert_eq!(ModelClass::from_str_loose("yolo-v4"), Some(ModelClass::Yolov4));
        assert_eq!(ModelClass::from_str_loose("resnet"), None);
    }

    #[test]
    fn test_display() {
        let s = ModelDescriptor::file("a.tflite").to_string();
        assert_eq!(s, "a.tflite (AUTOPILOT_F, file:a.tflite, 256x96)");
    }
}
