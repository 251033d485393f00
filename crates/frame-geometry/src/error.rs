// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for frame geometry.

use crate::Size;

/// Errors produced while resolving or applying a frame transform.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeometryError {
    /// A source or target dimension is zero.
    #[error("degenerate dimensions: frame {frame}, target {target}")]
    ZeroDimension { frame: Size, target: Size },

    /// Crop margins are out of range or leave no visible region.
    #[error("invalid crop: {0}")]
    InvalidCrop(String),

    /// The transform cannot be inverted.
    #[error("singular transform (determinant {determinant})")]
    Singular { determinant: f32 },

    /// A pixel buffer does not match the size it claims to hold.
    #[error("pixel buffer mismatch: expected {expected} bytes, got {actual}")]
    BufferSize { expected: usize, actual: usize },
}
