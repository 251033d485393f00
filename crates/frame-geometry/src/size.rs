// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Pixel dimensions and crop margins.

use crate::GeometryError;
use std::fmt;

/// Bytes per pixel in every buffer this crate handles (RGBA8).
pub const BYTES_PER_PIXEL: usize = 4;

/// Width and height of an image in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    /// Creates a new size.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns `true` if either dimension is zero.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Number of pixels.
    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Byte length of an RGBA8 buffer of this size.
    pub fn rgba_len(&self) -> usize {
        self.area() * BYTES_PER_PIXEL
    }

    /// Returns the size with width and height swapped.
    pub fn transposed(&self) -> Self {
        Self::new(self.height, self.width)
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Fractional margins trimmed from each edge of the source frame before it
/// is scaled into the model input.
///
/// Each margin is a fraction of the corresponding source dimension, so
/// `top = 0.25` on a 720-pixel-high frame discards the top 180 rows.
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct CropRect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl CropRect {
    /// No cropping.
    pub const NONE: CropRect = CropRect {
        left: 0.0,
        top: 0.0,
        right: 0.0,
        bottom: 0.0,
    };

    /// Creates a crop from its four margins.
    pub const fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Crop that only trims the top of the frame.
    pub const fn top(fraction: f32) -> Self {
        Self::new(0.0, fraction, 0.0, 0.0)
    }

    /// Checks that all margins are in `[0, 1)` and leave a visible region.
    pub fn validate(&self) -> Result<(), GeometryError> {
        let margins = [self.left, self.top, self.right, self.bottom];
        if margins.iter().any(|m| !m.is_finite() || *m < 0.0 || *m >= 1.0) {
            return Err(GeometryError::InvalidCrop(format!(
                "margins must be in [0, 1): {self:?}"
            )));
        }
        if self.left + self.right >= 1.0 || self.top + self.bottom >= 1.0 {
            return Err(GeometryError::InvalidCrop(format!(
                "margins leave no visible region: {self:?}"
            )));
        }
        Ok(())
    }

    /// Returns `(x, y, width, height)` of the kept region inside `frame`.
    pub fn region(&self, frame: Size) -> (f32, f32, f32, f32) {
        let w = frame.width as f32;
        let h = frame.height as f32;
        (
            self.left * w,
            self.top * h,
            w * (1.0 - self.left - self.right),
            h * (1.0 - self.top - self.bottom),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_display() {
        assert_eq!(Size::new(256, 96).to_string(), "256x96");
    }

    #[test]
    fn test_rgba_len() {
        assert_eq!(Size::new(256, 96).rgba_len(), 256 * 96 * 4);
        assert!(Size::new(0, 96).is_empty());
    }

    #[test]
    fn test_crop_validate() {
        assert!(CropRect::NONE.validate().is_ok());
        assert!(CropRect::top(0.33).validate().is_ok());
        assert!(CropRect::new(0.5, 0.0, 0.5, 0.0).validate().is_err());
        assert!(CropRect::new(-0.1, 0.0, 0.0, 0.0).validate().is_err());
        assert!(CropRect::new(0.0, f32::NAN, 0.0, 0.0).validate().is_err());
    }

    #[test]
    fn test_crop_region() {
        let (x, y, w, h) = CropRect::top(0.25).region(Size::new(100, 200));
        assert_eq!((x, y, w, h), (0.0, 50.0, 100.0, 150.0));
    }
}
