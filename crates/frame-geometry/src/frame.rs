// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Camera frames and frame preparation.

use crate::size::BYTES_PER_PIXEL;
use crate::{AffineTransform, GeometryError, Size};
use std::sync::Arc;
use std::time::Instant;

/// Pixel written where the inverse-mapped point falls outside the frame.
const OUTSIDE: [u8; 4] = [0, 0, 0, 255];

/// Capture-side information delivered with each frame.
#[derive(Debug, Clone, Copy)]
pub struct CaptureMetadata {
    /// Monotonic frame counter assigned by the camera source.
    pub frame_number: u64,
    /// When the frame was captured.
    pub captured_at: Instant,
}

impl CaptureMetadata {
    /// Metadata stamped with the current time.
    pub fn now(frame_number: u64) -> Self {
        Self {
            frame_number,
            captured_at: Instant::now(),
        }
    }
}

/// An immutable RGBA8 camera frame.
///
/// Pixel data is reference-counted, so cloning a frame to hand it from the
/// camera thread to the inference worker does not copy the image.
#[derive(Debug, Clone)]
pub struct Frame {
    size: Size,
    pixels: Arc<[u8]>,
    metadata: CaptureMetadata,
}

impl Frame {
    /// Wraps an RGBA8 pixel buffer.
    pub fn new(
        size: Size,
        pixels: Vec<u8>,
        metadata: CaptureMetadata,
    ) -> Result<Self, GeometryError> {
        if pixels.len() != size.rgba_len() {
            return Err(GeometryError::BufferSize {
                expected: size.rgba_len(),
                actual: pixels.len(),
            });
        }
        Ok(Self {
            size,
            pixels: pixels.into(),
            metadata,
        })
    }

    /// Builds a frame by evaluating `f(x, y)` for every pixel.
    pub fn from_fn(
        size: Size,
        metadata: CaptureMetadata,
        mut f: impl FnMut(u32, u32) -> [u8; 4],
    ) -> Self {
        let mut pixels = Vec::with_capacity(size.rgba_len());
        for y in 0..size.height {
            for x in 0..size.width {
                pixels.extend_from_slice(&f(x, y));
            }
        }
        Self {
            size,
            pixels: pixels.into(),
            metadata,
        }
    }

    /// A frame filled with a single colour.
    pub fn filled(size: Size, rgba: [u8; 4], metadata: CaptureMetadata) -> Self {
        Self::from_fn(size, metadata, |_, _| rgba)
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn metadata(&self) -> &CaptureMetadata {
        &self.metadata
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Returns the pixel at `(x, y)`, or `None` outside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.size.width || y >= self.size.height {
            return None;
        }
        let offset = (y as usize * self.size.width as usize + x as usize) * BYTES_PER_PIXEL;
        let mut px = [0u8; 4];
        px.copy_from_slice(&self.pixels[offset..offset + BYTES_PER_PIXEL]);
        Some(px)
    }
}

/// Resamples `frame` into `dst` through `transform` (frame → target).
///
/// Each destination pixel centre is mapped back into the frame with the
/// inverse transform and sampled nearest-neighbour. Destination pixels whose
/// source lies outside the frame are written opaque black.
pub fn warp_into(
    frame: &Frame,
    transform: &AffineTransform,
    dst: &mut [u8],
    dst_size: Size,
) -> Result<(), GeometryError> {
    if dst.len() != dst_size.rgba_len() {
        return Err(GeometryError::BufferSize {
            expected: dst_size.rgba_len(),
            actual: dst.len(),
        });
    }
    let inverse = transform.invert()?;
    let src_w = frame.size.width as i64;
    let src_h = frame.size.height as i64;

    for (row, line) in dst
        .chunks_exact_mut(dst_size.width as usize * BYTES_PER_PIXEL)
        .enumerate()
    {
        let cy = row as f32 + 0.5;
        for (col, out) in line.chunks_exact_mut(BYTES_PER_PIXEL).enumerate() {
            let (sx, sy) = inverse.map_point(col as f32 + 0.5, cy);
            let (ix, iy) = (sx.floor() as i64, sy.floor() as i64);
            if ix < 0 || iy < 0 || ix >= src_w || iy >= src_h {
                out.copy_from_slice(&OUTSIDE);
            } else {
                let offset = (iy as usize * src_w as usize + ix as usize) * BYTES_PER_PIXEL;
                out.copy_from_slice(&frame.pixels[offset..offset + BYTES_PER_PIXEL]);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{resolve, CropRect, SensorOrientation};

    fn meta() -> CaptureMetadata {
        CaptureMetadata::now(0)
    }

    #[test]
    fn test_new_rejects_wrong_length() {
        let err = Frame::new(Size::new(2, 2), vec![0; 15], meta()).unwrap_err();
        assert_eq!(
            err,
            GeometryError::BufferSize {
                expected: 16,
                actual: 15
            }
        );
    }

    #[test]
    fn test_pixel_lookup() {
        let f = Frame::from_fn(Size::new(3, 2), meta(), |x, y| [x as u8, y as u8, 0, 255]);
        assert_eq!(f.pixel(2, 1), Some([2, 1, 0, 255]));
        assert_eq!(f.pixel(3, 0), None);
    }

    #[test]
    fn test_warp_downscale_keeps_halves() {
        // Left half dark, right half bright.
        let frame = Frame::from_fn(Size::new(80, 40), meta(), |x, _| {
            if x < 40 {
                [10, 10, 10, 255]
            } else {
                [200, 200, 200, 255]
            }
        });
        let target = Size::new(8, 4);
        let t = resolve(frame.size(), SensorOrientation::UPRIGHT, target, CropRect::NONE, false)
            .unwrap();
        let mut dst = vec![0u8; target.rgba_len()];
        warp_into(&frame, &t, &mut dst, target).unwrap();

        assert_eq!(&dst[0..4], &[10, 10, 10, 255]);
        let last = dst.len() - 4;
        assert_eq!(&dst[last..], &[200, 200, 200, 255]);
    }

    #[test]
    fn test_warp_half_turn_flips() {
        let frame = Frame::from_fn(Size::new(4, 1), meta(), |x, _| [x as u8, 0, 0, 255]);
        let target = Size::new(4, 1);
        let t = resolve(
            frame.size(),
            SensorOrientation::from_degrees(180),
            target,
            CropRect::NONE,
            false,
        )
        .unwrap();
        let mut dst = vec![0u8; target.rgba_len()];
        warp_into(&frame, &t, &mut dst, target).unwrap();
        let reds: Vec<u8> = dst.chunks(4).map(|p| p[0]).collect();
        assert_eq!(reds, vec![3, 2, 1, 0]);
    }

    #[test]
    fn test_warp_outside_is_black() {
        let frame = Frame::filled(Size::new(4, 4), [255, 255, 255, 255], meta());
        let target = Size::new(4, 4);
        let shift = AffineTransform::translation(2.0, 0.0);
        let mut dst = vec![0u8; target.rgba_len()];
        warp_into(&frame, &shift, &mut dst, target).unwrap();
        assert_eq!(&dst[0..4], &OUTSIDE);
        assert_eq!(&dst[8..12], &[255, 255, 255, 255]);
    }

    #[test]
    fn test_warp_rejects_wrong_destination() {
        let frame = Frame::filled(Size::new(4, 4), [0; 4], meta());
        let mut dst = vec![0u8; 10];
        assert!(warp_into(&frame, &AffineTransform::IDENTITY, &mut dst, Size::new(2, 2)).is_err());
    }
}
