// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `autopilot inspect` command: show how camera frames map onto a model.
//!
//! Opens the model through the reference backend, resolves the frame
//! transform for the requested camera size, and prints both directions.

use anyhow::Context;
use autopilot::{default_model_info, FrameGeometry, ModelSession, PipelineConfig, ReferenceBackend};
use frame_geometry::{AffineTransform, SensorOrientation, Size};
use model_registry::DeviceConfig;

pub async fn execute(
    config: PipelineConfig,
    model: String,
    frame: Option<String>,
    rotation: Option<i32>,
) -> anyhow::Result<()> {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║             autopilot · Model Inspector             ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();

    let frame_size = match frame.as_deref() {
        Some(s) => parse_size(s)?,
        None => config.frame_size(),
    };
    let orientation = match rotation {
        Some(degrees) => SensorOrientation::from_screen_rotation(degrees),
        None => config.orientation(),
    };

    let registry = config.registry();
    let descriptor = registry.resolve(&model)?;

    // ── Descriptor ─────────────────────────────────────────────
    println!("  Model: {}", descriptor.name);
    println!("   Id:       {}", descriptor.id);
    println!("   Class:    {}", descriptor.class.as_str());
    println!("   Kind:     {:?}", descriptor.kind);
    println!("   Source:   {:?} ({})", descriptor.source_kind, descriptor.locator);
    println!("   Declared: {}", descriptor.input_size);
    println!();

    // ── Session ────────────────────────────────────────────────
    let backend = ReferenceBackend::new(config.assets_dir.clone(), config.models_dir.clone());
    let device = DeviceConfig::new(config.inference.device, config.inference.threads);
    let info = match ModelSession::open(&backend, &descriptor, &device) {
        Ok(mut session) => {
            let info = (session.input_size(), session.crop(), session.maintain_aspect());
            let geometry = session
                .resolve_geometry(frame_size, orientation)
                .with_context(|| {
                    format!("cannot map {frame_size} frames onto {}", descriptor.name)
                })?;
            print_geometry(geometry);
            session.close();
            info
        }
        Err(e) => {
            // Without a model file, fall back to what the model would declare.
            tracing::warn!("open failed: {e}");
            println!("  Could not open the model ({e}).");
            println!("  Showing the declared geometry instead.");
            println!();
            let declared = default_model_info(&descriptor);
            let transform = frame_geometry::resolve(
                frame_size,
                orientation,
                declared.input_size,
                declared.crop,
                declared.maintain_aspect,
            )?;
            print_geometry(&FrameGeometry {
                frame_size,
                orientation,
                frame_to_input: transform,
                input_to_frame: transform.invert()?,
            });
            (declared.input_size, declared.crop, declared.maintain_aspect)
        }
    };

    let (input, crop, maintain_aspect) = info;
    println!("  Model input:");
    println!("   Size:            {input}");
    println!(
        "   Crop:            left {:.3}, top {:.3}, right {:.3}, bottom {:.3}",
        crop.left, crop.top, crop.right, crop.bottom
    );
    println!("   Maintain aspect: {maintain_aspect}");
    println!();
    Ok(())
}

fn print_geometry(geometry: &FrameGeometry) {
    println!("  Frame: {} ({})", geometry.frame_size, geometry.orientation);
    println!();
    println!("  Frame → input:");
    print_transform(&geometry.frame_to_input);
    println!("  Input → frame:");
    print_transform(&geometry.input_to_frame);

    // Where the frame corners land, as a quick sanity check.
    let w = geometry.frame_size.width as f32;
    let h = geometry.frame_size.height as f32;
    println!("  Frame corners in input space:");
    let corners = [
        ("top-left", 0.0, 0.0),
        ("top-right", w, 0.0),
        ("bottom-left", 0.0, h),
        ("bottom-right", w, h),
    ];
    for (label, x, y) in corners {
        let (ix, iy) = geometry.frame_to_input.map_point(x, y);
        println!("   {label:<13} ({x:>7.1}, {y:>7.1}) → ({ix:>8.2}, {iy:>8.2})");
    }
    println!();
}

fn print_transform(t: &AffineTransform) {
    println!("   | {:>10.4} {:>10.4} {:>10.2} |", t.sx, t.kx, t.tx);
    println!("   | {:>10.4} {:>10.4} {:>10.2} |", t.ky, t.sy, t.ty);
    println!("   det = {:.6}", t.determinant());
    println!();
}

/// Parses `"WIDTHxHEIGHT"`.
fn parse_size(s: &str) -> anyhow::Result<Size> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .with_context(|| format!("invalid frame size '{s}', expected e.g. 1280x720"))?;
    let width = w.trim().parse().with_context(|| format!("invalid width in '{s}'"))?;
    let height = h.trim().parse().with_context(|| format!("invalid height in '{s}'"))?;
    Ok(Size::new(width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("1280x720").unwrap(), Size::new(1280, 720));
        assert_eq!(parse_size("640X480").unwrap(), Size::new(640, 480));
        assert!(parse_size("1280").is_err());
        assert!(parse_size("axb").is_err());
    }
}
