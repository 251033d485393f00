// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `autopilot import` command: copy a model file into the models directory.

use anyhow::Context;
use autopilot::PipelineConfig;
use std::path::PathBuf;

pub async fn execute(
    config: PipelineConfig,
    path: PathBuf,
    name: Option<String>,
) -> anyhow::Result<()> {
    let file_name = match name {
        Some(name) => name,
        None => path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .with_context(|| format!("'{}' has no usable file name", path.display()))?,
    };

    let mut source = std::fs::File::open(&path)
        .with_context(|| format!("failed to open '{}'", path.display()))?;
    let registry = config.registry();
    let descriptor = registry.import(&file_name, &mut source)?;

    let target = registry.models_dir().join(&file_name);
    println!("  Imported {} → {}", path.display(), target.display());
    println!("  Select it with: autopilot drive --model {}", descriptor.name);
    Ok(())
}
