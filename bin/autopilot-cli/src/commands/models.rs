// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `autopilot models` command: list bundled and imported models.

use autopilot::{PipelineConfig, ReferenceBackend};

pub async fn execute(config: PipelineConfig) -> anyhow::Result<()> {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║                autopilot · Models                   ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();

    let registry = config.registry();
    let backend = ReferenceBackend::new(config.assets_dir.clone(), config.models_dir.clone());

    // ── Bundled ────────────────────────────────────────────────
    println!("  Bundled ({}):", config.assets_dir.display());
    println!(
        "  {:<4} {:<24} {:<10} {:<10} {:>9}  {}",
        "Id", "Name", "Class", "Kind", "Input", "File"
    );
    println!("  {}", "-".repeat(72));
    for d in registry.bundled() {
        let present = if backend.model_path(d).is_file() { "yes" } else { "missing" };
        println!(
            "  {:<4} {:<24} {:<10} {:<10} {:>9}  {}",
            d.id,
            super::truncate(&d.name, 24),
            d.class.as_str(),
            format!("{:?}", d.kind).to_lowercase(),
            d.input_size.to_string(),
            present,
        );
    }
    println!();

    // ── Imported ───────────────────────────────────────────────
    println!("  Imported ({}):", registry.models_dir().display());
    let files = registry.model_files()?;
    if files.is_empty() {
        println!("   (none)");
    }
    for file in &files {
        println!("   {file}");
    }
    println!();

    println!("  Selectable: {}", registry.choices()?.join(", "));
    println!("  Configured: {}", config.inference.model);
    println!();
    Ok(())
}
