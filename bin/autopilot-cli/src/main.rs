// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # autopilot
//!
//! Command-line driver for the autopilot inference pipeline.
//!
//! ## Usage
//! ```bash
//! # Drive a simulated vehicle from a synthetic camera for 5 seconds
//! autopilot drive --seconds 5 --threads 4 --swap-threads 2
//!
//! # Show how camera frames map onto a model's input
//! autopilot inspect --model AUTOPILOT_F --frame 1280x720
//!
//! # List and import models
//! autopilot models
//! autopilot import ./my_autopilot.tflite
//! ```

mod commands;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(
    name = "autopilot",
    about = "Camera-to-wheels inference pipeline for small robots",
    version,
    author
)]
struct Cli {
    /// Path to a TOML pipeline configuration file.
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Enable verbose logging (repeat for more: -v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// How autonomy is switched off at the end of a drive.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum StopToggle {
    /// Stop after the configured safety delay.
    Plain,
    /// Stop after the most recent inference time.
    Announced,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive a simulated vehicle from a synthetic camera.
    Drive {
        /// Model to run (display name or imported file name).
        #[arg(short, long)]
        model: Option<String>,

        /// CPU threads for the interpreter.
        #[arg(short, long)]
        threads: Option<u32>,

        /// How long to drive, in seconds.
        #[arg(short, long, default_value_t = 3)]
        seconds: u64,

        /// Camera frame rate.
        #[arg(long, default_value_t = 30)]
        fps: u32,

        /// Switch to this thread count halfway through the drive.
        #[arg(long)]
        swap_threads: Option<u32>,

        /// How autonomy is switched off at the end.
        #[arg(long, value_enum, default_value_t = StopToggle::Plain)]
        toggle: StopToggle,

        /// Persist selections to this preferences file.
        #[arg(long)]
        preferences: Option<std::path::PathBuf>,
    },

    /// Show a model's declared geometry and the resolved frame transform.
    Inspect {
        /// Model to inspect (display name or imported file name).
        #[arg(short, long)]
        model: String,

        /// Camera frame size, e.g. "1280x720". Defaults to the configured size.
        #[arg(short, long)]
        frame: Option<String>,

        /// Screen rotation in degrees.
        #[arg(short, long)]
        rotation: Option<i32>,
    },

    /// List bundled and imported models.
    Models,

    /// Copy a model file into the models directory.
    Import {
        /// Model file to import.
        path: std::path::PathBuf,

        /// File name to store it under. Defaults to the source file name.
        #[arg(long)]
        name: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    commands::init_tracing(cli.verbose);
    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Drive {
            model,
            threads,
            seconds,
            fps,
            swap_threads,
            toggle,
            preferences,
        } => {
            let options = commands::drive::DriveOptions {
                model,
                threads,
                seconds,
                fps,
                swap_threads,
                toggle,
                preferences,
            };
            commands::drive::execute(config, options).await
        }
        Commands::Inspect {
            model,
            frame,
            rotation,
        } => commands::inspect::execute(config, model, frame, rotation).await,
        Commands::Models => commands::models::execute(config).await,
        Commands::Import { path, name } => commands::import::execute(config, path, name).await,
    }
}
