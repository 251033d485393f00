// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Compute device selection.

use crate::RegistryError;
use std::fmt;
use std::str::FromStr;

/// Lowest thread count the operator controls allow.
pub const MIN_UI_THREADS: u32 = 1;
/// Highest thread count the operator controls allow.
pub const MAX_UI_THREADS: u32 = 9;

/// Where inference runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    #[default]
    Cpu,
    /// GPU delegate.
    Gpu,
    /// Android neural-network accelerator delegate.
    Nnapi,
}

impl Device {
    /// Returns `true` for the accelerator devices.
    pub fn is_accelerator(&self) -> bool {
        !matches!(self, Self::Cpu)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Gpu => "gpu",
            Self::Nnapi => "nnapi",
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Device {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "gpu" => Ok(Self::Gpu),
            "nnapi" => Ok(Self::Nnapi),
            other => Err(RegistryError::UnknownDevice(other.to_string())),
        }
    }
}

/// Compute device plus CPU thread count.
///
/// The thread count is kept even when an accelerator is selected, so that
/// switching back to the CPU restores the previous setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct DeviceConfig {
    pub device: Device,
    pub threads: u32,
}

impl DeviceConfig {
    pub fn new(device: Device, threads: u32) -> Self {
        Self { device, threads }
    }

    /// CPU execution with `threads` worker threads.
    pub fn cpu(threads: u32) -> Self {
        Self::new(Device::Cpu, threads)
    }

    /// Thread count the runtime should use, or `None` when it does not apply.
    pub fn effective_threads(&self) -> Option<u32> {
        (self.device == Device::Cpu).then_some(self.threads)
    }

    /// One more thread, capped at [`MAX_UI_THREADS`].
    pub fn more_threads(&self) -> Self {
        Self {
            threads: self
                .threads
                .saturating_add(1)
                .clamp(MIN_UI_THREADS, MAX_UI_THREADS),
            ..*self
        }
    }

    /// One fewer thread, floored at [`MIN_UI_THREADS`].
    pub fn fewer_threads(&self) -> Self {
        Self {
            threads: self
                .threads
                .saturating_sub(1)
                .clamp(MIN_UI_THREADS, MAX_UI_THREADS),
            ..*self
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self::cpu(4)
    }
}

impl fmt::Display for DeviceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.effective_threads() {
            Some(n) => write!(f, "{} ({n} threads)", self.device),
            None => write!(f, "{}", self.device),
        }
    }
}
