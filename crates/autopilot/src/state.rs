// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Pipeline state shared across threads.
//!
//! The camera thread, the control thread and the inference worker only ever
//! meet here: an atomic [`PipelineState`] that gates frame admission, and an
//! immutable [`PipelineSnapshot`] that the worker republishes.

use crate::actuation::AutonomyMode;
use crate::control::AppliedSpeeds;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, RwLock};

/// Lifecycle of the pipeline.
///
/// ```text
///         start()        open ok          claim frame
///  Closed ───────► Idle ─────────► Ready ───────────► Inferring
///                   ▲  ▲  open err   ▲ ◄─────────────────┘
///                   │  └─────────────┤      done
///                   │                ▼
///                   └──────── Reconfiguring
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[repr(u8)]
pub enum PipelineState {
    /// No usable session; frames are dropped.
    Idle = 0,
    /// A session is open and the next frame may be claimed.
    Ready = 1,
    /// A frame has been claimed and is queued or running.
    Inferring = 2,
    /// The worker is replacing the session.
    Reconfiguring = 3,
    /// The pipeline is stopped or stopping.
    Closed = 4,
}

impl PipelineState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Idle,
            1 => Self::Ready,
            2 => Self::Inferring,
            3 => Self::Reconfiguring,
            _ => Self::Closed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Ready => "ready",
            Self::Inferring => "inferring",
            Self::Reconfiguring => "reconfiguring",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lock-free holder of a [`PipelineState`].
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new(state: PipelineState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn load(&self) -> PipelineState {
        PipelineState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn store(&self, state: PipelineState) {
        self.0.store(state as u8, Ordering::Release);
    }

    pub(crate) fn swap(&self, state: PipelineState) -> PipelineState {
        PipelineState::from_u8(self.0.swap(state as u8, Ordering::AcqRel))
    }

    /// Moves `from → to` atomically. On failure returns the state found.
    pub(crate) fn transition(
        &self,
        from: PipelineState,
        to: PipelineState,
    ) -> Result<(), PipelineState> {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(PipelineState::from_u8)
    }
}

/// Read-only view of what the pipeline last published.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PipelineSnapshot {
    /// Name of the model in the open session.
    pub model: Option<String>,
    /// Model input size as `"WxH"`, once a session is open.
    pub input_resolution: Option<String>,
    /// Duration of the most recent inference.
    pub last_processing_ms: u64,
    /// Speeds the vehicle reported after the last command.
    pub applied: Option<AppliedSpeeds>,
    pub autonomy: AutonomyMode,
    /// Last user-facing error, cleared by a successful reconfiguration.
    pub last_error: Option<String>,
}

impl Default for PipelineSnapshot {
    fn default() -> Self {
        Self {
            model: None,
            input_resolution: None,
            last_processing_ms: 0,
            applied: None,
            autonomy: AutonomyMode::Manual,
            last_error: None,
        }
    }
}

/// Copy-on-write publication point for [`PipelineSnapshot`].
#[derive(Debug, Default)]
pub(crate) struct SnapshotCell(RwLock<Arc<PipelineSnapshot>>);

impl SnapshotCell {
    pub(crate) fn load(&self) -> Arc<PipelineSnapshot> {
        match self.0.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Publishes a modified copy of the current snapshot.
    pub(crate) fn update(&self, f: impl FnOnce(&mut PipelineSnapshot)) {
        let mut guard = match self.0.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut next = PipelineSnapshot::clone(&guard);
        f(&mut next);
        *guard = Arc::new(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_only_from_expected_state() {
        let cell = StateCell::new(PipelineState::Ready);
        assert!(cell.transition(PipelineState::Ready, PipelineState::Inferring).is_ok());
        assert_eq!(
            cell.transition(PipelineState::Ready, PipelineState::Inferring),
            Err(PipelineState::Inferring)
        );
        assert_eq!(cell.swap(PipelineState::Closed), PipelineState::Inferring);
        assert_eq!(cell.load(), PipelineState::Closed);
    }

    #[test]
    fn test_snapshot_update_does_not_touch_old_readers() {
        let cell = SnapshotCell::default();
        let before = cell.load();
        cell.update(|s| s.input_resolution = Some("256x96".into()));
        assert_eq!(before.input_resolution, None);
        assert_eq!(cell.load().input_resolution.as_deref(), Some("256x96"));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(PipelineState::Reconfiguring.to_string(), "reconfiguring");
    }
}
