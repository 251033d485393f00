// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Frame admission and the inference worker.
//!
//! # Threading
//! ```text
//!  camera thread                      inference worker ("inference")
//!  ─────────────                      ──────────────────────────────
//!  admit(): Ready → Inferring ──┐
//!  (else drop)                  │ FIFO   ┌─► Process: warp → infer → actuate → Ready
//!                               ├──────► ├─► Reconfigure: close → open → Ready | Idle
//!  control thread               │        ├─► SafetyStop: arm timer
//!  reconfigure / toggle / stop ─┘        └─► Shutdown: fire timers, close, exit
//! ```
//! The worker owns the session. Everything other threads see is published
//! through [`Shared`].

use crate::actuation::ActuationGate;
use crate::backend::ModelBackend;
use crate::config::InferenceConfig;
use crate::error::PipelineError;
use crate::metrics::PipelineStats;
use crate::observer::PipelineObserver;
use crate::preferences::Preferences;
use crate::session::ModelSession;
use crate::state::{PipelineState, SnapshotCell, StateCell};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use frame_geometry::{Frame, SensorOrientation, Size};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

/// Name of the worker thread.
pub const WORKER_THREAD_NAME: &str = "inference";

/// Work items, executed strictly in posting order.
pub(crate) enum Task {
    /// Run a frame claimed by [`admit`].
    Process(Frame),
    /// Replace the session.
    Reconfigure(InferenceConfig),
    /// Force the wheels to zero at the given instant.
    SafetyStop(Instant),
    /// Exit after firing pending stops and closing the session.
    Shutdown,
}

/// State shared between the pipeline handle and the worker.
pub(crate) struct Shared {
    pub(crate) state: StateCell,
    pub(crate) stats: PipelineStats,
    pub(crate) snapshot: Arc<SnapshotCell>,
    pub(crate) gate: ActuationGate,
    pub(crate) observer: Arc<dyn PipelineObserver>,
    pub(crate) preferences: Option<Arc<dyn Preferences>>,
    /// Safety stops fired when the current frame was claimed.
    pub(crate) stops_at_claim: AtomicU64,
}

/// What happened to a frame offered to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDecision {
    /// Autonomy is off; the frame was not looked at.
    Ignored,
    /// The pipeline was not `Ready`; the frame was discarded.
    Dropped(PipelineState),
    /// The frame was claimed and queued for inference.
    Submitted,
}

/// Admission gate, run on the camera thread. Never blocks.
pub(crate) fn admit(shared: &Shared, frame: &Frame) -> FrameDecision {
    shared.stats.record_received();
    if !shared.gate.is_autonomous() {
        shared.stats.record_ignored();
        return FrameDecision::Ignored;
    }
    match shared
        .state
        .transition(PipelineState::Ready, PipelineState::Inferring)
    {
        Ok(()) => {
            shared
                .stops_at_claim
                .store(shared.stats.safety_stops(), Ordering::Release);
            FrameDecision::Submitted
        }
        Err(state) => {
            shared.stats.record_dropped();
            tracing::debug!(
                "frame {} dropped: pipeline {state}",
                frame.metadata().frame_number
            );
            FrameDecision::Dropped(state)
        }
    }
}

/// Handle to a running worker.
pub(crate) struct InferenceScheduler {
    tx: Sender<Task>,
    handle: JoinHandle<()>,
}

impl InferenceScheduler {
    /// Spawns the worker thread.
    pub(crate) fn spawn(
        shared: Arc<Shared>,
        backend: Arc<dyn ModelBackend>,
        frame_size: Size,
        orientation: SensorOrientation,
    ) -> Result<Self, PipelineError> {
        let (tx, rx) = channel::unbounded();
        let worker = Worker {
            shared,
            backend,
            session: None,
            frame_size,
            orientation,
            rx,
            stops: BinaryHeap::new(),
        };
        let handle = std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || worker.run())
            .map_err(PipelineError::WorkerSpawn)?;
        Ok(Self { tx, handle })
    }

    /// Queues a task. Returns `false` if the worker has exited.
    pub(crate) fn post(&self, task: Task) -> bool {
        self.tx.send(task).is_ok()
    }

    /// Queues shutdown behind everything already posted and joins the worker.
    pub(crate) fn shutdown(self) {
        if !self.post(Task::Shutdown) {
            tracing::debug!("inference worker already exited");
        }
        drop(self.tx);
        if let Err(payload) = self.handle.join() {
            tracing::error!("inference worker panicked: {}", panic_message(&*payload));
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Worker-local state. Lives on the worker thread only.
pub(crate) struct Worker {
    pub(crate) shared: Arc<Shared>,
    pub(crate) backend: Arc<dyn ModelBackend>,
    pub(crate) session: Option<ModelSession>,
    pub(crate) frame_size: Size,
    pub(crate) orientation: SensorOrientation,
    rx: Receiver<Task>,
    /// Pending safety stops, earliest first.
    stops: BinaryHeap<Reverse<Instant>>,
}

impl Worker {
    fn run(mut self) {
        tracing::info!("inference worker started");
        loop {
            let deadline = self.stops.peek().map(|Reverse(due)| *due);
            let received = match deadline {
                Some(due) => self.rx.recv_deadline(due),
                None => self.rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            let task = match received {
                Ok(task) => task,
                Err(RecvTimeoutError::Timeout) => {
                    self.fire_due_stops();
                    continue;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            };
            self.fire_due_stops();
            match task {
                Task::Process(frame) => self.process(frame),
                Task::Reconfigure(config) => self.reconfigure(config),
                Task::SafetyStop(due) => {
                    self.stops.push(Reverse(due));
                    self.fire_due_stops();
                }
                Task::Shutdown => break,
            }
        }
        self.finish();
    }

    fn process(&mut self, frame: Frame) {
        let frame_number = frame.metadata().frame_number;
        let Some(session) = self.session.as_mut() else {
            tracing::debug!("frame {frame_number} skipped: no session");
            self.shared.stats.record_skipped();
            self.release_claim();
            return;
        };
        if let Err(e) = session.prepare(&frame, self.orientation) {
            tracing::debug!("frame {frame_number} skipped: {e}");
            self.shared.stats.record_skipped();
            self.release_claim();
            return;
        }
        if frame.size() != self.frame_size {
            self.frame_size = frame.size();
        }

        let indicator = self.shared.gate.vehicle().indicator();
        let started = Instant::now();
        let result = session.infer(indicator);
        let elapsed = started.elapsed();

        match result {
            Ok(command) => {
                self.shared.stats.record_inference(elapsed);
                let elapsed_ms = self.shared.stats.last_processing_ms();
                self.shared
                    .snapshot
                    .update(|s| s.last_processing_ms = elapsed_ms);
                tracing::debug!(
                    "frame {frame_number}: l={:.3} r={:.3} in {elapsed:.2?}",
                    command.left,
                    command.right
                );
                if self.stopped_since_claim() {
                    tracing::debug!(
                        "frame {frame_number}: command dropped, vehicle already stopped"
                    );
                } else {
                    self.shared.gate.apply(command);
                }
                self.release_claim();
            }
            Err(e) => {
                tracing::error!("inference failed, closing session: {e}");
                self.shared.stats.record_inference_failure();
                if let Some(mut session) = self.session.take() {
                    session.close();
                }
                let message = e.to_string();
                self.shared.snapshot.update(|s| {
                    s.model = None;
                    s.input_resolution = None;
                    s.last_error = Some(message.clone());
                });
                self.shared.observer.on_error(&message);
                let _ = self
                    .shared
                    .state
                    .transition(PipelineState::Inferring, PipelineState::Idle);
            }
        }
    }

    /// A forced stop fired after this frame was claimed and autonomy is
    /// still off. The model's command must not override it.
    fn stopped_since_claim(&self) -> bool {
        !self.shared.gate.is_autonomous()
            && self.shared.stats.safety_stops()
                > self.shared.stops_at_claim.load(Ordering::Acquire)
    }

    /// Hands the claim back: `Ready` with a session, `Idle` without.
    /// A concurrent `stop()` wins.
    fn release_claim(&self) {
        let next = if self.session.is_some() {
            PipelineState::Ready
        } else {
            PipelineState::Idle
        };
        let _ = self
            .shared
            .state
            .transition(PipelineState::Inferring, next);
    }

    fn fire_due_stops(&mut self) {
        let now = Instant::now();
        let mut due = 0;
        while self.stops.peek().is_some_and(|Reverse(at)| *at <= now) {
            self.stops.pop();
            due += 1;
        }
        if due > 0 {
            self.safety_stop();
        }
    }

    fn safety_stop(&self) {
        self.shared.stats.record_safety_stop();
        self.shared.gate.force_stop();
        tracing::info!("safety stop issued");
    }

    fn finish(&mut self) {
        if !self.stops.is_empty() {
            tracing::info!(
                "firing {} pending safety stop(s) on shutdown",
                self.stops.len()
            );
            self.stops.clear();
            self.safety_stop();
        }
        if let Some(mut session) = self.session.take() {
            session.close();
        }
        self.shared.state.store(PipelineState::Closed);
        tracing::info!("inference worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuation::{AutonomyMode, ToggleSource, SAFETY_STOP_DELAY};
    use crate::control::SimulatedVehicle;
    use crate::observer::LogObserver;
    use frame_geometry::CaptureMetadata;
    use std::time::Duration;

    fn shared() -> Shared {
        let snapshot = Arc::new(SnapshotCell::default());
        Shared {
            state: StateCell::new(PipelineState::Idle),
            stats: PipelineStats::default(),
            gate: ActuationGate::new(
                Arc::new(SimulatedVehicle::new()),
                Arc::new(LogObserver),
                Arc::clone(&snapshot),
                SAFETY_STOP_DELAY,
            ),
            snapshot,
            observer: Arc::new(LogObserver),
            preferences: None,
            stops_at_claim: AtomicU64::new(0),
        }
    }

    fn frame(n: u64) -> Frame {
        Frame::filled(Size::new(4, 4), [0, 0, 0, 255], CaptureMetadata::now(n))
    }

    #[test]
    fn test_admit_ignores_in_manual_mode() {
        let s = shared();
        s.state.store(PipelineState::Ready);
        assert_eq!(admit(&s, &frame(0)), FrameDecision::Ignored);
        assert_eq!(s.state.load(), PipelineState::Ready);
        assert_eq!(s.stats.snapshot().frames_ignored, 1);
    }

    #[test]
    fn test_admit_claims_once() {
        let s = shared();
        s.gate
            .transition(AutonomyMode::Autonomous, ToggleSource::Plain, Duration::ZERO);
        s.state.store(PipelineState::Ready);

        assert_eq!(admit(&s, &frame(0)), FrameDecision::Submitted);
        assert_eq!(
            admit(&s, &frame(1)),
            FrameDecision::Dropped(PipelineState::Inferring)
        );
        s.state.store(PipelineState::Reconfiguring);
        assert_eq!(
            admit(&s, &frame(2)),
            FrameDecision::Dropped(PipelineState::Reconfiguring)
        );

        let stats = s.stats.snapshot();
        assert_eq!(stats.frames_received, 3);
        assert_eq!(stats.frames_dropped, 2);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*payload), "boom");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(&*payload), "bang");
        let payload: Box<dyn std::any::Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(&*payload), "unknown panic");
    }
}
