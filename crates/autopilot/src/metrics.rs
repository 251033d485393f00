// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Pipeline counters.
//!
//! [`PipelineStats`] is updated lock-free from the camera thread and the
//! inference worker; [`StatsSnapshot`] is the serialisable copy handed out.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Live counters.
#[derive(Debug, Default)]
pub(crate) struct PipelineStats {
    frames_received: AtomicU64,
    frames_ignored: AtomicU64,
    frames_dropped: AtomicU64,
    frames_processed: AtomicU64,
    frames_skipped: AtomicU64,
    inference_failures: AtomicU64,
    reconfigurations: AtomicU64,
    load_failures: AtomicU64,
    safety_stops: AtomicU64,
    last_processing_ms: AtomicU64,
    total_processing_us: AtomicU64,
}

impl PipelineStats {
    pub(crate) fn record_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Frame arrived while autonomy was off.
    pub(crate) fn record_ignored(&self) {
        self.frames_ignored.fetch_add(1, Ordering::Relaxed);
    }

    /// Frame arrived while the pipeline was busy or sessionless.
    pub(crate) fn record_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Frame claimed but not run (no session, or geometry could not be resolved).
    pub(crate) fn record_skipped(&self) {
        self.frames_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a completed inference. The published latency is rounded up
    /// to whole milliseconds and never reads 0 once an inference has run.
    pub(crate) fn record_inference(&self, elapsed: Duration) {
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
        self.total_processing_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        let ms = elapsed.as_micros().div_ceil(1000).max(1);
        self.last_processing_ms
            .store(u64::try_from(ms).unwrap_or(u64::MAX), Ordering::Release);
    }

    pub(crate) fn record_inference_failure(&self) {
        self.inference_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reconfiguration(&self, succeeded: bool) {
        self.reconfigurations.fetch_add(1, Ordering::Relaxed);
        if !succeeded {
            self.load_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_safety_stop(&self) {
        self.safety_stops.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn safety_stops(&self) -> u64 {
        self.safety_stops.load(Ordering::Acquire)
    }

    pub(crate) fn last_processing_ms(&self) -> u64 {
        self.last_processing_ms.load(Ordering::Acquire)
    }

    pub(crate) fn snapshot(&self) -> StatsSnapshot {
        let processed = self.frames_processed.load(Ordering::Relaxed);
        let total_us = self.total_processing_us.load(Ordering::Relaxed);
        StatsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_ignored: self.frames_ignored.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            frames_processed: processed,
            frames_skipped: self.frames_skipped.load(Ordering::Relaxed),
            inference_failures: self.inference_failures.load(Ordering::Relaxed),
            reconfigurations: self.reconfigurations.load(Ordering::Relaxed),
            load_failures: self.load_failures.load(Ordering::Relaxed),
            safety_stops: self.safety_stops(),
            last_processing_ms: self.last_processing_ms(),
            mean_processing: if processed == 0 {
                Duration::ZERO
            } else {
                Duration::from_micros(total_us / processed)
            },
        }
    }
}

/// Point-in-time copy of the pipeline counters.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct StatsSnapshot {
    pub frames_received: u64,
    /// Frames that arrived in manual mode.
    pub frames_ignored: u64,
    /// Frames refused at the admission gate.
    pub frames_dropped: u64,
    pub frames_processed: u64,
    /// Frames admitted but not run.
    pub frames_skipped: u64,
    pub inference_failures: u64,
    pub reconfigurations: u64,
    pub load_failures: u64,
    pub safety_stops: u64,
    pub last_processing_ms: u64,
    pub mean_processing: Duration,
}

impl StatsSnapshot {
    /// Throughput estimate from the last inference, as shown to the operator.
    pub fn fps(&self) -> Option<u64> {
        (self.last_processing_ms > 0).then(|| 1000 / self.last_processing_ms)
    }

    /// Share of received frames that reached the model.
    pub fn processed_ratio(&self) -> f64 {
        if self.frames_received == 0 {
            return 0.0;
        }
        self.frames_processed as f64 / self.frames_received as f64
    }

    /// Human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "Frames: {} received, {} processed ({:.1}%), {} dropped, {} ignored, {} skipped\n\
             Inference: last {} ms, mean {:.2?}, {} failures\n\
             Sessions: {} reconfigurations, {} load failures\n\
             Safety stops: {}",
            self.frames_received,
            self.frames_processed,
            self.processed_ratio() * 100.0,
            self.frames_dropped,
            self.frames_ignored,
            self.frames_skipped,
            self.last_processing_ms,
            self.mean_processing,
            self.inference_failures,
            self.reconfigurations,
            self.load_failures,
            self.safety_stops,
        )
    }
}
