// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Session replacement.
//!
//! Requests are diffed on the caller's thread ([`ConfigChange`]); only real
//! changes reach the worker, where [`Worker::reconfigure`] closes the old
//! session before opening the new one. A reconfiguration never overlaps an
//! inference because both run on the worker.

use crate::config::InferenceConfig;
use crate::scheduler::Worker;
use crate::session::ModelSession;
use crate::state::PipelineState;
use std::fmt;

/// Which parts of an [`InferenceConfig`] differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConfigChange {
    pub model: bool,
    pub device: bool,
    pub threads: bool,
}

impl ConfigChange {
    pub fn between(current: &InferenceConfig, next: &InferenceConfig) -> Self {
        Self {
            model: current.descriptor != next.descriptor,
            device: current.device.device != next.device.device,
            threads: current.device.threads != next.device.threads,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.model || self.device || self.threads)
    }
}

impl fmt::Display for ConfigChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<&str> = [
            (self.model, "model"),
            (self.device, "device"),
            (self.threads, "threads"),
        ]
        .iter()
        .filter(|(changed, _)| *changed)
        .map(|(_, name)| *name)
        .collect();
        if parts.is_empty() {
            f.write_str("nothing")
        } else {
            f.write_str(&parts.join(" + "))
        }
    }
}

impl Worker {
    /// Replaces the session with one built from `config`.
    ///
    /// A frame claimed before the request keeps its claim and runs against
    /// the new session. On failure the pipeline stays sessionless until a
    /// later reconfiguration succeeds.
    pub(crate) fn reconfigure(&mut self, config: InferenceConfig) {
        let previous = self.shared.state.swap(PipelineState::Reconfiguring);
        tracing::info!("reconfiguring: {config}");
        self.shared.observer.on_tracking_reset();

        if let Some(mut old) = self.session.take() {
            old.close();
        }

        let opened =
            ModelSession::open(self.backend.as_ref(), &config.descriptor, &config.device);
        let succeeded = opened.is_ok();
        match opened {
            Ok(mut session) => {
                if let Err(e) = session.resolve_geometry(self.frame_size, self.orientation) {
                    tracing::debug!(
                        "geometry for {} frames not resolved yet: {e}",
                        self.frame_size
                    );
                }
                let resolution = session.input_size().to_string();
                let model = config.descriptor.name.clone();
                self.shared.snapshot.update(|s| {
                    s.model = Some(model);
                    s.input_resolution = Some(resolution.clone());
                    s.last_error = None;
                });
                self.shared.observer.on_input_resolution(&resolution);
                self.persist(&config);
                self.session = Some(session);
            }
            Err(e) => {
                tracing::warn!("failed to open '{}': {e}", config.descriptor.name);
                let message = e.to_string();
                self.shared.snapshot.update(|s| {
                    s.model = None;
                    s.input_resolution = None;
                    s.last_error = Some(message.clone());
                });
                self.shared.observer.on_error(&message);
            }
        }
        self.shared.stats.record_reconfiguration(succeeded);

        let next = match previous {
            PipelineState::Closed => PipelineState::Closed,
            PipelineState::Inferring => PipelineState::Inferring,
            _ if self.session.is_some() => PipelineState::Ready,
            _ => PipelineState::Idle,
        };
        if let Err(found) = self
            .shared
            .state
            .transition(PipelineState::Reconfiguring, next)
        {
            tracing::debug!("state changed to {found} during reconfiguration");
        }
    }

    fn persist(&self, config: &InferenceConfig) {
        let Some(preferences) = &self.shared.preferences else {
            return;
        };
        let result = preferences.update(&mut |s| {
            s.model = Some(config.descriptor.name.clone());
            s.device = Some(config.device.device);
            s.threads = Some(config.device.threads);
        });
        if let Err(e) = result {
            tracing::warn!("could not persist model selection: {e}");
        }
    }
}
