// Copyright 2026 CoreLink Contributors
// SPDX-License-Identifier: Apache-2.0

//! Top-level application state machine.
//!
//! `run_once` is called from the core's idle loop. Every call drains one
//! correlator message, then advances the phase: wait for both cores to
//! report ready, push every startup-flagged object to the peer once, then
//! poll all objects for the rest of the process lifetime.

use corelink_hal::{Clock, Flag, Memory, Readiness, Transport};

use crate::object;
use crate::{Link, Role, MAX_OBJECTS};

/// Phase of the application orchestrator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppState {
    /// Waiting for both cores' readiness flags.
    Unknown,
    /// Driving every registered object through its first delivery.
    StartupBroadcast,
    /// Steady state: poll every object once per call.
    Started,
    /// Quiescent fallback; nothing is driven.
    Idle,
}

impl<M: Memory, T: Transport, C: Clock, R: Readiness> Link<'_, M, T, C, R> {
    /// Performs one cooperative step: one correlator drain plus one
    /// orchestrator advance. Never blocks.
    pub fn run_once(&mut self) {
        self.drain_one();
        match self.app {
            AppState::Unknown => {
                if self.handshake_complete() {
                    log::info!("both cores ready, starting broadcast");
                    self.app = AppState::StartupBroadcast;
                }
            }
            AppState::StartupBroadcast => self.broadcast_pass(),
            AppState::Started => self.step_all(),
            AppState::Idle => {}
        }
    }

    /// Current orchestrator phase.
    pub fn app_state(&self) -> AppState {
        self.app
    }

    /// Whether the startup broadcast finished and steady-state polling runs.
    pub fn started(&self) -> bool {
        self.app == AppState::Started
    }

    fn handshake_complete(&self) -> bool {
        let both_ready =
            self.flags.local(Flag::ApiReady) && self.flags.peer(Flag::ApiReady);
        match self.role {
            Role::Initiator => both_ready,
            // The responder also waits for the initiator's application to
            // come up, so its broadcast never races the peer's bring-up.
            Role::Responder => both_ready && self.flags.peer(Flag::AppStarted),
        }
    }

    fn step_all(&mut self) {
        let Link { mem, transport, clock, table, arena, config, .. } = self;
        for handle in 0..MAX_OBJECTS {
            let (desc, mirror) = table.pair_mut(handle);
            object::step(handle, desc, mirror, mem, transport, arena, clock, config);
        }
    }

    fn broadcast_pass(&mut self) {
        self.step_all();
        if self.table.all_settled() {
            self.flags.signal(Flag::AppStarted);
            self.app = AppState::Started;
            log::info!("startup broadcast complete");
            return;
        }
        // A startup-mandated object that parked in Fail stalls the phase;
        // re-arm the failed set a bounded number of times, then hold.
        if self.table.stalled_on_failure() {
            if self.startup_attempts_used < self.config.startup_attempts {
                self.startup_attempts_used += 1;
                log::warn!(
                    "startup broadcast attempt {} re-arming failed objects",
                    self.startup_attempts_used,
                );
                self.table.rearm_failed_startup();
            }
        }
    }
}
