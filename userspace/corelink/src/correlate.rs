// Copyright 2026 CoreLink Contributors
// SPDX-License-Identifier: Apache-2.0

//! Inbound message dispatch and response correlation.
//!
//! Each orchestrator pass drains at most one queued message. Peer commands
//! are applied through the driver and acknowledged (block reads excepted);
//! notify messages are correlated back to the object whose mirrored address
//! they name, by scanning the whole table. A notification that matches no
//! mirrored address is ignored outright.

use corelink_hal::{Clock, Command, Memory, Message, Readiness, Response, Transport};

use crate::object::ObjState;
use crate::Link;

impl<M: Memory, T: Transport, C: Clock, R: Readiness> Link<'_, M, T, C, R> {
    /// Dequeues and handles one inbound message, if any is pending.
    pub(crate) fn drain_one(&mut self) -> bool {
        let Some(message) = self.queue.pop() else {
            return false;
        };
        match message.command {
            Command::Notify => self.correlate(&message),
            command => {
                self.transport.apply(&message);
                if let Some(response) = Response::for_command(command) {
                    if self.transport.notify(response, message.addr).is_err() {
                        // The peer's timeout will re-drive the transfer.
                        log::debug!("ack for {command:?} dropped, transport busy");
                    }
                }
            }
        }
        true
    }

    /// Advances the object whose mirrored address the notification names.
    fn correlate(&mut self, message: &Message) {
        let Some(response) = Response::from_code(message.data1) else {
            log::debug!("unknown notify code {:#010x} ignored", message.data1);
            return;
        };
        let Link { table, arena, .. } = self;
        let Some(handle) = table.find_by_mirror(message.addr) else {
            log::debug!("notify for unmapped address {:#010x} ignored", message.addr.0);
            return;
        };
        let desc = table.descriptor_mut(handle);
        match desc.state {
            ObjState::AwaitingResponse => {
                if let Some(stage) = desc.stage.take() {
                    arena.release(stage);
                }
                desc.state = ObjState::Idle;
                log::debug!("object {handle} acknowledged ({response:?})");
            }
            ObjState::Idle => {}
            _ => {
                // An ack we never asked for; force the object back through
                // classification rather than trusting its current state.
                if let Some(stage) = desc.stage.take() {
                    arena.release(stage);
                }
                desc.state = ObjState::Unknown;
                log::debug!("object {handle} got an unexpected ack, reset");
            }
        }
    }
}
