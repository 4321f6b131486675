// Copyright 2026 CoreLink Contributors
// SPDX-License-Identifier: Apache-2.0

//! Interrupt-side glue: move everything the hardware has pending into the
//! inbound queue, then return.
//!
//! This is the only code meant to run in the interrupt context. It never
//! parses messages; classification and correlation happen later, in the
//! cooperative loop via [`crate::Link::run_once`]. When the queue is full the
//! remaining messages are still drained from the hardware (the mailbox must
//! be released for the peer) and counted as drops by the ring itself.

use corelink_hal::Transport;

use crate::InboundQueue;

/// Drains the transport's pending inbound messages into `queue`.
///
/// Returns how many were accepted; the ring's drop counter records the rest.
pub fn pump<T: Transport>(transport: &mut T, queue: &InboundQueue) -> usize {
    let mut accepted = 0;
    while let Some(message) = transport.poll_inbound() {
        if queue.push(message).is_ok() {
            accepted += 1;
        }
    }
    accepted
}

#[cfg(test)]
mod tests {
    use super::*;
    use corelink_hal::loopback::ScriptedTransport;
    use corelink_hal::{Command, Message, WordAddr};
    use corelink_ring::SpscRing;

    use crate::INBOUND_DEPTH;

    fn message(n: u32) -> Message {
        Message { command: Command::DataWrite, addr: WordAddr(n), data1: n, data2: 0 }
    }

    #[test]
    fn pump_moves_everything_pending() {
        let mut transport = ScriptedTransport::new();
        for n in 0..3 {
            transport.push_inbound(message(n));
        }
        let queue: InboundQueue = SpscRing::new();
        assert_eq!(pump(&mut transport, &queue), 3);
        assert_eq!(queue.len(), 3);
        assert!(transport.poll_inbound().is_none());
    }

    #[test]
    fn overflow_still_drains_the_hardware_and_counts_drops() {
        let mut transport = ScriptedTransport::new();
        for n in 0..(INBOUND_DEPTH as u32 + 4) {
            transport.push_inbound(message(n));
        }
        let queue: InboundQueue = SpscRing::new();
        assert_eq!(pump(&mut transport, &queue), INBOUND_DEPTH);
        assert_eq!(queue.drops(), 4);
        assert!(transport.poll_inbound().is_none());
        // Oldest messages survive; the overflow was dropped, not the backlog.
        assert_eq!(queue.pop(), Some(message(0)));
    }
}
