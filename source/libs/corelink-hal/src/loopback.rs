// Copyright 2026 CoreLink Contributors
// SPDX-License-Identifier: Apache-2.0

//! Scripted in-process implementations of the hardware seams.
//!
//! Host tests drive the protocol against these doubles: the transport records
//! every outbound request and can be told to report busy, the clock only
//! moves when advanced, and the flag board plays both sides of the readiness
//! exchange.

use std::cell::Cell;
use std::collections::VecDeque;

use crate::{
    Clock, Flag, Memory, Message, Readiness, Response, Result, Transport, TransportError,
    WordAddr, Width,
};

/// One recorded outbound transport request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Call {
    /// Scalar write toward the peer.
    Scalar {
        /// Peer destination address.
        dest: WordAddr,
        /// Value written.
        value: u32,
        /// Transfer width.
        width: Width,
    },
    /// Block write toward the peer.
    Block {
        /// Peer destination address.
        dest: WordAddr,
        /// Shared-visible staging source address.
        src: WordAddr,
        /// Length in words.
        words: u16,
    },
    /// Set-bits toward the peer.
    SetBits {
        /// Peer destination address.
        dest: WordAddr,
        /// Bits set.
        mask: u32,
        /// Transfer width.
        width: Width,
    },
    /// Clear-bits toward the peer.
    ClearBits {
        /// Peer destination address.
        dest: WordAddr,
        /// Bits cleared.
        mask: u32,
        /// Transfer width.
        width: Width,
    },
    /// Remote invocation toward the peer.
    Invoke {
        /// Peer destination address.
        dest: WordAddr,
        /// Invocation argument.
        argument: u32,
    },
    /// Acknowledgement sent back to the peer.
    Notify {
        /// Acknowledgement code.
        response: Response,
        /// Mirrored object address being acknowledged.
        addr: WordAddr,
    },
}

/// Transport double that records requests and replays scripted inbound
/// messages.
#[derive(Default)]
pub struct ScriptedTransport {
    calls: Vec<Call>,
    applied: Vec<Message>,
    inbound: VecDeque<Message>,
    busy_budget: u32,
}

impl ScriptedTransport {
    /// Creates an idle transport with nothing scripted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` outbound requests report [`TransportError::Busy`].
    pub fn fail_next(&mut self, count: u32) {
        self.busy_budget = count;
    }

    /// Queues a raw inbound message for `poll_inbound`.
    pub fn push_inbound(&mut self, message: Message) {
        self.inbound.push_back(message);
    }

    /// All outbound requests recorded so far, oldest first.
    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    /// All peer commands applied locally so far.
    pub fn applied(&self) -> &[Message] {
        &self.applied
    }

    fn admit(&mut self, call: Call) -> Result<()> {
        if self.busy_budget > 0 {
            self.busy_budget -= 1;
            return Err(TransportError::Busy);
        }
        self.calls.push(call);
        Ok(())
    }
}

impl Transport for ScriptedTransport {
    fn send_scalar(&mut self, dest: WordAddr, value: u32, width: Width) -> Result<()> {
        self.admit(Call::Scalar { dest, value, width })
    }

    fn send_block(&mut self, dest: WordAddr, src: WordAddr, words: u16) -> Result<()> {
        self.admit(Call::Block { dest, src, words })
    }

    fn set_bits(&mut self, dest: WordAddr, mask: u32, width: Width) -> Result<()> {
        self.admit(Call::SetBits { dest, mask, width })
    }

    fn clear_bits(&mut self, dest: WordAddr, mask: u32, width: Width) -> Result<()> {
        self.admit(Call::ClearBits { dest, mask, width })
    }

    fn call(&mut self, dest: WordAddr, argument: u32) -> Result<()> {
        self.admit(Call::Invoke { dest, argument })
    }

    fn notify(&mut self, response: Response, addr: WordAddr) -> Result<()> {
        self.admit(Call::Notify { response, addr })
    }

    fn poll_inbound(&mut self) -> Option<Message> {
        self.inbound.pop_front()
    }

    fn apply(&mut self, message: &Message) {
        self.applied.push(*message);
    }
}

/// Deterministic counter that only moves when the test advances it.
#[derive(Default)]
pub struct ManualClock {
    now: Cell<u64>,
    auto_tick: Cell<u64>,
}

impl ManualClock {
    /// Creates a clock starting at `start` ticks.
    pub fn starting_at(start: u64) -> Self {
        Self { now: Cell::new(start), auto_tick: Cell::new(0) }
    }

    /// Advances the counter by `ticks`, wrapping like the hardware counter.
    pub fn advance(&self, ticks: u64) {
        self.now.set(self.now.get().wrapping_add(ticks));
    }

    /// Makes every `now()` read advance the counter by `ticks`, so code that
    /// spin-waits on the clock runs out of budget without a second thread.
    pub fn set_auto_tick(&self, ticks: u64) {
        self.auto_tick.set(ticks);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        let now = self.now.get();
        self.now.set(now.wrapping_add(self.auto_tick.get()));
        now
    }
}

/// Both sides of the readiness flag exchange, test-settable.
#[derive(Default)]
pub struct FlagBoard {
    local: [bool; Flag::COUNT],
    peer: [bool; Flag::COUNT],
}

impl FlagBoard {
    /// Creates a board with no flags raised on either side.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises a flag on the peer side.
    pub fn raise_peer(&mut self, flag: Flag) {
        self.peer[flag.index()] = true;
    }
}

impl Readiness for FlagBoard {
    fn signal(&mut self, flag: Flag) {
        self.local[flag.index()] = true;
    }

    fn local(&self, flag: Flag) -> bool {
        self.local[flag.index()]
    }

    fn peer(&self, flag: Flag) -> bool {
        self.peer[flag.index()]
    }
}

/// Word-addressed memory backed by an array, standing in for the
/// application-owned data the protocol reads at send time.
pub struct ArrayMemory<const WORDS: usize> {
    base: u32,
    words: [u16; WORDS],
}

impl<const WORDS: usize> ArrayMemory<WORDS> {
    /// Creates a zeroed region whose first word lives at word address `base`.
    pub fn new(base: u32) -> Self {
        Self { base, words: [0; WORDS] }
    }

    fn index(&self, addr: WordAddr) -> Option<usize> {
        let off = addr.0.checked_sub(self.base)? as usize;
        (off < WORDS).then_some(off)
    }

    /// Stores a 16-bit word at `addr`.
    pub fn write_word(&mut self, addr: WordAddr, value: u16) {
        if let Some(i) = self.index(addr) {
            self.words[i] = value;
        }
    }

    /// Stores a 32-bit value at `addr` (low word first).
    pub fn write_dword(&mut self, addr: WordAddr, value: u32) {
        if let Some(i) = self.index(addr) {
            if i + 1 < WORDS {
                self.words[i] = value as u16;
                self.words[i + 1] = (value >> 16) as u16;
            }
        }
    }
}

impl<const WORDS: usize> Memory for ArrayMemory<WORDS> {
    fn load(&self, addr: WordAddr, width: Width) -> Option<u32> {
        let i = self.index(addr)?;
        match width {
            Width::Word => Some(self.words[i] as u32),
            Width::DWord => {
                if i + 1 >= WORDS {
                    return None;
                }
                Some(self.words[i] as u32 | (self.words[i + 1] as u32) << 16)
            }
        }
    }

    fn read_block(&self, addr: WordAddr, out: &mut [u16]) -> bool {
        let Some(i) = self.index(addr) else {
            return false;
        };
        if i + out.len() > WORDS {
            return false;
        }
        out.copy_from_slice(&self.words[i..i + out.len()]);
        true
    }

    fn contains(&self, addr: WordAddr, words: u16) -> bool {
        match self.index(addr) {
            Some(i) => i + words as usize <= WORDS,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_reports_busy_then_recovers() {
        let mut transport = ScriptedTransport::new();
        transport.fail_next(1);
        let err = transport.call(WordAddr(1), 7).unwrap_err();
        assert_eq!(err, TransportError::Busy);
        transport.call(WordAddr(1), 7).unwrap();
        assert_eq!(transport.calls().len(), 1);
    }

    #[test]
    fn memory_reads_are_bounds_checked() {
        let mut mem = ArrayMemory::<4>::new(0x100);
        mem.write_dword(WordAddr(0x102), 0xABCD_1234);
        assert_eq!(mem.load(WordAddr(0x102), Width::DWord), Some(0xABCD_1234));
        assert_eq!(mem.load(WordAddr(0x103), Width::DWord), None);
        assert!(!mem.contains(WordAddr(0x0FF), 1));
        assert!(mem.contains(WordAddr(0x100), 4));
        assert!(!mem.contains(WordAddr(0x100), 5));
    }
}
