// Copyright 2026 CoreLink Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Typed object exchange between two cores over shared memory.
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Unstable
//!
//! PUBLIC API:
//!   - Link: owned context (registry + staging arena + inbound queue view)
//!   - Link::init(): two-phase readiness handshake, caller-budgeted
//!   - Link::register() / map_peer() / request_send() / state_of()
//!   - Link::run_once(): one correlator drain + one orchestrator step
//!   - isr::pump(): interrupt-side glue feeding the inbound queue
//!
//! The low-level transport (message send, flag set/acknowledge, block/data
//! wire encoding) is an external collaborator behind the `corelink-hal`
//! traits. This crate owns everything above it: the fixed object table, the
//! per-object transfer state machine with retry and timeout, the startup
//! handshake and broadcast, and the correlation of asynchronous
//! acknowledgements back to the object that caused them.
//!
//! Everything runs in one cooperative context per core; only the inbound
//! queue is also touched by the interrupt context, through [`isr::pump`].

#![cfg_attr(not(test), no_std)]
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod app;
mod correlate;
mod error;
pub mod isr;
mod object;
mod table;

pub use app::AppState;
pub use error::{Error, Result};
pub use object::{ObjKind, ObjState};

use corelink_arena::Arena;
use corelink_hal::{Clock, Flag, Memory, Message, Readiness, Transport, Width, WordAddr};
use corelink_ring::SpscRing;

use table::ObjectTable;

/// Number of object slots per core.
pub const MAX_OBJECTS: usize = 10;

/// Capacity of the inbound message queue.
pub const INBOUND_DEPTH: usize = MAX_OBJECTS;

/// Size of the staging arena in 16-bit words.
pub const STAGING_WORDS: usize = 4096;

/// The inbound queue: written by the interrupt context, drained by
/// [`Link::run_once`].
pub type InboundQueue = SpscRing<Message, INBOUND_DEPTH>;

/// Which side of the bring-up sequence this core plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Owns shared-RAM configuration and signals readiness first.
    Initiator,
    /// Waits for the initiator at each bring-up step.
    Responder,
}

/// Tunables of the synchronization layer.
///
/// The defaults mirror the protocol's reference platform: a 200 MHz
/// free-running counter, 5 ms response and retry windows, three retries.
#[derive(Clone, Copy, Debug)]
pub struct LinkConfig {
    /// Ticks to wait for an acknowledgement before retrying.
    pub response_window: u64,
    /// Ticks to back off before re-entering `Writing`.
    pub retry_window: u64,
    /// Write attempts granted beyond the first, per transfer.
    pub retry_budget: u8,
    /// Startup broadcast re-arm passes granted for failed objects.
    pub startup_attempts: u8,
    /// Word address of the staging arena within shared RAM.
    pub staging_base: u32,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            response_window: 1_000_000,
            retry_window: 1_000_000,
            retry_budget: 3,
            startup_attempts: 3,
            staging_base: 0xF000,
        }
    }
}

const SPIN_CHECK_MASK: usize = 0x7f; // consult the counter every 128 spins

/// Owned context for one core's half of the exchange.
///
/// All fields live in this struct rather than ambient globals: the registry
/// and arena belong to the cooperative loop, while `queue` is the one
/// structure shared with the interrupt context.
pub struct Link<'q, M, T, C, R> {
    pub(crate) mem: M,
    pub(crate) transport: T,
    pub(crate) clock: C,
    pub(crate) flags: R,
    pub(crate) role: Role,
    pub(crate) config: LinkConfig,
    pub(crate) queue: &'q InboundQueue,
    pub(crate) table: ObjectTable,
    pub(crate) arena: Arena<STAGING_WORDS>,
    pub(crate) app: AppState,
    pub(crate) startup_attempts_used: u8,
}

impl<'q, M: Memory, T: Transport, C: Clock, R: Readiness> Link<'q, M, T, C, R> {
    /// Builds an idle context around the platform seams.
    ///
    /// `queue` is the inbound ring shared with the interrupt context; hand
    /// the same reference to [`isr::pump`].
    pub fn new(
        mem: M,
        transport: T,
        clock: C,
        flags: R,
        role: Role,
        queue: &'q InboundQueue,
        config: LinkConfig,
    ) -> Self {
        Self {
            mem,
            transport,
            clock,
            flags,
            role,
            config,
            queue,
            table: ObjectTable::new(),
            arena: Arena::new(),
            app: AppState::Unknown,
            startup_attempts_used: 0,
        }
    }

    /// One-time bring-up: shared-RAM ownership hand-off, then the
    /// `ApiReady` exchange.
    ///
    /// Deliberately spin-waits for the peer, bounded by `budget` ticks of
    /// the free-running counter — the timeout policy stays with the caller.
    pub fn init(&mut self, budget: u64) -> Result<()> {
        let start = self.clock.now();
        match self.role {
            Role::Initiator => self.flags.signal(Flag::SramConfigured),
            Role::Responder => self.wait_peer(Flag::SramConfigured, start, budget)?,
        }
        match self.role {
            Role::Initiator => self.flags.signal(Flag::ApiReady),
            Role::Responder => {
                self.wait_peer(Flag::ApiReady, start, budget)?;
                self.flags.signal(Flag::ApiReady);
            }
        }
        log::info!("initialized as {:?}", self.role);
        Ok(())
    }

    fn wait_peer(&self, flag: Flag, start: u64, budget: u64) -> Result<()> {
        let mut spins: usize = 0;
        while !self.flags.peer(flag) {
            if spins & SPIN_CHECK_MASK == 0 && self.clock.expired(start, budget) {
                log::warn!("peer never raised {flag:?}");
                return Err(Error::HandshakeTimeout);
            }
            core::hint::spin_loop();
            spins = spins.wrapping_add(1);
        }
        Ok(())
    }

    /// Registers `handle` as a transferable object backed by the
    /// application's live storage at `addr`, `words` 16-bit words long.
    ///
    /// Objects flagged `startup` are pushed to the peer during the startup
    /// broadcast and must succeed for the broadcast to complete.
    pub fn register(
        &mut self,
        handle: usize,
        kind: ObjKind,
        addr: WordAddr,
        words: u16,
        startup: bool,
    ) -> Result<()> {
        if handle >= MAX_OBJECTS {
            return Err(Error::BadHandle);
        }
        // A zero-length object can never be dispatched; refuse it here
        // instead of letting the retry loop grind against it.
        if words == 0 {
            return Err(Error::UnsupportedLength);
        }
        if !self.mem.contains(addr, words) {
            return Err(Error::InvalidAddress);
        }
        self.table.register(handle, kind, addr, words, startup)
    }

    /// Records the peer's mirrored address for `handle`.
    ///
    /// Populated by the handshake/driver glue; objects without a mirror
    /// cannot be sent.
    pub fn map_peer(&mut self, handle: usize, addr: WordAddr) -> Result<()> {
        if handle >= MAX_OBJECTS {
            return Err(Error::BadHandle);
        }
        self.table.map_peer(handle, addr);
        Ok(())
    }

    /// Sets the argument a `FunctionCall` object forwards on each send.
    pub fn set_argument(&mut self, handle: usize, argument: u32) -> Result<()> {
        if handle >= MAX_OBJECTS {
            return Err(Error::BadHandle);
        }
        let desc = self.table.descriptor_mut(handle);
        if desc.local.is_none() {
            return Err(Error::InvalidAddress);
        }
        desc.argument = argument;
        Ok(())
    }

    /// Current state of an object's transfer state machine.
    ///
    /// Out-of-range handles read as [`ObjState::Free`], the same as a slot
    /// that was never registered.
    pub fn state_of(&self, handle: usize) -> ObjState {
        if handle >= MAX_OBJECTS {
            return ObjState::Free;
        }
        self.table.descriptor(handle).state
    }

    /// Whether the object's last transfer ended in terminal failure.
    pub fn last_error(&self, handle: usize) -> bool {
        handle < MAX_OBJECTS && self.table.descriptor(handle).error
    }

    /// Requests one transfer of `handle` to the peer.
    ///
    /// Accepted only while the object is idle; the transfer itself is driven
    /// by subsequent [`Link::run_once`] calls. A request against an object
    /// mid-transfer is refused without touching its retry budget or timer.
    pub fn request_send(&mut self, handle: usize) -> Result<()> {
        if handle >= MAX_OBJECTS {
            return Err(Error::BadHandle);
        }
        let desc = self.table.descriptor_mut(handle);
        if desc.state != ObjState::Idle {
            return Err(Error::NotReady);
        }
        desc.state = ObjState::Init;
        Ok(())
    }

    /// Sets `mask` bits on the peer's copy of `handle`, right now.
    ///
    /// Unsupervised: this bypasses the object state machine, is not retried,
    /// and reports the transport's own verdict. Intended for urgent one-shot
    /// flag signalling only. Restricted to one- and two-word objects; wider
    /// objects are refused with [`Error::UnsupportedLength`].
    pub fn set_bits(&mut self, handle: usize, mask: u32) -> Result<()> {
        let (dest, width) = self.bit_target(handle)?;
        self.transport
            .set_bits(dest, mask, width)
            .map_err(|_| Error::TransportBusy)
    }

    /// Clears `mask` bits on the peer's copy of `handle`, right now.
    ///
    /// Unsupervised, like [`Link::set_bits`], with the same width
    /// restriction.
    pub fn clear_bits(&mut self, handle: usize, mask: u32) -> Result<()> {
        let (dest, width) = self.bit_target(handle)?;
        self.transport
            .clear_bits(dest, mask, width)
            .map_err(|_| Error::TransportBusy)
    }

    fn bit_target(&self, handle: usize) -> Result<(WordAddr, Width)> {
        if handle >= MAX_OBJECTS {
            return Err(Error::BadHandle);
        }
        let desc = self.table.descriptor(handle);
        if desc.local.is_none() {
            return Err(Error::InvalidAddress);
        }
        let width = Width::from_words(desc.words).ok_or(Error::UnsupportedLength)?;
        let dest = self.table.mirror(handle).ok_or(Error::PeerUnmapped)?;
        Ok((dest, width))
    }

    /// Words currently free in the staging arena.
    pub fn staging_free(&self) -> usize {
        self.arena.free_words()
    }

    /// Pre-fills the staging arena by `words`, reserving them for the
    /// lifetime of the link. Diagnostic/test hook for exhaustion behavior.
    pub fn reserve_staging(&mut self, words: u16) -> Result<()> {
        self.arena
            .acquire(words)
            .map(|_| ())
            .ok_or(Error::AllocationExhausted)
    }

    /// Inbound messages dropped because the queue was full.
    pub fn inbound_drops(&self) -> usize {
        self.queue.drops()
    }

    /// Driver handle, shared with the interrupt glue ([`isr::pump`]).
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Readiness flag seam.
    pub fn flags_mut(&mut self) -> &mut R {
        &mut self.flags
    }

    /// Free-running counter seam.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// The application-owned storage the objects are backed by.
    pub fn memory_mut(&mut self) -> &mut M {
        &mut self.mem
    }
}
