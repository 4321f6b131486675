// Copyright 2026 CoreLink Contributors
// SPDX-License-Identifier: Apache-2.0

//! Per-object descriptors, transfer dispatch, and the transfer state machine.
//!
//! One descriptor drives at most one outstanding transfer. The state machine
//! is advanced by [`step`], once per orchestrator pass per object; immediate
//! hand-offs (`Unknown` into `Init` into `Writing`) are expressed through an
//! explicit re-entry flag instead of fallthrough, so every transition is a
//! single auditable arm.

use corelink_arena::{Arena, StageHandle};
use corelink_hal::{Clock, Memory, Transport, Width, WordAddr};

use crate::{Error, LinkConfig, STAGING_WORDS};

/// What kind of payload an object carries across.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjKind {
    /// A run of 16-bit words, staged through the shared arena.
    Block,
    /// A 16- or 32-bit value read from the object's live storage at send time.
    Scalar,
    /// A 16- or 32-bit mask: set the mask, clear its complement.
    Flags,
    /// A remote invocation carrying one stored argument word.
    FunctionCall,
}

/// Current node of an object's transfer state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjState {
    /// Not yet classified; resolves to `Free`, `Idle`, or `Init` on the
    /// first pass.
    Unknown,
    /// Unregistered slot; permanently inert.
    Free,
    /// Re-armed; the retry budget resets and the transfer begins.
    Init,
    /// Dispatching the kind-specific transfer to the transport.
    Writing,
    /// Sent; waiting for the peer's acknowledgement or the timeout window.
    AwaitingResponse,
    /// Backing off before another write attempt.
    Retry,
    /// Settled and ready to accept a new send request.
    Idle,
    /// Terminal until explicitly re-armed.
    Fail,
}

/// One object table entry.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Descriptor {
    pub(crate) kind: ObjKind,
    pub(crate) state: ObjState,
    /// Live storage, owned by the application. `None` marks a vacant slot.
    pub(crate) local: Option<WordAddr>,
    /// Payload size in 16-bit words.
    pub(crate) words: u16,
    /// Argument forwarded by `FunctionCall` objects.
    pub(crate) argument: u32,
    /// Arena token held only while a block transfer awaits its ack.
    pub(crate) stage: Option<StageHandle>,
    /// Counter snapshot opening the response/retry window.
    pub(crate) deadline: u64,
    pub(crate) retries: u8,
    pub(crate) startup: bool,
    pub(crate) error: bool,
}

impl Descriptor {
    pub(crate) const VACANT: Self = Self {
        kind: ObjKind::Scalar,
        state: ObjState::Unknown,
        local: None,
        words: 0,
        argument: 0,
        stage: None,
        deadline: 0,
        retries: 0,
        startup: false,
        error: false,
    };
}

/// Outcome of a failed dispatch: transient failures feed the retry loop,
/// hard failures park the object immediately.
pub(crate) enum WriteFailure {
    Transient(Error),
    Hard(Error),
}

impl WriteFailure {
    fn cause(&self) -> Error {
        match self {
            WriteFailure::Transient(cause) | WriteFailure::Hard(cause) => *cause,
        }
    }
}

/// Kind-specific transfer dispatch.
///
/// Blocks are copied into the staging arena first so the transport only ever
/// references shared-visible memory; on success the stage token stays on the
/// descriptor until the acknowledgement (or timeout) releases it.
pub(crate) fn write_object<M: Memory, T: Transport>(
    desc: &mut Descriptor,
    mirror: Option<WordAddr>,
    mem: &M,
    transport: &mut T,
    arena: &mut Arena<STAGING_WORDS>,
    staging_base: u32,
) -> core::result::Result<(), WriteFailure> {
    let local = desc.local.ok_or(WriteFailure::Hard(Error::InvalidAddress))?;
    let dest = mirror.ok_or(WriteFailure::Hard(Error::PeerUnmapped))?;

    match desc.kind {
        ObjKind::Block => {
            let stage = arena
                .acquire(desc.words)
                .ok_or(WriteFailure::Transient(Error::AllocationExhausted))?;
            if !mem.read_block(local, arena.slice_mut(stage)) {
                arena.release(stage);
                return Err(WriteFailure::Hard(Error::InvalidAddress));
            }
            let src = WordAddr(staging_base.wrapping_add(arena.offset_of(stage) as u32));
            match transport.send_block(dest, src, desc.words) {
                Ok(()) => {
                    desc.stage = Some(stage);
                    Ok(())
                }
                Err(_) => {
                    arena.release(stage);
                    Err(WriteFailure::Transient(Error::TransportBusy))
                }
            }
        }
        ObjKind::Scalar => {
            let width = Width::from_words(desc.words)
                .ok_or(WriteFailure::Hard(Error::UnsupportedLength))?;
            let value =
                mem.load(local, width).ok_or(WriteFailure::Hard(Error::InvalidAddress))?;
            transport
                .send_scalar(dest, value, width)
                .map_err(|_| WriteFailure::Transient(Error::TransportBusy))
        }
        ObjKind::Flags => {
            let width = Width::from_words(desc.words)
                .ok_or(WriteFailure::Hard(Error::UnsupportedLength))?;
            let mask =
                mem.load(local, width).ok_or(WriteFailure::Hard(Error::InvalidAddress))?;
            // Both halves must land for the object to count as written.
            transport
                .set_bits(dest, mask, width)
                .map_err(|_| WriteFailure::Transient(Error::TransportBusy))?;
            transport
                .clear_bits(dest, !mask, width)
                .map_err(|_| WriteFailure::Transient(Error::TransportBusy))
        }
        ObjKind::FunctionCall => transport
            .call(dest, desc.argument)
            .map_err(|_| WriteFailure::Transient(Error::TransportBusy)),
    }
}

/// Advances one object's state machine by a single pass.
pub(crate) fn step<M: Memory, T: Transport, C: Clock>(
    handle: usize,
    desc: &mut Descriptor,
    mirror: Option<WordAddr>,
    mem: &M,
    transport: &mut T,
    arena: &mut Arena<STAGING_WORDS>,
    clock: &C,
    config: &LinkConfig,
) {
    loop {
        let reenter = match desc.state {
            ObjState::Unknown => {
                if desc.local.is_none() {
                    desc.state = ObjState::Free;
                    false
                } else if !desc.startup {
                    desc.state = ObjState::Idle;
                    false
                } else {
                    desc.state = ObjState::Init;
                    true
                }
            }
            ObjState::Init => {
                desc.retries = config.retry_budget;
                desc.error = false;
                desc.state = ObjState::Writing;
                true
            }
            ObjState::Writing => {
                match write_object(desc, mirror, mem, transport, arena, config.staging_base) {
                    Ok(()) => {
                        desc.deadline = clock.now();
                        desc.state = ObjState::AwaitingResponse;
                    }
                    Err(WriteFailure::Transient(cause)) if desc.retries > 0 => {
                        log::debug!("object {handle} write deferred: {cause}");
                        desc.deadline = clock.now();
                        desc.retries -= 1;
                        desc.state = ObjState::Retry;
                    }
                    Err(failure) => park(handle, desc, arena, failure.cause()),
                }
                false
            }
            ObjState::AwaitingResponse => {
                if clock.expired(desc.deadline, config.response_window) {
                    if let Some(stage) = desc.stage.take() {
                        arena.release(stage);
                    }
                    if desc.retries > 0 {
                        desc.retries -= 1;
                        desc.deadline = clock.now();
                        desc.state = ObjState::Retry;
                    } else {
                        park(handle, desc, arena, Error::RetryBudgetExhausted);
                    }
                }
                false
            }
            ObjState::Retry => {
                if clock.expired(desc.deadline, config.retry_window) {
                    desc.state = ObjState::Writing;
                }
                false
            }
            ObjState::Fail => {
                // Startup-mandated objects stay parked; everything else
                // returns to Idle so the application can re-arm it.
                if !desc.startup {
                    desc.state = ObjState::Idle;
                }
                false
            }
            ObjState::Idle | ObjState::Free => false,
        };
        if !reenter {
            break;
        }
    }
}

fn park(handle: usize, desc: &mut Descriptor, arena: &mut Arena<STAGING_WORDS>, cause: Error) {
    if let Some(stage) = desc.stage.take() {
        arena.release(stage);
    }
    desc.error = true;
    desc.state = ObjState::Fail;
    log::warn!("object {handle} failed: {cause}");
}
