// Copyright 2026 CoreLink Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Hardware seams consumed by the corelink synchronization protocol.
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Unstable
//!
//! PUBLIC API:
//!   - Transport trait: register-level message/flag driver boundary
//!   - Clock trait: free-running counter reads with wraparound-safe expiry
//!   - Readiness trait: cross-core readiness flag primitives
//!   - Memory trait: word-addressed view of locally readable data
//!   - Message / Command / Response: the fixed in-chip message layout
//!
//! The wire codes carried here are the protocol's fixed values; both cores
//! must agree on them bit for bit. The `loopback` module (behind the `std`
//! feature) provides scripted implementations of every trait for host tests.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[cfg(feature = "std")]
pub mod loopback;

/// Result alias for transport operations.
pub type Result<T> = core::result::Result<T, TransportError>;

/// Failure reported by the low-level driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportError {
    /// The driver's outbound queue could not accept the request.
    Busy,
}

/// A 16-bit-word address within the shared-visible address space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WordAddr(pub u32);

/// Scalar transfer width.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Width {
    /// A single 16-bit word.
    Word,
    /// Two consecutive 16-bit words read as one 32-bit value.
    DWord,
}

impl Width {
    /// Payload size in 16-bit words.
    pub const fn words(self) -> u16 {
        match self {
            Width::Word => 1,
            Width::DWord => 2,
        }
    }

    /// Maps a word count onto a scalar width; lengths other than one or two
    /// words have no scalar encoding.
    pub const fn from_words(words: u16) -> Option<Width> {
        match words {
            1 => Some(Width::Word),
            2 => Some(Width::DWord),
            _ => None,
        }
    }
}

/// Command tag of an inbound driver message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// Remote function invocation request.
    FunctionCall,
    /// Scalar write into local memory.
    DataWrite,
    /// Block read served by the driver itself.
    BlockRead,
    /// Block write into local memory.
    BlockWrite,
    /// Set bits at a local address.
    SetBits,
    /// Clear bits at a local address.
    ClearBits,
    /// Protocol correlation notification (response codes ride in `data1`).
    Notify,
}

impl Command {
    /// Wire value of the command tag.
    pub const fn code(self) -> u32 {
        match self {
            Command::SetBits => 0x0000_0001,
            Command::ClearBits => 0x0000_0002,
            Command::DataWrite => 0x0000_0004,
            Command::BlockRead => 0x0000_0008,
            Command::BlockWrite => 0x0000_0010,
            Command::FunctionCall => 0x0000_0020,
            Command::Notify => 0x0001_000C,
        }
    }

    /// Decodes a wire command tag.
    pub const fn from_code(code: u32) -> Option<Command> {
        match code {
            0x0000_0001 => Some(Command::SetBits),
            0x0000_0002 => Some(Command::ClearBits),
            0x0000_0004 => Some(Command::DataWrite),
            0x0000_0008 => Some(Command::BlockRead),
            0x0000_0010 => Some(Command::BlockWrite),
            0x0000_0020 => Some(Command::FunctionCall),
            0x0001_000C => Some(Command::Notify),
            _ => None,
        }
    }
}

/// Acknowledgement code carried inside a [`Command::Notify`] message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Response {
    /// Function call served.
    FunctionCall,
    /// Set-bits applied.
    SetBits,
    /// Clear-bits applied.
    ClearBits,
    /// Scalar write applied.
    DataWrite,
    /// Block read completed (never acknowledged over notify).
    BlockRead,
    /// Block write applied.
    BlockWrite,
}

impl Response {
    /// Wire value of the acknowledgement code.
    pub const fn code(self) -> u32 {
        match self {
            Response::FunctionCall => 0x0000_0012,
            Response::SetBits => 0x0001_0001,
            Response::ClearBits => 0x0001_0002,
            Response::DataWrite => 0x0001_0003,
            Response::BlockRead => 0x0001_0004,
            Response::BlockWrite => 0x0001_0005,
        }
    }

    /// Decodes an acknowledgement code.
    pub const fn from_code(code: u32) -> Option<Response> {
        match code {
            0x0000_0012 => Some(Response::FunctionCall),
            0x0001_0001 => Some(Response::SetBits),
            0x0001_0002 => Some(Response::ClearBits),
            0x0001_0003 => Some(Response::DataWrite),
            0x0001_0004 => Some(Response::BlockRead),
            0x0001_0005 => Some(Response::BlockWrite),
            _ => None,
        }
    }

    /// Acknowledgement owed to the peer for a handled command.
    ///
    /// Block reads complete as a side effect of the driver and must not be
    /// acknowledged; notify messages are never themselves acknowledged.
    pub const fn for_command(command: Command) -> Option<Response> {
        match command {
            Command::FunctionCall => Some(Response::FunctionCall),
            Command::DataWrite => Some(Response::DataWrite),
            Command::BlockWrite => Some(Response::BlockWrite),
            Command::SetBits => Some(Response::SetBits),
            Command::ClearBits => Some(Response::ClearBits),
            Command::BlockRead | Command::Notify => None,
        }
    }
}

/// One inbound driver message: `{command, address, data words}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Message {
    /// Command tag.
    pub command: Command,
    /// Address the command targets (local for writes, mirrored for acks).
    pub addr: WordAddr,
    /// First data word; carries the [`Response`] code for notify messages.
    pub data1: u32,
    /// Second data word.
    pub data2: u32,
}

/// Register-level message/flag driver, programmed per core by the platform.
pub trait Transport {
    /// Writes a 16- or 32-bit scalar at `dest` on the peer.
    fn send_scalar(&mut self, dest: WordAddr, value: u32, width: Width) -> Result<()>;

    /// Requests a block copy of `words` 16-bit words from the shared-visible
    /// staging address `src` to `dest` on the peer.
    fn send_block(&mut self, dest: WordAddr, src: WordAddr, words: u16) -> Result<()>;

    /// Sets `mask` bits at `dest` on the peer.
    fn set_bits(&mut self, dest: WordAddr, mask: u32, width: Width) -> Result<()>;

    /// Clears `mask` bits at `dest` on the peer.
    fn clear_bits(&mut self, dest: WordAddr, mask: u32, width: Width) -> Result<()>;

    /// Invokes the remote function registered at `dest` with `argument`.
    fn call(&mut self, dest: WordAddr, argument: u32) -> Result<()>;

    /// Sends a protocol acknowledgement for the object mirrored at `addr`.
    fn notify(&mut self, response: Response, addr: WordAddr) -> Result<()>;

    /// Dequeues one raw inbound message, if any. Interrupt context only.
    fn poll_inbound(&mut self) -> Option<Message>;

    /// Applies the local side effect of a peer command (scalar/block/bit
    /// writes into this core's memory). The driver owns the actual write.
    fn apply(&mut self, message: &Message);
}

/// Free-running counter reads.
///
/// The counter is never reset; all comparisons must tolerate wraparound.
pub trait Clock {
    /// Current counter value.
    fn now(&self) -> u64;

    /// Whether `window` ticks have elapsed since `start`.
    fn expired(&self, start: u64, window: u64) -> bool {
        self.now().wrapping_sub(start) >= window
    }
}

/// Cross-core readiness flags exchanged during bring-up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flag {
    /// Shared-RAM block ownership has been programmed.
    SramConfigured,
    /// The synchronization layer on this core finished initializing.
    ApiReady,
    /// The application orchestrator completed its startup broadcast.
    AppStarted,
}

impl Flag {
    pub(crate) const COUNT: usize = 3;

    pub(crate) const fn index(self) -> usize {
        match self {
            Flag::SramConfigured => 0,
            Flag::ApiReady => 1,
            Flag::AppStarted => 2,
        }
    }
}

/// Peer-readiness signal primitives.
pub trait Readiness {
    /// Raises this core's flag toward the peer.
    fn signal(&mut self, flag: Flag);

    /// Whether this core has already raised `flag`.
    fn local(&self, flag: Flag) -> bool;

    /// Whether the peer has raised `flag`.
    fn peer(&self, flag: Flag) -> bool;
}

/// Word-addressed view of the data this core can read directly.
///
/// Object payloads live in application-owned memory; the protocol reads them
/// through this trait at send time so it never captures raw pointers.
pub trait Memory {
    /// Reads a scalar of `width` at `addr`, or `None` if unreadable.
    fn load(&self, addr: WordAddr, width: Width) -> Option<u32>;

    /// Copies `out.len()` words starting at `addr`; `false` if unreadable.
    fn read_block(&self, addr: WordAddr, out: &mut [u16]) -> bool;

    /// Whether `words` words starting at `addr` are readable by this core.
    fn contains(&self, addr: WordAddr, words: u16) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_codes_round_trip() {
        for cmd in [
            Command::FunctionCall,
            Command::DataWrite,
            Command::BlockRead,
            Command::BlockWrite,
            Command::SetBits,
            Command::ClearBits,
            Command::Notify,
        ] {
            assert_eq!(Command::from_code(cmd.code()), Some(cmd));
        }
        assert_eq!(Command::from_code(0xDEAD_BEEF), None);
    }

    #[test]
    fn block_read_is_never_acknowledged() {
        assert_eq!(Response::for_command(Command::BlockRead), None);
        assert_eq!(Response::for_command(Command::Notify), None);
        assert_eq!(
            Response::for_command(Command::DataWrite),
            Some(Response::DataWrite)
        );
    }

    #[test]
    fn width_rejects_odd_lengths() {
        assert_eq!(Width::from_words(1), Some(Width::Word));
        assert_eq!(Width::from_words(2), Some(Width::DWord));
        assert_eq!(Width::from_words(0), None);
        assert_eq!(Width::from_words(64), None);
    }

    struct FixedClock(u64);

    impl Clock for FixedClock {
        fn now(&self) -> u64 {
            self.0
        }
    }

    #[test]
    fn expiry_survives_counter_wraparound() {
        // `start` taken just before the counter wraps.
        let clock = FixedClock(5);
        assert!(clock.expired(u64::MAX - 2, 7));
        assert!(!clock.expired(u64::MAX - 2, 9));
    }
}
