// Copyright 2026 CoreLink Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy for the object synchronization layer.
//!
//! Transient conditions (`TransportBusy`, `AllocationExhausted`) are absorbed
//! by the per-object retry loop and never surface past the initial acceptance
//! of a request. Terminal conditions are recorded on the object and observed
//! through [`crate::Link::state_of`] / [`crate::Link::last_error`]; nothing
//! propagates across the cooperative loop boundary.

/// Result alias for synchronization-layer operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors produced by the object synchronization layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The slot is already occupied by a live object.
    #[error("object slot already registered")]
    RegistrationConflict,
    /// The address is not readable by this core, or the slot is not
    /// registered.
    #[error("address not readable by this core")]
    InvalidAddress,
    /// The handle is outside the object table.
    #[error("object handle out of range")]
    BadHandle,
    /// A send was requested while a transfer is outstanding.
    #[error("object is not idle")]
    NotReady,
    /// The driver's outbound queue refused the request; retried by the
    /// object state machine.
    #[error("transport busy")]
    TransportBusy,
    /// No contiguous staging space left; retried by the object state machine.
    #[error("staging arena exhausted")]
    AllocationExhausted,
    /// The object's length has no encoding for the requested operation:
    /// zero-length registrations, scalar dispatch of anything but one or two
    /// words, bit operations on wider objects. Never retried.
    #[error("object length unsupported for this operation")]
    UnsupportedLength,
    /// The peer has not shared this object's mirror address; never retried.
    #[error("peer mirror address not mapped")]
    PeerUnmapped,
    /// Every retry attempt failed; the object parked in `Fail`.
    #[error("retry budget exhausted")]
    RetryBudgetExhausted,
    /// The peer never raised its readiness flag within the caller's budget.
    #[error("peer readiness handshake timed out")]
    HandshakeTimeout,
}
