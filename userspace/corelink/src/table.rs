// Copyright 2026 CoreLink Contributors
// SPDX-License-Identifier: Apache-2.0

//! Fixed-capacity object table: local descriptors plus the read-only mirror
//! of the peer's addresses.
//!
//! The mirror column is populated exogenously (by the handshake/driver glue
//! through [`crate::Link::map_peer`]); this layer never writes through it. A
//! `None` mirror means the peer has not yet told us where its copy lives and
//! any send toward that object must fail.

use corelink_hal::WordAddr;

use crate::object::{Descriptor, ObjKind, ObjState};
use crate::{Error, Result, MAX_OBJECTS};

pub(crate) struct ObjectTable {
    local: [Descriptor; MAX_OBJECTS],
    mirror: [Option<WordAddr>; MAX_OBJECTS],
}

impl ObjectTable {
    pub(crate) const fn new() -> Self {
        Self { local: [Descriptor::VACANT; MAX_OBJECTS], mirror: [None; MAX_OBJECTS] }
    }

    /// Claims a slot. Refuses to overwrite a live registration so a caller
    /// can never silently clobber an object mid-transfer.
    pub(crate) fn register(
        &mut self,
        handle: usize,
        kind: ObjKind,
        addr: WordAddr,
        words: u16,
        startup: bool,
    ) -> Result<()> {
        let slot = &mut self.local[handle];
        if slot.local.is_some() {
            return Err(Error::RegistrationConflict);
        }
        *slot = Descriptor {
            kind,
            state: ObjState::Unknown,
            local: Some(addr),
            words,
            startup,
            ..Descriptor::VACANT
        };
        Ok(())
    }

    /// Records where the peer's copy of `handle` lives.
    pub(crate) fn map_peer(&mut self, handle: usize, addr: WordAddr) {
        self.mirror[handle] = Some(addr);
    }

    pub(crate) fn descriptor(&self, handle: usize) -> &Descriptor {
        &self.local[handle]
    }

    pub(crate) fn descriptor_mut(&mut self, handle: usize) -> &mut Descriptor {
        &mut self.local[handle]
    }

    pub(crate) fn mirror(&self, handle: usize) -> Option<WordAddr> {
        self.mirror[handle]
    }

    /// Splits one slot into its mutable descriptor and (copied) mirror
    /// address, the pair every state-machine pass needs.
    pub(crate) fn pair_mut(&mut self, handle: usize) -> (&mut Descriptor, Option<WordAddr>) {
        (&mut self.local[handle], self.mirror[handle])
    }

    /// Full-table scan for the object mirrored at `addr`.
    pub(crate) fn find_by_mirror(&self, addr: WordAddr) -> Option<usize> {
        (0..MAX_OBJECTS).find(|&h| self.mirror[h] == Some(addr))
    }

    /// Whether every object has settled (inert or ready for requests).
    pub(crate) fn all_settled(&self) -> bool {
        self.local
            .iter()
            .all(|d| matches!(d.state, ObjState::Free | ObjState::Idle))
    }

    /// Whether the startup broadcast can make no further progress on its own:
    /// nothing is mid-transfer and at least one object parked in `Fail`.
    pub(crate) fn stalled_on_failure(&self) -> bool {
        let quiet = self
            .local
            .iter()
            .all(|d| matches!(d.state, ObjState::Free | ObjState::Idle | ObjState::Fail));
        quiet && self.local.iter().any(|d| d.state == ObjState::Fail)
    }

    /// Re-arms every failed startup-mandated object through `Init`.
    pub(crate) fn rearm_failed_startup(&mut self) {
        for desc in self.local.iter_mut() {
            if desc.state == ObjState::Fail && desc.startup {
                desc.state = ObjState::Init;
            }
        }
    }
}
