#![cfg_attr(not(test), no_std)]

//! CONTEXT: Staging arena for block payloads handed to the transport.
//! OWNERS: @runtime
//! PUBLIC API: Arena, StageHandle
//! INVARIANTS: No heap; allocations never overlap; release is idempotent.
//!
//! Block objects are copied into this arena before the transport is asked to
//! move them, so the driver always reads shared-visible memory instead of the
//! object's live storage. Exhaustion is a transient condition: callers retry
//! on their own schedule. All calls must come from the single cooperative
//! context that drives the object state machines.

/// Upper bound on concurrently staged blocks.
const MAX_STAGES: usize = 16;

/// Ownership token for one staged block.
///
/// The token is only valid against the arena that issued it and becomes dead
/// after `release`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StageHandle {
    slot: u8,
}

#[derive(Clone, Copy)]
struct Stage {
    used: bool,
    offset: u16,
    words: u16,
}

impl Stage {
    const EMPTY: Self = Self { used: false, offset: 0, words: 0 };
}

/// First-fit arena over a fixed run of 16-bit words.
pub struct Arena<const WORDS: usize> {
    words: [u16; WORDS],
    stages: [Stage; MAX_STAGES],
}

impl<const WORDS: usize> Arena<WORDS> {
    /// Creates an empty arena.
    pub const fn new() -> Self {
        Self { words: [0; WORDS], stages: [Stage::EMPTY; MAX_STAGES] }
    }

    /// Reserves `words` contiguous words, lowest offset first.
    ///
    /// Returns `None` when no contiguous run fits or all stage slots are in
    /// use; both are transient.
    pub fn acquire(&mut self, words: u16) -> Option<StageHandle> {
        if words == 0 || words as usize > WORDS {
            return None;
        }
        let slot = self.stages.iter().position(|s| !s.used)?;
        let offset = self.find_gap(words)?;
        self.stages[slot] = Stage { used: true, offset, words };
        Some(StageHandle { slot: slot as u8 })
    }

    /// Returns the staged words to the free pool.
    ///
    /// Releasing an already-released handle is a no-op, so the free-space
    /// accounting can never be inflated by a stray second release.
    pub fn release(&mut self, handle: StageHandle) {
        self.stages[handle.slot as usize].used = false;
    }

    /// Word offset of a staged block within the arena.
    pub fn offset_of(&self, handle: StageHandle) -> usize {
        self.stages[handle.slot as usize].offset as usize
    }

    /// Mutable view of a staged block, for copying the payload in.
    pub fn slice_mut(&mut self, handle: StageHandle) -> &mut [u16] {
        let stage = self.stages[handle.slot as usize];
        let start = stage.offset as usize;
        &mut self.words[start..start + stage.words as usize]
    }

    /// Words not currently reserved by any stage.
    pub fn free_words(&self) -> usize {
        let used: usize =
            self.stages.iter().filter(|s| s.used).map(|s| s.words as usize).sum();
        WORDS - used
    }

    /// Lowest offset where `words` fit without overlapping a live stage.
    fn find_gap(&self, words: u16) -> Option<u16> {
        let mut offset = 0u16;
        'scan: while (offset as usize) + (words as usize) <= WORDS {
            for stage in self.stages.iter().filter(|s| s.used) {
                let clear = offset >= stage.offset + stage.words
                    || offset + words <= stage.offset;
                if !clear {
                    // Jump past the stage that blocked us and rescan.
                    offset = stage.offset + stage.words;
                    continue 'scan;
                }
            }
            return Some(offset);
        }
        None
    }
}

impl<const WORDS: usize> Default for Arena<WORDS> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn acquire_release_restores_free_space() {
        let mut arena = Arena::<64>::new();
        assert_eq!(arena.free_words(), 64);
        let handle = arena.acquire(48).expect("fits");
        assert_eq!(arena.free_words(), 16);
        arena.release(handle);
        assert_eq!(arena.free_words(), 64);
    }

    #[test]
    fn exhaustion_returns_none_and_changes_nothing() {
        let mut arena = Arena::<64>::new();
        let _held = arena.acquire(60).expect("fits");
        assert!(arena.acquire(8).is_none());
        assert_eq!(arena.free_words(), 4);
    }

    #[test]
    fn double_release_is_harmless() {
        let mut arena = Arena::<32>::new();
        let handle = arena.acquire(8).expect("fits");
        arena.release(handle);
        arena.release(handle);
        assert_eq!(arena.free_words(), 32);
    }

    #[test]
    fn freed_space_is_reused() {
        let mut arena = Arena::<32>::new();
        let a = arena.acquire(16).expect("fits");
        let _b = arena.acquire(16).expect("fits");
        arena.release(a);
        let c = arena.acquire(12).expect("reuses the hole");
        assert_eq!(arena.offset_of(c), 0);
    }

    #[test]
    fn staged_slice_has_requested_length() {
        let mut arena = Arena::<32>::new();
        let handle = arena.acquire(5).expect("fits");
        arena.slice_mut(handle).copy_from_slice(&[1, 2, 3, 4, 5]);
        assert_eq!(arena.slice_mut(handle), &[1, 2, 3, 4, 5]);
    }

    proptest! {
        #[test]
        fn live_stages_never_overlap(sizes in proptest::collection::vec(1u16..20, 1..12)) {
            let mut arena = Arena::<128>::new();
            let mut live: Vec<(usize, u16)> = Vec::new();
            for (i, &words) in sizes.iter().enumerate() {
                if let Some(handle) = arena.acquire(words) {
                    let offset = arena.offset_of(handle);
                    for &(o, w) in &live {
                        let clear = offset >= o + w as usize || offset + words as usize <= o;
                        prop_assert!(clear, "stage overlaps a live one");
                    }
                    live.push((offset, words));
                    // Release every other stage to fragment the arena.
                    if i % 2 == 0 {
                        arena.release(handle);
                        live.pop();
                    }
                }
            }
        }

        #[test]
        fn accounting_matches_live_set(sizes in proptest::collection::vec(1u16..30, 1..10)) {
            let mut arena = Arena::<128>::new();
            let mut handles = Vec::new();
            for &words in &sizes {
                if let Some(handle) = arena.acquire(words) {
                    handles.push((handle, words));
                }
            }
            let held: usize = handles.iter().map(|&(_, w)| w as usize).sum();
            prop_assert_eq!(arena.free_words(), 128 - held);
            for (handle, _) in handles {
                arena.release(handle);
            }
            prop_assert_eq!(arena.free_words(), 128);
        }
    }
}
