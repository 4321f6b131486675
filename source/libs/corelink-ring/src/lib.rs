#![cfg_attr(not(test), no_std)]

//! CONTEXT: Bounded single-producer/single-consumer ring.
//! OWNERS: @runtime
//! PUBLIC API: SpscRing, Full
//! INVARIANTS: One producer context, one consumer context; cursors only move
//! forward; a full ring drops the new arrival and counts it.
//!
//! The interrupt context pushes raw inbound messages, the cooperative loop
//! pops them. There are no locks on this platform, so ordering is carried by
//! the two monotonic cursors alone: the producer publishes a slot with a
//! release store of `tail`, the consumer retires it with a release store of
//! `head`, and each side acquires the other's cursor before touching slots.

use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicUsize, Ordering};

/// The ring was full; the value was dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Full;

/// Fixed-capacity SPSC ring holding up to `N` values.
pub struct SpscRing<T, const N: usize> {
    slots: [UnsafeCell<MaybeUninit<T>>; N],
    /// Consumer cursor, monotonic.
    head: AtomicUsize,
    /// Producer cursor, monotonic.
    tail: AtomicUsize,
    drops: AtomicUsize,
}

// SAFETY: slot access is partitioned by the SPSC discipline documented above;
// a slot is touched by exactly one side at a time, fenced by the cursors.
unsafe impl<T: Send, const N: usize> Sync for SpscRing<T, N> {}

impl<T: Copy, const N: usize> SpscRing<T, N> {
    const EMPTY_SLOT: UnsafeCell<MaybeUninit<T>> = UnsafeCell::new(MaybeUninit::uninit());

    /// Creates an empty ring.
    pub const fn new() -> Self {
        Self {
            slots: [Self::EMPTY_SLOT; N],
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            drops: AtomicUsize::new(0),
        }
    }

    /// Enqueues `value`. Producer context only; never blocks.
    pub fn push(&self, value: T) -> Result<(), Full> {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);
        if tail.wrapping_sub(head) >= N {
            self.drops.fetch_add(1, Ordering::Relaxed);
            return Err(Full);
        }
        // SAFETY: the slot at `tail` is outside [head, tail), so the consumer
        // will not read it until the release store below publishes it.
        unsafe {
            (*self.slots[tail % N].get()).write(value);
        }
        self.tail.store(tail.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Dequeues the oldest value, if any. Consumer context only.
    pub fn pop(&self) -> Option<T> {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        if head == tail {
            return None;
        }
        // SAFETY: head != tail, so the slot was published by the producer's
        // release store and will not be rewritten until head moves past it.
        let value = unsafe { (*self.slots[head % N].get()).assume_init() };
        self.head.store(head.wrapping_add(1), Ordering::Release);
        Some(value)
    }

    /// Number of values currently queued.
    pub fn len(&self) -> usize {
        self.tail
            .load(Ordering::Acquire)
            .wrapping_sub(self.head.load(Ordering::Acquire))
    }

    /// Whether the ring is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Arrivals dropped because the ring was full.
    pub fn drops(&self) -> usize {
        self.drops.load(Ordering::Relaxed)
    }
}

impl<T: Copy, const N: usize> Default for SpscRing<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order_is_preserved() {
        let ring: SpscRing<u32, 4> = SpscRing::new();
        for v in 0..4 {
            ring.push(v).unwrap();
        }
        for v in 0..4 {
            assert_eq!(ring.pop(), Some(v));
        }
        assert_eq!(ring.pop(), None);
    }

    #[test]
    fn full_ring_drops_and_counts() {
        let ring: SpscRing<u8, 2> = SpscRing::new();
        ring.push(1).unwrap();
        ring.push(2).unwrap();
        assert_eq!(ring.push(3), Err(Full));
        assert_eq!(ring.push(4), Err(Full));
        assert_eq!(ring.drops(), 2);
        assert_eq!(ring.pop(), Some(1));
        ring.push(5).unwrap();
        assert_eq!(ring.len(), 2);
    }

    #[test]
    fn cursors_survive_many_wraps() {
        let ring: SpscRing<usize, 3> = SpscRing::new();
        for v in 0..1000 {
            ring.push(v).unwrap();
            assert_eq!(ring.pop(), Some(v));
        }
        assert!(ring.is_empty());
        assert_eq!(ring.drops(), 0);
    }

    #[test]
    fn concurrent_producer_consumer() {
        use std::sync::Arc;

        let ring: Arc<SpscRing<u64, 8>> = Arc::new(SpscRing::new());
        let producer = {
            let ring = Arc::clone(&ring);
            std::thread::spawn(move || {
                let mut sent = 0u64;
                while sent < 10_000 {
                    if ring.push(sent).is_ok() {
                        sent += 1;
                    } else {
                        std::thread::yield_now();
                    }
                }
            })
        };
        let mut expected = 0u64;
        while expected < 10_000 {
            if let Some(v) = ring.pop() {
                assert_eq!(v, expected);
                expected += 1;
            } else {
                std::thread::yield_now();
            }
        }
        producer.join().unwrap();
    }
}
