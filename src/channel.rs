//! Bounded, thread-safe FIFO of fixed-size elements
//!
//! [`BoundedChannel`] is the handoff primitive between every pipeline stage:
//! the caller and the encoder, the encoder and the transport, the transport
//! and the decoder, the decoder and each per-leaf consumer.
//!
//! # Semantics
//!
//! - Capacity is fixed at construction and never exceeded.
//! - [`push`](BoundedChannel::push) is all-or-nothing: either every item is
//!   enqueued or (on timeout) none is.
//! - [`pop`](BoundedChannel::pop) only ever returns a multiple of
//!   `multiple_of` items, so whole multi-element records stay together.
//! - [`lock_back`](BoundedChannel::lock_back) /
//!   [`lock_front`](BoundedChannel::lock_front) give zero-copy access to a
//!   contiguous run of slots. The returned view holds the channel lock until
//!   it is dropped, so at most one view exists at a time; fill or read it
//!   promptly.
//!
//! A timeout of `None` blocks forever. This is what production producers use
//! so that hardware-bound data is never dropped; short finite timeouts are
//! for shutdown polling and tests. Timeouts are reported as `false` / empty
//! results, never as errors.
//!
//! # Producers and consumers
//!
//! One consumer per channel is the supported configuration. Several
//! producers may share a channel: every push is atomic, so batches never
//! interleave, but the order *between* producers is unspecified.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Fixed-capacity FIFO guarded by one mutex and two condition variables
#[derive(Debug)]
pub struct BoundedChannel<T> {
    ring: Mutex<VecDeque<T>>,
    capacity: usize,
    not_empty: Condvar,
    not_full: Condvar,
}

impl<T: Copy> BoundedChannel<T> {
    /// Create a channel that holds at most `capacity` items
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "channel capacity must be non-zero");
        Self {
            ring: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    /// Fixed capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of unread items
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether there are no unread items
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Push every item of `items`, waiting for room
    ///
    /// Returns `false` if `timeout` elapsed first; nothing is pushed in that
    /// case.
    ///
    /// # Panics
    ///
    /// Pushing more items than the channel capacity can never succeed and is
    /// treated as a programming error.
    pub fn push(&self, items: &[T], timeout: Option<Duration>) -> bool {
        assert!(
            items.len() <= self.capacity,
            "push of {} items into channel of capacity {}",
            items.len(),
            self.capacity
        );
        if items.is_empty() {
            return true;
        }

        let capacity = self.capacity;
        let Some(mut ring) = self.wait_until(&self.not_full, timeout, |ring| {
            capacity - ring.len() >= items.len()
        }) else {
            return false;
        };
        ring.extend(items.iter().copied());
        drop(ring);
        self.not_empty.notify_all();
        true
    }

    /// Pop up to `max_count` items, waiting for at least `multiple_of`
    ///
    /// The returned vector's length is a multiple of `multiple_of`; it is
    /// empty on timeout.
    pub fn pop(&self, max_count: usize, timeout: Option<Duration>, multiple_of: usize) -> Vec<T> {
        let mut out = Vec::new();
        self.pop_into(&mut out, max_count, timeout, multiple_of);
        out
    }

    /// Like [`pop`](Self::pop) but appends into `out`, returning the count
    ///
    /// Asking for zero items returns immediately.
    pub fn pop_into(
        &self,
        out: &mut Vec<T>,
        max_count: usize,
        timeout: Option<Duration>,
        multiple_of: usize,
    ) -> usize {
        if max_count == 0 {
            return 0;
        }
        let multiple_of = multiple_of.max(1);
        assert!(
            multiple_of <= self.capacity && multiple_of <= max_count,
            "pop granularity {} exceeds capacity {} or max count {}",
            multiple_of,
            self.capacity,
            max_count
        );

        let Some(mut ring) =
            self.wait_until(&self.not_empty, timeout, |ring| ring.len() >= multiple_of)
        else {
            return 0;
        };
        let available = ring.len().min(max_count);
        let count = available - available % multiple_of;
        out.extend(ring.drain(..count));
        drop(ring);
        self.not_full.notify_all();
        count
    }

    /// Reserve `n` contiguous slots at the back for zero-copy filling
    ///
    /// Returns `None` if room for `n` items did not appear within `timeout`.
    /// The slots are published when [`BackView::commit`] is called; dropping
    /// the view without committing discards them.
    pub fn lock_back(&self, n: usize, timeout: Option<Duration>) -> Option<BackView<'_, T>>
    where
        T: Default,
    {
        assert!(
            n <= self.capacity,
            "lock of {} slots in channel of capacity {}",
            n,
            self.capacity
        );
        let capacity = self.capacity;
        let mut ring = self.wait_until(&self.not_full, timeout, |ring| capacity - ring.len() >= n)?;
        let start = ring.len();
        ring.resize(start + n, T::default());
        ring.make_contiguous();
        Some(BackView {
            channel: self,
            ring,
            start,
            committed: false,
        })
    }

    /// Borrow `n` contiguous unread items at the front without copying
    ///
    /// Returns `None` if `n` items did not arrive within `timeout`. The items
    /// are consumed when [`FrontView::consume`] is called; dropping the view
    /// without consuming leaves them in place.
    pub fn lock_front(&self, n: usize, timeout: Option<Duration>) -> Option<FrontView<'_, T>> {
        assert!(
            n <= self.capacity,
            "lock of {} slots in channel of capacity {}",
            n,
            self.capacity
        );
        let mut ring = self.wait_until(&self.not_empty, timeout, |ring| ring.len() >= n)?;
        ring.make_contiguous();
        Some(FrontView {
            channel: self,
            ring,
            len: n,
            consumed: false,
        })
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.ring.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait on `cond` until `ready` holds, honoring the timeout
    fn wait_until<F>(
        &self,
        cond: &Condvar,
        timeout: Option<Duration>,
        mut ready: F,
    ) -> Option<MutexGuard<'_, VecDeque<T>>>
    where
        F: FnMut(&VecDeque<T>) -> bool,
    {
        let mut ring = self.lock();
        match timeout {
            None => {
                while !ready(&ring) {
                    ring = cond.wait(ring).unwrap_or_else(PoisonError::into_inner);
                }
                Some(ring)
            }
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                while !ready(&ring) {
                    let now = Instant::now();
                    if now >= deadline {
                        return None;
                    }
                    ring = cond
                        .wait_timeout(ring, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
                Some(ring)
            }
        }
    }
}

/// Exclusive write access to reserved slots at the back of a channel
pub struct BackView<'a, T: Copy> {
    channel: &'a BoundedChannel<T>,
    ring: MutexGuard<'a, VecDeque<T>>,
    start: usize,
    committed: bool,
}

impl<T: Copy> BackView<'_, T> {
    /// Publish the filled slots to the consumer
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl<T: Copy> Deref for BackView<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        // Contiguous since lock_back.
        &self.ring.as_slices().0[self.start..]
    }
}

impl<T: Copy> DerefMut for BackView<'_, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        let start = self.start;
        &mut self.ring.as_mut_slices().0[start..]
    }
}

impl<T: Copy> Drop for BackView<'_, T> {
    fn drop(&mut self) {
        if self.committed {
            self.channel.not_empty.notify_all();
        } else {
            let start = self.start;
            self.ring.truncate(start);
        }
    }
}

/// Exclusive read access to the oldest items of a channel
pub struct FrontView<'a, T: Copy> {
    channel: &'a BoundedChannel<T>,
    ring: MutexGuard<'a, VecDeque<T>>,
    len: usize,
    consumed: bool,
}

impl<T: Copy> FrontView<'_, T> {
    /// Remove the viewed items from the channel
    pub fn consume(mut self) {
        self.consumed = true;
    }
}

impl<T: Copy> Deref for FrontView<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.ring.as_slices().0[..self.len]
    }
}

impl<T: Copy> Drop for FrontView<'_, T> {
    fn drop(&mut self) {
        if self.consumed {
            let len = self.len;
            self.ring.drain(..len);
            self.channel.not_full.notify_all();
        }
    }
}
