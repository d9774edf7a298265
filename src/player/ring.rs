//! Bounded blocking ring buffer of interleaved f32 samples.
//!
//! Single producer (the decoder worker), single consumer (the audio
//! callback). Push is non-blocking and drops a span that would not fit
//! whole; pop blocks on a condition variable until the requested amount is
//! available. Capacity is rounded up to the next power of two so index
//! arithmetic is a bitmask.
//!
//! Two escape hatches keep the consumer from blocking forever:
//! - `set_armed(false)` makes pop return immediately with silence, used
//!   while the pipeline is being reconfigured or after end of stream;
//! - `shutdown()` does the same permanently and wakes every waiter.

use parking_lot::{Condvar, Mutex};

struct Inner {
    data: Box<[f32]>,
    /// First readable index.
    head: usize,
    /// First writable index.
    tail: usize,
    len: usize,
    /// While disarmed, pop delivers whatever is present and zero-fills the
    /// rest instead of waiting.
    armed: bool,
    shutdown: bool,
}

pub struct RingBuffer {
    inner: Mutex<Inner>,
    cond: Condvar,
    capacity: usize,
    mask: usize,
}

impl RingBuffer {
    /// Create a ring with at least `capacity` samples of storage, rounded up
    /// to the next power of two.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be non-zero");
        let capacity = capacity.next_power_of_two();
        Self {
            inner: Mutex::new(Inner {
                data: vec![0.0; capacity].into_boxed_slice(),
                head: 0,
                tail: 0,
                len: 0,
                armed: true,
                shutdown: false,
            }),
            cond: Condvar::new(),
            capacity,
            mask: capacity - 1,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a whole span, never partially. Returns the fill level after the
    /// push. A span that would overflow is dropped and logged; with the
    /// high-water threshold respected by the producer this does not happen.
    pub fn push(&self, span: &[f32]) -> usize {
        let mut inner = self.inner.lock();

        if span.len() + inner.len > self.capacity {
            tracing::warn!(
                span = span.len(),
                len = inner.len,
                capacity = self.capacity,
                "dropping out-of-range push"
            );
            return inner.len;
        }

        let tail = inner.tail;
        let first = span.len().min(self.capacity - tail);
        inner.data[tail..tail + first].copy_from_slice(&span[..first]);
        inner.data[..span.len() - first].copy_from_slice(&span[first..]);

        inner.tail = (tail + span.len()) & self.mask;
        inner.len += span.len();
        let len = inner.len;
        drop(inner);

        self.cond.notify_all();
        len
    }

    /// Fill `dest` from the ring, blocking until enough samples are
    /// available. A request larger than the capacity is capped (and logged);
    /// the uncovered tail of `dest` is zeroed. When disarmed or shut down the
    /// call returns without waiting. Returns the number of real samples
    /// delivered.
    pub fn pop(&self, dest: &mut [f32]) -> usize {
        let mut requested = dest.len();
        if requested > self.capacity {
            tracing::warn!(
                requested,
                capacity = self.capacity,
                "capping pop request at capacity"
            );
            requested = self.capacity;
        }

        let mut inner = self.inner.lock();
        while requested > inner.len && inner.armed && !inner.shutdown {
            self.cond.wait(&mut inner);
        }

        let n = requested.min(inner.len);
        let head = inner.head;
        let first = n.min(self.capacity - head);
        dest[..first].copy_from_slice(&inner.data[head..head + first]);
        dest[first..n].copy_from_slice(&inner.data[..n - first]);

        inner.head = (head + n) & self.mask;
        inner.len -= n;
        drop(inner);

        self.cond.notify_all();
        dest[n..].fill(0.0);
        n
    }

    /// Drop all buffered samples. Wakes both sides so a waiting producer
    /// re-evaluates its watermark immediately (a seek barrier relies on
    /// this).
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.head = 0;
        inner.tail = 0;
        inner.len = 0;
        drop(inner);
        self.cond.notify_all();
    }

    /// Toggle blocking pops. Disarming releases a consumer that is already
    /// waiting.
    pub fn set_armed(&self, armed: bool) {
        let mut inner = self.inner.lock();
        inner.armed = armed;
        drop(inner);
        self.cond.notify_all();
    }

    /// Permanently release all waiters; every later pop returns silence for
    /// the uncovered part.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        inner.shutdown = true;
        drop(inner);
        self.cond.notify_all();
    }

    /// Park the producer until a refill is due: fill level below `level`
    /// while `active()` holds. Returns immediately on shutdown or once
    /// `running()` turns false. Pop, clear and arming flips all wake this.
    pub fn wait_for_refill(
        &self,
        level: usize,
        running: impl Fn() -> bool,
        active: impl Fn() -> bool,
    ) {
        let mut inner = self.inner.lock();
        while !inner.shutdown && running() && (inner.len >= level || !active()) {
            self.cond.wait(&mut inner);
        }
    }
}
