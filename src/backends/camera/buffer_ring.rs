// SPDX-License-Identifier: GPL-3.0-only

//! Fixed pool of raw preview buffers
//!
//! The controller allocates the ring once per open and hands it to the
//! device. For every frame the device takes a free buffer, fills it, and
//! delivers it back; delivery runs the preview consumer (if any) and returns
//! the buffer to the free list. When all buffers are out, frames are dropped
//! instead of allocating.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::trace;

/// Callback receiving each raw preview frame, on the device's thread
pub type PreviewConsumer = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Shared slot holding the current preview consumer
///
/// Lives in the controller so a consumer set before the ring exists is still
/// picked up.
#[derive(Clone, Default)]
pub struct ConsumerSlot(Arc<Mutex<Option<PreviewConsumer>>>);

impl ConsumerSlot {
    pub fn set(&self, consumer: Option<PreviewConsumer>) {
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = consumer;
    }

    fn get(&self) -> Option<PreviewConsumer> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl fmt::Debug for ConsumerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ConsumerSlot")
            .field(&self.get().map(|_| "<consumer>"))
            .finish()
    }
}

struct RingInner {
    free: Mutex<VecDeque<Vec<u8>>>,
    capacity: usize,
    buffer_size: usize,
    consumer: ConsumerSlot,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

/// Handle to a buffer pool; clones share the pool
#[derive(Clone)]
pub struct BufferRing {
    inner: Arc<RingInner>,
}

impl BufferRing {
    /// Allocate `count` (at least one) zeroed buffers of `buffer_size` bytes
    pub fn new(count: usize, buffer_size: usize, consumer: ConsumerSlot) -> Self {
        let count = count.max(1);
        let free = (0..count).map(|_| vec![0u8; buffer_size]).collect();
        Self {
            inner: Arc::new(RingInner {
                free: Mutex::new(free),
                capacity: count,
                buffer_size,
                consumer,
                delivered: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    fn free(&self) -> MutexGuard<'_, VecDeque<Vec<u8>>> {
        self.inner.free.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Take a free buffer. `None` means every buffer is in use and the
    /// frame should be dropped.
    pub fn acquire(&self) -> Option<Vec<u8>> {
        let buffer = self.free().pop_front();
        if buffer.is_none() {
            let dropped = self.inner.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            trace!(dropped, "No free preview buffer, frame dropped");
        }
        buffer
    }

    /// Hand a filled buffer to the consumer, then re-queue it
    pub fn deliver(&self, buffer: Vec<u8>) {
        if let Some(consumer) = self.inner.consumer.get() {
            consumer(&buffer);
        }
        self.inner.delivered.fetch_add(1, Ordering::Relaxed);
        self.requeue(buffer);
    }

    /// Return a buffer without delivering it
    pub fn requeue(&self, mut buffer: Vec<u8>) {
        // Keep every buffer at the negotiated size
        buffer.resize(self.inner.buffer_size, 0);
        let mut free = self.free();
        if free.len() < self.inner.capacity {
            free.push_back(buffer);
        }
    }

    /// Buffers currently free
    pub fn available(&self) -> usize {
        self.free().len()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn buffer_size(&self) -> usize {
        self.inner.buffer_size
    }

    pub fn frames_delivered(&self) -> u64 {
        self.inner.delivered.load(Ordering::Relaxed)
    }

    /// Frames dropped because no buffer was free
    pub fn frames_dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for BufferRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferRing")
            .field("capacity", &self.inner.capacity)
            .field("buffer_size", &self.inner.buffer_size)
            .field("available", &self.available())
            .field("delivered", &self.frames_delivered())
            .field("dropped", &self.frames_dropped())
            .finish()
    }
}
