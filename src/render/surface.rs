// SPDX-License-Identifier: GPL-3.0-only

//! Producer side of the frame texture
//!
//! The camera publishes frames into a [`CameraSurface`] from whatever thread
//! its pipeline runs on. Each publish raises the engine's [`FrameSignal`],
//! which posts at most one pending render at a time.

use crate::constants::timing::FRAME_LOG_INTERVAL;
use crate::gpu::TransformMatrix;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, trace};

/// One RGBA frame waiting to be uploaded
#[derive(Debug, Clone)]
pub struct TextureFrame {
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGBA, `width * height * 4` bytes
    pub pixels: Arc<[u8]>,
    /// Applied to texture coordinates when sampling this frame
    pub transform: TransformMatrix,
}

/// Coalescing "frame available" notification
///
/// At most one render is pending at any time: a notification that arrives
/// while a render is still queued is counted and dropped. Once the engine is
/// finishing, notifications are dropped before they reach the queue.
pub struct FrameSignal {
    pending: AtomicBool,
    finishing: AtomicBool,
    posted: AtomicU64,
    coalesced: AtomicU64,
    poster: Box<dyn Fn() -> bool + Send + Sync>,
}

impl FrameSignal {
    /// `poster` enqueues a render and returns false if the queue refused it
    pub fn new<F>(poster: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        Self {
            pending: AtomicBool::new(false),
            finishing: AtomicBool::new(false),
            posted: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
            poster: Box::new(poster),
        }
    }

    /// Announce a new frame. Returns true if a render was posted.
    pub fn notify(&self) -> bool {
        if self.finishing.load(Ordering::Acquire) {
            trace!("Frame signal after finish, dropped");
            return false;
        }
        if self.pending.swap(true, Ordering::AcqRel) {
            let coalesced = self.coalesced.fetch_add(1, Ordering::Relaxed) + 1;
            if coalesced % FRAME_LOG_INTERVAL == 0 {
                debug!(coalesced, "Frame signals coalesced into pending render");
            }
            return false;
        }
        if (self.poster)() {
            self.posted.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            self.pending.store(false, Ordering::Release);
            false
        }
    }

    /// Called by the render handler before it pulls the frame, so a frame
    /// published during the render schedules the next one.
    pub fn begin_render(&self) {
        self.pending.store(false, Ordering::Release);
    }

    /// Drop every later notification
    pub fn finish(&self) {
        self.finishing.store(true, Ordering::Release);
    }

    pub fn is_finishing(&self) -> bool {
        self.finishing.load(Ordering::Acquire)
    }

    /// Renders posted to the queue
    pub fn posted(&self) -> u64 {
        self.posted.load(Ordering::Relaxed)
    }

    /// Notifications dropped because a render was already pending
    pub fn coalesced(&self) -> u64 {
        self.coalesced.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for FrameSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameSignal")
            .field("pending", &self.pending.load(Ordering::Relaxed))
            .field("finishing", &self.is_finishing())
            .field("posted", &self.posted())
            .field("coalesced", &self.coalesced())
            .finish()
    }
}

/// Surface handed to the camera as its preview target
///
/// Holds only the newest frame; older unrendered frames are replaced.
#[derive(Debug)]
pub struct CameraSurface {
    latest: Mutex<Option<TextureFrame>>,
    signal: Arc<FrameSignal>,
    abandoned: AtomicBool,
    published: AtomicU64,
}

impl CameraSurface {
    pub fn new(signal: Arc<FrameSignal>) -> Self {
        Self {
            latest: Mutex::new(None),
            signal,
            abandoned: AtomicBool::new(false),
            published: AtomicU64::new(0),
        }
    }

    /// False once the render engine released it
    pub fn is_valid(&self) -> bool {
        !self.abandoned.load(Ordering::Acquire)
    }

    /// Store `frame` as the newest frame and signal the engine.
    /// Returns false if the surface was abandoned.
    pub fn publish(&self, frame: TextureFrame) -> bool {
        {
            // Checked under the slot lock so abandon cannot slip in between
            let mut latest = self.latest.lock().unwrap_or_else(|e| e.into_inner());
            if !self.is_valid() {
                return false;
            }
            *latest = Some(frame);
        }
        self.published.fetch_add(1, Ordering::Relaxed);
        self.signal.notify();
        true
    }

    /// Take the newest frame, if one arrived since the last call
    pub fn take_latest(&self) -> Option<TextureFrame> {
        self.latest.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    /// Frames published since creation
    pub fn frames_published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Reject further frames and drop the pending one
    pub fn abandon(&self) {
        let mut latest = self.latest.lock().unwrap_or_else(|e| e.into_inner());
        self.abandoned.store(true, Ordering::Release);
        latest.take();
        drop(latest);
        debug!("Camera surface abandoned");
    }

    pub fn signal(&self) -> &Arc<FrameSignal> {
        &self.signal
    }
}
