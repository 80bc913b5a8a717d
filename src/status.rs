// SPDX-License-Identifier: GPL-3.0-only

//! Status callbacks from the camera and render workers
//!
//! Listeners are invoked on the worker thread that produced the event.
//! [`ChannelListener`] forwards events into a tokio channel so they can be
//! consumed on the caller's own context instead.

use crate::errors::{ErrorCode, PipelineError};
use tokio::sync::mpsc;
use tracing::{error, info};

/// Camera lifecycle callbacks
pub trait CameraStatusListener: Send + Sync {
    /// The device is open and its parameters are negotiated
    fn on_opened(&self);
    /// Preview is running
    fn on_previewing(&self);
    /// The device was closed (sent for every close, successful or not)
    fn on_stopped(&self);
    /// Something failed; `message` carries the original diagnostic
    fn on_error(&self, code: ErrorCode, message: &str);
}

/// Render engine callbacks. Rendering is continuous, so only failures are reported.
pub trait RenderStatusListener: Send + Sync {
    fn on_error(&self, code: ErrorCode, message: &str);
}

/// Which worker produced a [`StatusEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Camera,
    Render,
}

/// A status callback captured as a value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    Opened,
    Previewing,
    Stopped,
    Error {
        source: Source,
        code: ErrorCode,
        message: String,
    },
}

impl StatusEvent {
    /// Build an error event from a pipeline error
    pub fn from_error(source: Source, err: &PipelineError) -> Self {
        StatusEvent::Error {
            source,
            code: err.code(),
            message: err.message().to_string(),
        }
    }
}

/// Forwards every callback into an unbounded tokio channel
#[derive(Debug, Clone)]
pub struct ChannelListener {
    sender: mpsc::UnboundedSender<StatusEvent>,
}

impl ChannelListener {
    /// Create a listener and the receiver that observes it
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StatusEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    fn send(&self, event: StatusEvent) {
        // The receiver going away just means nobody is listening any more
        let _ = self.sender.send(event);
    }
}

impl CameraStatusListener for ChannelListener {
    fn on_opened(&self) {
        self.send(StatusEvent::Opened);
    }

    fn on_previewing(&self) {
        self.send(StatusEvent::Previewing);
    }

    fn on_stopped(&self) {
        self.send(StatusEvent::Stopped);
    }

    fn on_error(&self, code: ErrorCode, message: &str) {
        self.send(StatusEvent::Error {
            source: Source::Camera,
            code,
            message: message.to_string(),
        });
    }
}

impl RenderStatusListener for ChannelListener {
    fn on_error(&self, code: ErrorCode, message: &str) {
        self.send(StatusEvent::Error {
            source: Source::Render,
            code,
            message: message.to_string(),
        });
    }
}

/// Listener that only writes events to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogListener;

impl CameraStatusListener for LogListener {
    fn on_opened(&self) {
        info!("Camera opened");
    }

    fn on_previewing(&self) {
        info!("Camera previewing");
    }

    fn on_stopped(&self) {
        info!("Camera stopped");
    }

    fn on_error(&self, code: ErrorCode, message: &str) {
        error!(%code, detail = message, "Camera error");
    }
}

impl RenderStatusListener for LogListener {
    fn on_error(&self, code: ErrorCode, message: &str) {
        error!(%code, detail = message, "Render error");
    }
}
