// SPDX-License-Identifier: GPL-3.0-only

//! Dedicated worker threads with ordered command queues
//!
//! Both the camera controller and the render engine funnel every operation
//! through a [`CommandWorker`]: one named OS thread that pops commands from a
//! FIFO queue and hands them to a handler, one at a time. Callers only ever
//! post; they never block on the worker.
//!
//! The worker's state is built *on* the worker thread by an init closure, so
//! thread-affine resources (GPU contexts, device handles) never cross threads.
//!
//! # Example
//!
//! ```ignore
//! let worker = CommandWorker::start_with_init(
//!     "camera-worker",
//!     || CameraCore::new(hal),
//!     |core, command| core.handle(command),
//! )?;
//!
//! worker.post(CameraCommand::Open);
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// Action returned by the command handler to control the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerAction {
    /// Keep processing commands
    Continue,
    /// Discard anything still queued and exit the thread
    Stop,
}

struct QueueState<C> {
    commands: VecDeque<C>,
    /// No new commands are accepted once set
    closed: bool,
}

/// Ordered command queue shared between posters and the worker thread
pub struct CommandQueue<C> {
    state: Mutex<QueueState<C>>,
    ready: Condvar,
}

impl<C> Default for CommandQueue<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> CommandQueue<C> {
    /// An empty, open queue. Hand it to [`CommandWorker::start_on_queue`].
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                commands: VecDeque::new(),
                closed: false,
            }),
            ready: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<C>> {
        // A handler panic never happens while this lock is held, so the data
        // behind a poisoned lock is still consistent.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append a command. Returns false if the queue no longer accepts work.
    pub fn post(&self, command: C) -> bool {
        let mut state = self.lock();
        if state.closed {
            return false;
        }
        state.commands.push_back(command);
        self.ready.notify_one();
        true
    }

    /// Remove every queued command matching `pred`, then append `command`,
    /// under a single lock.
    ///
    /// Returns the number of removed commands, or `None` if the queue is closed.
    pub fn post_replacing<P>(&self, pred: P, command: C) -> Option<usize>
    where
        P: Fn(&C) -> bool,
    {
        let mut state = self.lock();
        if state.closed {
            return None;
        }
        let before = state.commands.len();
        state.commands.retain(|c| !pred(c));
        let removed = before - state.commands.len();
        state.commands.push_back(command);
        self.ready.notify_one();
        Some(removed)
    }

    /// Remove every queued command matching `pred`
    pub fn remove_where<P>(&self, pred: P) -> usize
    where
        P: Fn(&C) -> bool,
    {
        let mut state = self.lock();
        let before = state.commands.len();
        state.commands.retain(|c| !pred(c));
        before - state.commands.len()
    }

    /// Remove every queued command
    pub fn clear(&self) -> usize {
        let mut state = self.lock();
        let removed = state.commands.len();
        state.commands.clear();
        removed
    }

    /// Number of commands waiting to run
    pub fn pending(&self) -> usize {
        self.lock().commands.len()
    }

    /// Whether the queue still accepts commands
    pub fn is_open(&self) -> bool {
        !self.lock().closed
    }

    /// Stop accepting commands. Already queued commands still run.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        self.ready.notify_all();
    }

    /// Block until a command is available. `None` once closed and drained.
    fn next(&self) -> Option<C> {
        let mut state = self.lock();
        loop {
            if let Some(command) = state.commands.pop_front() {
                return Some(command);
            }
            if state.closed {
                return None;
            }
            state = self.ready.wait(state).unwrap_or_else(|e| e.into_inner());
        }
    }

    fn close_and_discard(&self) -> usize {
        let mut state = self.lock();
        state.closed = true;
        let dropped = state.commands.len();
        state.commands.clear();
        dropped
    }
}

/// Closes the queue when the worker thread exits, including by panic
struct CloseOnExit<'a, C> {
    queue: &'a CommandQueue<C>,
    name: &'a str,
}

impl<C> Drop for CloseOnExit<'_, C> {
    fn drop(&mut self) {
        let dropped = self.queue.close_and_discard();
        if thread::panicking() {
            error!(name = %self.name, dropped, "Worker thread panicked, queue closed");
        }
    }
}

/// A named thread that runs queued commands strictly in order
pub struct CommandWorker<C> {
    queue: Arc<CommandQueue<C>>,
    /// Thread handle for joining
    thread_handle: Option<JoinHandle<()>>,
    /// Name for logging
    name: String,
}

impl<C: Send + 'static> CommandWorker<C> {
    /// Start a worker whose state is created on the worker thread
    ///
    /// # Arguments
    ///
    /// * `name` - Thread name, also used in logging
    /// * `init_fn` - Builds the worker state; runs first, on the new thread
    /// * `handler` - Processes one command against the state
    pub fn start_with_init<S, I, F>(name: &str, init_fn: I, handler: F) -> std::io::Result<Self>
    where
        S: 'static,
        I: FnOnce() -> S + Send + 'static,
        F: FnMut(&mut S, C) -> WorkerAction + Send + 'static,
    {
        Self::start_on_queue(name, Arc::new(CommandQueue::new()), init_fn, handler)
    }

    /// Like [`CommandWorker::start_with_init`], but serving a queue created
    /// beforehand, so the state (or anything else) can hold a handle to it
    pub fn start_on_queue<S, I, F>(
        name: &str,
        queue: Arc<CommandQueue<C>>,
        init_fn: I,
        mut handler: F,
    ) -> std::io::Result<Self>
    where
        S: 'static,
        I: FnOnce() -> S + Send + 'static,
        F: FnMut(&mut S, C) -> WorkerAction + Send + 'static,
    {
        let thread_queue = Arc::clone(&queue);
        let name_clone = name.to_string();

        info!(name = %name, "Starting worker thread");

        let thread_handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let _close = CloseOnExit {
                    queue: &thread_queue,
                    name: &name_clone,
                };
                debug!(name = %name_clone, "Worker thread started, initializing...");
                let mut state = init_fn();

                while let Some(command) = thread_queue.next() {
                    match handler(&mut state, command) {
                        WorkerAction::Continue => {}
                        WorkerAction::Stop => {
                            let dropped = thread_queue.close_and_discard();
                            debug!(name = %name_clone, dropped, "Handler requested stop");
                            break;
                        }
                    }
                }

                // State is dropped here, on the thread that created it
                drop(state);
                info!(name = %name_clone, "Worker thread exiting");
            })?;

        Ok(Self {
            queue,
            thread_handle: Some(thread_handle),
            name: name.to_string(),
        })
    }
}

impl<C> CommandWorker<C> {
    /// Shared handle to the queue, for posting from other threads
    pub fn queue(&self) -> Arc<CommandQueue<C>> {
        Arc::clone(&self.queue)
    }

    /// Append a command. Returns false if the worker has shut down.
    pub fn post(&self, command: C) -> bool {
        let accepted = self.queue.post(command);
        if !accepted {
            warn!(name = %self.name, "Worker no longer accepts commands");
        }
        accepted
    }

    /// See [`CommandQueue::post_replacing`]
    pub fn post_replacing<P>(&self, pred: P, command: C) -> Option<usize>
    where
        P: Fn(&C) -> bool,
    {
        self.queue.post_replacing(pred, command)
    }

    /// See [`CommandQueue::remove_where`]
    pub fn remove_where<P>(&self, pred: P) -> usize
    where
        P: Fn(&C) -> bool,
    {
        self.queue.remove_where(pred)
    }

    /// Drop every command that has not started yet
    pub fn clear(&self) -> usize {
        self.queue.clear()
    }

    /// Number of commands waiting to run
    pub fn pending(&self) -> usize {
        self.queue.pending()
    }

    /// Check if the thread is still running
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Stop accepting commands; the thread drains what is queued, then exits
    pub fn shutdown(&self) {
        debug!(name = %self.name, "Requesting worker shutdown");
        self.queue.close();
    }

    /// Wait for the thread to finish
    pub fn join(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            if handle.thread().id() == thread::current().id() {
                // Joining ourselves would deadlock; the thread exits on its own
                debug!(name = %self.name, "Worker dropped from its own thread, detaching");
                return;
            }
            debug!(name = %self.name, "Waiting for worker thread to finish");
            if let Err(e) = handle.join() {
                warn!(name = %self.name, "Worker thread panicked: {:?}", e);
            } else {
                debug!(name = %self.name, "Worker thread finished");
            }
        }
    }
}

impl<C> Drop for CommandWorker<C> {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            debug!(name = %self.name, "CommandWorker dropped, shutting down");
            self.shutdown();
            self.join();
        }
    }
}
