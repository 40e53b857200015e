// SPDX-License-Identifier: GPL-3.0-only
//! Serial execution contexts
//!
//! A [`SerialQueue`] is a dedicated worker thread that owns some state and
//! runs submitted jobs against it one at a time, in submission order. The
//! state can only be reached through the queue, so everything that mutates it
//! is serialized without further locking.
//!
//! # Example
//!
//! ```ignore
//! let queue = SerialQueue::start("encoder", encoder)?;
//! queue.dispatch_async(|encoder| encoder.set_dimensions(1920, 1080));
//! let size = queue.dispatch_sync(|encoder| (encoder.width(), encoder.height()));
//! ```

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

type Job<S> = Box<dyn FnOnce(&mut S) + Send>;

/// FIFO executor bound to one worker thread
pub struct SerialQueue<S: Send + 'static> {
    /// Job channel; dropped first on shutdown so the worker drains and exits
    sender: Option<mpsc::Sender<Job<S>>>,
    /// Thread handle for joining
    thread_handle: Option<JoinHandle<()>>,
    /// Name for logging
    name: String,
}

impl<S: Send + 'static> SerialQueue<S> {
    /// Start the worker thread owning `state`
    pub fn start(name: &str, mut state: S) -> std::io::Result<Self> {
        let (sender, receiver) = mpsc::channel::<Job<S>>();
        let name_clone = name.to_string();

        info!(name = %name, "Starting serial queue");

        let thread_handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                debug!(name = %name_clone, "Serial queue thread started");

                while let Ok(job) = receiver.recv() {
                    let result = panic::catch_unwind(AssertUnwindSafe(|| job(&mut state)));
                    if result.is_err() {
                        warn!(name = %name_clone, "Job panicked, queue keeps running");
                    }
                }

                info!(name = %name_clone, "Serial queue thread exiting");
            })?;

        Ok(Self {
            sender: Some(sender),
            thread_handle: Some(thread_handle),
            name: name.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue a job without waiting for it
    ///
    /// Returns `false` if the worker is gone and the job was discarded.
    pub fn dispatch_async<F>(&self, job: F) -> bool
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        match &self.sender {
            Some(sender) => sender.send(Box::new(job)).is_ok(),
            None => false,
        }
    }

    /// Run a job and wait for its result
    ///
    /// Returns `None` if the worker is gone or the job panicked. Must not be
    /// called from a job running on this same queue.
    pub fn dispatch_sync<R, F>(&self, job: F) -> Option<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut S) -> R + Send + 'static,
    {
        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        let queued = self.dispatch_async(move |state| {
            let _ = reply_tx.send(job(state));
        });
        if !queued {
            return None;
        }
        reply_rx.recv().ok()
    }

    /// Wait until every job queued before this call has run
    pub fn flush(&self) {
        let _ = self.dispatch_sync(|_| ());
    }

    /// Check if the worker thread is still alive
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }
}

impl<S: Send + 'static> Drop for SerialQueue<S> {
    fn drop(&mut self) {
        // Closing the channel lets the worker finish pending jobs and exit
        self.sender.take();
        if let Some(handle) = self.thread_handle.take() {
            debug!(name = %self.name, "Waiting for serial queue thread to finish");
            if let Err(e) = handle.join() {
                warn!(name = %self.name, "Serial queue thread panicked: {:?}", e);
            }
        }
    }
}
