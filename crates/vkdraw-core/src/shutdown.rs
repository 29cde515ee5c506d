// SPDX-License-Identifier: CEPL-1.0
//! Exit request / cleanup acknowledgement handshake.
//!
//! The frame loop owns the [`ShutdownListener`]; anything else that wants the
//! process to stop (signal handlers, tests, a supervisor thread) holds a
//! [`ShutdownHandle`]. A requester raises the exit signal and may then block
//! until the loop has released every GPU object and acknowledged.

use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
struct ExitToken {
    requested: Arc<AtomicBool>,
    tx: Sender<()>,
    rx: Receiver<()>,
}

impl ExitToken {
    fn new() -> Self {
        let (tx, rx) = bounded(1);
        Self {
            requested: Arc::new(AtomicBool::new(false)),
            tx,
            rx,
        }
    }

    fn request(&self) {
        // Only the first request lands in the channel.
        if !self.requested.swap(true, Ordering::AcqRel) {
            let _ = self.tx.try_send(());
        }
    }

    fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }
}

/// Requester side. Cheap to clone and `Send`.
#[derive(Clone)]
pub struct ShutdownHandle {
    exit: ExitToken,
    done: Receiver<()>,
}

/// Frame-loop side. Dropping it (or calling [`ShutdownListener::acknowledge`])
/// releases every waiter.
pub struct ShutdownListener {
    exit: ExitToken,
    // Never sent on; dropped to signal completion.
    _done: Sender<()>,
    done_rx: Receiver<()>,
}

pub fn channel() -> (ShutdownHandle, ShutdownListener) {
    let exit = ExitToken::new();
    let (done_tx, done_rx) = bounded::<()>(0);
    (
        ShutdownHandle {
            exit: exit.clone(),
            done: done_rx.clone(),
        },
        ShutdownListener {
            exit,
            _done: done_tx,
            done_rx,
        },
    )
}

impl ShutdownHandle {
    /// Idempotent.
    pub fn request_exit(&self) {
        self.exit.request();
    }

    pub fn is_exit_requested(&self) -> bool {
        self.exit.is_requested()
    }

    /// Blocks until the listener has acknowledged (or was dropped).
    pub fn wait_done(&self) {
        // No message is ever sent; disconnection is the signal.
        let _ = self.done.recv();
    }

    /// Returns `true` if cleanup was acknowledged within `timeout`.
    pub fn wait_done_timeout(&self, timeout: Duration) -> bool {
        !matches!(self.done.recv_timeout(timeout), Err(RecvTimeoutError::Timeout))
    }

    pub fn is_done(&self) -> bool {
        matches!(self.done.try_recv(), Err(TryRecvError::Disconnected))
    }

    pub fn request_and_wait(&self) {
        self.request_exit();
        self.wait_done();
    }
}

impl ShutdownListener {
    /// Fires once, on the first exit request. Meant for `select!`.
    pub fn exit_signal(&self) -> &Receiver<()> {
        &self.exit.rx
    }

    pub fn request_exit(&self) {
        self.exit.request();
    }

    pub fn is_exit_requested(&self) -> bool {
        self.exit.is_requested()
    }

    /// A further requester handle, e.g. for a signal thread spawned later.
    pub fn handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            exit: self.exit.clone(),
            done: self.done_rx.clone(),
        }
    }

    pub fn acknowledge(self) {
        drop(self);
    }
}
