//! Close-once broadcast signal.

use flume::{Receiver, RecvError, RecvTimeoutError, Sender};
use std::convert::Infallible;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// A one-shot broadcast primitive that is closed exactly once.
///
/// The signal never carries a value. It is backed by a `flume` channel whose
/// only sender is dropped on [`close`](Self::close), so every listener
/// observes disconnection at the same moment. Clones share the same state.
#[derive(Debug, Clone)]
pub struct TerminalSignal {
    inner: Arc<SignalInner>,
}

#[derive(Debug)]
struct SignalInner {
    /// `Some` while open. Taken (and dropped) by the closing call.
    closer: Mutex<Option<Sender<Infallible>>>,
    listener: Receiver<Infallible>,
}

impl TerminalSignal {
    /// Creates an open signal.
    pub fn new() -> Self {
        let (closer, listener) = flume::bounded(0);
        Self {
            inner: Arc::new(SignalInner {
                closer: Mutex::new(Some(closer)),
                listener,
            }),
        }
    }

    /// Closes the signal, releasing every waiter.
    ///
    /// Returns `true` only for the call that actually closed it; later calls
    /// are no-ops returning `false`. Only the bridge's terminal winner and
    /// [`CancelHandle`](crate::CancelHandle) close signals; holders outside
    /// the crate can only wait.
    pub(crate) fn close(&self) -> bool {
        let closer = self
            .inner
            .closer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        // Dropping the last sender disconnects every listener.
        closer.is_some()
    }

    /// Returns `true` once the signal has been closed.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.inner.listener.is_disconnected()
    }

    /// Returns a receiver that disconnects when the signal closes.
    ///
    /// Intended for `flume::Selector` waits racing the signal against other
    /// channels. The receiver never yields a value. It also disconnects once
    /// every `TerminalSignal` clone is dropped, so keep one alive for as long
    /// as the listener is in use.
    pub fn listener(&self) -> Receiver<Infallible> {
        self.inner.listener.clone()
    }

    /// Blocks until the signal is closed.
    pub fn wait(&self) {
        match self.inner.listener.recv() {
            Ok(never) => match never {},
            Err(RecvError::Disconnected) => {}
        }
    }

    /// Blocks until the signal is closed or `timeout` elapses.
    ///
    /// Returns `true` if the signal is closed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        Self::closed(self.inner.listener.recv_timeout(timeout))
    }

    /// Blocks until the signal is closed or `deadline` passes.
    ///
    /// Returns `true` if the signal is closed.
    pub fn wait_deadline(&self, deadline: Instant) -> bool {
        Self::closed(self.inner.listener.recv_deadline(deadline))
    }

    fn closed(result: Result<Infallible, RecvTimeoutError>) -> bool {
        match result {
            Ok(never) => match never {},
            Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => false,
        }
    }
}

impl Default for TerminalSignal {
    fn default() -> Self {
        Self::new()
    }
}
