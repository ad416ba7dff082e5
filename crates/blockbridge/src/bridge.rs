//! The blocking bridge subscriber.

use crate::config::DEFAULT_WATCHER_NAME;
use crate::context::Context;
use crate::error::BlockError;
#[cfg(debug_assertions)]
use crate::invariants::{
    debug_assert_active_forward, debug_assert_error_before_signal, debug_assert_sole_closer,
};
use crate::payload::Payload;
use crate::reactive::{Subscriber, Subscription, REQUEST_INFINITE};
use crate::signal::TerminalSignal;
use crossbeam_utils::CachePadded;
use flume::{Selector, SendError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

/// Subscriber that forwards a push-based stream into blocking channels.
///
/// Constructed from three channels the caller owns: the terminal signal, the
/// send side of the item channel and the send side of the error slot. The
/// consumer keeps the other ends and only ever waits on them.
///
/// # Termination
///
/// `on_complete`, `on_error` and cancellation of the subscribe-time
/// [`Context`] race for a single compare-and-swap on the terminal flag. The
/// winner closes the terminal signal (after writing the error slot, on the
/// failure paths); losers have no observable effect.
///
/// # Backpressure
///
/// `on_next` blocks while the item channel is full. That is the only pacing
/// the bridge applies; it requests unbounded demand up front.
pub struct BlockSubscriber<T> {
    inner: Arc<Inner<T>>,
    watcher_name: Arc<str>,
}

struct Inner<T> {
    /// `false` while active, `true` once terminated. Only ever flipped by CAS.
    terminated: CachePadded<AtomicBool>,
    terminal: TerminalSignal,
    items: Sender<T>,
    errors: Sender<BlockError>,
}

impl<T> Clone for BlockSubscriber<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            watcher_name: Arc::clone(&self.watcher_name),
        }
    }
}

impl<T> std::fmt::Debug for BlockSubscriber<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockSubscriber")
            .field("terminated", &self.is_terminated())
            .field("watcher_name", &self.watcher_name)
            .finish_non_exhaustive()
    }
}

impl<T> BlockSubscriber<T> {
    /// Creates an active bridge over caller-owned channels.
    ///
    /// The error slot must be able to hold one value without a reader
    /// (`flume::bounded(1)` or larger, or unbounded).
    pub fn new(terminal: TerminalSignal, items: Sender<T>, errors: Sender<BlockError>) -> Self {
        Self {
            inner: Arc::new(Inner {
                terminated: CachePadded::new(AtomicBool::new(false)),
                terminal,
                items,
                errors,
            }),
            watcher_name: Arc::from(DEFAULT_WATCHER_NAME),
        }
    }

    /// Sets the thread name used for the cancellation watcher.
    pub fn with_watcher_name(mut self, name: impl AsRef<str>) -> Self {
        self.watcher_name = Arc::from(name.as_ref());
        self
    }

    /// Returns `true` once a terminal event has won.
    #[inline]
    pub fn is_terminated(&self) -> bool {
        self.inner.is_terminated()
    }

    /// The terminal signal this bridge closes.
    pub fn terminal(&self) -> &TerminalSignal {
        &self.inner.terminal
    }
}

impl<T: Send + 'static> BlockSubscriber<T> {
    fn spawn_watcher(&self, cancelled: TerminalSignal, deadline: Option<Instant>) {
        let inner = Arc::clone(&self.inner);
        let spawned = thread::Builder::new()
            .name(self.watcher_name.to_string())
            .spawn(move || inner.watch(&cancelled, deadline));

        match spawned {
            Ok(_) => tracing::debug!(watcher = %self.watcher_name, "cancellation watcher started"),
            // Without a watcher the bridge still terminates through the producer.
            Err(e) => tracing::warn!(error = %e, "failed to spawn cancellation watcher"),
        }
    }
}

impl<T> Subscriber<T> for BlockSubscriber<T>
where
    T: Payload + Send + 'static,
{
    fn on_subscribe(&self, ctx: &Context, subscription: &dyn Subscription) {
        if let Some(cancelled) = ctx.done() {
            self.spawn_watcher(cancelled, ctx.deadline());
        }
        subscription.request(REQUEST_INFINITE);
    }

    fn on_next(&self, item: T) {
        let terminated = self.inner.is_terminated();
        if terminated {
            tracing::trace!("item dropped after termination");
            return;
        }

        // The consumer gets its own share; the producer may release its
        // reference as soon as this call returns.
        if let Some(r) = item.releasable() {
            r.inc_ref();
        }

        #[cfg(debug_assertions)]
        debug_assert_active_forward!(terminated);

        if let Err(SendError(item)) = self.inner.items.send(item) {
            // Consumer is gone: hand back the share it will never release.
            if let Some(r) = item.releasable() {
                r.release();
            }
            tracing::trace!("item dropped, consumer disconnected");
        }
    }

    fn on_complete(&self) {
        self.inner.complete();
    }

    fn on_error(&self, err: BlockError) {
        self.inner.fail(err);
    }
}

/// What woke the watcher.
enum Wake {
    Cancelled,
    Terminated,
}

impl<T> Inner<T> {
    #[inline]
    fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    /// The single `Active -> Terminated` transition.
    #[inline]
    fn try_terminate(&self) -> bool {
        self.terminated
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn complete(&self) {
        if !self.try_terminate() {
            tracing::trace!("completion after termination ignored");
            return;
        }

        let closed = self.terminal.close();
        #[cfg(debug_assertions)]
        debug_assert_sole_closer!(closed);
        tracing::debug!(closed, "stream completed");
    }

    fn fail(&self, err: BlockError) {
        if !self.try_terminate() {
            tracing::trace!(error = %err, "error after termination discarded");
            return;
        }

        tracing::debug!(error = %err, "stream terminated with error");
        // Slot first, signal second: a consumer woken by the signal must
        // find the error already there.
        if self.errors.send(err).is_err() {
            tracing::trace!("error slot receiver already dropped");
        }
        #[cfg(debug_assertions)]
        debug_assert_error_before_signal!(self.terminal.is_closed());

        let closed = self.terminal.close();
        #[cfg(debug_assertions)]
        debug_assert_sole_closer!(closed);
    }

    /// Races context cancellation (and deadline) against the terminal signal.
    ///
    /// `cancelled` is owned for the whole wait so its listener can only
    /// disconnect through an explicit cancel.
    fn watch(&self, cancelled: &TerminalSignal, deadline: Option<Instant>) {
        let cancel_listener = cancelled.listener();
        let terminal = self.terminal.listener();
        let selector = Selector::new()
            .recv(&cancel_listener, |_| Wake::Cancelled)
            .recv(&terminal, |_| Wake::Terminated);

        let wake = match deadline {
            Some(deadline) => selector.wait_deadline(deadline).unwrap_or(Wake::Cancelled),
            None => selector.wait(),
        };

        match wake {
            Wake::Cancelled => self.fail(BlockError::Cancelled),
            Wake::Terminated => tracing::trace!("watcher exiting, stream already terminated"),
        }
    }
}
