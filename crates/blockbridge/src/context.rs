//! Ambient cancellation context.

use crate::signal::TerminalSignal;
use std::time::{Duration, Instant};

/// Ambient cancellation context handed to [`Subscriber::on_subscribe`].
///
/// Two sentinel contexts, [`background`](Self::background) and
/// [`todo`](Self::todo), mean "no cancellation wanted". Every other context is
/// live: it can be cancelled through its [`CancelHandle`] and may carry a
/// deadline. Clones of a live context share its cancellation state.
///
/// [`Subscriber::on_subscribe`]: crate::Subscriber::on_subscribe
#[derive(Debug, Clone, Default)]
pub struct Context {
    kind: Kind,
}

#[derive(Debug, Clone, Default)]
enum Kind {
    #[default]
    Background,
    Todo,
    Live {
        cancelled: TerminalSignal,
        deadline: Option<Instant>,
    },
}

impl Context {
    /// The root sentinel context. Never cancelled.
    pub fn background() -> Self {
        Self {
            kind: Kind::Background,
        }
    }

    /// Placeholder sentinel for call sites that have not decided on a
    /// context yet. Never cancelled.
    pub fn todo() -> Self {
        Self { kind: Kind::Todo }
    }

    /// Creates a live context cancelled by the returned handle.
    pub fn with_cancel() -> (Self, CancelHandle) {
        Self::live(None)
    }

    /// Creates a live context that counts as cancelled once `deadline`
    /// passes, or earlier through the returned handle.
    pub fn with_deadline(deadline: Instant) -> (Self, CancelHandle) {
        Self::live(Some(deadline))
    }

    /// Like [`with_deadline`](Self::with_deadline), relative to now.
    pub fn with_timeout(timeout: Duration) -> (Self, CancelHandle) {
        Self::with_deadline(Instant::now() + timeout)
    }

    fn live(deadline: Option<Instant>) -> (Self, CancelHandle) {
        let cancelled = TerminalSignal::new();
        let handle = CancelHandle {
            cancelled: cancelled.clone(),
        };
        let ctx = Self {
            kind: Kind::Live {
                cancelled,
                deadline,
            },
        };
        (ctx, handle)
    }

    /// Returns `true` for the two non-cancellable sentinels.
    #[inline]
    pub fn is_sentinel(&self) -> bool {
        matches!(self.kind, Kind::Background | Kind::Todo)
    }

    /// Returns `true` if the context was cancelled or its deadline passed.
    pub fn is_cancelled(&self) -> bool {
        match &self.kind {
            Kind::Background | Kind::Todo => false,
            Kind::Live {
                cancelled,
                deadline,
            } => cancelled.is_closed() || deadline.is_some_and(|d| Instant::now() >= d),
        }
    }

    /// The deadline of a live context, if it has one.
    pub fn deadline(&self) -> Option<Instant> {
        match &self.kind {
            Kind::Live { deadline, .. } => *deadline,
            _ => None,
        }
    }

    /// Signal closed on explicit cancellation.
    ///
    /// `None` for sentinels. The returned clone keeps the cancellation state
    /// alive, so dropping the context and its handle never looks like a
    /// cancellation to whoever holds it. The deadline is not folded in;
    /// watchers race it separately via [`deadline`](Self::deadline).
    pub fn done(&self) -> Option<TerminalSignal> {
        match &self.kind {
            Kind::Live { cancelled, .. } => Some(cancelled.clone()),
            _ => None,
        }
    }
}

/// Cancels a live [`Context`].
///
/// Cloneable; any clone may cancel, and only the first call has an effect.
/// Dropping the handle does not cancel the context.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    cancelled: TerminalSignal,
}

impl CancelHandle {
    /// Cancels the context. Idempotent.
    pub fn cancel(&self) {
        if self.cancelled.close() {
            tracing::debug!("context cancelled");
        }
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.is_closed()
    }
}
