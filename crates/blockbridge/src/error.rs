//! Error types surfaced through the bridge's error slot and receiver.

use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;

/// Boxed producer error accepted by [`BlockError::upstream`].
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Errors observed by a blocking consumer.
///
/// Only [`Cancelled`](Self::Cancelled) and [`Upstream`](Self::Upstream) ever
/// travel through the error slot. The remaining variants are produced by
/// [`BlockingReceiver`](crate::BlockingReceiver) while waiting.
#[derive(Debug, Clone, Error)]
pub enum BlockError {
    /// The ambient context was cancelled (or hit its deadline) before the
    /// producer terminated the stream.
    #[error("subscription cancelled")]
    Cancelled,

    /// The producer failed. The original error is kept as-is.
    #[error(transparent)]
    Upstream(Arc<dyn StdError + Send + Sync + 'static>),

    /// A timed wait elapsed before an item or a terminal signal arrived.
    #[error("timed out waiting for the stream")]
    Timeout,

    /// `try_recv` found no item and the stream is still active.
    #[error("no item available")]
    Empty,

    /// Every producer handle was dropped without a terminal notification.
    #[error("producer dropped the bridge without terminating the stream")]
    Abandoned,
}

impl BlockError {
    /// Wraps a producer-originated error.
    pub fn upstream<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Upstream(Arc::from(err.into()))
    }

    /// Returns `true` if this is the synthetic cancellation error.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns `true` if the stream is over and further waits are pointless.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Upstream(_) | Self::Abandoned)
    }

    /// Attempts to view the producer's error as a concrete type.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: StdError + 'static,
    {
        match self {
            Self::Upstream(err) => err.downcast_ref::<E>(),
            _ => None,
        }
    }
}

impl PartialEq for BlockError {
    /// Upstream errors compare by identity: two values are equal only when
    /// they share the same underlying error allocation.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Upstream(a), Self::Upstream(b)) => Arc::ptr_eq(a, b),
            (Self::Cancelled, Self::Cancelled)
            | (Self::Timeout, Self::Timeout)
            | (Self::Empty, Self::Empty)
            | (Self::Abandoned, Self::Abandoned) => true,
            _ => false,
        }
    }
}
