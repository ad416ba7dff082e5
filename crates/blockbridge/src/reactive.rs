//! Producer-facing contract: subscribers, subscriptions and publishers.

use crate::context::Context;
use crate::error::BlockError;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, Thread};

/// Demand value meaning "send everything, never wait for more requests".
pub const REQUEST_INFINITE: u64 = u64::MAX;

/// Demand-control handle given to a subscriber when it subscribes.
pub trait Subscription: Send + Sync {
    /// Requests `n` more items. [`REQUEST_INFINITE`] lifts the limit for good.
    fn request(&self, n: u64);

    /// Asks the producer to stop emitting.
    fn cancel(&self);
}

/// Receiver of a push-based stream.
///
/// A producer calls `on_subscribe` once, then `on_next` for every item, and
/// finishes with at most one of `on_complete` / `on_error`.
pub trait Subscriber<T>: Send + Sync {
    fn on_subscribe(&self, ctx: &Context, subscription: &dyn Subscription);

    fn on_next(&self, item: T);

    fn on_complete(&self);

    fn on_error(&self, err: BlockError);
}

/// Source of a push-based stream.
pub trait Publisher<T> {
    /// Starts emitting into `subscriber` under `ctx`.
    fn subscribe<S>(self, ctx: Context, subscriber: S)
    where
        S: Subscriber<T> + 'static;
}

/// Publisher that emits the items of an iterator on its own thread.
///
/// Honors demand and `Subscription::cancel`, and stops quietly once the
/// subscribe-time context is cancelled.
#[derive(Debug, Clone)]
pub struct IterPublisher<I> {
    iter: I,
}

/// Creates a publisher emitting every item of `iter`, then completing.
pub fn from_iter<I>(iter: I) -> IterPublisher<I>
where
    I: IntoIterator,
{
    IterPublisher { iter }
}

impl<I> Publisher<I::Item> for IterPublisher<I>
where
    I: IntoIterator + Send + 'static,
    I::Item: Send + 'static,
{
    fn subscribe<S>(self, ctx: Context, subscriber: S)
    where
        S: Subscriber<I::Item> + 'static,
    {
        let iter = self.iter;
        let spawned = thread::Builder::new()
            .name("blockbridge-publisher".into())
            .spawn(move || emit(iter, &ctx, &subscriber));

        if let Err(e) = spawned {
            tracing::warn!(error = %e, "failed to spawn publisher thread");
        }
    }
}

fn emit<I, S>(iter: I, ctx: &Context, subscriber: &S)
where
    I: IntoIterator,
    S: Subscriber<I::Item>,
{
    let subscription = DemandSubscription::new(thread::current());
    subscriber.on_subscribe(ctx, &subscription);

    for item in iter {
        if ctx.is_cancelled() || !subscription.acquire() {
            tracing::trace!("publisher stopped before exhausting its source");
            return;
        }
        subscriber.on_next(item);
    }

    if !subscription.is_cancelled() {
        subscriber.on_complete();
    }
}

/// Subscription counting outstanding demand for a single emitter thread.
#[derive(Debug)]
struct DemandSubscription {
    demand: AtomicU64,
    cancelled: AtomicBool,
    emitter: Thread,
}

impl DemandSubscription {
    fn new(emitter: Thread) -> Self {
        Self {
            demand: AtomicU64::new(0),
            cancelled: AtomicBool::new(false),
            emitter,
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Takes one unit of demand, parking the emitter until some is granted.
    /// Returns `false` if the subscription was cancelled instead.
    fn acquire(&self) -> bool {
        loop {
            if self.is_cancelled() {
                return false;
            }
            let demand = self.demand.load(Ordering::Acquire);
            if demand == REQUEST_INFINITE {
                return true;
            }
            if demand == 0 {
                thread::park();
                continue;
            }
            if self
                .demand
                .compare_exchange(demand, demand - 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return true;
            }
        }
    }
}

impl Subscription for DemandSubscription {
    fn request(&self, n: u64) {
        if n == 0 {
            return;
        }
        // REQUEST_INFINITE is sticky: saturating_add never leaves u64::MAX.
        let _ = self
            .demand
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |d| Some(d.saturating_add(n)));
        self.emitter.unpark();
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.emitter.unpark();
    }
}

/// Publisher that fails as soon as it is subscribed.
#[derive(Debug, Clone)]
pub struct ErrorPublisher {
    err: BlockError,
}

/// Creates a publisher that immediately signals `err`.
pub fn failed(err: BlockError) -> ErrorPublisher {
    ErrorPublisher { err }
}

impl<T> Publisher<T> for ErrorPublisher {
    fn subscribe<S>(self, ctx: Context, subscriber: S)
    where
        S: Subscriber<T> + 'static,
    {
        subscriber.on_subscribe(&ctx, &NoopSubscription);
        subscriber.on_error(self.err);
    }
}

/// Subscription for publishers that ignore demand.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSubscription;

impl Subscription for NoopSubscription {
    fn request(&self, _n: u64) {}

    fn cancel(&self) {}
}
