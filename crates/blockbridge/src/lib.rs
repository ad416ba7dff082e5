//! Blocking Bridge for Push-Based Streams
//!
//! This crate turns a callback-driven producer (a [`Publisher`] calling
//! `on_next` / `on_complete` / `on_error` on a [`Subscriber`]) into something
//! an ordinary sequential call site can block on.
//!
//! # Features
//!
//! - **Exactly-once termination**: completion, error and context cancellation
//!   race for a single atomic compare-and-swap; the winner alone closes the
//!   [`TerminalSignal`]
//! - **Error before signal**: a failing stream writes the error slot before
//!   closing the signal, so a woken consumer always finds it
//! - **Blocking backpressure**: `on_next` blocks on a full item channel
//! - **Cancellation watcher**: a live [`Context`] gets a watcher thread that
//!   turns cancellation into [`BlockError::Cancelled`]
//! - **Reference-count handoff**: items exposing [`Releasable`] are retained
//!   once per forwarded delivery; the consumer releases them
//!
//! # Example
//!
//! ```
//! use blockbridge::{bridge, from_iter, BridgeConfig, Context, Publisher};
//!
//! let (subscriber, rx) = bridge::<u32>(&BridgeConfig::bounded(16));
//! from_iter(vec![1u32, 2, 3]).subscribe(Context::background(), subscriber);
//!
//! while let Some(item) = rx.recv().unwrap() {
//!     println!("Received: {}", item);
//! }
//! ```

mod bridge;
mod config;
mod context;
mod error;
mod invariants;
mod payload;
mod reactive;
mod receiver;
mod signal;

pub use bridge::BlockSubscriber;
pub use config::{BridgeConfig, DEFAULT_CAPACITY, DEFAULT_WATCHER_NAME};
pub use context::{CancelHandle, Context};
pub use error::{BlockError, BoxError};
pub use payload::{Payload, Releasable, SharedPayload};
pub use reactive::{
    failed, from_iter, ErrorPublisher, IterPublisher, NoopSubscription, Publisher, Subscriber,
    Subscription, REQUEST_INFINITE,
};
pub use receiver::{block_collect, block_last, bridge, BlockingReceiver, IntoIter, Iter};
pub use signal::TerminalSignal;
