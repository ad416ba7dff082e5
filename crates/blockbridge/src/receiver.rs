//! Consumer side: blocking waits over the bridge's channels.

use crate::bridge::BlockSubscriber;
use crate::config::BridgeConfig;
use crate::context::Context;
use crate::error::BlockError;
use crate::payload::Payload;
use crate::reactive::Publisher;
use crate::signal::TerminalSignal;
use flume::{Receiver, RecvError, Selector, TryRecvError};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Creates a bridge and the matching blocking receiver.
///
/// Returns the producer-facing [`BlockSubscriber`] (hand it to a
/// [`Publisher`]) and a [`BlockingReceiver`] for the consuming thread.
///
/// # Example
///
/// ```
/// use blockbridge::{bridge, from_iter, BridgeConfig, Context, Publisher};
///
/// let (subscriber, rx) = bridge::<u64>(&BridgeConfig::bounded(8));
/// from_iter(1..=3u64).subscribe(Context::background(), subscriber);
///
/// let items: Vec<u64> = rx.into_iter().collect::<Result<_, _>>().unwrap();
/// assert_eq!(items, vec![1, 2, 3]);
/// ```
pub fn bridge<T>(config: &BridgeConfig) -> (BlockSubscriber<T>, BlockingReceiver<T>)
where
    T: Payload + Send + 'static,
{
    let (items_tx, items_rx) = match config.capacity {
        Some(capacity) => flume::bounded(capacity),
        None => flume::unbounded(),
    };
    let (errors_tx, errors_rx) = flume::bounded(1);
    let terminal = TerminalSignal::new();

    let subscriber = BlockSubscriber::new(terminal.clone(), items_tx, errors_tx)
        .with_watcher_name(&config.watcher_name);
    let receiver = BlockingReceiver::new(terminal, items_rx, errors_rx);

    (subscriber, receiver)
}

/// Subscribes `publisher` and blocks until it terminates, returning the last
/// item it emitted.
///
/// Earlier items are dropped; reference-counted ones are released first. On
/// error every share still held, including the last item, is released.
pub fn block_last<P, T>(publisher: P, ctx: Context, config: &BridgeConfig) -> Result<Option<T>, BlockError>
where
    P: Publisher<T>,
    T: Payload + Send + 'static,
{
    let (subscriber, receiver) = bridge(config);
    publisher.subscribe(ctx, subscriber);

    let mut last: Option<T> = None;
    for item in &receiver {
        match item {
            Ok(item) => {
                if let Some(prev) = last.replace(item) {
                    release(&prev);
                }
            }
            Err(e) => {
                last.iter().for_each(release);
                receiver.discard_queued();
                return Err(e);
            }
        }
    }
    Ok(last)
}

/// Subscribes `publisher` and blocks until it terminates, returning every
/// item in emission order.
///
/// On error the items collected so far are released and dropped.
pub fn block_collect<P, T>(publisher: P, ctx: Context, config: &BridgeConfig) -> Result<Vec<T>, BlockError>
where
    P: Publisher<T>,
    T: Payload + Send + 'static,
{
    let (subscriber, receiver) = bridge(config);
    publisher.subscribe(ctx, subscriber);

    let mut collected = Vec::new();
    for item in &receiver {
        match item {
            Ok(item) => collected.push(item),
            Err(e) => {
                collected.iter().for_each(release);
                receiver.discard_queued();
                return Err(e);
            }
        }
    }
    Ok(collected)
}

fn release<T: Payload>(item: &T) {
    if let Some(r) = item.releasable() {
        r.release();
    }
}

/// Blocking consumer over a bridge's item channel, error slot and terminal
/// signal.
///
/// Items already queued when the stream terminates are still handed out
/// before the terminal outcome is reported. After that every call returns
/// the same outcome: `Ok(None)` for a clean completion, the slot's error
/// otherwise.
#[derive(Debug)]
pub struct BlockingReceiver<T> {
    terminal: TerminalSignal,
    items: Receiver<T>,
    errors: Receiver<BlockError>,
    failure: OnceLock<BlockError>,
}

/// What ended a select-wait.
enum Wake<T> {
    Item(T),
    Terminated,
    Abandoned,
}

impl<T> BlockingReceiver<T> {
    /// Wraps the receiving ends of a bridge's channels.
    pub fn new(terminal: TerminalSignal, items: Receiver<T>, errors: Receiver<BlockError>) -> Self {
        Self {
            terminal,
            items,
            errors,
            failure: OnceLock::new(),
        }
    }

    /// Blocks until the next item or the end of the stream.
    pub fn recv(&self) -> Result<Option<T>, BlockError> {
        self.wait(None)
    }

    /// Like [`recv`](Self::recv), giving up with [`BlockError::Timeout`]
    /// after `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<T>, BlockError> {
        self.wait(Some(Instant::now() + timeout))
    }

    /// Like [`recv`](Self::recv), giving up with [`BlockError::Timeout`]
    /// once `deadline` passes.
    pub fn recv_deadline(&self, deadline: Instant) -> Result<Option<T>, BlockError> {
        self.wait(Some(deadline))
    }

    /// Returns a queued item without blocking.
    ///
    /// Fails with [`BlockError::Empty`] while the stream is active and
    /// nothing is queued.
    pub fn try_recv(&self) -> Result<Option<T>, BlockError> {
        match self.items.try_recv() {
            Ok(item) => Ok(Some(item)),
            Err(TryRecvError::Empty) if self.terminal.is_closed() => self.outcome(),
            Err(TryRecvError::Empty) => Err(BlockError::Empty),
            Err(TryRecvError::Disconnected) => self.disconnected(),
        }
    }

    /// Iterates over items until the stream ends.
    ///
    /// Yields `Err` at most once, as the last element.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            receiver: self,
            finished: false,
        }
    }

    /// The terminal signal shared with the producer side.
    pub fn terminal(&self) -> &TerminalSignal {
        &self.terminal
    }

    /// Returns `true` once the producer side has terminated the stream.
    ///
    /// Queued items may still be waiting.
    pub fn is_terminated(&self) -> bool {
        self.terminal.is_closed()
    }

    /// Number of items queued for this consumer.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if no items are queued.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drops every item still queued, releasing reference-counted ones.
    fn discard_queued(&self)
    where
        T: Payload,
    {
        for item in self.items.try_iter() {
            release(&item);
        }
    }

    fn wait(&self, deadline: Option<Instant>) -> Result<Option<T>, BlockError> {
        match self.items.try_recv() {
            Ok(item) => return Ok(Some(item)),
            Err(TryRecvError::Empty) if self.terminal.is_closed() => return self.outcome(),
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => return self.disconnected(),
        }

        let listener = self.terminal.listener();
        let selector = Selector::new()
            .recv(&self.items, |r: Result<T, RecvError>| match r {
                Ok(item) => Wake::Item(item),
                Err(RecvError::Disconnected) => Wake::Abandoned,
            })
            .recv(&listener, |_| Wake::Terminated);

        let wake = match deadline {
            Some(deadline) => selector.wait_deadline(deadline).map_err(|_| BlockError::Timeout)?,
            None => selector.wait(),
        };

        match wake {
            Wake::Item(item) => Ok(Some(item)),
            // Items enqueued before the signal closed come first.
            Wake::Terminated => match self.items.try_recv() {
                Ok(item) => Ok(Some(item)),
                Err(_) => self.outcome(),
            },
            Wake::Abandoned => self.disconnected(),
        }
    }

    fn disconnected(&self) -> Result<Option<T>, BlockError> {
        if self.terminal.is_closed() {
            self.outcome()
        } else {
            tracing::debug!("item channel disconnected before the stream terminated");
            Err(BlockError::Abandoned)
        }
    }

    /// Reads the error slot once and remembers what it held.
    fn outcome(&self) -> Result<Option<T>, BlockError> {
        if let Some(err) = self.failure.get() {
            return Err(err.clone());
        }
        match self.errors.try_recv() {
            Ok(err) => Err(self.failure.get_or_init(|| err).clone()),
            Err(_) => Ok(None),
        }
    }
}

/// Borrowing iterator returned by [`BlockingReceiver::iter`].
#[derive(Debug)]
pub struct Iter<'a, T> {
    receiver: &'a BlockingReceiver<T>,
    finished: bool,
}

impl<T> Iterator for Iter<'_, T> {
    type Item = Result<T, BlockError>;

    fn next(&mut self) -> Option<Self::Item> {
        advance(self.receiver, &mut self.finished)
    }
}

/// One iteration step: an item, the final error, or the end.
fn advance<T>(receiver: &BlockingReceiver<T>, finished: &mut bool) -> Option<Result<T, BlockError>> {
    if *finished {
        return None;
    }
    match receiver.recv() {
        Ok(Some(item)) => Some(Ok(item)),
        Ok(None) => {
            *finished = true;
            None
        }
        Err(err) => {
            *finished = true;
            Some(Err(err))
        }
    }
}

impl<'a, T> IntoIterator for &'a BlockingReceiver<T> {
    type Item = Result<T, BlockError>;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Owning iterator over a [`BlockingReceiver`].
#[derive(Debug)]
pub struct IntoIter<T> {
    receiver: BlockingReceiver<T>,
    finished: bool,
}

impl<T> Iterator for IntoIter<T> {
    type Item = Result<T, BlockError>;

    fn next(&mut self) -> Option<Self::Item> {
        advance(&self.receiver, &mut self.finished)
    }
}

impl<T> IntoIterator for BlockingReceiver<T> {
    type Item = Result<T, BlockError>;
    type IntoIter = IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter {
            receiver: self,
            finished: false,
        }
    }
}
