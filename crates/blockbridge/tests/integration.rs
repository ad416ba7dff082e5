//! Integration tests for blockbridge.

use blockbridge::{
    block_collect, block_last, bridge, failed, from_iter, BlockError, BlockSubscriber, BlockingReceiver,
    BridgeConfig, Context, NoopSubscription, Payload, Publisher, Releasable, SharedPayload, Subscriber,
    TerminalSignal,
};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

/// Builds the three channels by hand, the way an embedding call site would.
fn raw_bridge<T: Payload + Send + 'static>(capacity: usize) -> (BlockSubscriber<T>, BlockingReceiver<T>) {
    let terminal = TerminalSignal::new();
    let (items_tx, items_rx) = flume::bounded(capacity);
    let (errors_tx, errors_rx) = flume::bounded(1);
    (
        BlockSubscriber::new(terminal.clone(), items_tx, errors_tx),
        BlockingReceiver::new(terminal, items_rx, errors_rx),
    )
}

#[test]
fn test_items_then_complete() {
    let (tx, rx) = raw_bridge::<&'static str>(1);

    let producer = thread::spawn(move || {
        tx.on_subscribe(&Context::background(), &NoopSubscription);
        tx.on_next("A");
        tx.on_next("B");
        tx.on_complete();
    });

    assert_eq!(rx.recv_timeout(WAIT), Ok(Some("A")));
    assert_eq!(rx.recv_timeout(WAIT), Ok(Some("B")));
    assert_eq!(rx.recv_timeout(WAIT), Ok(None));
    assert!(rx.terminal().is_closed());

    producer.join().unwrap();
}

#[test]
fn test_item_then_error() {
    let (tx, rx) = raw_bridge::<&'static str>(1);
    let err = BlockError::upstream("E");
    let expected = err.clone();

    let producer = thread::spawn(move || {
        tx.on_subscribe(&Context::todo(), &NoopSubscription);
        tx.on_next("A");
        tx.on_error(err);
        // A late completion must not mask the error
        tx.on_complete();
    });

    assert_eq!(rx.recv_timeout(WAIT), Ok(Some("A")));
    assert_eq!(rx.recv_timeout(WAIT), Err(expected));

    producer.join().unwrap();
}

#[test]
fn test_cancel_without_items() {
    let (tx, rx) = bridge::<u32>(&BridgeConfig::default());
    let (ctx, cancel) = Context::with_cancel();

    tx.on_subscribe(&ctx, &NoopSubscription);
    cancel.cancel();
    // Cancelling twice changes nothing
    cancel.cancel();

    let got: Vec<_> = rx.iter().collect();
    assert_eq!(got, vec![Err(BlockError::Cancelled)]);
    assert!(tx.is_terminated());
}

#[test]
fn test_deadline_cancels_stalled_stream() {
    let (tx, rx) = bridge::<u32>(&BridgeConfig::default());
    let (ctx, _cancel) = Context::with_timeout(Duration::from_millis(20));

    tx.on_subscribe(&ctx, &NoopSubscription);

    let err = rx.recv_timeout(WAIT).unwrap_err();
    assert!(err.is_cancelled());
}

#[test]
fn test_completion_after_cancel_is_swallowed() {
    let (tx, rx) = bridge::<u32>(&BridgeConfig::default());
    let (ctx, cancel) = Context::with_cancel();

    tx.on_subscribe(&ctx, &NoopSubscription);
    cancel.cancel();
    assert!(rx.terminal().wait_timeout(WAIT));

    tx.on_next(9);
    tx.on_complete();
    tx.on_error(BlockError::upstream("late"));

    assert_eq!(rx.recv(), Err(BlockError::Cancelled));
    assert!(rx.is_empty());
}

#[test]
fn test_sentinel_contexts_spawn_no_watcher() {
    for ctx in [Context::background(), Context::todo()] {
        let (tx, rx) = bridge::<u32>(&BridgeConfig::default());
        tx.on_subscribe(&ctx, &NoopSubscription);

        // With no watcher holding the bridge, dropping the producer side
        // disconnects the item channel immediately.
        drop(tx);
        assert_eq!(rx.recv_timeout(WAIT), Err(BlockError::Abandoned));
    }
}

#[test]
fn test_concurrent_complete_and_error() {
    for _ in 0..200 {
        let (tx, rx) = bridge::<u32>(&BridgeConfig::default());
        let barrier = Arc::new(Barrier::new(2));
        let err = BlockError::upstream("racer");
        let expected = err.clone();

        let completer = {
            let tx = tx.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                tx.on_complete();
            })
        };
        let failer = thread::spawn(move || {
            barrier.wait();
            tx.on_error(err);
        });

        completer.join().unwrap();
        failer.join().unwrap();

        // Exactly one outcome, whichever won
        match rx.recv() {
            Ok(None) => {}
            Err(e) => assert_eq!(e, expected),
            Ok(Some(item)) => panic!("unexpected item {item}"),
        }
        assert!(rx.terminal().is_closed());
    }
}

#[test]
fn test_refcounted_items_retained_once_per_delivery() {
    let (tx, rx) = bridge::<Arc<SharedPayload>>(&BridgeConfig::bounded(4));
    let first = Arc::new(SharedPayload::from_data("one"));
    let second = Arc::new(SharedPayload::from_data("two"));

    tx.on_next(Arc::clone(&first));
    tx.on_next(Arc::clone(&first));
    assert_eq!(first.ref_count(), 3);

    tx.on_complete();
    tx.on_next(Arc::clone(&second));
    assert_eq!(second.ref_count(), 1, "dropped item must not be retained");

    let received: Vec<_> = rx.iter().collect::<Result<_, _>>().unwrap();
    assert_eq!(received.len(), 2);
    for payload in &received {
        assert_eq!(payload.data_utf8(), Some("one"));
        payload.release();
    }
    assert_eq!(first.ref_count(), 1);
}

#[test]
fn test_slow_consumer_backpressure() {
    let (tx, rx) = bridge::<u64>(&BridgeConfig::bounded(1));

    let producer = thread::spawn(move || {
        for i in 0..100 {
            tx.on_next(i);
        }
        tx.on_complete();
    });

    let mut prev = None;
    for item in &rx {
        let item = item.unwrap();
        if let Some(p) = prev {
            assert!(item > p, "FIFO violation: {} came after {}", item, p);
        }
        prev = Some(item);
    }
    assert_eq!(prev, Some(99));

    producer.join().unwrap();
}

#[test]
fn test_publisher_block_helpers() {
    let items = block_collect(from_iter(0..10u32), Context::background(), &BridgeConfig::default()).unwrap();
    assert_eq!(items, (0..10).collect::<Vec<_>>());

    let last = block_last(from_iter(vec![1u8, 2, 3]), Context::background(), &BridgeConfig::unbounded());
    assert_eq!(last, Ok(Some(3)));

    let empty = block_last(from_iter(Vec::<u8>::new()), Context::todo(), &BridgeConfig::default());
    assert_eq!(empty, Ok(None));
}

#[test]
fn test_failed_publisher() {
    let err = BlockError::upstream("refused");
    let result = block_last::<_, u32>(failed(err.clone()), Context::background(), &BridgeConfig::default());
    assert_eq!(result, Err(err));
}

#[test]
fn test_block_last_releases_superseded_payloads() {
    let payloads: Vec<_> = (0..3u8)
        .map(|i| Arc::new(SharedPayload::from_data(vec![i])))
        .collect();
    let handles = payloads.clone();

    let last = block_last(from_iter(payloads), Context::background(), &BridgeConfig::bounded(4))
        .unwrap()
        .expect("one payload");

    assert_eq!(last.data(), &[2]);
    // Superseded payloads are back to their creator's share
    assert_eq!(handles[0].ref_count(), 1);
    assert_eq!(handles[1].ref_count(), 1);
    // The consumer still holds the last one
    assert_eq!(handles[2].ref_count(), 2);
}

#[test]
fn test_cancel_stops_endless_publisher() {
    let (ctx, cancel) = Context::with_cancel();
    let (tx, rx) = bridge::<u64>(&BridgeConfig::bounded(8));
    from_iter(0u64..).subscribe(ctx, tx);

    let mut seen = 0;
    loop {
        match rx.recv_timeout(WAIT) {
            Ok(Some(_)) => {
                seen += 1;
                if seen == 10 {
                    cancel.cancel();
                }
            }
            Ok(None) => panic!("endless stream completed"),
            Err(e) => {
                assert!(e.is_cancelled(), "unexpected error {e}");
                break;
            }
        }
    }
    assert!(seen >= 10);
}

#[test]
fn test_bridge_config() {
    let config = BridgeConfig::default();
    assert_eq!(config.capacity, Some(1));
    assert_eq!(config.watcher_name, "blockbridge-watcher");

    assert_eq!(BridgeConfig::unbounded().capacity, None);
    assert_eq!(BridgeConfig::bounded(32).capacity, Some(32));

    let config = BridgeConfig::default()
        .with_capacity(Some(2))
        .with_watcher_name("rpc-block");
    assert_eq!(config.capacity, Some(2));
    assert_eq!(config.watcher_name, "rpc-block");
}

#[test]
fn test_dropped_context_does_not_cancel() {
    let (tx, rx) = raw_bridge::<u32>(1);
    let (ctx, handle) = Context::with_cancel();

    tx.on_subscribe(&ctx, &NoopSubscription);
    drop(ctx);
    drop(handle);

    assert!(!rx.terminal().wait_timeout(Duration::from_millis(100)));
    assert!(!tx.is_terminated());

    tx.on_next(1);
    tx.on_complete();
    assert_eq!(rx.recv(), Ok(Some(1)));
    assert_eq!(rx.recv(), Ok(None));
}

/// Emits its payloads synchronously from `subscribe`, then fails.
struct EmitThenFail(Vec<Arc<SharedPayload>>);

impl Publisher<Arc<SharedPayload>> for EmitThenFail {
    fn subscribe<S>(self, ctx: Context, subscriber: S)
    where
        S: Subscriber<Arc<SharedPayload>> + 'static,
    {
        subscriber.on_subscribe(&ctx, &NoopSubscription);
        for payload in self.0 {
            subscriber.on_next(payload);
        }
        subscriber.on_error(BlockError::upstream("boom"));
    }
}

#[test]
fn test_block_last_releases_on_error() {
    let payload = Arc::new(SharedPayload::from_data("kept"));

    let result = block_last(
        EmitThenFail(vec![Arc::clone(&payload)]),
        Context::background(),
        &BridgeConfig::default(),
    );

    assert!(matches!(result, Err(BlockError::Upstream(_))));
    assert_eq!(payload.ref_count(), 1);
}

#[test]
fn test_block_collect_releases_on_error() {
    let first = Arc::new(SharedPayload::from_data("one"));
    let second = Arc::new(SharedPayload::from_data("two"));

    let result = block_collect(
        EmitThenFail(vec![Arc::clone(&first), Arc::clone(&second)]),
        Context::background(),
        &BridgeConfig::unbounded(),
    );

    assert!(matches!(result, Err(BlockError::Upstream(_))));
    assert_eq!(first.ref_count(), 1);
    assert_eq!(second.ref_count(), 1);
}
