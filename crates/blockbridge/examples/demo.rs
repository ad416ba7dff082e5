//! Demonstration of blockbridge features.
//!
//! Run with: `RUST_LOG=blockbridge=debug cargo run -p blockbridge --example demo`

use blockbridge::{
    block_collect, block_last, bridge, failed, from_iter, BlockError, BridgeConfig, Context, Publisher,
    Releasable, SharedPayload,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("=== blockbridge Demo ===\n");

    demo_completion()?;
    demo_error()?;
    demo_cancellation()?;
    demo_deadline()?;
    demo_refcounted_payloads()?;

    println!("\n=== All demos completed successfully! ===");
    Ok(())
}

/// Demo 1: A stream that completes normally
fn demo_completion() -> anyhow::Result<()> {
    println!("--- Demo 1: Completion ---");

    let (subscriber, rx) = bridge::<u32>(&BridgeConfig::bounded(4));
    from_iter(1..=5u32).subscribe(Context::background(), subscriber);

    while let Some(item) = rx.recv()? {
        println!("  Received: {}", item);
    }

    let all = block_collect(from_iter(vec!["a", "b", "c"]), Context::todo(), &BridgeConfig::default())?;
    println!("  Collected: {:?}", all);
    println!("  ✓ Completion\n");
    Ok(())
}

/// Demo 2: A producer error reaches the blocking caller
fn demo_error() -> anyhow::Result<()> {
    println!("--- Demo 2: Producer Error ---");

    let result = block_last::<_, u32>(
        failed(BlockError::upstream("connection reset")),
        Context::background(),
        &BridgeConfig::default(),
    );
    match result {
        Err(e) => println!("  Failed as expected: {}", e),
        Ok(v) => anyhow::bail!("expected an error, got {:?}", v),
    }

    println!("  ✓ Producer error\n");
    Ok(())
}

/// Demo 3: Cancelling the context ends an endless stream
fn demo_cancellation() -> anyhow::Result<()> {
    println!("--- Demo 3: Cancellation ---");

    let (ctx, cancel) = Context::with_cancel();
    let (subscriber, rx) = bridge::<u64>(&BridgeConfig::bounded(16));
    from_iter(0u64..).subscribe(ctx, subscriber);

    let mut received = 0;
    let outcome = loop {
        match rx.recv() {
            Ok(Some(_)) => {
                received += 1;
                if received == 1000 {
                    cancel.cancel();
                }
            }
            Ok(None) => break Ok(()),
            Err(e) => break Err(e),
        }
    };

    println!("  Received {} items, outcome: {:?}", received, outcome);
    anyhow::ensure!(outcome.is_err_and(|e| e.is_cancelled()), "stream was not cancelled");
    println!("  ✓ Cancellation\n");
    Ok(())
}

/// Demo 4: A deadline behaves like cancellation
fn demo_deadline() -> anyhow::Result<()> {
    println!("--- Demo 4: Deadline ---");

    let (ctx, _cancel) = Context::with_timeout(Duration::from_millis(50));
    let result = block_last(from_iter(std::iter::repeat(7u8)), ctx, &BridgeConfig::bounded(8));

    println!("  Outcome after deadline: {:?}", result);
    anyhow::ensure!(result.is_err(), "deadline did not fire");
    println!("  ✓ Deadline\n");
    Ok(())
}

/// Demo 5: Reference-counted payloads cross the boundary with their own share
fn demo_refcounted_payloads() -> anyhow::Result<()> {
    println!("--- Demo 5: Reference-Counted Payloads ---");

    let payloads: Vec<_> = ["ping", "pong"]
        .into_iter()
        .map(|s| Arc::new(SharedPayload::new(s, Some(b"demo".to_vec()))))
        .collect();
    let handles = payloads.clone();

    let received = block_collect(from_iter(payloads), Context::background(), &BridgeConfig::bounded(2))?;
    for (p, h) in received.iter().zip(&handles) {
        println!("  {:?}: refs while consumer holds it = {}", p.data_utf8(), h.ref_count());
        p.release();
    }
    for h in &handles {
        println!("  {:?}: refs after release = {}", h.data_utf8(), h.ref_count());
    }

    println!("  ✓ Reference counting\n");
    Ok(())
}
