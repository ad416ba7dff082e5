//! Configuration for bridges built with [`bridge`](crate::bridge).

/// Default capacity of the item channel.
pub const DEFAULT_CAPACITY: usize = 1;

/// Default thread name of the cancellation watcher.
pub const DEFAULT_WATCHER_NAME: &str = "blockbridge-watcher";

/// Configuration for a blocking bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Capacity of the item channel.
    ///
    /// `Some(n)` makes `on_next` block once `n` items are waiting for the
    /// consumer. `None` never blocks the producer and lets the channel grow
    /// without limit.
    ///
    /// Default: `Some(1)`
    pub capacity: Option<usize>,

    /// Name given to the cancellation watcher thread.
    ///
    /// Default: `"blockbridge-watcher"`
    pub watcher_name: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            capacity: Some(DEFAULT_CAPACITY),
            watcher_name: DEFAULT_WATCHER_NAME.to_owned(),
        }
    }
}

impl BridgeConfig {
    /// Creates a configuration with a bounded item channel.
    pub fn bounded(capacity: usize) -> Self {
        Self::default().with_capacity(Some(capacity))
    }

    /// Creates a configuration whose item channel never blocks the producer.
    pub fn unbounded() -> Self {
        Self::default().with_capacity(None)
    }

    /// Sets the item channel capacity.
    pub fn with_capacity(mut self, capacity: Option<usize>) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the watcher thread name.
    pub fn with_watcher_name(mut self, name: impl Into<String>) -> Self {
        self.watcher_name = name.into();
        self
    }
}
