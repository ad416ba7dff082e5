//! Reference-counting capability for items crossing the bridge.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A resource whose lifetime is tracked by an explicit holder count.
pub trait Releasable {
    /// Registers one more holder.
    fn inc_ref(&self);

    /// Drops one holder.
    fn release(&self);

    /// Current number of holders.
    fn ref_count(&self) -> usize;
}

/// An item that may be forwarded through a [`BlockSubscriber`].
///
/// The bridge probes [`releasable`](Self::releasable) before handing an item
/// to the consumer; items that expose the capability get one
/// [`Releasable::inc_ref`] per forwarded delivery, and the consumer owns the
/// matching [`Releasable::release`].
///
/// [`BlockSubscriber`]: crate::BlockSubscriber
pub trait Payload {
    /// Returns the reference-counting capability, if the item has one.
    fn releasable(&self) -> Option<&dyn Releasable> {
        None
    }
}

macro_rules! impl_plain_payload {
    ($($ty:ty),* $(,)?) => {
        $(impl Payload for $ty {})*
    };
}

impl_plain_payload!(
    (),
    bool,
    char,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    f32,
    f64,
    str,
    [u8],
    String,
    Vec<u8>,
);

impl<P: Payload + ?Sized> Payload for &P {
    fn releasable(&self) -> Option<&dyn Releasable> {
        (**self).releasable()
    }
}

impl<P: Payload + ?Sized> Payload for Box<P> {
    fn releasable(&self) -> Option<&dyn Releasable> {
        (**self).releasable()
    }
}

impl<P: Payload + ?Sized> Payload for Arc<P> {
    fn releasable(&self) -> Option<&dyn Releasable> {
        (**self).releasable()
    }
}

/// A data/metadata payload with an explicit reference count.
///
/// Starts with one holder (its creator). Usually shared behind an [`Arc`] so
/// the producer can keep a handle while a copy travels to the consumer.
#[derive(Debug)]
pub struct SharedPayload {
    data: Vec<u8>,
    metadata: Option<Vec<u8>>,
    refs: AtomicUsize,
}

impl SharedPayload {
    /// Creates a payload with a reference count of 1.
    pub fn new(data: impl Into<Vec<u8>>, metadata: Option<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            metadata,
            refs: AtomicUsize::new(1),
        }
    }

    /// Creates a payload without metadata.
    pub fn from_data(data: impl Into<Vec<u8>>) -> Self {
        Self::new(data, None)
    }

    /// The payload body.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The payload metadata, if any.
    pub fn metadata(&self) -> Option<&[u8]> {
        self.metadata.as_deref()
    }

    /// The body as UTF-8, if valid.
    pub fn data_utf8(&self) -> Option<&str> {
        std::str::from_utf8(&self.data).ok()
    }
}

impl Releasable for SharedPayload {
    #[inline]
    fn inc_ref(&self) {
        self.refs.fetch_add(1, Ordering::Relaxed);
    }

    fn release(&self) {
        let released = self
            .refs
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        if released.is_err() {
            tracing::warn!(len = self.data.len(), "payload released more times than it was retained");
        }
    }

    #[inline]
    fn ref_count(&self) -> usize {
        self.refs.load(Ordering::Acquire)
    }
}

impl Payload for SharedPayload {
    fn releasable(&self) -> Option<&dyn Releasable> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_items_have_no_capability() {
        assert!(42u64.releasable().is_none());
        assert!(String::from("a").releasable().is_none());
        assert!(Box::new(vec![1u8, 2]).releasable().is_none());
    }

    #[test]
    fn test_shared_payload_counts() {
        let p = Arc::new(SharedPayload::new("hello", Some(b"meta".to_vec())));
        assert_eq!(p.ref_count(), 1);
        assert_eq!(p.data_utf8(), Some("hello"));
        assert_eq!(p.metadata(), Some(&b"meta"[..]));

        // Capability is reachable through the Arc
        let r = p.releasable().expect("capability");
        r.inc_ref();
        assert_eq!(p.ref_count(), 2);

        r.release();
        r.release();
        assert_eq!(p.ref_count(), 0);
    }

    #[test]
    fn test_over_release_saturates() {
        let p = SharedPayload::from_data(vec![1, 2, 3]);
        p.release();
        p.release();
        assert_eq!(p.ref_count(), 0);
        assert!(p.metadata().is_none());
    }
}
