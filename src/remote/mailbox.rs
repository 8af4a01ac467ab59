//! Single-slot, last-write-wins mailbox.

use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

/// A single shared value overwritten on every publish.
///
/// Subscribers observe the latest value only. Writes that land between two
/// observations are collapsed; nothing is queued.
#[derive(Debug)]
pub struct Mailbox<T> {
    slot: watch::Sender<Option<T>>,
}

impl<T> Default for Mailbox<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Mailbox<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create an empty mailbox.
    pub fn new() -> Self {
        let (slot, _) = watch::channel(None);
        Self { slot }
    }

    /// Overwrite the slot and wake every subscriber.
    pub fn publish(&self, value: T) {
        self.slot.send_replace(Some(value));
    }

    /// Current value, if anything was ever published.
    pub fn latest(&self) -> Option<T> {
        self.slot.borrow().clone()
    }

    /// Raw receiver for callers that want `changed()` semantics.
    pub fn subscribe(&self) -> watch::Receiver<Option<T>> {
        self.slot.subscribe()
    }

    /// Stream of the current value (if any) followed by each later value.
    pub fn updates(&self) -> BoxStream<'static, T> {
        WatchStream::new(self.slot.subscribe())
            .filter_map(|value| async move { value })
            .boxed()
    }
}
