//! Change-notification fan-out shared by the store implementations.

use futures::stream::{self, StreamExt};
use tokio::sync::broadcast;
use tracing::warn;

use crate::resource::{ResourceKind, WatchEvent};
use crate::storage_traits::WatchStream;

const DEFAULT_CAPACITY: usize = 1024;

/// Broadcasts committed writes to every open watch.
///
/// A watcher that falls more than `capacity` events behind skips the missed
/// events; consumers are expected to resync on their own schedule.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<WatchEvent>,
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl EventBroadcaster {
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: WatchEvent) {
        let _ = self.sender.send(event);
    }

    /// Open a stream of events for one kind.
    pub fn subscribe(&self, kind: ResourceKind) -> WatchStream {
        let receiver = self.sender.subscribe();
        stream::unfold(receiver, move |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(event) if event.kind() == kind => return Some((event, receiver)),
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(kind = %kind, skipped, "watch receiver lagged, events dropped");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .boxed()
    }
}
