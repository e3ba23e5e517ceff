//! Registered subscribers and the per-event delivery task

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::ids::SubscriberId;

/// One live entry in the broadcaster's registry
pub struct Subscriber<T> {
    pub id: SubscriberId,
    /// Write-only handle events are pushed into
    pub sink: mpsc::Sender<T>,
    /// Fires once the subscriber has gone away
    pub cancel: CancellationToken,
}

/// Outcome of a single delivery attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// Cancel signal fired (or the receiving side was dropped); removal was requested
    Removed,
    /// Sink did not accept the event in time; the event was dropped for this subscriber
    TimedOut,
}

impl<T: Send + 'static> Subscriber<T> {
    /// Spawn a task delivering `event` to this subscriber
    ///
    /// The cancel signal is checked once before the attempt and then raced
    /// against the send itself, so an unregister that lands after the
    /// registry lookup still wins.
    pub(crate) fn spawn_delivery(
        &self,
        event: T,
        timeout: Duration,
        unregister: mpsc::UnboundedSender<SubscriberId>,
    ) -> tokio::task::JoinHandle<Delivery> {
        let id = self.id.clone();
        let sink = self.sink.clone();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            let outcome = deliver(&sink, &cancel, event, timeout).await;
            match outcome {
                Delivery::Removed => {
                    // Loop may already be gone; nothing left to clean up then
                    let _ = unregister.send(id);
                }
                Delivery::TimedOut => {
                    tracing::debug!(subscriber_id = %id, ?timeout, "Slow subscriber, event dropped");
                }
                Delivery::Delivered => {}
            }
            outcome
        })
    }
}

async fn deliver<T>(
    sink: &mpsc::Sender<T>,
    cancel: &CancellationToken,
    event: T,
    timeout: Duration,
) -> Delivery {
    if cancel.is_cancelled() {
        return Delivery::Removed;
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Delivery::Removed,
        sent = sink.send(event) => match sent {
            Ok(()) => Delivery::Delivered,
            Err(_) => Delivery::Removed,
        },
        _ = tokio::time::sleep(timeout) => Delivery::TimedOut,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscriber(capacity: usize) -> (Subscriber<u32>, mpsc::Receiver<u32>) {
        let (sink, rx) = mpsc::channel(capacity);
        let sub = Subscriber {
            id: SubscriberId::new(),
            sink,
            cancel: CancellationToken::new(),
        };
        (sub, rx)
    }

    #[tokio::test]
    async fn test_delivers_to_ready_sink() {
        let (sub, mut rx) = subscriber(1);
        let (unregister, _unreg_rx) = mpsc::unbounded_channel();

        let outcome = sub
            .spawn_delivery(7, Duration::from_secs(1), unregister)
            .await
            .unwrap();

        assert_eq!(outcome, Delivery::Delivered);
        assert_eq!(rx.recv().await, Some(7));
    }

    #[tokio::test]
    async fn test_cancelled_subscriber_is_removed_without_delivery() {
        let (sub, mut rx) = subscriber(1);
        let (unregister, mut unreg_rx) = mpsc::unbounded_channel();
        sub.cancel.cancel();

        let outcome = sub
            .spawn_delivery(7, Duration::from_secs(1), unregister)
            .await
            .unwrap();

        assert_eq!(outcome, Delivery::Removed);
        assert_eq!(unreg_rx.recv().await, Some(sub.id.clone()));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_cancel_while_waiting_aborts_delivery() {
        let (sub, mut rx) = subscriber(1);
        // Fill the only slot so the next send has to wait
        sub.sink.send(1).await.unwrap();
        let (unregister, mut unreg_rx) = mpsc::unbounded_channel();

        let handle = sub.spawn_delivery(2, Duration::from_secs(5), unregister);
        tokio::time::sleep(Duration::from_millis(20)).await;
        sub.cancel.cancel();

        assert_eq!(handle.await.unwrap(), Delivery::Removed);
        assert_eq!(unreg_rx.recv().await, Some(sub.id.clone()));
        assert_eq!(rx.recv().await, Some(1));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_full_sink_times_out() {
        let (sub, _rx) = subscriber(1);
        sub.sink.send(1).await.unwrap();
        let (unregister, mut unreg_rx) = mpsc::unbounded_channel();

        let outcome = sub
            .spawn_delivery(2, Duration::from_millis(50), unregister)
            .await
            .unwrap();

        assert_eq!(outcome, Delivery::TimedOut);
        assert!(unreg_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dropped_receiver_counts_as_removed() {
        let (sub, rx) = subscriber(1);
        drop(rx);
        let (unregister, mut unreg_rx) = mpsc::unbounded_channel();

        let outcome = sub
            .spawn_delivery(2, Duration::from_secs(1), unregister)
            .await
            .unwrap();

        assert_eq!(outcome, Delivery::Removed);
        assert_eq!(unreg_rx.recv().await, Some(sub.id.clone()));
    }
}
