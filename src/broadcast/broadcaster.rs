//! Broadcaster actor
//!
//! The registry lives inside a single spawned task. Every handle talks to it
//! through channels, so the map itself is never shared and needs no lock.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::subscriber::Subscriber;
use crate::config::BroadcasterConfig;
use crate::error::BroadcastError;
use crate::ids::SubscriberId;

type Publication<T> = (T, oneshot::Sender<()>);

struct Registration<T> {
    sink: mpsc::Sender<T>,
    cancel: CancellationToken,
    reply: oneshot::Sender<SubscriberId>,
}

/// Cloneable handle to a broadcaster loop
///
/// The loop exits once every handle has been dropped.
pub struct Broadcaster<T> {
    register_tx: mpsc::Sender<Registration<T>>,
    unregister_tx: mpsc::UnboundedSender<SubscriberId>,
    publish_tx: mpsc::Sender<Publication<T>>,
    count_tx: mpsc::Sender<oneshot::Sender<usize>>,
    publish_timeout: Duration,
    register_timeout: Option<Duration>,
}

impl<T> Clone for Broadcaster<T> {
    fn clone(&self) -> Self {
        Self {
            register_tx: self.register_tx.clone(),
            unregister_tx: self.unregister_tx.clone(),
            publish_tx: self.publish_tx.clone(),
            count_tx: self.count_tx.clone(),
            publish_timeout: self.publish_timeout,
            register_timeout: self.register_timeout,
        }
    }
}

impl<T: Clone + Send + 'static> Broadcaster<T> {
    /// Start a broadcaster loop on the current runtime
    pub fn new(config: BroadcasterConfig) -> Self {
        Self::spawn(config).0
    }

    /// Start a broadcaster loop, also returning the loop's join handle
    pub fn spawn(config: BroadcasterConfig) -> (Self, JoinHandle<()>) {
        let (broadcaster, event_loop) = Self::unstarted(config);
        (broadcaster, tokio::spawn(event_loop.run()))
    }

    /// Handle plus the loop that serves it, not yet running
    fn unstarted(config: BroadcasterConfig) -> (Self, EventLoop<T>) {
        let capacity = config.queue_capacity.max(1);
        let (register_tx, register_rx) = mpsc::channel(capacity);
        let (unregister_tx, unregister_rx) = mpsc::unbounded_channel();
        let (publish_tx, publish_rx) = mpsc::channel(capacity);
        let (count_tx, count_rx) = mpsc::channel(capacity);

        let event_loop = EventLoop {
            subscribers: HashMap::new(),
            register_rx,
            unregister_rx,
            publish_rx,
            count_rx,
            unregister_tx: unregister_tx.downgrade(),
            delivery_timeout: config.delivery_timeout,
        };

        let broadcaster = Self {
            register_tx,
            unregister_tx,
            publish_tx,
            count_tx,
            publish_timeout: config.publish_timeout,
            register_timeout: config.register_timeout,
        };
        (broadcaster, event_loop)
    }

    /// Register a delivery sink, returning the id assigned by the loop
    ///
    /// Waits for the loop to process the request, which can take a while if
    /// it is busy. The wait is bounded by the configured register timeout.
    pub async fn register(
        &self,
        sink: mpsc::Sender<T>,
        cancel: CancellationToken,
    ) -> Result<SubscriberId, BroadcastError> {
        let (reply, reply_rx) = oneshot::channel();
        let request = async {
            self.register_tx
                .send(Registration { sink, cancel, reply })
                .await
                .map_err(|_| BroadcastError::Closed)?;
            reply_rx.await.map_err(|_| BroadcastError::Closed)
        };

        match self.register_timeout {
            Some(limit) => tokio::time::timeout(limit, request)
                .await
                .map_err(|_| BroadcastError::RegisterTimeout(limit))?,
            None => request.await,
        }
    }

    /// Remove a subscriber; unknown ids are ignored
    pub fn unregister(&self, id: &SubscriberId) {
        let _ = self.unregister_tx.send(id.clone());
    }

    /// Hand an event to the loop for fan-out
    ///
    /// Returns `false` if the loop did not fan the event out within the
    /// publish timeout. That bound covers both queueing and the loop getting
    /// round to it, so an event that was queued but not yet served when the
    /// bound expired may still go out afterwards. On `true` the loop has
    /// already spawned one delivery per subscriber registered at that moment;
    /// it does not mean any of them received it.
    pub async fn publish(&self, event: T) -> bool {
        let (ack, ack_rx) = oneshot::channel();
        let request = async {
            self.publish_tx.send((event, ack)).await.is_ok() && ack_rx.await.is_ok()
        };

        match tokio::time::timeout(self.publish_timeout, request).await {
            Ok(fanned_out) => fanned_out,
            Err(_) => {
                tracing::warn!(timeout = ?self.publish_timeout, "Broadcaster busy, event dropped");
                false
            }
        }
    }

    /// Number of subscribers currently in the registry
    pub async fn subscriber_count(&self) -> usize {
        let (reply, reply_rx) = oneshot::channel();
        if self.count_tx.send(reply).await.is_err() {
            return 0;
        }
        reply_rx.await.unwrap_or(0)
    }
}

struct EventLoop<T> {
    subscribers: HashMap<SubscriberId, Subscriber<T>>,
    register_rx: mpsc::Receiver<Registration<T>>,
    unregister_rx: mpsc::UnboundedReceiver<SubscriberId>,
    publish_rx: mpsc::Receiver<Publication<T>>,
    count_rx: mpsc::Receiver<oneshot::Sender<usize>>,
    // Weak so that the loop alone does not keep the unregister channel open
    unregister_tx: mpsc::WeakUnboundedSender<SubscriberId>,
    delivery_timeout: Duration,
}

impl<T: Clone + Send + 'static> EventLoop<T> {
    async fn run(mut self) {
        tracing::debug!("Broadcaster loop started");
        loop {
            // Pending removals are applied before the next fan-out, and
            // registrations are taken ahead of publishes.
            tokio::select! {
                biased;
                Some(id) = self.unregister_rx.recv() => self.remove(&id),
                Some(registration) = self.register_rx.recv() => self.add(registration),
                Some((event, ack)) = self.publish_rx.recv() => {
                    self.fan_out(event);
                    let _ = ack.send(());
                }
                Some(reply) = self.count_rx.recv() => {
                    let _ = reply.send(self.subscribers.len());
                }
                else => break,
            }
        }
        tracing::debug!(remaining = self.subscribers.len(), "Broadcaster loop stopped");
    }

    fn add(&mut self, registration: Registration<T>) {
        let Registration { sink, cancel, reply } = registration;
        let id = SubscriberId::new();
        if reply.send(id.clone()).is_err() {
            // Caller gave up waiting; it never learned the id, so don't keep it
            tracing::debug!(subscriber_id = %id, "Registration abandoned by caller");
            return;
        }
        tracing::debug!(subscriber_id = %id, "Subscriber registered");
        self.subscribers
            .insert(id.clone(), Subscriber { id, sink, cancel });
    }

    fn remove(&mut self, id: &SubscriberId) {
        if self.subscribers.remove(id).is_some() {
            tracing::debug!(subscriber_id = %id, "Subscriber removed");
        }
    }

    fn fan_out(&self, event: T) {
        let Some(unregister) = self.unregister_tx.upgrade() else {
            return;
        };
        for subscriber in self.subscribers.values() {
            subscriber.spawn_delivery(event.clone(), self.delivery_timeout, unregister.clone());
        }
    }
}
