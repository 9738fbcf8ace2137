//! In-process publish/subscribe for Tessera.
//!
//! A [`Notifier`] keeps a table of handlers, each registered for a
//! *subject* (usually a user id, or `*` for everyone) and a *topic* glob
//! (`lobby.*`, `game.invite.received`, `*`). Publishing a [`Notification`]
//! delivers it to every distinct sink whose patterns match.
//!
//! ```text
//! Lobby ──publish──▶ Notifier ──deliver──▶ NotificationSink (one per Subscribe)
//! ```
//!
//! Handlers can be added and removed while a publish is in flight; a
//! publish works on a snapshot of the table taken when it starts.

mod error;
pub mod pattern;

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, join_all};
use serde::Serialize;

pub use error::NotifyError;

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

/// An event addressed to a subject under a dotted topic name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    /// Dotted event name, e.g. `lobby.joined`.
    pub topic: String,
    /// Who the event is for. Matched against handler subject patterns.
    pub subject_id: String,
    /// Opaque payload, forwarded as-is.
    pub data: serde_json::Value,
}

impl Notification {
    pub fn new(
        topic: impl Into<String>,
        subject_id: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            topic: topic.into(),
            subject_id: subject_id.into(),
            data,
        }
    }
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Receives notifications matched by the [`Notifier`].
///
/// Deduplication is by sink instance: if two handlers share the same
/// `Arc`, a notification matching both is delivered once.
pub trait NotificationSink: Send + Sync + 'static {
    fn deliver<'a>(
        &'a self,
        notification: &'a Notification,
    ) -> BoxFuture<'a, Result<(), NotifyError>>;
}

/// A sink backed by a synchronous closure.
pub struct FnSink<F>(F);

impl<F> NotificationSink for FnSink<F>
where
    F: Fn(&Notification) -> Result<(), NotifyError> + Send + Sync + 'static,
{
    fn deliver<'a>(
        &'a self,
        notification: &'a Notification,
    ) -> BoxFuture<'a, Result<(), NotifyError>> {
        Box::pin(async move { (self.0)(notification) })
    }
}

/// Wraps a closure into a shareable sink.
pub fn sink_fn<F>(f: F) -> Arc<dyn NotificationSink>
where
    F: Fn(&Notification) -> Result<(), NotifyError> + Send + Sync + 'static,
{
    Arc::new(FnSink(f))
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

/// Opaque handle returned by [`Notifier::register_handler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl HandlerId {
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

struct Handler {
    subject: String,
    topic: String,
    sink: Arc<dyn NotificationSink>,
}

#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    handlers: Mutex<HashMap<HandlerId, Handler>>,
}

/// Outcome of a [`Notifier::publish_now`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Sinks that accepted the notification.
    pub delivered: usize,
    /// Sinks that returned an error or panicked.
    pub failed: usize,
}

/// Subject/topic routed fan-out. Cheap to clone; clones share the table.
#[derive(Clone, Default)]
pub struct Notifier {
    registry: Arc<Registry>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `sink` for notifications whose subject matches `subject`
    /// and whose topic matches the glob `topic`.
    pub fn register_handler(
        &self,
        subject: impl Into<String>,
        topic: impl Into<String>,
        sink: Arc<dyn NotificationSink>,
    ) -> HandlerId {
        let id =
            HandlerId(self.registry.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let handler = Handler {
            subject: subject.into(),
            topic: topic.into(),
            sink,
        };
        tracing::debug!(
            handler = id.0,
            subject = %handler.subject,
            topic = %handler.topic,
            "handler registered"
        );
        self.handlers().insert(id, handler);
        id
    }

    /// Removes a handler. Unknown ids are ignored; returns whether a
    /// handler was actually removed.
    pub fn unregister_handler(&self, id: HandlerId) -> bool {
        let removed = self.handlers().remove(&id).is_some();
        if removed {
            tracing::debug!(handler = id.0, "handler unregistered");
        }
        removed
    }

    /// Number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.handlers().len()
    }

    /// Delivers in the background. Returns immediately.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn publish(&self, notification: Notification) {
        let notifier = self.clone();
        tokio::spawn(async move {
            notifier.publish_now(&notification).await;
        });
    }

    /// Delivers to every distinct matching sink and waits for all of them.
    ///
    /// A failing or panicking sink is logged and does not affect the
    /// others.
    pub async fn publish_now(&self, notification: &Notification) -> Delivery {
        let sinks = self.matching_sinks(notification);
        if sinks.is_empty() {
            return Delivery::default();
        }

        let results = join_all(sinks.iter().map(|sink| {
            AssertUnwindSafe(sink.deliver(notification)).catch_unwind()
        }))
        .await;

        let mut report = Delivery::default();
        for result in results {
            match result {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    report.failed += 1;
                    tracing::warn!(
                        topic = %notification.topic,
                        subject = %notification.subject_id,
                        error = %e,
                        "notification delivery failed"
                    );
                }
                Err(_) => {
                    report.failed += 1;
                    tracing::error!(
                        topic = %notification.topic,
                        subject = %notification.subject_id,
                        "notification sink panicked"
                    );
                }
            }
        }
        report
    }

    /// Snapshot of the distinct sinks matching `notification`.
    fn matching_sinks(
        &self,
        notification: &Notification,
    ) -> Vec<Arc<dyn NotificationSink>> {
        let handlers = self.handlers();
        let mut sinks: Vec<Arc<dyn NotificationSink>> = Vec::new();
        // HashMap iteration order is arbitrary; sort by id for stable fan-out.
        let mut ordered: Vec<_> = handlers.iter().collect();
        ordered.sort_by_key(|(id, _)| **id);
        for (_, handler) in ordered {
            if !pattern::subject_matches(
                &handler.subject,
                &notification.subject_id,
            ) || !pattern::topic_matches(&handler.topic, &notification.topic)
            {
                continue;
            }
            if sinks.iter().any(|s| Arc::ptr_eq(s, &handler.sink)) {
                continue;
            }
            sinks.push(Arc::clone(&handler.sink));
        }
        sinks
    }

    fn handlers(&self) -> std::sync::MutexGuard<'_, HashMap<HandlerId, Handler>> {
        self.registry
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("handlers", &self.handler_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use serde_json::json;

    use super::*;

    fn counting_sink() -> (Arc<dyn NotificationSink>, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let sink = sink_fn(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        (sink, count)
    }

    fn note(topic: &str, subject: &str) -> Notification {
        Notification::new(topic, subject, json!({}))
    }

    #[tokio::test]
    async fn test_wildcard_subject_and_topic_receive_everything() {
        let notifier = Notifier::new();
        let (sink, count) = counting_sink();
        notifier.register_handler("*", "*", sink);

        notifier.publish_now(&note("lobby.joined", "u1")).await;
        notifier.publish_now(&note("game.invite.received", "u2")).await;

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_topic_glob_filters() {
        let notifier = Notifier::new();
        let (sink, count) = counting_sink();
        notifier.register_handler("*", "lobby.*", sink);

        notifier.publish_now(&note("lobby.joined", "u1")).await;
        notifier.publish_now(&note("lobby.left", "u1")).await;
        let report =
            notifier.publish_now(&note("game.invite.received", "u1")).await;

        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(report, Delivery::default());
    }

    #[tokio::test]
    async fn test_exact_subject_filters() {
        let notifier = Notifier::new();
        let (sink, count) = counting_sink();
        notifier.register_handler("u1", "*", sink);

        notifier.publish_now(&note("lobby.joined", "u1")).await;
        notifier.publish_now(&note("lobby.joined", "u2")).await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_same_sink_under_two_handlers_is_delivered_once() {
        let notifier = Notifier::new();
        let (sink, count) = counting_sink();
        notifier.register_handler("u1", "lobby.*", Arc::clone(&sink));
        notifier.register_handler("*", "*", sink);

        let report = notifier.publish_now(&note("lobby.joined", "u1")).await;

        assert_eq!(report.delivered, 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_distinct_sinks_each_receive() {
        let notifier = Notifier::new();
        let (a, a_count) = counting_sink();
        let (b, b_count) = counting_sink();
        notifier.register_handler("u1", "*", a);
        notifier.register_handler("u1", "lobby.*", b);

        let report = notifier.publish_now(&note("lobby.left", "u1")).await;

        assert_eq!(report.delivered, 2);
        assert_eq!(a_count.load(Ordering::SeqCst), 1);
        assert_eq!(b_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unregistered_handler_receives_nothing() {
        let notifier = Notifier::new();
        let (sink, count) = counting_sink();
        let id = notifier.register_handler("*", "*", sink);

        assert!(notifier.unregister_handler(id));
        assert!(!notifier.unregister_handler(id));
        notifier.publish_now(&note("lobby.joined", "u1")).await;

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(notifier.handler_count(), 0);
    }

    #[tokio::test]
    async fn test_failing_sink_does_not_block_others() {
        let notifier = Notifier::new();
        notifier.register_handler(
            "*",
            "*",
            sink_fn(|_| Err(NotifyError::ReceiverClosed)),
        );
        notifier.register_handler("*", "*", sink_fn(|_| panic!("boom")));
        let (ok, count) = counting_sink();
        notifier.register_handler("*", "*", ok);

        let report = notifier.publish_now(&note("lobby.joined", "u1")).await;

        assert_eq!(report, Delivery { delivered: 1, failed: 2 });
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_background_publish_eventually_delivers() {
        let notifier = Notifier::new();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        notifier.register_handler(
            "u1",
            "game.*",
            sink_fn(move |n| {
                tx.send(n.clone()).map_err(|_| NotifyError::ReceiverClosed)
            }),
        );

        notifier.publish(Notification::new(
            "game.state.changed",
            "u1",
            json!({"game_id": "g"}),
        ));

        let got = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            rx.recv(),
        )
        .await
        .expect("should deliver")
        .expect("channel open");
        assert_eq!(got.topic, "game.state.changed");
        assert_eq!(got.data["game_id"], "g");
    }

    #[test]
    fn test_handler_ids_are_unique() {
        let notifier = Notifier::new();
        let (sink, _) = counting_sink();
        let a = notifier.register_handler("*", "*", Arc::clone(&sink));
        let b = notifier.register_handler("*", "*", sink);
        assert_ne!(a, b);
        assert_eq!(notifier.handler_count(), 2);
    }
}
