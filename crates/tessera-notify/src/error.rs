//! Error types for the notification layer.

/// Errors a [`NotificationSink`](crate::NotificationSink) can report.
///
/// A failing sink never stops delivery to the other sinks; the error is
/// logged and counted in the [`Delivery`](crate::Delivery) report.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The receiving side is gone (e.g. the session already closed).
    #[error("notification receiver closed")]
    ReceiverClosed,

    /// The sink could not deliver for another reason.
    #[error("delivery failed: {0}")]
    DeliveryFailed(String),
}
