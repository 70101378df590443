//! Fire-and-forget sink for forward decisions.
//!
//! Every proxy decision is recorded for observability without ever blocking
//! or failing the forwarding path: `emit` pushes onto an unbounded channel
//! and returns immediately. A background drain task turns events into
//! structured log records; a telemetry shipper can subscribe in its place.

use tokio::sync::mpsc;

/// A single forward decision.
#[derive(Debug, Clone)]
pub struct ForwardEvent {
    /// Event kind, e.g. "P2P Forward" or "Service Forward".
    pub kind: &'static str,
    /// Local peer id.
    pub from: String,
    /// Target peer or service authority.
    pub to: String,
    /// Outgoing request path.
    pub path: String,
    /// Global service name, when the dispatcher chose the target.
    pub service: Option<String>,
}

impl ForwardEvent {
    pub fn p2p(from: impl Into<String>, to: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            kind: "P2P Forward",
            from: from.into(),
            to: to.into(),
            path: path.into(),
            service: None,
        }
    }

    pub fn service(
        from: impl Into<String>,
        to: impl Into<String>,
        path: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        Self {
            kind: "Service Forward",
            from: from.into(),
            to: to.into(),
            path: path.into(),
            service: Some(service.into()),
        }
    }
}

/// Handle for emitting forward events. Cheap to clone.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<ForwardEvent>,
}

impl EventSink {
    /// Create a sink and spawn the drain task on the current runtime.
    pub fn spawn() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<ForwardEvent>();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                tracing::info!(
                    kind = event.kind,
                    from = %event.from,
                    to = %event.to,
                    path = %event.path,
                    service = event.service.as_deref().unwrap_or(""),
                    "forward event"
                );
            }
        });
        Self { tx }
    }

    /// Create a sink whose events are collected into the returned receiver.
    /// Used by tests to assert on emitted events.
    pub fn collecting() -> (Self, mpsc::UnboundedReceiver<ForwardEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Record an event. Never blocks; a closed drain is ignored.
    pub fn emit(&self, event: ForwardEvent) {
        let _ = self.tx.send(event);
    }
}
