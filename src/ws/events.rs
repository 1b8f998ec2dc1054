//! Realtime events and the handler registry that fans them out.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde_json::Value;
use strum_macros::{AsRefStr, Display};
use tokio::sync::broadcast;

use crate::error::Error;

/// Broadcast channel capacity for the [`events`](super::Client::events) stream.
const BROADCAST_CAPACITY: usize = 1024;

/// Channels a handler can be registered on.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum EventKind {
    Connected,
    MarketUpdate,
    MarketSnapshot,
    Subscribed,
    Unsubscribed,
    Error,
    Disconnect,
    Reconnect,
}

/// An event delivered to handlers and to the event stream.
///
/// Server payloads are passed through as received, with their original camelCase keys.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub enum Event {
    /// Session accepted by the server, e.g. `{"type":"connected","sessionId":"..."}`
    Connected(Value),
    MarketUpdate(Value),
    MarketSnapshot(Value),
    /// Subscription acknowledged or listed
    Subscribed(Value),
    Unsubscribed(Value),
    Error(StreamError),
    /// The transport closed. `1000` for a normal close, `1006` when the connection dropped
    Disconnect { code: u16, reason: String },
    /// A reconnect attempt is about to start
    Reconnect { attempt: u32 },
}

impl Event {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Connected(_) => EventKind::Connected,
            Self::MarketUpdate(_) => EventKind::MarketUpdate,
            Self::MarketSnapshot(_) => EventKind::MarketSnapshot,
            Self::Subscribed(_) => EventKind::Subscribed,
            Self::Unsubscribed(_) => EventKind::Unsubscribed,
            Self::Error(_) => EventKind::Error,
            Self::Disconnect { .. } => EventKind::Disconnect,
            Self::Reconnect { .. } => EventKind::Reconnect,
        }
    }

    /// Server payload for message events, `None` for lifecycle events.
    #[must_use]
    pub fn payload(&self) -> Option<&Value> {
        match self {
            Self::Connected(v)
            | Self::MarketUpdate(v)
            | Self::MarketSnapshot(v)
            | Self::Subscribed(v)
            | Self::Unsubscribed(v)
            | Self::Error(StreamError::Server(v)) => Some(v),
            _ => None,
        }
    }
}

/// Payload of an [`Event::Error`].
#[non_exhaustive]
#[derive(Debug, Clone)]
pub enum StreamError {
    /// `{"type":"error", ...}` frame sent by the server
    Server(Value),
    /// Failure raised on this side: connect errors, dropped connections, exhausted reconnects
    Client(Arc<Error>),
}

impl StreamError {
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Server(value) => value
                .get("message")
                .or_else(|| value.get("error"))
                .and_then(Value::as_str)
                .map_or_else(|| value.to_string(), ToOwned::to_owned),
            Self::Client(error) => error.message(),
        }
    }
}

impl From<Error> for StreamError {
    fn from(error: Error) -> Self {
        Self::Client(Arc::new(error))
    }
}

/// Identifies a registered handler so it can be removed with [`off`](super::Client::off).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

pub(crate) type Handler = Arc<dyn Fn(&Event) + Send + Sync + 'static>;

/// Routes events to per-kind handlers and to broadcast subscribers.
pub(crate) struct Dispatcher {
    handlers: DashMap<EventKind, Vec<(HandlerId, Handler)>>,
    next_id: AtomicU64,
    broadcast_tx: broadcast::Sender<Event>,
}

impl Dispatcher {
    pub(crate) fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(BROADCAST_CAPACITY);

        Self {
            handlers: DashMap::new(),
            next_id: AtomicU64::new(0),
            broadcast_tx,
        }
    }

    pub(crate) fn on(&self, kind: EventKind, handler: Handler) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.entry(kind).or_default().push((id, handler));
        id
    }

    pub(crate) fn off(&self, kind: EventKind, id: HandlerId) -> bool {
        let Some(mut handlers) = self.handlers.get_mut(&kind) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|(handler_id, _)| *handler_id != id);
        before != handlers.len()
    }

    /// Invokes every handler for the event's kind in registration order, then broadcasts it.
    ///
    /// A panicking handler is logged and skipped; the remaining handlers still run.
    pub(crate) fn emit(&self, event: Event) {
        let kind = event.kind();
        // Snapshot so handlers may call `on`/`off` without deadlocking the map shard.
        let handlers: Vec<(HandlerId, Handler)> = self
            .handlers
            .get(&kind)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();

        for (id, handler) in handlers {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handler(&event))) {
                #[cfg(feature = "tracing")]
                tracing::error!(
                    event = %kind,
                    handler = id.0,
                    panic = panic_message(&*panic),
                    "Event handler panicked"
                );
                #[cfg(not(feature = "tracing"))]
                let _: (&HandlerId, &Box<dyn std::any::Any + Send>) = (&id, &panic);
            }
        }

        _ = self.broadcast_tx.send(event);
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.broadcast_tx.subscribe()
    }
}

#[cfg(feature = "tracing")]
fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic>")
}

/// Maps a text frame onto an [`Event`]. Invalid JSON and unknown `type` values yield `None`.
pub(crate) fn parse_frame(text: &str) -> Option<Event> {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            #[cfg(feature = "tracing")]
            tracing::warn!(%text, error = %e, "Dropping non-JSON WebSocket frame");
            #[cfg(not(feature = "tracing"))]
            let _: &serde_json::Error = &e;
            return None;
        }
    };

    let frame_type = value
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();

    let event = match frame_type.as_str() {
        "connected" => Event::Connected(value),
        "market_update" => Event::MarketUpdate(value),
        "market_snapshot" => Event::MarketSnapshot(value),
        "subscribed" => Event::Subscribed(value),
        "unsubscribed" => Event::Unsubscribed(value),
        "error" => Event::Error(StreamError::Server(value)),
        other => {
            #[cfg(feature = "tracing")]
            tracing::trace!(r#type = other, "Ignoring WebSocket frame of unknown type");
            #[cfg(not(feature = "tracing"))]
            let _: &str = other;
            return None;
        }
    };

    Some(event)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, Handler) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler: Handler = Arc::new(move |event: &Event| {
            sink.lock().expect("lock").push(event.kind().to_string());
        });
        (seen, handler)
    }

    #[test]
    fn known_frames_map_to_events() {
        let cases = [
            ("connected", EventKind::Connected),
            ("market_update", EventKind::MarketUpdate),
            ("market_snapshot", EventKind::MarketSnapshot),
            ("subscribed", EventKind::Subscribed),
            ("unsubscribed", EventKind::Unsubscribed),
            ("error", EventKind::Error),
        ];

        for (frame_type, kind) in cases {
            let text = json!({"type": frame_type, "marketId": "pm_1"}).to_string();
            let event = parse_frame(&text).expect("known frame");
            assert_eq!(event.kind(), kind);
            assert_eq!(event.kind().as_ref(), frame_type);
        }
    }

    #[test]
    fn payload_keeps_wire_keys() {
        let event = parse_frame(r#"{"type":"market_update","marketId":"pm_1","yesPrice":0.4}"#)
            .expect("market update");

        let payload = event.payload().expect("payload");
        assert_eq!(payload["marketId"], json!("pm_1"));
        assert_eq!(payload["yesPrice"], json!(0.4));
    }

    #[test]
    fn unknown_and_malformed_frames_are_dropped() {
        assert!(parse_frame(r#"{"type":"pong"}"#).is_none(), "unknown type");
        assert!(parse_frame(r#"{"marketId":"pm_1"}"#).is_none(), "missing type");
        assert!(parse_frame("not json").is_none(), "invalid json");
        assert!(parse_frame("[1,2]").is_none(), "non-object");
    }

    #[test]
    fn server_error_message_is_extracted() {
        let event = parse_frame(r#"{"type":"error","message":"unknown market"}"#).expect("error");

        let Event::Error(error) = event else {
            panic!("expected error event");
        };
        assert_eq!(error.message(), "unknown market");
    }

    #[test]
    fn handlers_run_in_registration_order_for_their_kind_only() {
        let dispatcher = Dispatcher::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second"] {
            let order = Arc::clone(&order);
            dispatcher.on(
                EventKind::Reconnect,
                Arc::new(move |_: &Event| order.lock().expect("lock").push(tag)),
            );
        }
        let (other, handler) = recorder();
        dispatcher.on(EventKind::Connected, handler);

        dispatcher.emit(Event::Reconnect { attempt: 1 });

        assert_eq!(*order.lock().expect("lock"), vec!["first", "second"]);
        assert!(other.lock().expect("lock").is_empty(), "wrong kind invoked");
    }

    #[test]
    fn panicking_handler_does_not_stop_others() {
        let dispatcher = Dispatcher::new();
        dispatcher.on(
            EventKind::MarketUpdate,
            Arc::new(|_: &Event| panic!("handler failure")),
        );
        let (seen, handler) = recorder();
        dispatcher.on(EventKind::MarketUpdate, handler);

        dispatcher.emit(Event::MarketUpdate(json!({"type": "market_update"})));

        assert_eq!(*seen.lock().expect("lock"), vec!["market_update"]);
    }

    #[test]
    fn off_removes_only_that_handler() {
        let dispatcher = Dispatcher::new();
        let (removed, handler) = recorder();
        let id = dispatcher.on(EventKind::Disconnect, handler);
        let (kept, handler) = recorder();
        dispatcher.on(EventKind::Disconnect, handler);

        assert!(dispatcher.off(EventKind::Disconnect, id), "handler removed");
        assert!(!dispatcher.off(EventKind::Disconnect, id), "already removed");
        assert!(!dispatcher.off(EventKind::Connected, id), "wrong kind");

        dispatcher.emit(Event::Disconnect {
            code: 1000,
            reason: String::new(),
        });

        assert!(removed.lock().expect("lock").is_empty(), "removed handler ran");
        assert_eq!(kept.lock().expect("lock").len(), 1);
    }

    #[tokio::test]
    async fn emitted_events_reach_broadcast_subscribers() {
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe();

        dispatcher.emit(Event::Reconnect { attempt: 3 });

        let event = rx.recv().await.expect("event");
        assert!(matches!(event, Event::Reconnect { attempt: 3 }), "got {event:?}");
    }
}
