#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff as _;
use futures::{SinkExt as _, StreamExt as _};
use secrecy::{ExposeSecret as _, SecretString};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval_at, sleep};
use tokio_tungstenite::tungstenite::client::IntoClientRequest as _;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::USER_AGENT;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

use super::config::Config;
use super::error::WsError;
use super::events::{Dispatcher, Event, parse_frame};
use crate::Result;
use crate::error::Error;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Close code reported when the connection ended without a close frame.
const ABNORMAL_CLOSURE: u16 = 1006;
const NORMAL_CLOSURE: u16 = 1000;

/// Connection state tracking.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected
    Disconnected,
    /// Attempting to connect
    Connecting,
    /// Successfully connected
    Connected {
        /// When the connection was established
        since: Instant,
    },
    /// Waiting before the next reconnect attempt
    Reconnecting {
        /// Current reconnection attempt number, starting at 1
        attempt: u32,
    },
    /// Closed by the caller. Terminal.
    Closed,
}

impl ConnectionState {
    /// Check if the connection is currently active.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected { .. })
    }
}

/// Frames sent from the client to the server.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ClientFrame {
    Subscribe { markets: Vec<String> },
    Unsubscribe { markets: Vec<String> },
    ListSubscriptions,
    Ping,
}

impl ClientFrame {
    fn encode(&self) -> Option<String> {
        serde_json::to_string(self)
            .inspect_err(|e| {
                #[cfg(feature = "tracing")]
                tracing::error!(frame = ?self, error = %e, "Unable to serialize WebSocket frame");
                #[cfg(not(feature = "tracing"))]
                let _: &serde_json::Error = e;
            })
            .ok()
    }
}

/// State shared between the public client and its supervisor task.
pub(crate) struct Shared {
    pub(crate) config: Config,
    api_key: SecretString,
    pub(crate) dispatcher: Dispatcher,
    state_tx: watch::Sender<ConnectionState>,
    /// Lock order: `subscriptions` before `outbound`.
    subscriptions: RwLock<BTreeSet<String>>,
    /// Sender into the live session, `None` while disconnected
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
}

impl Shared {
    pub(crate) fn new(config: Config, api_key: SecretString) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);

        Self {
            config,
            api_key,
            dispatcher: Dispatcher::new(),
            state_tx,
            subscriptions: RwLock::new(BTreeSet::new()),
            outbound: Mutex::new(None),
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub(crate) fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        #[cfg(feature = "tracing")]
        tracing::debug!(?state, "WebSocket state transition");
        self.state_tx.send_replace(state);
    }

    pub(crate) fn subscriptions(&self) -> Vec<String> {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Adds `markets` to the subscription set and tells the server if a session is live.
    pub(crate) fn subscribe(&self, markets: Vec<String>) -> bool {
        let mut subscriptions = self
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        subscriptions.extend(markets.iter().cloned());
        self.send(&ClientFrame::Subscribe { markets })
    }

    pub(crate) fn unsubscribe(&self, markets: Vec<String>) -> bool {
        let mut subscriptions = self
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for market in &markets {
            subscriptions.remove(market);
        }
        self.send(&ClientFrame::Unsubscribe { markets })
    }

    /// Best-effort send into the live session. Dropped while disconnected.
    pub(crate) fn send(&self, frame: &ClientFrame) -> bool {
        let outbound = self.outbound.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = outbound.as_ref() else {
            return false;
        };

        frame.encode().is_some_and(|text| tx.send(text).is_ok())
    }

    /// Publishes the session sender, replaying the current subscription set first.
    fn attach(&self, tx: mpsc::UnboundedSender<String>) {
        let subscriptions = self
            .subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        if !subscriptions.is_empty() {
            let replay = ClientFrame::Subscribe {
                markets: subscriptions.iter().cloned().collect(),
            };
            if let Some(text) = replay.encode() {
                #[cfg(feature = "tracing")]
                tracing::debug!(count = subscriptions.len(), "Replaying subscriptions");
                _ = tx.send(text);
            }
        }

        *self.outbound.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);
    }

    fn detach(&self) {
        self.outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub(crate) fn emit_error(&self, error: Error) {
        self.dispatcher.emit(Event::Error(error.into()));
    }

    async fn open(&self) -> Result<WsStream> {
        let endpoint = self.config.endpoint(self.api_key.expose_secret())?;
        let mut request = endpoint.as_str().into_client_request()?;
        request
            .headers_mut()
            .insert(USER_AGENT, HeaderValue::from_str(&crate::user_agent())?);

        let (stream, _) = connect_async(request).await?;
        Ok(stream)
    }
}

/// How a session ended.
struct SessionEnd {
    code: u16,
    reason: String,
    /// Ended by [`close`](super::Client::close) rather than by the network or the server
    local: bool,
}

/// Supervises one logical connection: connect, run the session, reconnect with backoff.
///
/// `ready` resolves once the first connection attempt settles. A failed first attempt ends the
/// task without reconnecting; failures after a session was established follow the reconnect
/// procedure until attempts run out or `cancel` fires.
pub(crate) async fn run(
    shared: Arc<Shared>,
    cancel: CancellationToken,
    ready: oneshot::Sender<Result<Instant>>,
) {
    let mut ready = Some(ready);
    let mut attempts = 0_u32;
    let mut backoff = Config::reconnect_backoff();

    loop {
        shared.set_state(ConnectionState::Connecting);

        let opened = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            opened = shared.open() => opened,
        };

        match opened {
            Ok(stream) => {
                attempts = 0;
                backoff.reset();
                let since = Instant::now();
                let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

                shared.set_state(ConnectionState::Connected { since });
                shared.attach(outbound_tx);
                if let Some(ready) = ready.take() {
                    _ = ready.send(Ok(since));
                }

                let end = session(&shared, stream, outbound_rx, &cancel).await;

                shared.detach();
                shared.dispatcher.emit(Event::Disconnect {
                    code: end.code,
                    reason: end.reason,
                });

                if end.local || cancel.is_cancelled() {
                    return;
                }
                if !shared.config.reconnect {
                    shared.set_state(ConnectionState::Disconnected);
                    return;
                }
            }
            Err(error) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %error, "Unable to connect");

                if let Some(ready) = ready.take() {
                    let copy = WsError::Handshake {
                        reason: error.message(),
                    };
                    shared.emit_error(copy.into());
                    shared.set_state(ConnectionState::Disconnected);
                    _ = ready.send(Err(error));
                    return;
                }

                shared.emit_error(error);
            }
        }

        if !wait_for_reconnect(&shared, &cancel, &mut attempts, &mut backoff).await {
            return;
        }
    }
}

/// Runs the reconnect bookkeeping. Returns `false` when no further attempt should be made.
async fn wait_for_reconnect(
    shared: &Shared,
    cancel: &CancellationToken,
    attempts: &mut u32,
    backoff: &mut ExponentialBackoff,
) -> bool {
    let max = shared.config.max_reconnect_attempts;
    if *attempts >= max {
        #[cfg(feature = "tracing")]
        tracing::warn!(attempts = max, "Giving up on reconnecting");
        shared.set_state(ConnectionState::Disconnected);
        shared.emit_error(WsError::ReconnectExhausted { attempts: max }.into());
        return false;
    }

    *attempts += 1;
    let attempt = *attempts;
    let delay = backoff.next_backoff().unwrap_or(backoff.max_interval);

    #[cfg(feature = "tracing")]
    tracing::warn!(attempt, ?delay, "Reconnecting");
    shared.set_state(ConnectionState::Reconnecting { attempt });
    shared.dispatcher.emit(Event::Reconnect { attempt });

    tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        () = sleep(delay) => true,
    }
}

/// Drives one established connection until it closes or `cancel` fires.
async fn session(
    shared: &Shared,
    stream: WsStream,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
    cancel: &CancellationToken,
) -> SessionEnd {
    let (mut write, mut read) = stream.split();

    let (ping_tx, mut ping_rx) = mpsc::unbounded_channel();
    let heartbeat_cancel = cancel.child_token();
    let heartbeat = tokio::spawn(heartbeat_loop(
        ping_tx,
        shared.config.ping_interval,
        heartbeat_cancel.clone(),
    ));

    let end = loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                let frame = CloseFrame {
                    code: CloseCode::Normal,
                    reason: "".into(),
                };
                _ = write.send(Message::Close(Some(frame))).await;
                break SessionEnd {
                    code: NORMAL_CLOSURE,
                    reason: String::new(),
                    local: true,
                };
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        #[cfg(feature = "tracing")]
                        tracing::trace!(%text, "Received WebSocket text message");

                        if let Some(event) = parse_frame(&text) {
                            shared.dispatcher.emit(event);
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame.map_or((NORMAL_CLOSURE, String::new()), |frame| {
                            (u16::from(frame.code), frame.reason.as_str().to_owned())
                        });
                        break SessionEnd { code, reason, local: false };
                    }
                    Some(Err(e)) => {
                        shared.emit_error(e.into());
                        break SessionEnd {
                            code: ABNORMAL_CLOSURE,
                            reason: String::new(),
                            local: false,
                        };
                    }
                    None => {
                        break SessionEnd {
                            code: ABNORMAL_CLOSURE,
                            reason: String::new(),
                            local: false,
                        };
                    }
                    Some(Ok(_)) => {
                        // Binary frames are not part of the protocol; control frames are
                        // answered by tungstenite.
                    }
                }
            }

            Some(text) = outbound_rx.recv() => {
                if let Err(e) = write.send(Message::Text(text.into())).await {
                    shared.emit_error(e.into());
                    break SessionEnd {
                        code: ABNORMAL_CLOSURE,
                        reason: String::new(),
                        local: false,
                    };
                }
            }

            Some(()) = ping_rx.recv() => {
                let Some(ping) = ClientFrame::Ping.encode() else {
                    continue;
                };
                if let Err(e) = write.send(Message::Text(ping.into())).await {
                    shared.emit_error(e.into());
                    break SessionEnd {
                        code: ABNORMAL_CLOSURE,
                        reason: String::new(),
                        local: false,
                    };
                }
            }
        }
    };

    heartbeat_cancel.cancel();
    if let Err(e) = heartbeat.await {
        #[cfg(feature = "tracing")]
        tracing::error!(error = %e, "Heartbeat task failed");
        #[cfg(not(feature = "tracing"))]
        let _: &tokio::task::JoinError = &e;
    }
    _ = write.close().await;

    end
}

/// Requests a `ping` frame every `period` until cancelled. The first ping goes out one period
/// after the connection opens.
async fn heartbeat_loop(
    ping_tx: mpsc::UnboundedSender<()>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = interval_at(tokio::time::Instant::now() + period, period);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if ping_tx.send(()).is_err() {
                    // Session loop has terminated
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;

    fn frame(frame: &ClientFrame) -> Value {
        serde_json::from_str(&frame.encode().expect("encodable")).expect("json")
    }

    fn shared() -> Shared {
        Shared::new(Config::default(), SecretString::from("pk_test"))
    }

    #[test]
    fn client_frames_match_wire_format() {
        assert_eq!(
            frame(&ClientFrame::Subscribe {
                markets: vec!["pm_1".to_owned(), "ks_2".to_owned()]
            }),
            json!({"type": "subscribe", "markets": ["pm_1", "ks_2"]})
        );
        assert_eq!(
            frame(&ClientFrame::Unsubscribe {
                markets: vec!["pm_1".to_owned()]
            }),
            json!({"type": "unsubscribe", "markets": ["pm_1"]})
        );
        assert_eq!(
            frame(&ClientFrame::ListSubscriptions),
            json!({"type": "list_subscriptions"})
        );
        assert_eq!(frame(&ClientFrame::Ping), json!({"type": "ping"}));
    }

    #[test]
    fn subscriptions_are_tracked_while_disconnected() {
        let shared = shared();

        assert!(!shared.subscribe(vec!["pm_2".to_owned(), "pm_1".to_owned()]), "no session");
        assert!(!shared.subscribe(vec!["pm_1".to_owned()]), "no session");
        assert!(!shared.unsubscribe(vec!["pm_2".to_owned(), "pm_9".to_owned()]), "no session");

        assert_eq!(shared.subscriptions(), vec!["pm_1".to_owned()]);
    }

    #[test]
    fn attach_replays_full_set_before_later_frames() {
        let shared = shared();
        shared.subscribe(vec!["pm_2".to_owned(), "pm_1".to_owned()]);

        let (tx, mut rx) = mpsc::unbounded_channel();
        shared.attach(tx);
        assert!(shared.subscribe(vec!["ks_3".to_owned()]), "session attached");

        let replay: Value = serde_json::from_str(&rx.try_recv().expect("replay")).expect("json");
        let follow_up: Value = serde_json::from_str(&rx.try_recv().expect("subscribe")).expect("json");
        assert_eq!(replay, json!({"type": "subscribe", "markets": ["pm_1", "pm_2"]}));
        assert_eq!(follow_up, json!({"type": "subscribe", "markets": ["ks_3"]}));

        shared.detach();
        assert!(!shared.send(&ClientFrame::ListSubscriptions), "detached");
    }

    #[test]
    fn attach_with_empty_set_sends_nothing() {
        let shared = shared();
        let (tx, mut rx) = mpsc::unbounded_channel();

        shared.attach(tx);

        assert!(rx.try_recv().is_err(), "no replay frame expected");
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_bookkeeping_counts_and_gives_up() {
        let shared = shared();
        let cancel = CancellationToken::new();
        let mut events = shared.dispatcher.subscribe();
        let mut attempts = 4;
        let mut backoff = Config::reconnect_backoff();

        assert!(wait_for_reconnect(&shared, &cancel, &mut attempts, &mut backoff).await, "attempt 5 allowed");
        assert_eq!(attempts, 5);
        assert_eq!(shared.state(), ConnectionState::Reconnecting { attempt: 5 });
        assert!(
            matches!(events.recv().await, Ok(Event::Reconnect { attempt: 5 })),
            "reconnect event"
        );

        assert!(!wait_for_reconnect(&shared, &cancel, &mut attempts, &mut backoff).await, "exhausted");
        assert_eq!(shared.state(), ConnectionState::Disconnected);
        let Ok(Event::Error(error)) = events.recv().await else {
            panic!("expected error event");
        };
        assert_eq!(error.message(), "Failed to reconnect after 5 attempts");
    }

    #[tokio::test]
    async fn reconnect_wait_stops_on_cancel() {
        let shared = shared();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut attempts = 0;
        let mut backoff = Config::reconnect_backoff();

        assert!(!wait_for_reconnect(&shared, &cancel, &mut attempts, &mut backoff).await, "cancelled");
        assert_eq!(attempts, 1);
    }
}
