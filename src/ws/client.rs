use std::fmt;
use std::sync::Arc;

use async_stream::try_stream;
use futures::Stream;
use secrecy::SecretString;
use tokio::sync::Mutex;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use super::config::Config;
use super::connection::{ClientFrame, ConnectionState, Shared, run};
use super::error::WsError;
use super::events::{Event, EventKind, HandlerId};
use crate::Result;
use crate::error::Error;

/// Realtime market client.
///
/// Holds one logical connection and the set of markets it should be subscribed to. The set
/// survives disconnects and is replayed whenever a connection is (re)established.
///
/// Handlers run on the connection task, in registration order. Keep them short: a slow
/// handler delays every frame behind it. A handler that panics is logged and skipped.
///
/// # Example
///
/// ```no_run
/// use propheseer_client_sdk::ws::{Client, Config, Event, EventKind};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = Client::new(Config::builder().api_key("pk_live_...").build())?;
///
/// client.on(EventKind::MarketUpdate, |event: &Event| {
///     if let Some(update) = event.payload() {
///         println!("{update}");
///     }
/// });
///
/// client.subscribe(["pm_12345"]);
/// client.connect().await?;
/// # Ok(())
/// # }
/// ```
pub struct Client {
    shared: Arc<Shared>,
    /// Cancels every supervisor this client ever started
    shutdown: CancellationToken,
    supervisor: Mutex<Option<Supervisor>>,
}

struct Supervisor {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Client {
    /// Creates a disconnected client. Fails when no API key is configured or available from
    /// the environment.
    pub fn new(config: Config) -> Result<Self> {
        let Some(api_key) = crate::resolve_api_key(config.api_key.clone()) else {
            return Err(Error::missing_api_key());
        };
        if config.ping_interval.is_zero() {
            return Err(Error::validation("ping_interval must be greater than zero"));
        }
        // Surface an unusable base URL now rather than on every connect.
        config.endpoint(&api_key)?;

        Ok(Self {
            shared: Arc::new(Shared::new(config, SecretString::from(api_key))),
            shutdown: CancellationToken::new(),
            supervisor: Mutex::new(None),
        })
    }

    /// Opens the connection and waits up to the configured connect timeout for it.
    ///
    /// Returns [`ConnectionState::Connected`] on success. If the timeout elapses first the
    /// attempt carries on in the background and the current state is returned instead. A
    /// failed attempt is returned as an error and also emitted on [`EventKind::Error`].
    /// Calling this while a connection is live or being retried returns the current state.
    pub async fn connect(&self) -> Result<ConnectionState> {
        let mut supervisor = self.supervisor.lock().await;

        if self.state() == ConnectionState::Closed {
            return Err(WsError::ClientClosed.into());
        }
        if supervisor
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
        {
            return Ok(self.state());
        }

        let cancel = self.shutdown.child_token();
        let (ready_tx, ready_rx) = oneshot::channel();
        let handle = tokio::spawn(run(Arc::clone(&self.shared), cancel.clone(), ready_tx));
        *supervisor = Some(Supervisor { cancel, handle });
        drop(supervisor);

        match timeout(self.shared.config.connect_timeout, ready_rx).await {
            Ok(Ok(Ok(since))) => Ok(ConnectionState::Connected { since }),
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(_)) => Err(WsError::ClientClosed.into()),
            Err(_) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    timeout = ?self.shared.config.connect_timeout,
                    "Connect still pending, continuing in the background"
                );
                Ok(self.state())
            }
        }
    }

    /// Closes the connection for good.
    ///
    /// Stops the heartbeat and receive loops, waits for them to finish and suppresses any
    /// reconnect. Emits a final [`Event::Disconnect`] if a session was live.
    pub async fn close(&self) {
        let mut supervisor = self.supervisor.lock().await;

        if let Some(Supervisor { cancel, handle }) = supervisor.take() {
            cancel.cancel();
            if let Err(e) = handle.await {
                #[cfg(feature = "tracing")]
                tracing::error!(error = %e, "WebSocket supervisor task failed");
                #[cfg(not(feature = "tracing"))]
                let _: &tokio::task::JoinError = &e;
            }
        }

        self.shared.set_state(ConnectionState::Closed);
    }

    /// Adds markets to the subscription set and sends a `subscribe` frame if connected.
    ///
    /// Returns whether the frame was handed to the live connection. Subscriptions made while
    /// disconnected are sent on the next successful connect.
    pub fn subscribe<I, S>(&self, markets: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let markets: Vec<String> = markets.into_iter().map(Into::into).collect();
        if markets.is_empty() {
            return false;
        }
        self.shared.subscribe(markets)
    }

    /// Removes markets from the subscription set and sends an `unsubscribe` frame if connected.
    pub fn unsubscribe<I, S>(&self, markets: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let markets: Vec<String> = markets.into_iter().map(Into::into).collect();
        if markets.is_empty() {
            return false;
        }
        self.shared.unsubscribe(markets)
    }

    /// Asks the server for its view of this session's subscriptions. The answer arrives as a
    /// [`EventKind::Subscribed`] event.
    pub fn list_subscriptions(&self) -> bool {
        self.shared.send(&ClientFrame::ListSubscriptions)
    }

    /// Sorted snapshot of the local subscription set.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<String> {
        self.shared.subscriptions()
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Watch channel for connection state transitions.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_receiver()
    }

    /// Registers `handler` for events of `kind`.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> HandlerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.shared.dispatcher.on(kind, Arc::new(handler))
    }

    /// Removes a handler. Returns `false` if it was not registered for `kind`.
    pub fn off(&self, kind: EventKind, id: HandlerId) -> bool {
        self.shared.dispatcher.off(kind, id)
    }

    /// Every event emitted from now on, in order.
    ///
    /// A consumer that falls more than 1024 events behind gets a [`WsError::Lagged`] error and
    /// then resumes with the oldest retained event. Once the client is closed the stream
    /// yields the events still queued, including the final [`Event::Disconnect`], and ends.
    pub fn events(&self) -> impl Stream<Item = Result<Event>> + use<> {
        let mut rx = self.shared.dispatcher.subscribe();
        let mut state = self.shared.state_receiver();

        try_stream! {
            let mut closed = *state.borrow_and_update() == ConnectionState::Closed;

            loop {
                let received = if closed {
                    match rx.try_recv() {
                        Ok(event) => Ok(event),
                        Err(TryRecvError::Lagged(n)) => Err(RecvError::Lagged(n)),
                        Err(TryRecvError::Empty | TryRecvError::Closed) => break,
                    }
                } else {
                    tokio::select! {
                        biased;
                        received = rx.recv() => received,
                        changed = state.changed() => {
                            closed = changed.is_err()
                                || *state.borrow_and_update() == ConnectionState::Closed;
                            continue;
                        }
                    }
                };

                match received {
                    Ok(event) => yield event,
                    Err(RecvError::Lagged(n)) => {
                        Err(WsError::Lagged { count: n })?;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.shared.config.ws_base_url())
            .field("state", &self.state())
            .field("subscriptions", &self.subscriptions())
            .finish_non_exhaustive()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
