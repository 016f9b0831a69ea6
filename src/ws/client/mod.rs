mod connector;
mod handler;
mod inner;
mod options;

pub use connector::{ConnectGatewayError, Connector, Transport, WebsocketConnector};
pub use handler::Handler;
pub use inner::{ClientError, HandshakeError};
pub use options::{
    ConnectOptions, GatewayUrl, ParseGatewayURLError, ReconnectConfig, DEFAULT_HANDSHAKE_TIMEOUT,
    DEFAULT_PING_INTERVAL, DEFAULT_RECONNECT_BASE_DELAY, DEFAULT_RECONNECT_MAX_ATTEMPTS,
    DEFAULT_RECONNECT_MAX_DELAY,
};

use std::{fmt::Debug, sync::Arc};

use tokio::{
    sync::{oneshot, watch},
    task::JoinHandle,
};
use tokio_tungstenite as websocket;

use inner::{ClientInner, ClientStateInit};

pub(crate) type WebsocketClient =
    websocket::WebSocketStream<websocket::MaybeTlsStream<tokio::net::TcpStream>>;

/// Connection state, only changed by the client's driver task
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// no connection, initial and terminal state
    Disconnected,
    /// opening websocket
    Connecting,
    /// Connect packet sent, waiting ConnAck
    AwaitingAck,
    /// handshake done, heartbeat running
    Connected,
    /// owner requested disconnect
    Closing,
}

#[derive(Debug)]
struct Running {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// WuKongIM websocket protocol client.
///
/// Runs the connect handshake, sends heartbeat pings, acks every received
/// message and reconnects with exponential backoff after unexpected
/// disconnection. Events go to the [`Handler`] given at construction.
pub struct Client<C: Connector = WebsocketConnector> {
    options: Arc<ConnectOptions>,
    connector: Arc<C>,
    handler: Arc<dyn Handler>,
    state: Arc<watch::Sender<ConnectionState>>,
    state_rx: watch::Receiver<ConnectionState>,
    running: Option<Running>,
}

impl<C: Connector> Debug for Client<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("gateway", &self.options.gateway)
            .field("uid", &self.options.uid)
            .field("state", &self.state())
            .field("running", &self.running.is_some())
            .finish()
    }
}

impl Client<WebsocketConnector> {
    /// Create a client over real websocket connection
    pub fn new<H: Handler>(options: ConnectOptions, handler: H) -> Self {
        Self::with_connector(options, WebsocketConnector, handler)
    }
}

impl<C: Connector> Client<C> {
    /// Create a client with custom transport connector
    pub fn with_connector<H: Handler>(options: ConnectOptions, connector: C, handler: H) -> Self {
        let (state, state_rx) = watch::channel(ConnectionState::Disconnected);

        Self {
            options: Arc::new(options),
            connector: Arc::new(connector),
            handler: Arc::new(handler),
            state: Arc::new(state),
            state_rx,
            running: None,
        }
    }

    /// Start connecting in background, no-op if already running.
    ///
    /// Must be called inside a tokio runtime.
    pub fn connect(&mut self) {
        if let Some(ref running) = self.running {
            if !running.task.is_finished() {
                log::debug!("Client already running, ignore connect");
                return;
            }
        }

        log::info!("Client start, gateway {}", self.options.gateway);

        let (shutdown, shutdown_rx) = oneshot::channel();

        let inner = ClientInner {
            state: ClientStateInit {
                options: self.options.clone(),
                connector: self.connector.clone(),
                handler: self.handler.clone(),
                state: self.state.clone(),
            },
        };

        let task = tokio::spawn(inner.run(shutdown_rx));

        self.running = Some(Running { shutdown, task });
    }

    /// Stop heartbeat, cancel pending reconnect and close the connection.
    ///
    /// When this returns no more handler callback will be made, until next
    /// [`connect`](Self::connect).
    pub async fn disconnect(&mut self) {
        let running = match self.running.take() {
            Some(running) => running,
            None => {
                log::debug!("Client not running, ignore disconnect");
                return;
            }
        };

        log::info!("Client disconnecting");

        // error means driver already stopped
        let _ = running.shutdown.send(());

        if let Err(err) = running.task.await {
            log::warn!("Client driver task failed: {}", err);
        }

        log::info!("Client disconnected");
    }

    /// current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// a receiver for observing state changes
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// connect options
    pub fn options(&self) -> &ConnectOptions {
        &self.options
    }
}

#[cfg(test)]
mod test;
