//! `TesseraServer` builder and accept loop.
//!
//! This is the entry point for running a Tessera server. It ties the
//! layers together: transport, session, then the lobby, game or gateway
//! behavior picked by the request path.

use std::sync::Arc;
use std::time::Duration;

use tessera_game::{GameSessions, PowerDefinitions, SpawnPolicy};
use tessera_lobby::LobbyRegistry;
use tessera_notify::Notifier;
use tessera_protocol::GameId;
use tessera_session::{Authenticator, SessionConfig, SessionServices};
use tessera_store::Repository;
use tessera_transport::{DEFAULT_HANDSHAKE_TIMEOUT, TransportError, WebSocketTransport};

use crate::TesseraError;
use crate::router::handle_connection;

type SpawnFactory = Box<dyn Fn(&GameId) -> Box<dyn SpawnPolicy> + Send + Sync>;

/// State shared by every connection task.
pub(crate) struct ServerState<A, R> {
    pub(crate) services: Arc<SessionServices<A, R>>,
    pub(crate) lobbies: Arc<LobbyRegistry>,
    pub(crate) games: Arc<GameSessions>,
}

/// Builder for configuring and starting a Tessera server.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use std::time::Duration;
/// use tessera::prelude::*;
///
/// let server = TesseraServerBuilder::new()
///     .bind("0.0.0.0:8080")
///     .build(StaticAuthenticator::new(), Arc::new(MemoryRepository::new()))
///     .await?;
/// server.run().await
/// ```
pub struct TesseraServerBuilder {
    bind_addr: String,
    session_config: SessionConfig,
    handshake_timeout: Duration,
    powers: PowerDefinitions,
    spawn: Option<SpawnFactory>,
}

impl TesseraServerBuilder {
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            session_config: SessionConfig::default(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            powers: PowerDefinitions::builtin(),
            spawn: None,
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    /// How long a client gets to finish the WebSocket upgrade after the
    /// TCP connect.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Replaces the built-in power catalogue.
    pub fn power_definitions(mut self, powers: PowerDefinitions) -> Self {
        self.powers = powers;
        self
    }

    /// Sets how each game gets its spawn policy. Defaults to a randomly
    /// seeded countdown.
    pub fn spawn_policy<F>(mut self, factory: F) -> Self
    where
        F: Fn(&GameId) -> Box<dyn SpawnPolicy> + Send + Sync + 'static,
    {
        self.spawn = Some(Box::new(factory));
        self
    }

    /// Binds the listener. Nothing is accepted until
    /// [`TesseraServer::run`].
    pub async fn build<A, R>(
        self,
        authenticator: A,
        repository: Arc<R>,
    ) -> Result<TesseraServer<A, R>, TesseraError>
    where
        A: Authenticator,
        R: Repository,
    {
        let transport = WebSocketTransport::bind(&self.bind_addr)
            .await?
            .handshake_timeout(self.handshake_timeout);

        let notifier = Notifier::new();
        let mut games = GameSessions::new(notifier.clone()).powers(self.powers);
        if let Some(spawn) = self.spawn {
            games = games.spawn_policy(spawn);
        }
        let state = Arc::new(ServerState {
            lobbies: Arc::new(LobbyRegistry::new(notifier.clone())),
            games: Arc::new(games),
            services: Arc::new(
                SessionServices::new(authenticator, repository, notifier)
                    .config(self.session_config),
            ),
        });

        Ok(TesseraServer { transport, state })
    }
}

impl Default for TesseraServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Tessera server.
///
/// Call [`run()`](Self::run) to start accepting connections. The
/// registries and the notifier are shared handles and stay usable while
/// the server runs.
pub struct TesseraServer<A, R> {
    transport: WebSocketTransport,
    state: Arc<ServerState<A, R>>,
}

impl<A, R> TesseraServer<A, R>
where
    A: Authenticator,
    R: Repository,
{
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// The notifier sessions publish to and subscribe on.
    pub fn notifier(&self) -> Notifier {
        self.state.services.notifier.clone()
    }

    pub fn repository(&self) -> Arc<R> {
        Arc::clone(&self.state.services.repository)
    }

    pub fn lobbies(&self) -> Arc<LobbyRegistry> {
        Arc::clone(&self.state.lobbies)
    }

    pub fn games(&self) -> Arc<GameSessions> {
        Arc::clone(&self.state.games)
    }

    /// Runs the accept loop until the transport shuts down.
    ///
    /// Each accepted socket is upgraded, routed and served on its own
    /// task, so a client that stalls mid-handshake only holds up itself.
    pub async fn run(self) -> Result<(), TesseraError> {
        tracing::info!(addr = ?self.transport.local_addr().ok(), "tessera server running");

        loop {
            match self.transport.accept_stream().await {
                Ok(handshake) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        let peer = handshake.peer_addr();
                        let conn = match handshake.complete().await {
                            Ok(conn) => conn,
                            Err(e) => {
                                tracing::debug!(%peer, error = %e, "handshake failed");
                                return;
                            }
                        };
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(TransportError::Shutdown) => {
                    tracing::info!("transport shut down, stopping");
                    return Ok(());
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
