//! Maps a connection's request path to the behavior that serves it.

use std::sync::Arc;

use tessera_game::GameBehavior;
use tessera_lobby::LobbyBehavior;
use tessera_protocol::{CloseCode, GameId, LobbyId};
use tessera_session::{
    Authenticator, FramedConnection, GatewayBehavior, Session, SessionError,
};
use tessera_store::Repository;
use tessera_transport::{Connection, WebSocketConnection};

use crate::server::ServerState;

/// Where a connection asked to go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// `/gateway`: notifications only.
    Gateway,
    /// `/lobby/{id}/connect`
    Lobby(LobbyId),
    /// `/game/{id}/connect`
    Game(GameId),
}

impl Route {
    /// Parses a request path. The query string is ignored, as are empty
    /// segments from doubled or trailing slashes.
    pub fn parse(path: &str) -> Option<Self> {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        match segments.as_slice() {
            ["gateway"] => Some(Self::Gateway),
            ["lobby", id, "connect"] => Some(Self::Lobby(LobbyId::from(*id))),
            ["game", id, "connect"] => Some(Self::Game(GameId::from(*id))),
            _ => None,
        }
    }
}

/// Runs one accepted connection to completion.
pub(crate) async fn handle_connection<A, R>(
    conn: WebSocketConnection,
    state: Arc<ServerState<A, R>>,
) -> Result<(), SessionError>
where
    A: Authenticator,
    R: Repository,
{
    let conn_id = conn.id();
    let Some(route) = Route::parse(conn.path()) else {
        tracing::info!(%conn_id, path = conn.path(), "no route for path");
        FramedConnection::new(conn)
            .send_error("Not found", Some(CloseCode::Normal))
            .await?;
        return Ok(());
    };
    tracing::debug!(%conn_id, ?route, "routing connection");

    let session = Session::new(conn, Arc::clone(&state.services));
    match route {
        Route::Gateway => session.run(GatewayBehavior).await,
        Route::Lobby(id) => {
            let lobby = state.lobbies.get_or_create(&id).await;
            session.run(LobbyBehavior::new(lobby)).await
        }
        Route::Game(id) => {
            let game = state.games.get_or_create(&id).await;
            let result = session.run(GameBehavior::new(game)).await;
            // Sessions nobody is playing in anymore are reloaded on demand.
            state.games.evict(&id).await;
            result
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_routes() {
        assert_eq!(Route::parse("/gateway"), Some(Route::Gateway));
        assert_eq!(
            Route::parse("/lobby/@main/connect"),
            Some(Route::Lobby(LobbyId::from("@main")))
        );
        assert_eq!(
            Route::parse("/game/g-42/connect"),
            Some(Route::Game(GameId::from("g-42")))
        );
    }

    #[test]
    fn test_parse_ignores_query_and_extra_slashes() {
        assert_eq!(Route::parse("/gateway?v=1"), Some(Route::Gateway));
        assert_eq!(
            Route::parse("//game/g1/connect/"),
            Some(Route::Game(GameId::from("g1")))
        );
    }

    #[test]
    fn test_parse_rejects_unknown_paths() {
        for path in ["/", "", "/lobby", "/lobby/x", "/game/g1", "/game/g1/join", "/gateway/x"] {
            assert_eq!(Route::parse(path), None, "{path}");
        }
    }
}
