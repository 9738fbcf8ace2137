//! Local development server: an in-memory store seeded with two players,
//! a lobby and one running game.
//!
//! ```text
//! RUST_LOG=tessera=debug TESSERA_BIND=0.0.0.0:8080 cargo run -p tessera-dev-server
//! ```
//!
//! Tokens are `dev-alice` and `dev-bob`. Connect to `/lobby/@main/connect`,
//! `/game/demo/connect` or `/gateway`.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tessera::prelude::*;
use tessera::store::AccessToken;
use tracing_subscriber::EnvFilter;

const DEFAULT_BIND: &str = "127.0.0.1:8080";

const PLAYERS: [(&str, &str, &str); 2] = [
    ("alice", "Alice", "dev-alice"),
    ("bob", "Bob", "dev-bob"),
];

type DevServer = TesseraServer<StoreAuthenticator<MemoryRepository>, MemoryRepository>;

async fn seed(repo: &MemoryRepository) -> Result<(), Box<dyn std::error::Error>> {
    let mut scope = repo.begin().await?;
    let now = Utc::now();
    for (id, name, token) in PLAYERS {
        repo.add_user(&mut scope, User::new(id, name)).await?;
        repo.add_access_token(
            &mut scope,
            AccessToken {
                id: format!("{id}-token"),
                user_id: UserId::from(id),
                token: token.to_string(),
                created_at: now,
                accessed_at: now,
            },
        )
        .await?;
    }

    let a = UserId::from(PLAYERS[0].0);
    let b = UserId::from(PLAYERS[1].0);
    let state = GameState::initial(&a, &b, &GameConfig::default()).to_value()?;
    repo.add_game(
        &mut scope,
        Game {
            id: GameId::from("demo"),
            player_a_id: a,
            player_b_id: b,
            expires_at: now + Duration::days(1),
            revision: 0,
            state,
        },
    )
    .await?;
    repo.commit(scope).await?;
    Ok(())
}

async fn start(bind: &str) -> Result<DevServer, Box<dyn std::error::Error>> {
    let repo = Arc::new(MemoryRepository::new());
    seed(&repo).await?;
    let server = TesseraServerBuilder::new()
        .bind(bind)
        .build(StoreAuthenticator::new(Arc::clone(&repo)), repo)
        .await?;
    Ok(server)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let bind = std::env::var("TESSERA_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());
    let server = start(&bind).await?;
    tracing::info!(addr = ?server.local_addr()?, "dev server listening");

    server.run().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use tessera::protocol::IdentifyData;
    use tokio_tungstenite::tungstenite;

    async fn identify(addr: &str, path: &str, token: &str) -> Vec<Message> {
        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}{path}"))
            .await
            .unwrap();
        let hello = Message::Identify(IdentifyData {
            token: token.into(),
        });
        ws.send(tungstenite::Message::Text(hello.to_text().unwrap().into()))
            .await
            .unwrap();

        let mut got = Vec::new();
        while got.len() < 2 {
            let next = tokio::time::timeout(std::time::Duration::from_secs(2), ws.next()).await;
            match next {
                Ok(Some(Ok(tungstenite::Message::Text(text)))) => {
                    got.push(Message::from_text(text.as_str()).unwrap());
                }
                Ok(Some(Ok(_))) => continue,
                _ => break,
            }
        }
        got
    }

    #[tokio::test]
    async fn test_seeded_player_can_join_the_demo_game() {
        let server = start("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap().to_string();
        tokio::spawn(server.run());

        let got = identify(&addr, "/game/demo/connect", "dev-bob").await;
        assert_eq!(got[0], Message::ServerReady);
        assert!(matches!(got[1], Message::GameState(_)));
    }

    #[tokio::test]
    async fn test_unknown_token_is_refused() {
        let server = start("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap().to_string();
        tokio::spawn(server.run());

        let got = identify(&addr, "/gateway", "dev-mallory").await;
        assert!(matches!(&got[0], Message::Error(e) if e.fatal));
    }
}
