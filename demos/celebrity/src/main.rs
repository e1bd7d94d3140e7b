//! Celebrity: every player secretly names a celebrity, and when the game
//! starts each player is handed someone else's pick.
//!
//! ```text
//! cargo run -p celebrity [config.json]
//! ```

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use partyforge::prelude::*;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

type BoxError = Box<dyn Error + Send + Sync>;

const SECRET: &str = "celebrity";
const ASSIGNED: &str = "assignedCelebrity";

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Guest {
    name: String,
    celebrity: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct DemoConfig {
    session: SessionConfig,
    /// The first entry hosts.
    players: Vec<Guest>,
    /// How long anyone waits for the lobby to move on.
    wait_secs: u64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        let players = [
            ("Alice", "Dolly Parton"),
            ("Bob", "Keanu Reeves"),
            ("Carol", "Serena Williams"),
            ("Dan", "David Attenborough"),
        ]
        .map(|(name, celebrity)| Guest {
            name: name.into(),
            celebrity: celebrity.into(),
        })
        .to_vec();
        Self {
            session: SessionConfig::default(),
            players,
            wait_secs: 10,
        }
    }
}

fn load_config(path: Option<&str>) -> Result<DemoConfig, BoxError> {
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&raw)?)
        }
        None => Ok(DemoConfig::default()),
    }
}

// ---------------------------------------------------------------------------
// Game flow
// ---------------------------------------------------------------------------

/// Who ended up with which celebrity.
#[derive(Debug, Clone, PartialEq)]
struct Dealt {
    name: String,
    submitted: String,
    received: String,
}

fn secret(celebrity: &str) -> Fields {
    let mut extra = Fields::new();
    extra.insert(SECRET.into(), celebrity.into());
    extra
}

/// Forwards every update of `code` into a channel.
async fn watch(
    lobby: &Lobby<MemoryStore>,
    code: &SessionCode,
) -> Result<(Subscription, mpsc::UnboundedReceiver<SessionUpdate>), PartyforgeError> {
    let (tx, rx) = mpsc::unbounded_channel();
    let sub = lobby
        .subscribe(code, move |update| {
            let _ = tx.send(update);
        })
        .await?;
    Ok((sub, rx))
}

/// Waits for the first snapshot that satisfies `done`.
async fn wait_until(
    rx: &mut mpsc::UnboundedReceiver<SessionUpdate>,
    wait: Duration,
    done: impl Fn(&SessionSnapshot) -> bool,
) -> Result<SessionSnapshot, BoxError> {
    tokio::time::timeout(wait, async {
        while let Some(update) = rx.recv().await {
            match update {
                SessionUpdate::Changed(snapshot) if done(&snapshot) => return Ok(snapshot),
                SessionUpdate::Changed(_) => {}
                SessionUpdate::Removed(code) => {
                    return Err(BoxError::from(format!("session {code} was removed")));
                }
            }
        }
        Err(BoxError::from("change feed closed"))
    })
    .await
    .map_err(|_| BoxError::from("timed out waiting for the lobby"))?
}

fn received(snapshot: &SessionSnapshot, slot: &SlotKey) -> Result<String, BoxError> {
    snapshot
        .document
        .player(slot)
        .and_then(|p| p.field(ASSIGNED))
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .ok_or_else(|| format!("{slot} was not dealt a celebrity").into())
}

/// One guest: join, register, ready up, then wait for the deal.
async fn play_guest(
    lobby: Arc<Lobby<MemoryStore>>,
    code: SessionCode,
    guest: Guest,
    wait: Duration,
) -> Result<Dealt, BoxError> {
    lobby.join_session(&code).await?;
    let slot = lobby
        .register_player(&code, &guest.name, secret(&guest.celebrity))
        .await?;
    let (sub, mut rx) = watch(&lobby, &code).await?;
    lobby.mark_ready(&code, &slot).await?;

    let started = wait_until(&mut rx, wait, |s| s.status() == SessionStatus::InProgress).await;
    sub.unsubscribe();
    let started = started?;

    let dealt = Dealt {
        received: received(&started, &slot)?,
        name: guest.name,
        submitted: guest.celebrity,
    };
    info!(%slot, name = %dealt.name, "got a celebrity");
    Ok(dealt)
}

/// Plays one full round and returns what everyone was dealt, host first.
async fn run(config: DemoConfig) -> Result<Vec<Dealt>, BoxError> {
    let mut players = config.players.into_iter();
    let host = players.next().ok_or("at least one player is needed to host")?;
    let guests: Vec<Guest> = players.collect();
    let expected = guests.len() + 1;
    let wait = Duration::from_secs(config.wait_secs);

    let lobby = Arc::new(Lobby::builder().config(config.session).build(MemoryStore::new()));
    let mut metadata = Fields::new();
    metadata.insert("game".into(), "celebrity".into());
    metadata.insert("players".into(), expected.into());
    let code = lobby.create_session(metadata, Fields::new()).await?;
    info!(%code, "share this code with your friends");

    let (host_sub, mut host_rx) = watch(&lobby, &code).await?;
    let host_slot = lobby
        .register_player(&code, &host.name, secret(&host.celebrity))
        .await?;

    let tasks: Vec<_> = guests
        .into_iter()
        .map(|guest| tokio::spawn(play_guest(Arc::clone(&lobby), code.clone(), guest, wait)))
        .collect();

    let full = wait_until(&mut host_rx, wait, |s| {
        s.document.players.len() == expected && s.document.all_ready()
    })
    .await;
    host_sub.unsubscribe();
    full?;

    let started = lobby
        .start_session(&code, &SecretSwap::new(SECRET, ASSIGNED))
        .await?;

    let mut dealt = vec![Dealt {
        received: received(&started, &host_slot)?,
        name: host.name,
        submitted: host.celebrity,
    }];
    for task in tasks {
        dealt.push(task.await??);
    }

    lobby
        .end_session_with(&code, |snapshot| async move {
            info!(code = %snapshot.code, players = snapshot.document.players.len(), "game over");
            Ok::<(), BoxError>(())
        })
        .await?;

    Ok(dealt)
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let path = std::env::args().nth(1);
    let config = load_config(path.as_deref())?;

    for dealt in run(config).await? {
        println!(
            "{:<10} wrote {:<20} and must play {}",
            dealt.name, dealt.submitted, dealt.received
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(players: &[(&str, &str)]) -> DemoConfig {
        DemoConfig {
            players: players
                .iter()
                .map(|(name, celebrity)| Guest {
                    name: (*name).into(),
                    celebrity: (*celebrity).into(),
                })
                .collect(),
            wait_secs: 5,
            ..Default::default()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_default_round_deals_everyone_a_foreign_celebrity() {
        let dealt = run(DemoConfig::default()).await.unwrap();

        assert_eq!(dealt.len(), 4);
        assert_eq!(dealt[0].name, "Alice");
        for d in &dealt {
            assert_ne!(d.submitted, d.received, "{} got their own pick", d.name);
        }
        let mut submitted: Vec<_> = dealt.iter().map(|d| d.submitted.clone()).collect();
        let mut received: Vec<_> = dealt.iter().map(|d| d.received.clone()).collect();
        submitted.sort();
        received.sort();
        assert_eq!(submitted, received);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_two_players_swap() {
        let dealt = run(config(&[("Ann", "Prince"), ("Ben", "Madonna")]))
            .await
            .unwrap();
        assert_eq!(dealt[0].received, "Madonna");
        assert_eq!(dealt[1].received, "Prince");
    }

    #[tokio::test]
    async fn test_solo_host_cannot_start() {
        let err = run(config(&[("Ann", "Prince")])).await.unwrap_err();
        let err = err.downcast::<PartyforgeError>().unwrap();
        assert!(matches!(
            *err,
            PartyforgeError::Session(SessionError::Shuffle(ShuffleError::TooShort { len: 1 }))
        ));
    }

    #[tokio::test]
    async fn test_empty_player_list_is_rejected() {
        assert!(run(config(&[])).await.is_err());
    }

    #[test]
    fn test_load_config_partial_json() {
        let path = std::env::temp_dir().join("celebrity-demo-config.json");
        std::fs::write(
            &path,
            r#"{"players": [{"name": "Zed", "celebrity": "Bowie"}], "session": {"code_digits": 6}}"#,
        )
        .unwrap();

        let config = load_config(path.to_str()).unwrap();
        assert_eq!(config.players.len(), 1);
        assert_eq!(config.session.code_digits, 6);
        assert_eq!(config.wait_secs, 10);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_load_config_defaults_without_path() {
        let config = load_config(None).unwrap();
        assert_eq!(config.players.len(), 4);
        assert_eq!(config.session, SessionConfig::default());
    }
}
