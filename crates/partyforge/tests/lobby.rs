//! Integration tests for the `Lobby` facade and the full party flow.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use partyforge::prelude::*;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::timeout;

fn fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

// =========================================================================
// Full flow
// =========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_full_party_flow() {
    let lobby = Arc::new(Lobby::in_memory());
    let code = lobby
        .create_session(fields(json!({"theme": "movies"})), Fields::new())
        .await
        .unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let sub = lobby
        .subscribe(&code, move |update| {
            let _ = tx.send(update);
        })
        .await
        .unwrap();

    let host = lobby
        .register_player(&code, "Alice", fields(json!({"celebrity": "Cher"})))
        .await
        .unwrap();
    assert_eq!(host, SlotKey::creator());

    let guests = ["Bob", "Carol", "Dan"].map(|name| {
        let lobby = Arc::clone(&lobby);
        let code = code.clone();
        tokio::spawn(async move {
            let extra = fields(json!({"celebrity": format!("{name}'s idol")}));
            let slot = lobby.register_player(&code, name, extra).await.unwrap();
            lobby.mark_ready(&code, &slot).await.unwrap();
            slot
        })
    });
    let guests: Vec<SlotKey> = join_all(guests)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();
    assert!(guests.iter().all(|s| !s.is_creator()));

    let snapshot = lobby.join_session(&code).await.unwrap();
    assert!(snapshot.document.all_ready());
    assert_eq!(snapshot.document.player_count, Some(4));

    let started = lobby
        .start_session(&code, &SecretSwap::new("celebrity", "assignedCelebrity"))
        .await
        .unwrap();
    assert_eq!(started.status(), SessionStatus::InProgress);
    for player in started.document.players.values() {
        assert_ne!(player.field("celebrity"), player.field("assignedCelebrity"));
    }

    let ended = lobby.end_session(&code).await.unwrap();
    assert_eq!(ended.status(), SessionStatus::Finished);

    let mut statuses = Vec::new();
    loop {
        let update = timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let status = update.status().unwrap();
        statuses.push(status);
        if status == SessionStatus::Finished {
            break;
        }
    }
    sub.unsubscribe();

    assert!(statuses.windows(2).all(|w| w[0] <= w[1]));
    assert!(statuses.contains(&SessionStatus::InProgress));
}

// =========================================================================
// Errors surface through the unified type
// =========================================================================

#[tokio::test]
async fn test_unknown_code_is_session_not_found() {
    let lobby = Lobby::in_memory();
    let code = SessionCode::parse("00000").unwrap();

    let err = lobby.join_session(&code).await.unwrap_err();
    assert!(matches!(
        err,
        PartyforgeError::Session(SessionError::NotFound(_))
    ));
    assert_eq!(err.to_string(), "session 00000 not found");
}

#[tokio::test]
async fn test_finished_session_is_closed_to_newcomers() {
    let lobby = Lobby::in_memory();
    let code = lobby
        .create_session(Fields::new(), Fields::new())
        .await
        .unwrap();
    lobby.end_session(&code).await.unwrap();

    let err = lobby
        .register_player(&code, "Late", Fields::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err.as_session(),
        Some(SessionError::SessionClosed { .. })
    ));
}

#[tokio::test]
async fn test_end_session_with_hook_error() {
    let lobby = Lobby::in_memory();
    let code = lobby
        .create_session(Fields::new(), Fields::new())
        .await
        .unwrap();

    let err = lobby
        .end_session_with(&code, |_| async { Err("leaderboard down") })
        .await
        .unwrap_err();
    assert!(matches!(err.as_session(), Some(SessionError::Hook(_))));
}

// =========================================================================
// Builder and shared stores
// =========================================================================

#[tokio::test]
async fn test_builder_applies_config() {
    let lobby = Lobby::builder()
        .code_digits(7)
        .allow_late_registration(true)
        .build(MemoryStore::new());

    let code = lobby
        .create_session(Fields::new(), Fields::new())
        .await
        .unwrap();
    assert_eq!(code.as_str().len(), 7);

    lobby
        .register_player(&code, "Alice", Fields::new())
        .await
        .unwrap();
    lobby.start_session(&code, &Identity).await.unwrap();
    let late = lobby
        .register_player(&code, "Late", Fields::new())
        .await
        .unwrap();
    assert_eq!(late, SlotKey::joiner(1));
}

#[tokio::test]
async fn test_builder_validates_config() {
    let lobby = Lobby::builder()
        .config(SessionConfig {
            code_digits: 30,
            ..Default::default()
        })
        .build(MemoryStore::new());
    assert_eq!(lobby.config().code_digits, SessionConfig::MAX_CODE_DIGITS);
}

#[tokio::test]
async fn test_lobbies_over_one_store_share_sessions() {
    let store = Arc::new(MemoryStore::new());
    let host = Lobby::builder().build_shared(Arc::clone(&store));
    let guest = Lobby::builder().build_shared(Arc::clone(&store));

    let code = host
        .create_session(Fields::new(), Fields::new())
        .await
        .unwrap();
    host.register_player(&code, "Alice", Fields::new())
        .await
        .unwrap();

    let slot = guest
        .register_player(&code, "Bob", Fields::new())
        .await
        .unwrap();
    assert_eq!(slot, SlotKey::joiner(1));
    assert_eq!(host.session(&code).await.unwrap().document.players.len(), 2);
    assert!(Arc::ptr_eq(host.store(), guest.store()));
}
