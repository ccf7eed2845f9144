//! Integration tests for a single room: state machine, host hand-off,
//! event emission, teardown, expiry, and concurrent joins.

use std::sync::Arc;
use std::time::Duration;

use encore_protocol::{PlayerId, RoomEvent, RoomId, RoomStatus, Song};
use encore_room::{LifecycleConfig, Room, RoomConfig, RoomError};

// =========================================================================
// Helpers
// =========================================================================

fn pid(id: &str) -> PlayerId {
    PlayerId::from(id)
}

fn room_with(max_players: usize, lifecycle: LifecycleConfig) -> Room {
    Room::new(
        RoomId::from("room_test"),
        "ABC123",
        RoomConfig {
            name: "Friday Night".into(),
            max_players,
            password: Some("secret".into()),
            ..RoomConfig::default()
        },
        lifecycle,
    )
}

fn room(max_players: usize) -> Room {
    room_with(max_players, LifecycleConfig::default())
}

fn song(id: &str) -> Song {
    Song {
        id: id.into(),
        name: format!("Track {id}"),
        difficulty: "hard".into(),
        duration_secs: 180,
    }
}

/// Exactly one host when anyone is seated, and `host_id` names them.
async fn assert_host_invariant(room: &Room) {
    let snap = room.snapshot().await;
    let hosts: Vec<_> = snap.players.iter().filter(|p| p.is_host).collect();
    if snap.players.is_empty() {
        assert!(hosts.is_empty());
    } else {
        assert_eq!(hosts.len(), 1, "exactly one host expected");
        assert_eq!(snap.host_id.as_ref(), Some(&hosts[0].id));
    }
}

/// Two-seat room with A (host) and B seated, song picked, nobody ready.
async fn prepared_pair() -> Room {
    let room = room(2);
    room.join(pid("a"), "Alice").await.unwrap();
    room.join(pid("b"), "Bob").await.unwrap();
    room.select_song(&pid("a"), song("s1")).await.unwrap();
    room
}

// =========================================================================
// Scenarios
// =========================================================================

#[tokio::test]
async fn test_scenario_join_promotes_first_player_and_fills_to_preparing() {
    let room = room(2);

    let alice = room.join(pid("a"), "Alice").await.unwrap();
    assert!(alice.is_host);
    assert_eq!(room.status().await, RoomStatus::Waiting);
    assert_eq!(room.host_name().await.as_deref(), Some("Alice"));

    let bob = room.join(pid("b"), "Bob").await.unwrap();
    assert!(!bob.is_host);
    assert_eq!(room.status().await, RoomStatus::Preparing);
    assert_host_invariant(&room).await;
}

#[tokio::test]
async fn test_scenario_select_song_by_non_host_is_rejected() {
    let room = room(2);
    room.join(pid("a"), "Alice").await.unwrap();
    room.join(pid("b"), "Bob").await.unwrap();

    let err = room.select_song(&pid("b"), song("s1")).await.unwrap_err();
    assert_eq!(err, RoomError::NotHost(pid("b")));
}

#[tokio::test]
async fn test_scenario_everyone_ready_moves_to_ready() {
    let room = prepared_pair().await;

    room.set_ready(&pid("a"), true).await.unwrap();
    assert_eq!(room.status().await, RoomStatus::Preparing);

    room.set_ready(&pid("b"), true).await.unwrap();
    assert_eq!(room.status().await, RoomStatus::Ready);
}

#[tokio::test]
async fn test_scenario_only_host_starts_game() {
    let room = prepared_pair().await;
    room.set_ready(&pid("a"), true).await.unwrap();
    room.set_ready(&pid("b"), true).await.unwrap();

    let err = room.start_game(&pid("b")).await.unwrap_err();
    assert_eq!(err, RoomError::NotHost(pid("b")));

    room.start_game(&pid("a")).await.unwrap();
    assert_eq!(room.status().await, RoomStatus::Playing);
}

#[tokio::test]
async fn test_scenario_end_game_needs_no_host() {
    let room = prepared_pair().await;
    let mut events = room.take_events().unwrap();
    room.set_ready(&pid("a"), true).await.unwrap();
    room.set_ready(&pid("b"), true).await.unwrap();
    room.start_game(&pid("a")).await.unwrap();

    room.end_game().await.unwrap();

    assert_eq!(room.status().await, RoomStatus::Finished);
    let kinds: Vec<_> = events.drain().iter().map(RoomEvent::kind).collect();
    assert_eq!(kinds.last(), Some(&"game_ended"));
    assert!(kinds.contains(&"game_starting"));
}

#[tokio::test]
async fn test_end_game_from_waiting_and_again_from_finished() {
    let room = room(2);
    room.join(pid("a"), "Alice").await.unwrap();

    room.end_game().await.unwrap();
    assert_eq!(room.status().await, RoomStatus::Finished);

    room.end_game().await.unwrap();
    assert_eq!(room.status().await, RoomStatus::Finished);
}

// =========================================================================
// Join
// =========================================================================

#[tokio::test]
async fn test_join_beyond_capacity_is_room_full_and_changes_nothing() {
    let room = room(3);
    for id in ["a", "b", "c"] {
        room.join(pid(id), id).await.unwrap();
    }
    let before = room.snapshot().await;

    let err = room.join(pid("d"), "d").await.unwrap_err();

    assert_eq!(err, RoomError::RoomFull);
    assert_eq!(room.snapshot().await, before);
}

#[tokio::test]
async fn test_join_counts_and_preparing_exactly_at_capacity() {
    let room = room(4);
    for (i, id) in ["a", "b", "c", "d"].into_iter().enumerate() {
        assert_eq!(room.status().await, RoomStatus::Waiting);
        room.join(pid(id), id).await.unwrap();
        assert_eq!(room.player_count().await, i + 1);
    }
    assert_eq!(room.status().await, RoomStatus::Preparing);
}

#[tokio::test]
async fn test_join_duplicate_player_is_rejected() {
    let room = room(3);
    room.join(pid("a"), "Alice").await.unwrap();

    let err = room.join(pid("a"), "Alice again").await.unwrap_err();

    assert_eq!(err, RoomError::DuplicatePlayer(pid("a")));
    assert_eq!(room.player_count().await, 1);
}

#[tokio::test]
async fn test_join_while_playing_is_invalid_state() {
    let room = prepared_pair().await;
    room.set_ready(&pid("a"), true).await.unwrap();
    room.set_ready(&pid("b"), true).await.unwrap();
    room.start_game(&pid("a")).await.unwrap();

    let err = room.join(pid("c"), "Carol").await.unwrap_err();
    assert!(err.is_invalid_state());
}

#[tokio::test]
async fn test_join_after_seat_frees_refills_to_preparing() {
    let room = room(3);
    for id in ["a", "b", "c"] {
        room.join(pid(id), id).await.unwrap();
    }
    room.leave(&pid("c")).await.unwrap();
    assert_eq!(room.status().await, RoomStatus::Waiting);

    room.join(pid("d"), "d").await.unwrap();
    assert_eq!(room.status().await, RoomStatus::Preparing);
}

// =========================================================================
// Leave
// =========================================================================

#[tokio::test]
async fn test_leave_host_hands_off_to_earliest_joiner() {
    let room = room(4);
    let mut events = room.take_events().unwrap();
    for id in ["a", "b", "c"] {
        room.join(pid(id), id).await.unwrap();
    }

    let new_host = room.leave(&pid("a")).await.unwrap();

    assert_eq!(new_host, Some(pid("b")));
    assert_eq!(room.host_name().await.as_deref(), Some("b"));
    assert_host_invariant(&room).await;

    let last = events.drain().pop().unwrap();
    assert_eq!(
        last,
        RoomEvent::PlayerLeft {
            player_id: pid("a"),
            new_host: Some(pid("b")),
        }
    );
}

#[tokio::test]
async fn test_leave_non_host_keeps_host() {
    let room = room(3);
    room.join(pid("a"), "a").await.unwrap();
    room.join(pid("b"), "b").await.unwrap();

    assert_eq!(room.leave(&pid("b")).await.unwrap(), None);
    assert_eq!(room.snapshot().await.host_id, Some(pid("a")));
}

#[tokio::test]
async fn test_leave_below_capacity_falls_back_to_waiting() {
    let room = room(2);
    room.join(pid("a"), "a").await.unwrap();
    room.join(pid("b"), "b").await.unwrap();
    assert_eq!(room.status().await, RoomStatus::Preparing);

    room.leave(&pid("a")).await.unwrap();

    assert_eq!(room.status().await, RoomStatus::Waiting);
    assert_host_invariant(&room).await;
}

#[tokio::test]
async fn test_leave_falling_back_to_waiting_clears_ready_flags() {
    let room = prepared_pair().await;
    room.set_ready(&pid("a"), true).await.unwrap();

    room.leave(&pid("b")).await.unwrap();

    let snapshot = room.snapshot().await;
    assert_eq!(snapshot.status, RoomStatus::Waiting);
    assert!(snapshot.players.iter().all(|p| !p.is_ready));

    // Refilling the room starts the ready-up over.
    room.join(pid("c"), "Carol").await.unwrap();
    assert_eq!(room.status().await, RoomStatus::Preparing);
    assert!(room.snapshot().await.players.iter().all(|p| !p.is_ready));
}

#[tokio::test]
async fn test_last_player_leaving_preparing_room_stays_preparing() {
    let room = room(1);
    room.join(pid("a"), "a").await.unwrap();
    assert_eq!(room.status().await, RoomStatus::Preparing);

    room.leave(&pid("a")).await.unwrap();

    // The fall-back guard needs at least one remaining player.
    assert_eq!(room.status().await, RoomStatus::Preparing);
    assert_eq!(room.snapshot().await.host_id, None);
    assert_host_invariant(&room).await;
}

#[tokio::test]
async fn test_host_invariant_through_churn() {
    let room = room(4);
    for id in ["a", "b", "c", "d"] {
        room.join(pid(id), id).await.unwrap();
        assert_host_invariant(&room).await;
    }
    for id in ["a", "c", "b"] {
        room.leave(&pid(id)).await.unwrap();
        assert_host_invariant(&room).await;
    }
    room.join(pid("e"), "e").await.unwrap();
    assert_host_invariant(&room).await;
    assert_eq!(room.snapshot().await.host_id, Some(pid("d")));
}

// =========================================================================
// Ready / song selection / start
// =========================================================================

#[tokio::test]
async fn test_set_ready_before_song_is_song_not_selected() {
    let room = room(2);
    room.join(pid("a"), "a").await.unwrap();
    room.join(pid("b"), "b").await.unwrap();

    let err = room.set_ready(&pid("a"), true).await.unwrap_err();
    assert_eq!(err, RoomError::SongNotSelected);
}

#[tokio::test]
async fn test_set_ready_in_waiting_is_invalid_state() {
    let room = room(3);
    room.join(pid("a"), "a").await.unwrap();

    let err = room.set_ready(&pid("a"), true).await.unwrap_err();
    assert!(matches!(
        err,
        RoomError::InvalidState {
            status: RoomStatus::Waiting,
            ..
        }
    ));
}

#[tokio::test]
async fn test_set_ready_unknown_player_is_not_found() {
    let room = prepared_pair().await;
    let err = room.set_ready(&pid("z"), true).await.unwrap_err();
    assert_eq!(err, RoomError::PlayerNotFound(pid("z")));
}

#[tokio::test]
async fn test_select_song_resets_ready_flags() {
    let room = prepared_pair().await;
    room.set_ready(&pid("b"), true).await.unwrap();

    room.select_song(&pid("a"), song("s2")).await.unwrap();

    let snap = room.snapshot().await;
    assert!(snap.players.iter().all(|p| !p.is_ready));
    assert_eq!(snap.selected_song.map(|s| s.id), Some("s2".to_string()));
}

#[tokio::test]
async fn test_select_song_in_waiting_is_invalid_state() {
    let room = room(3);
    room.join(pid("a"), "a").await.unwrap();

    let err = room.select_song(&pid("a"), song("s1")).await.unwrap_err();
    assert!(err.is_invalid_state());
}

#[tokio::test]
async fn test_start_game_before_ready_is_rejected() {
    let room = prepared_pair().await;
    room.set_ready(&pid("a"), true).await.unwrap();

    let err = room.start_game(&pid("a")).await.unwrap_err();

    assert_eq!(
        err,
        RoomError::RoomNotReady {
            status: RoomStatus::Preparing
        }
    );
    assert!(err.is_invalid_state());
}

#[tokio::test]
async fn test_unready_keeps_room_preparing() {
    let room = prepared_pair().await;
    room.set_ready(&pid("a"), true).await.unwrap();
    room.set_ready(&pid("a"), false).await.unwrap();
    room.set_ready(&pid("b"), true).await.unwrap();

    assert_eq!(room.status().await, RoomStatus::Preparing);
}

#[tokio::test]
async fn test_game_starting_carries_countdown() {
    let room = prepared_pair().await;
    let mut events = room.take_events().unwrap();
    room.set_ready(&pid("a"), true).await.unwrap();
    room.set_ready(&pid("b"), true).await.unwrap();
    room.start_game(&pid("a")).await.unwrap();

    let last = events.drain().pop().unwrap();
    assert_eq!(last, RoomEvent::GameStarting { countdown: 3 });
}

// =========================================================================
// Events
// =========================================================================

#[tokio::test]
async fn test_events_follow_emission_order() {
    let room = room(2);
    let mut events = room.take_events().unwrap();

    room.join(pid("a"), "a").await.unwrap();
    room.join(pid("b"), "b").await.unwrap();
    room.select_song(&pid("a"), song("s1")).await.unwrap();
    room.set_ready(&pid("b"), true).await.unwrap();
    room.leave(&pid("b")).await.unwrap();

    let kinds: Vec<_> = events.drain().iter().map(RoomEvent::kind).collect();
    assert_eq!(
        kinds,
        vec![
            "player_joined",
            "player_joined",
            "song_selected",
            "player_ready_changed",
            "player_left",
        ]
    );
}

#[tokio::test]
async fn test_player_joined_reports_current_count() {
    let room = room(3);
    let mut events = room.take_events().unwrap();
    room.join(pid("a"), "a").await.unwrap();
    room.join(pid("b"), "b").await.unwrap();

    match events.drain().pop().unwrap() {
        RoomEvent::PlayerJoined {
            player,
            current_players,
        } => {
            assert_eq!(player.id, pid("b"));
            assert_eq!(current_players, 2);
        }
        other => panic!("expected PlayerJoined, got {other:?}"),
    }
}

#[tokio::test]
async fn test_full_queue_drops_events_without_blocking() {
    let room = room_with(
        10,
        LifecycleConfig {
            event_capacity: 2,
            ..LifecycleConfig::default()
        },
    );
    let mut events = room.take_events().unwrap();

    // Nobody drains: the mutations must still complete.
    for id in ["a", "b", "c", "d", "e"] {
        room.join(pid(id), id).await.unwrap();
    }

    assert_eq!(room.player_count().await, 5);
    assert_eq!(room.dropped_events().await, 3);
    assert_eq!(events.drain().len(), 2);
}

// =========================================================================
// Close
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_close_delivers_final_event_then_ends_stream() {
    let room = room(2);
    let mut events = room.take_events().unwrap();
    room.join(pid("a"), "a").await.unwrap();

    assert!(room.close("host_disbanded").await);

    assert_eq!(events.recv().await.map(|e| e.kind()), Some("player_joined"));
    assert_eq!(
        events.recv().await,
        Some(RoomEvent::RoomClosed {
            reason: "host_disbanded".into()
        })
    );
    assert_eq!(events.recv().await, None);
}

#[tokio::test(start_paused = true)]
async fn test_close_is_idempotent() {
    let room = room(2);
    let mut events = room.take_events().unwrap();

    assert!(room.close("first").await);
    assert!(!room.close("second").await);

    assert!(room.is_expired().await);
    assert_eq!(room.status().await, RoomStatus::Closed);
    assert_eq!(
        events.recv().await,
        Some(RoomEvent::RoomClosed {
            reason: "first".into()
        })
    );
    assert_eq!(events.recv().await, None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_closes_close_stream_once() {
    let room = Arc::new(room(2));
    let mut events = room.take_events().unwrap();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let room = Arc::clone(&room);
            tokio::spawn(async move { room.close(format!("close-{i}")).await })
        })
        .collect();

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);

    let closed: Vec<_> = events
        .drain()
        .into_iter()
        .filter(|e| e.kind() == "room_closed")
        .collect();
    assert_eq!(closed.len(), 1);
    assert_eq!(events.recv().await, None);
}

#[tokio::test(start_paused = true)]
async fn test_close_with_full_queue_gives_up_after_timeout() {
    let room = room_with(
        4,
        LifecycleConfig {
            event_capacity: 1,
            ..LifecycleConfig::default()
        },
    );
    let mut events = room.take_events().unwrap();
    room.join(pid("a"), "a").await.unwrap();

    let started = tokio::time::Instant::now();
    assert!(room.close("timeout").await);
    let waited = started.elapsed();

    // Bounded wait (100ms) plus grace (10ms), never more.
    assert!(waited >= Duration::from_millis(100));
    assert!(waited < Duration::from_secs(1));
    assert_eq!(events.recv().await.map(|e| e.kind()), Some("player_joined"));
    assert_eq!(events.recv().await, None);
}

#[tokio::test(start_paused = true)]
async fn test_closed_room_refuses_mutations() {
    let room = room(3);
    room.join(pid("a"), "a").await.unwrap();
    let mut events = room.take_events().unwrap();
    room.close("done").await;
    let _ = events.drain();

    assert!(room.join(pid("b"), "b").await.unwrap_err().is_invalid_state());
    assert!(room.leave(&pid("a")).await.unwrap_err().is_invalid_state());
    assert!(room.end_game().await.unwrap_err().is_invalid_state());
    assert!(room.set_ready(&pid("a"), true).await.is_err());
    assert!(room.start_game(&pid("a")).await.is_err());

    assert_eq!(room.status().await, RoomStatus::Closed);
    assert_eq!(room.player_count().await, 1);
    assert_eq!(events.recv().await, None);
}

// =========================================================================
// Expiry
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_fresh_room_is_not_expired() {
    let room = room(2);
    assert!(!room.is_expired().await);
}

#[tokio::test(start_paused = true)]
async fn test_expired_past_max_age_even_with_players() {
    let room = room(2);
    room.join(pid("a"), "a").await.unwrap();

    tokio::time::advance(Duration::from_secs(29 * 60)).await;
    assert!(!room.is_expired().await);

    tokio::time::advance(Duration::from_secs(2 * 60)).await;
    assert!(room.is_expired().await);
}

#[tokio::test(start_paused = true)]
async fn test_empty_room_expires_after_idle_timeout() {
    let room = room(2);

    tokio::time::advance(Duration::from_secs(4 * 60)).await;
    assert!(!room.is_expired().await);

    tokio::time::advance(Duration::from_secs(2 * 60)).await;
    assert!(room.is_expired().await);
}

#[tokio::test(start_paused = true)]
async fn test_occupied_room_does_not_idle_expire() {
    let room = room(2);
    room.join(pid("a"), "a").await.unwrap();

    tokio::time::advance(Duration::from_secs(10 * 60)).await;
    assert!(!room.is_expired().await);
}

#[tokio::test(start_paused = true)]
async fn test_idle_clock_restarts_on_activity() {
    let room = room(2);
    tokio::time::advance(Duration::from_secs(4 * 60)).await;
    room.join(pid("a"), "a").await.unwrap();
    room.leave(&pid("a")).await.unwrap();

    tokio::time::advance(Duration::from_secs(4 * 60)).await;
    assert!(!room.is_expired().await);

    tokio::time::advance(Duration::from_secs(2 * 60)).await;
    assert!(room.is_expired().await);
}

// =========================================================================
// Accessors
// =========================================================================

#[tokio::test]
async fn test_snapshot_hides_password() {
    let room = room(2);
    room.join(pid("a"), "Alice").await.unwrap();

    let snap = room.snapshot().await;
    let json = serde_json::to_value(&snap).unwrap();

    assert!(snap.has_password);
    assert!(json.get("password").is_none());
    assert_eq!(json["room_name"], "Friday Night");
    assert_eq!(json["join_code"], "ABC123");
    assert_eq!(json["status"], "waiting");
    assert_eq!(json["host_id"], "a");
    assert!(json["selected_song"].is_null());
}

#[tokio::test]
async fn test_validate_password() {
    let room = room(2);
    assert!(room.validate_password("secret"));
    assert!(!room.validate_password("guess"));
    assert!(!room.validate_password(""));
}

#[tokio::test]
async fn test_summary_reports_host_name() {
    let room = room(2);
    room.join(pid("a"), "Alice").await.unwrap();

    let summary = room.summary().await;
    assert_eq!(summary.current_players, 1);
    assert_eq!(summary.host_name.as_deref(), Some("Alice"));
    assert_eq!(summary.status, RoomStatus::Waiting);
}

// =========================================================================
// Concurrency
// =========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_joins_never_over_admit() {
    const CAPACITY: usize = 5;
    const ATTEMPTS: usize = 64;
    let room = Arc::new(room(CAPACITY));

    let handles: Vec<_> = (0..ATTEMPTS)
        .map(|i| {
            let room = Arc::clone(&room);
            tokio::spawn(async move { room.join(pid(&format!("p{i}")), "x").await })
        })
        .collect();

    let mut admitted = 0;
    let mut full = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => admitted += 1,
            Err(RoomError::RoomFull) => full += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(admitted, CAPACITY);
    assert_eq!(full, ATTEMPTS - CAPACITY);
    assert_eq!(room.player_count().await, CAPACITY);
    assert_eq!(room.status().await, RoomStatus::Preparing);
    assert_host_invariant(&room).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_readers_during_writes() {
    let room = Arc::new(room(50));

    let writers: Vec<_> = (0..50)
        .map(|i| {
            let room = Arc::clone(&room);
            tokio::spawn(async move {
                room.join(pid(&format!("p{i}")), "x").await.unwrap();
            })
        })
        .collect();
    let readers: Vec<_> = (0..50)
        .map(|_| {
            let room = Arc::clone(&room);
            tokio::spawn(async move {
                let count = room.player_count().await;
                assert!(count <= 50);
                let _ = room.snapshot().await;
            })
        })
        .collect();

    for handle in writers.into_iter().chain(readers) {
        handle.await.unwrap();
    }
    assert_eq!(room.player_count().await, 50);
    assert_host_invariant(&room).await;
}
