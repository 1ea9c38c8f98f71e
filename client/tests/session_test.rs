//! Integration tests for the session controller.
//!
//! All tests run against the in-memory backend with paused virtual time,
//! so debounce windows elapse deterministically.

use std::sync::Arc;
use std::time::Duration;

use tally_client::{
    ClickSession, ClientConfig, ClientError, DocumentStore, IdentityProvider, Leaderboard,
    MemoryBackend, MemoryClient, UserProfile,
};
use tally_engine::Error as EngineError;
use tokio::task;

fn profile(uid: &str, display_name: Option<&str>) -> UserProfile {
    UserProfile {
        uid: uid.to_string(),
        email: None,
        display_name: display_name.map(str::to_string),
    }
}

fn start_session(backend: &MemoryBackend, user: UserProfile) -> (ClickSession, Arc<MemoryClient>) {
    let client = Arc::new(backend.client());
    let session = ClickSession::start(
        client.clone(),
        client.clone(),
        user,
        ClientConfig::default(),
    );
    (session, client)
}

/// Let the driver task process everything already queued, without moving
/// virtual time.
async fn drain() {
    for _ in 0..20 {
        task::yield_now().await;
    }
}

/// Move virtual time past the debounce window and let everything settle.
async fn idle_past_debounce() {
    tokio::time::sleep(Duration::from_millis(600)).await;
    drain().await;
}

#[tokio::test(start_paused = true)]
async fn burst_of_clicks_coalesces_into_one_flush() {
    let backend = MemoryBackend::new();
    let (session, _client) = start_session(&backend, profile("ada", None));
    drain().await;

    // Three clicks, 200 ms apart: each resets the 500 ms window.
    session.record_click().unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    session.record_click().unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    session.record_click().unwrap();
    drain().await;

    // No flush yet.
    assert_eq!(backend.increment_log().len(), 0);
    assert_eq!(session.current_view().displayed, 3);

    idle_past_debounce().await;

    // Exactly one increment, for the whole burst.
    assert_eq!(backend.increment_log(), vec![("ada".to_string(), 3)]);
    assert_eq!(backend.doc("ada").unwrap().clicks, 3);

    let view = session.current_view();
    assert_eq!(view.displayed, 3);
    assert!(!view.syncing);
}

#[tokio::test(start_paused = true)]
async fn displayed_count_tracks_clicks_immediately() {
    let backend = MemoryBackend::new();
    let seed = backend.client();
    seed.increment_clicks("ada", 10, None).await.unwrap();

    let (session, _client) = start_session(&backend, profile("ada", None));
    drain().await;
    assert_eq!(session.current_view().displayed, 10);

    session.record_click().unwrap();
    drain().await;

    let view = session.current_view();
    assert_eq!(view.displayed, 11);
    assert!(view.syncing);

    idle_past_debounce().await;
    let view = session.current_view();
    assert_eq!(view.displayed, 11);
    assert!(!view.syncing);
    assert_eq!(backend.doc("ada").unwrap().clicks, 11);
}

#[tokio::test(start_paused = true)]
async fn failed_flush_restores_pending_and_retries_on_next_trigger() {
    let backend = MemoryBackend::new();
    let seed = backend.client();
    seed.increment_clicks("ada", 10, None).await.unwrap();

    let (session, _client) = start_session(&backend, profile("ada", None));
    drain().await;

    backend.fail_next_increment();
    session.record_click().unwrap();
    idle_past_debounce().await;

    // The write failed: restored to pending, surfaced, nothing persisted.
    let view = session.current_view();
    assert_eq!(view.displayed, 11);
    assert!(view.syncing);
    assert!(view.status.as_deref().unwrap().contains("failed to save clicks"));
    assert_eq!(backend.doc("ada").unwrap().clicks, 10);

    // The next click re-triggers the timer; the retry carries both.
    session.record_click().unwrap();
    idle_past_debounce().await;

    let view = session.current_view();
    assert_eq!(view.displayed, 12);
    assert!(!view.syncing);
    assert_eq!(backend.doc("ada").unwrap().clicks, 12);
}

#[tokio::test(start_paused = true)]
async fn partial_flush_residue_is_collected_without_another_click() {
    let backend = MemoryBackend::new();
    let (session, _client) = start_session(&backend, profile("ada", None));
    drain().await;

    for _ in 0..3 {
        session.record_click().unwrap();
    }
    session.flush(Some(2)).unwrap();
    drain().await;

    assert_eq!(backend.doc("ada").unwrap().clicks, 2);
    assert_eq!(session.current_view().displayed, 3);

    // The residue flushes after one debounce window, with no new click.
    idle_past_debounce().await;
    assert_eq!(backend.doc("ada").unwrap().clicks, 3);
    assert!(!session.current_view().syncing);
}

#[tokio::test(start_paused = true)]
async fn sign_out_flushes_pending_clicks() {
    let backend = MemoryBackend::new();
    backend.add_user("ada", None, None);

    let client = Arc::new(backend.client());
    let user = client.sign_in("ada").await.unwrap();
    let session = ClickSession::start(
        client.clone(),
        client.clone(),
        user,
        ClientConfig::default(),
    );
    drain().await;

    session.record_click().unwrap();
    session.record_click().unwrap();

    // Sign out well before the debounce window elapses.
    session.sign_out().await.unwrap();

    assert_eq!(backend.doc("ada").unwrap().clicks, 2);
    assert_eq!(backend.increment_log(), vec![("ada".to_string(), 2)]);
    assert_eq!(client.current_user().await, None);
    // The counter subscription was released.
    assert_eq!(backend.counter_subscription_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn sign_out_proceeds_when_final_flush_fails() {
    let backend = MemoryBackend::new();
    backend.add_user("ada", None, None);

    let client = Arc::new(backend.client());
    let user = client.sign_in("ada").await.unwrap();
    let session = ClickSession::start(
        client.clone(),
        client.clone(),
        user,
        ClientConfig::default(),
    );
    drain().await;

    session.record_click().unwrap();
    session.record_click().unwrap();
    backend.fail_next_increment();

    let result = session.sign_out().await;
    assert!(matches!(result, Err(ClientError::Flush(_))));

    // Signed out regardless, with no clicks persisted.
    assert_eq!(client.current_user().await, None);
    assert_eq!(backend.doc("ada").unwrap().clicks, 0);
    assert_eq!(backend.counter_subscription_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn initials_are_normalized_and_mirrored() {
    let backend = MemoryBackend::new();
    backend.add_user("ada", None, None);

    let client = Arc::new(backend.client());
    let user = client.sign_in("ada").await.unwrap();
    let session = ClickSession::start(
        client.clone(),
        client.clone(),
        user,
        ClientConfig::default(),
    );
    drain().await;

    let initials = session.set_initials("  ab!!12cdef").await.unwrap();
    assert_eq!(initials.as_str(), "AB12");

    drain().await;
    let current = client.current_user().await.unwrap();
    assert_eq!(current.display_name.as_deref(), Some("AB12"));
    assert_eq!(backend.doc("ada").unwrap().initials.as_deref(), Some("AB12"));
    assert_eq!(session.current_view().initials.as_deref(), Some("AB12"));
}

#[tokio::test(start_paused = true)]
async fn empty_initials_are_rejected_before_any_remote_call() {
    let backend = MemoryBackend::new();
    backend.add_user("ada", None, Some("ADA"));

    let client = Arc::new(backend.client());
    let user = client.sign_in("ada").await.unwrap();
    let session = ClickSession::start(
        client.clone(),
        client.clone(),
        user,
        ClientConfig::default(),
    );
    drain().await;

    let result = session.set_initials("***").await;
    assert!(matches!(
        result,
        Err(ClientError::Validation(EngineError::EmptyInitials))
    ));

    // Nothing was written.
    assert_eq!(backend.doc("ada").unwrap().initials.as_deref(), Some("ADA"));
}

#[tokio::test(start_paused = true)]
async fn concurrent_initials_saves_are_guarded() {
    let backend = MemoryBackend::new();
    backend.add_user("ada", None, None);

    let client = Arc::new(backend.client());
    let user = client.sign_in("ada").await.unwrap();
    let session = ClickSession::start(
        client.clone(),
        client.clone(),
        user,
        ClientConfig::default(),
    );
    drain().await;

    let (first, second) = tokio::join!(session.set_initials("ab"), session.set_initials("cd"));
    assert!(first.is_ok());
    assert!(matches!(second, Err(ClientError::SaveInProgress)));
}

#[tokio::test(start_paused = true)]
async fn init_read_failure_leaves_session_interactive() {
    let backend = MemoryBackend::new();
    backend.fail_next_read();

    let (session, _client) = start_session(&backend, profile("ada", None));
    drain().await;

    let view = session.current_view();
    assert_eq!(view.displayed, 0);
    assert!(view.status.as_deref().unwrap().contains("failed to load score"));

    // Clicking still works: the increment merge creates the record.
    session.record_click().unwrap();
    idle_past_debounce().await;
    assert_eq!(backend.doc("ada").unwrap().clicks, 1);

    session.dismiss_status().unwrap();
    drain().await;
    assert_eq!(session.current_view().status, None);
}

#[tokio::test(start_paused = true)]
async fn same_account_in_two_tabs_loses_no_clicks() {
    let backend = MemoryBackend::new();
    let (tab_a, _) = start_session(&backend, profile("ada", None));
    drain().await;
    let (tab_b, _) = start_session(&backend, profile("ada", None));
    drain().await;

    for _ in 0..3 {
        tab_a.record_click().unwrap();
    }
    for _ in 0..4 {
        tab_b.record_click().unwrap();
    }
    idle_past_debounce().await;
    idle_past_debounce().await;

    assert_eq!(backend.doc("ada").unwrap().clicks, 7);
    assert_eq!(tab_a.current_view().displayed, 7);
    assert_eq!(tab_b.current_view().displayed, 7);
}

#[tokio::test(start_paused = true)]
async fn leaderboard_tracks_confirmed_writes() {
    let backend = MemoryBackend::new();
    let client = Arc::new(backend.client());

    client.increment_clicks("ada", 5, Some("ADA")).await.unwrap();
    client.increment_clicks("bob", 9, Some("BOB")).await.unwrap();

    let board = Leaderboard::open(client.clone(), 10);
    drain().await;

    let state = board.current();
    assert!(!state.loading);
    assert_eq!(state.rows.len(), 2);
    assert_eq!(state.rows[0].initials.as_deref(), Some("BOB"));

    client.increment_clicks("ada", 9, Some("ADA")).await.unwrap();
    drain().await;

    let state = board.current();
    assert_eq!(state.rows[0].initials.as_deref(), Some("ADA"));
    assert_eq!(state.rows[0].clicks, 14);

    board.close();
    drain().await;
    assert_eq!(backend.board_subscription_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn profile_initials_sync_into_record_at_start() {
    let backend = MemoryBackend::new();
    let seed = backend.client();
    seed.increment_clicks("ada", 3, None).await.unwrap();

    let (session, _client) = start_session(&backend, profile("ada", Some("ada lovelace")));
    drain().await;

    assert_eq!(backend.doc("ada").unwrap().initials.as_deref(), Some("ADAL"));
    assert_eq!(session.current_view().initials.as_deref(), Some("ADAL"));
    assert_eq!(session.current_view().displayed, 3);
}
