//! Simulated play session against the in-memory backend.
//!
//! Drives sign-in, click bursts, an initials change, the leaderboard, and
//! sign-out, logging the view state along the way.

use std::sync::Arc;
use std::time::Duration;

use tally_client::{ClickSession, ClientConfig, Leaderboard, MemoryBackend};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tally_client=debug,simulate=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = ClientConfig::from_env()?;

    let backend = MemoryBackend::new();
    backend.add_user("ada", Some("ada@example.com"), Some("ada lovelace"));
    backend.add_user("bob", Some("bob@example.com"), Some("bob"));

    // A rival already on the board.
    let rival = Arc::new(backend.client());
    let rival_profile = rival.sign_in("bob").await?;
    let rival_session =
        ClickSession::start(rival.clone(), rival.clone(), rival_profile, config.clone());
    for _ in 0..5 {
        rival_session.record_click()?;
    }
    tokio::time::sleep(config.debounce_window + Duration::from_millis(100)).await;

    // Our player signs in.
    let client = Arc::new(backend.client());
    let profile = client.sign_in("ada").await?;
    tracing::info!(uid = %profile.uid, "signed in");

    let session = ClickSession::start(client.clone(), client.clone(), profile, config.clone());
    let board = Leaderboard::open(client.clone(), config.leaderboard_limit);

    // Two click bursts with an idle gap between them.
    for _ in 0..3 {
        session.record_click()?;
    }
    tokio::time::sleep(config.debounce_window + Duration::from_millis(100)).await;
    tracing::info!(view = ?session.current_view(), "after first burst");

    for _ in 0..4 {
        session.record_click()?;
    }
    tokio::time::sleep(config.debounce_window + Duration::from_millis(100)).await;
    tracing::info!(view = ?session.current_view(), "after second burst");

    // Change initials mid-session.
    let initials = session.set_initials("  ad!!42  ").await?;
    tracing::info!(initials = %initials, "initials updated");

    tokio::time::sleep(Duration::from_millis(100)).await;
    for row in &board.current().rows {
        tracing::info!(
            uid = %row.uid,
            initials = row.initials.as_deref().unwrap_or("-"),
            clicks = row.clicks,
            "leaderboard row"
        );
    }

    // One last click, then sign out before the debounce window elapses:
    // the sign-out flush must pick it up.
    session.record_click()?;
    session.sign_out().await?;
    rival_session.sign_out().await?;
    board.close();

    let doc = backend.doc("ada").expect("counter record exists");
    tracing::info!(clicks = doc.clicks, initials = ?doc.initials, "final record");
    assert_eq!(doc.clicks, 8);

    Ok(())
}
