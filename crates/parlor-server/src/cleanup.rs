use std::time::Duration;

use tracing::{info, warn};

use parlor_api::session::prune_expired_sessions;
use parlor_api::state::AppState;

/// Background task that deletes expired sessions on an interval.
pub async fn run_session_cleanup_loop(state: AppState, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        match prune_expired_sessions(&state.db) {
            Ok(count) => {
                if count > 0 {
                    info!("Cleanup: pruned {} expired sessions", count);
                }
            }
            Err(e) => {
                warn!("Cleanup error: {}", e);
            }
        }
    }
}
