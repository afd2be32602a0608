use std::sync::Arc;
use std::time::Instant;
use tokio::time::{Duration, interval};
use tracing::{debug, info};

use crate::metrics::WINDOW_COUNTERS;
use crate::state::AppState;

// Evicts window counters whose window has lapsed. Purely a memory bound:
// an evicted counter would have been reset by its next admission anyway.
pub async fn counter_sweeper(state: Arc<AppState>, every: Duration) {
    let mut interval = interval(every);

    info!(interval = ?every, "counter sweeper started");

    loop {
        interval.tick().await;
        sweep_once(&state, Instant::now());
    }
}

pub fn sweep_once(state: &AppState, now: Instant) -> usize {
    let removed = state.admission.prune_idle(now);
    let tracked = state.admission.tracked_counters();
    WINDOW_COUNTERS.set(tracked as f64);

    if removed > 0 {
        debug!(removed, tracked, "evicted idle window counters");
    }
    removed
}
