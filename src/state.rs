use std::sync::Arc;
use std::time::Instant;

use crate::core::relay::RtMiddleTier;

/// Application state shared by all handlers
#[derive(Debug)]
pub struct AppState {
    pub relay: RtMiddleTier,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(relay: RtMiddleTier) -> Arc<Self> {
        Arc::new(Self {
            relay,
            started_at: Instant::now(),
        })
    }
}
