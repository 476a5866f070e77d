//! Time utilities for game simulation

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Tick rate configuration
pub const DEFAULT_TICK_RATE_HZ: u32 = 60;
pub const MIN_TICK_RATE_HZ: u32 = 30;
pub const MAX_TICK_RATE_HZ: u32 = 120;

/// Fixed period between two simulation ticks at the given rate
pub fn tick_period(tick_rate_hz: u32) -> Duration {
    let hz = tick_rate_hz.clamp(MIN_TICK_RATE_HZ, MAX_TICK_RATE_HZ);
    Duration::from_micros(1_000_000 / hz as u64)
}
