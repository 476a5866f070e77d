//! Remote matchmaking

pub mod queue;
pub mod service;

pub use service::MatchmakingService;
