//! Game simulation modules

pub mod directory;
pub mod error;
pub mod r#match;
pub mod physics;
pub mod scheduler;
pub mod service;
pub mod snapshot;

pub use directory::RoomDirectory;
pub use r#match::GameConstants;
pub use scheduler::MatchScheduler;
pub use service::GameService;
