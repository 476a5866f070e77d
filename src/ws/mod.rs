//! WebSocket gateway

pub mod connections;
pub mod handler;
pub mod protocol;
