//! Reference relay for `chess-play`: a TCP publish/subscribe + presence
//! service over one in-memory hub, plus a read-only HTTP view of its rooms.

pub mod config;
pub mod error;
pub mod relay;
pub mod routes;
