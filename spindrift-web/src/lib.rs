//! Spindrift Web - JSON API Server
//!
//! Pure JSON request boundary for stream requests: submit a magnet link,
//! receive a public streaming URL. Presentation (players, clipboard, deep
//! links) lives in external clients of this API.

pub mod handlers;
pub mod server;

// Re-export main types
pub use server::{AppState, build_router, run_server};
