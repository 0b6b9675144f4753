//! blockport control server library
//!
//! Exposes the attachment resolution endpoint used by remote exports and a
//! content API whose saves run the import pipeline.

pub mod routes;

// Re-export for convenience
pub use routes::{create_routes, AppState, SharedState};
