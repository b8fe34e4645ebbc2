//! HTTP surface of the custody tracker.
//!
//! Status reads for the public endpoint, ingestion routes for the deal
//! indexer, the pinning webhook and the claims collaborator, and the
//! operational `/health` and `/metrics` endpoints.

pub mod custody;
pub mod server;

pub use server::{build_router, start_server, ApiError, AppState};

#[cfg(test)]
mod server_tests;
