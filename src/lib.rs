//! Puzzle Sync Server
//!
//! Offline-first sync backend for puzzle game sessions. Clients replay the
//! creates, updates and deletes they queued while offline; the server
//! reconciles each against the stored record and answers with the
//! authoritative outcome.

pub mod auth;
pub mod config;
pub mod error;
pub mod games;
pub mod routes;
pub mod state;
pub mod store;
pub mod sync;

#[cfg(test)]
mod testing;
