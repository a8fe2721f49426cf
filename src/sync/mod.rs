//! Offline-first game sync
//!
//! Clients queue creates, updates and deletes while offline and replay them
//! later. This module reconciles each replayed modification against the
//! store and answers pull queries for records changed or created elsewhere.
//!
//! Every stored game carries a `lastActionId` token regenerated on each
//! accepted mutation, and games created offline carry a `createdId`
//! fingerprint used as an idempotency key.

mod batch;
mod engine;
mod error;
mod pull;
mod types;

pub use batch::*;
pub use engine::*;
pub use error::*;
pub use pull::*;
pub use types::*;
