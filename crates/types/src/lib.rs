//! Shared domain types for the Saros node.
//!
//! Everything here is deliberately small and dependency-light: hashes,
//! timestamps, transactions, and the chain-context pair that every
//! pool-selection and consensus call is relative to.

mod block;
mod chain;
mod time;
mod transaction;

pub use block::{Block, BlockHeader};
pub use chain::ChainContext;
pub use time::UnixMillis;
pub use transaction::{Transaction, TxHash, TxHashParseError, TxKind, PUBLISH_SECRET_METHOD};

/// Unique identifier for an account or block producer (32-byte public key hash).
pub type Address = [u8; 32];

/// Canonical identifier for a block header (32-byte digest).
pub type BlockHash = [u8; 32];
