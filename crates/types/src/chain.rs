use crate::BlockHash;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The (height, hash) pair identifying the chain tip a call is relative to.
///
/// Callers must not mix contexts across concurrent calls for the same
/// in-flight round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainContext {
    /// Height of the tip the next block will extend.
    pub height: u64,
    /// Hash of that tip.
    pub hash: BlockHash,
}

impl ChainContext {
    pub fn new(height: u64, hash: BlockHash) -> Self {
        Self { height, hash }
    }
}

impl fmt::Display for ChainContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} ({})", self.height, hex::encode(&self.hash[0..8]))
    }
}
