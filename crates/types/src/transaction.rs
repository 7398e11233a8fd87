use crate::Address;
use blake3::Hasher as Blake3;
use serde::{Deserialize, Serialize};
use serde_bytes;
use std::fmt;

/// Method name of the designated reveal step in the round-based
/// secret-sharing protocol. At most one valid instance per producer per
/// round; the pool's selection filter is keyed on this name.
pub const PUBLISH_SECRET_METHOD: &str = "publish_secret";

/// Content-addressed transaction digest (blake3, 32 bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxHash(#[serde(with = "serde_bytes")] pub [u8; 32]);

/// Error returned when parsing a hex-encoded transaction hash fails.
#[derive(Debug, thiserror::Error)]
pub enum TxHashParseError {
    #[error("invalid hex encoding: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("expected 32 bytes, got {0}")]
    Length(usize),
}

impl TxHash {
    /// Hex representation, lowercase.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 64-character hex string.
    pub fn from_hex(input: &str) -> Result<Self, TxHashParseError> {
        let bytes = hex::decode(input)?;
        let bytes: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| TxHashParseError::Length(input.len() / 2))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({})", self.to_hex())
    }
}

/// Transaction partition kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxKind {
    /// Arbitrary contract invocation, subject to per-block volume limits.
    Ordinary,
    /// Drives the consensus protocol itself; volume-exempt, producer-filtered.
    ConsensusProtocol,
}

/// A transaction in the Saros blockchain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Sender address (32 bytes).
    pub from: Address,
    /// Which pool partition this transaction belongs in.
    pub kind: TxKind,
    /// Contract method being invoked.
    pub method: String,
    /// Serialized call parameters.
    #[serde(with = "serde_bytes")]
    pub params: Vec<u8>,
    /// Height of the chain tip this transaction was built against.
    pub ref_block_height: u64,
    /// First four bytes of that tip's hash, for cheap freshness checks.
    pub ref_block_prefix: [u8; 4],
    /// Sender-chosen entropy; distinguishes otherwise identical calls.
    pub nonce: u64,
}

impl Transaction {
    /// Create an ordinary contract-call transaction.
    pub fn ordinary(from: Address, method: impl Into<String>, params: Vec<u8>, nonce: u64) -> Self {
        Self {
            from,
            kind: TxKind::Ordinary,
            method: method.into(),
            params,
            ref_block_height: 0,
            ref_block_prefix: [0u8; 4],
            nonce,
        }
    }

    /// Create a consensus-protocol transaction.
    pub fn consensus(from: Address, method: impl Into<String>, params: Vec<u8>, nonce: u64) -> Self {
        Self {
            from,
            kind: TxKind::ConsensusProtocol,
            method: method.into(),
            params,
            ref_block_height: 0,
            ref_block_prefix: [0u8; 4],
            nonce,
        }
    }

    /// Stamp the reference-block fields from a chain tip.
    pub fn set_ref_block(&mut self, height: u64, hash: &crate::BlockHash) {
        self.ref_block_height = height;
        self.ref_block_prefix.copy_from_slice(&hash[0..4]);
    }

    /// Content-addressed hash over all fields.
    pub fn hash(&self) -> TxHash {
        let mut hasher = Blake3::new();
        hasher.update(&self.from);
        hasher.update(&[self.kind as u8]);
        hasher.update(self.method.as_bytes());
        hasher.update(&self.params);
        hasher.update(&self.ref_block_height.to_be_bytes());
        hasher.update(&self.ref_block_prefix);
        hasher.update(&self.nonce.to_be_bytes());

        let digest = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest.as_bytes()[0..32]);
        TxHash(out)
    }

    /// Whether this transaction belongs in the consensus partition.
    pub fn is_consensus(&self) -> bool {
        self.kind == TxKind::ConsensusProtocol
    }

    /// Whether this is the designated publish-secret reveal transaction.
    pub fn is_publish_secret(&self) -> bool {
        self.kind == TxKind::ConsensusProtocol && self.method == PUBLISH_SECRET_METHOD
    }
}
