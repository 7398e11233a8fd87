use crate::{Address, BlockHash, TxHash, UnixMillis};
use blake3::Hasher as Blake3;
use serde::{Deserialize, Serialize};

/// Block header capturing the chain linkage and producer metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Height of this block.
    pub height: u64,
    /// Hash of the block this one extends.
    pub previous_hash: BlockHash,
    /// Producer that assembled the block.
    pub producer: Address,
    /// Block time chosen by the producer.
    pub time: UnixMillis,
    /// Consensus extra data embedded by the producer's round.
    #[serde(default, with = "serde_bytes")]
    pub extra_data: Vec<u8>,
}

/// A block as seen by the admission core: a header plus the ordered list
/// of transaction hashes it commits to. Bodies travel separately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Metadata header.
    pub header: BlockHeader,
    /// Ordered transaction hashes included in the block.
    pub tx_hashes: Vec<TxHash>,
}

impl Block {
    pub fn new(header: BlockHeader, tx_hashes: Vec<TxHash>) -> Self {
        Self { header, tx_hashes }
    }

    /// Canonical block hash over the header fields and the tx-hash list.
    pub fn hash(&self) -> BlockHash {
        let mut hasher = Blake3::new();
        hasher.update(&self.header.height.to_be_bytes());
        hasher.update(&self.header.previous_hash);
        hasher.update(&self.header.producer);
        hasher.update(&self.header.time.0.to_be_bytes());
        hasher.update(&self.header.extra_data);
        for tx_hash in &self.tx_hashes {
            hasher.update(&tx_hash.0);
        }

        let digest = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest.as_bytes()[0..32]);
        out
    }
}
