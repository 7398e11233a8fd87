use saros_types::{BlockHash, UnixMillis};
use serde::{Deserialize, Serialize};

/// What the consensus contract told this node to do, and when.
///
/// Produced once per trigger and consumed by the scheduler and by the
/// round's extra-data/transaction-generation calls until the next trigger
/// overwrites it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusCommand {
    /// Absolute instant at which the next block should be produced.
    pub arranged_mining_time: UnixMillis,
    /// Per-block mining time budget in milliseconds.
    pub limit_millis_of_mining: u64,
    /// Hard bound on how late the mining attempt may still start.
    pub mining_due_time: UnixMillis,
}

/// Verdict from the contract's before/after-execution validation calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusValidationResult {
    pub success: bool,
    /// Human-readable failure reason; empty on success.
    pub message: String,
    /// Whether the failure warrants re-triggering consensus.
    pub is_retrigger: bool,
}

impl ConsensusValidationResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: String::new(),
            is_retrigger: false,
        }
    }

    pub fn failed(message: impl Into<String>, is_retrigger: bool) -> Self {
        Self {
            success: false,
            message: message.into(),
            is_retrigger,
        }
    }
}

/// Payload carried by the one-shot mining timer when it fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiningEvent {
    /// Chain tip the scheduled block will extend.
    pub block_hash: BlockHash,
    pub block_height: u64,
    /// When the contract arranged the attempt to happen.
    pub arranged_mining_time: UnixMillis,
    /// Per-block mining time budget in milliseconds.
    pub mining_time_budget_ms: u64,
    /// Hard bound on how late the attempt may still start.
    pub mining_due_time: UnixMillis,
}

/// Published when a block's consensus data fails validation; an external
/// subscriber decides whether to re-sync or re-trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationFailedEvent {
    pub message: String,
    pub should_retrigger: bool,
}
