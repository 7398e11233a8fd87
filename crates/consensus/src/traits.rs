use crate::command::{ConsensusCommand, ConsensusValidationResult, MiningEvent};
use anyhow::Result;
use async_trait::async_trait;
use saros_types::{ChainContext, Transaction, UnixMillis};
use std::time::Duration;

/// Remote calls into the consensus contract, per chain context.
///
/// `at` is the block-time reference every call is evaluated against.
/// `Ok(None)` is the contract's legitimate decline signal (not yet this
/// node's turn, nothing to reveal, ...) and must never be treated as a
/// fault; `Err` is a transport-level failure.
#[async_trait]
pub trait ConsensusReader: Send + Sync {
    async fn get_command(
        &self,
        ctx: &ChainContext,
        at: UnixMillis,
        trigger: &[u8],
    ) -> Result<Option<ConsensusCommand>>;

    async fn generate_transactions(
        &self,
        ctx: &ChainContext,
        at: UnixMillis,
        trigger: &[u8],
    ) -> Result<Option<Vec<Transaction>>>;

    async fn get_extra_data(
        &self,
        ctx: &ChainContext,
        at: UnixMillis,
        trigger: &[u8],
    ) -> Result<Option<Vec<u8>>>;

    async fn validate_before(
        &self,
        ctx: &ChainContext,
        at: UnixMillis,
        extra_data: &[u8],
    ) -> Result<Option<ConsensusValidationResult>>;

    async fn validate_after(
        &self,
        ctx: &ChainContext,
        at: UnixMillis,
        extra_data: &[u8],
    ) -> Result<Option<ConsensusValidationResult>>;
}

/// Builds the opaque trigger payloads the contract expects for each call
/// kind. The scheduling core never inspects these bytes.
pub trait TriggerInformationProvider: Send + Sync {
    /// Payload for the get-command call.
    fn for_command(&self) -> Vec<u8>;

    /// Payload for the extra-data call of the round `command` opened.
    fn for_extra_data(&self, command: &ConsensusCommand) -> Vec<u8>;

    /// Payload for the transaction-generation call of that round.
    fn for_transactions(&self, command: &ConsensusCommand) -> Vec<u8>;
}

/// Single-slot one-shot timer for the next mining attempt.
///
/// `cancel` is idempotent and guarantees no stale fire delivers its
/// payload after the call returns, so a fresh trigger can never race an
/// old timer's callback.
pub trait MiningScheduler: Send + Sync {
    fn arm(&self, delay: Duration, event: MiningEvent);
    fn cancel(&self);
}
