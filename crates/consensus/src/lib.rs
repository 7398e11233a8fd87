//! # Saros Consensus Scheduling Service
//!
//! Round-driven orchestrator between the block-assembly driver and the
//! consensus contract. On each trigger it asks the contract what to do and
//! when, re-arms a single-slot one-shot timer for the next mining attempt,
//! and later produces the round's extra header data and consensus
//! transactions and drives the pre/post-execution validation handshake.
//!
//! The contract is reachable only through the narrow [`ConsensusReader`]
//! call interface; a contract that returns nothing is declining, not
//! failing.

mod command;
mod scheduler;
mod service;
mod traits;

pub use command::{ConsensusCommand, ConsensusValidationResult, MiningEvent, ValidationFailedEvent};
pub use scheduler::TokioScheduler;
pub use service::{ConsensusConfig, ConsensusService};
pub use traits::{ConsensusReader, MiningScheduler, TriggerInformationProvider};

/// Consensus scheduling errors.
#[derive(thiserror::Error, Debug)]
pub enum ConsensusError {
    /// A remote call into the consensus contract failed at the transport
    /// level. Distinct from the contract declining, which is not an error.
    #[error("consensus contract call `{call}` failed")]
    ContractCall {
        call: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl ConsensusError {
    pub(crate) fn contract(call: &'static str, source: anyhow::Error) -> Self {
        Self::ContractCall { call, source }
    }
}
