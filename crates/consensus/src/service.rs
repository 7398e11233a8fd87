use crate::command::{ConsensusCommand, ConsensusValidationResult, MiningEvent, ValidationFailedEvent};
use crate::traits::{ConsensusReader, MiningScheduler, TriggerInformationProvider};
use crate::ConsensusError;
use parking_lot::RwLock;
use saros_types::{ChainContext, Transaction, UnixMillis};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Consensus service configuration.
#[derive(Debug, Clone)]
pub struct ConsensusConfig {
    /// Clamp on the delay until the next mining attempt. A contract bug or
    /// clock skew scheduling arbitrarily far out would otherwise stall
    /// block production indefinitely.
    pub max_mining_delay: Duration,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            max_mining_delay: Duration::from_secs(8),
        }
    }
}

/// The round state written by a trigger: the contract's command and the
/// block-time reference all of the round's artifacts are computed as-of.
/// Swapped as one value so no caller can observe a command paired with the
/// wrong mining time.
struct RoundState {
    command: ConsensusCommand,
    next_mining_time: UnixMillis,
}

/// Round-driven consensus orchestrator.
///
/// `Idle` until a successful [`trigger`](Self::trigger) arms the mining
/// timer; a later trigger or cancellation replaces the schedule. Mining
/// itself is driven externally by the scheduler's event channel.
pub struct ConsensusService {
    reader: Arc<dyn ConsensusReader>,
    trigger_info: Arc<dyn TriggerInformationProvider>,
    scheduler: Arc<dyn MiningScheduler>,
    events: mpsc::UnboundedSender<ValidationFailedEvent>,
    round: RwLock<Option<RoundState>>,
    max_mining_delay: Duration,
}

impl ConsensusService {
    /// Create the service and the receiving end of its validation-failure
    /// event channel.
    pub fn new(
        reader: Arc<dyn ConsensusReader>,
        trigger_info: Arc<dyn TriggerInformationProvider>,
        scheduler: Arc<dyn MiningScheduler>,
        config: ConsensusConfig,
    ) -> (Self, mpsc::UnboundedReceiver<ValidationFailedEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let service = Self {
            reader,
            trigger_info,
            scheduler,
            events,
            round: RwLock::new(None),
            max_mining_delay: config.max_mining_delay,
        };
        (service, receiver)
    }

    /// Ask the contract for the next command and re-arm the mining timer.
    ///
    /// A declining contract leaves the previous schedule untouched. When a
    /// command arrives, the delay until its arranged mining time is clamped
    /// to the configured maximum and the timer is cancelled then re-armed;
    /// concurrent triggers serialize on the round lock, last writer wins.
    pub async fn trigger(&self, ctx: ChainContext) -> Result<(), ConsensusError> {
        let now = UnixMillis::now();
        let trigger = self.trigger_info.for_command();

        let command = self
            .reader
            .get_command(&ctx, now, &trigger)
            .await
            .map_err(|err| ConsensusError::contract("get_command", err))?;

        let Some(command) = command else {
            warn!(
                target: "consensus",
                chain = %ctx,
                "contract declined to issue a command, keeping previous schedule"
            );
            return Ok(());
        };

        // An arranged time in the past clamps to an immediate fire.
        let delay = now
            .saturating_duration_until(command.arranged_mining_time)
            .min(self.max_mining_delay);
        let event = MiningEvent {
            block_hash: ctx.hash,
            block_height: ctx.height,
            arranged_mining_time: command.arranged_mining_time,
            mining_time_budget_ms: command.limit_millis_of_mining,
            mining_due_time: command.mining_due_time,
        };

        // Guard held across swap + cancel + arm so concurrent triggers
        // cannot interleave state and timer.
        let mut round = self.round.write();
        *round = Some(RoundState {
            next_mining_time: command.arranged_mining_time,
            command,
        });
        self.scheduler.cancel();
        self.scheduler.arm(delay, event);
        drop(round);

        info!(
            target: "consensus",
            chain = %ctx,
            delay_ms = delay.as_millis() as u64,
            "armed next mining attempt"
        );
        Ok(())
    }

    /// Validate a block's consensus extra data before execution.
    pub async fn validate_before_execution(
        &self,
        ctx: ChainContext,
        extra_data: &[u8],
    ) -> Result<bool, ConsensusError> {
        // Someone else's block: evaluated at receipt time, not this node's
        // stored mining time.
        let result = self
            .reader
            .validate_before(&ctx, UnixMillis::now(), extra_data)
            .await
            .map_err(|err| ConsensusError::contract("validate_before", err))?;
        Ok(self.digest_validation("pre-execution", result))
    }

    /// Validate a block's consensus extra data after execution.
    pub async fn validate_after_execution(
        &self,
        ctx: ChainContext,
        extra_data: &[u8],
    ) -> Result<bool, ConsensusError> {
        let result = self
            .reader
            .validate_after(&ctx, UnixMillis::now(), extra_data)
            .await
            .map_err(|err| ConsensusError::contract("validate_after", err))?;
        Ok(self.digest_validation("post-execution", result))
    }

    /// Extra block-header data for this node's own block being assembled,
    /// computed as-of the round's arranged mining time. `None` when the
    /// service is idle or the contract declines.
    pub async fn extra_data(&self, ctx: ChainContext) -> Result<Option<Vec<u8>>, ConsensusError> {
        let Some((command, at)) = self.round_snapshot() else {
            debug!(target: "consensus", chain = %ctx, "extra data requested while idle");
            return Ok(None);
        };

        let trigger = self.trigger_info.for_extra_data(&command);
        let data = self
            .reader
            .get_extra_data(&ctx, at, &trigger)
            .await
            .map_err(|err| ConsensusError::contract("get_extra_data", err))?;

        if data.is_none() {
            debug!(target: "consensus", chain = %ctx, "contract declined to produce extra data");
        }
        Ok(data)
    }

    /// Consensus transactions for this node's own block, computed as-of the
    /// round's arranged mining time and stamped against `ctx` so they
    /// validate against the tip they will extend. Empty when the service is
    /// idle or the contract declines.
    pub async fn generate_transactions(
        &self,
        ctx: ChainContext,
    ) -> Result<Vec<Transaction>, ConsensusError> {
        let Some((command, at)) = self.round_snapshot() else {
            debug!(target: "consensus", chain = %ctx, "transactions requested while idle");
            return Ok(Vec::new());
        };

        let trigger = self.trigger_info.for_transactions(&command);
        let generated = self
            .reader
            .generate_transactions(&ctx, at, &trigger)
            .await
            .map_err(|err| ConsensusError::contract("generate_transactions", err))?;

        let Some(mut txs) = generated else {
            debug!(target: "consensus", chain = %ctx, "contract declined to generate transactions");
            return Ok(Vec::new());
        };

        for tx in &mut txs {
            tx.set_ref_block(ctx.height, &ctx.hash);
        }
        Ok(txs)
    }

    fn round_snapshot(&self) -> Option<(ConsensusCommand, UnixMillis)> {
        self.round
            .read()
            .as_ref()
            .map(|round| (round.command.clone(), round.next_mining_time))
    }

    fn digest_validation(
        &self,
        stage: &'static str,
        result: Option<ConsensusValidationResult>,
    ) -> bool {
        let Some(result) = result else {
            warn!(target: "consensus", stage, "contract returned no validation result");
            return false;
        };

        if !result.success {
            warn!(
                target: "consensus",
                stage,
                retrigger = result.is_retrigger,
                "consensus validation failed: {}",
                result.message
            );
            let _ = self.events.send(ValidationFailedEvent {
                message: result.message.clone(),
                should_retrigger: result.is_retrigger,
            });
        }
        result.success
    }
}
