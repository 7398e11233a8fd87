//! # Saros Transaction Pool
//!
//! Admission and selection structure for block assembly.
//!
//! Incoming transactions are validated and partitioned by kind: ordinary
//! contract calls are subject to per-block volume limits, consensus-protocol
//! transactions are exempt but filtered per producer at selection time.
//! All operations are safe under concurrent callers; double-selection is
//! prevented by an atomic claim flag per pooled transaction rather than a
//! pool-wide lock.

use anyhow::Result;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use saros_types::{Address, Block, Transaction, TxHash, TxKind};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

mod filter;

/// Cap on the diagnostic set of block producers observed in admitted
/// consensus transactions.
const SEEN_PRODUCERS_CAP: usize = 512;

/// Verdict from the external transaction validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxValidity {
    Valid,
    /// Structurally malformed (bad signature, empty method, ...).
    Invalid,
    /// Built against a tip the chain no longer considers fresh.
    ReferenceBlockInvalid,
}

/// Outcome of a pool admission attempt. Rejections are values, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddTxOutcome {
    Success,
    /// The same hash is already pooled.
    AlreadyInserted,
    /// A persisted record of this hash exists; it was included in a block.
    AlreadyExecuted,
    Invalid,
    ReferenceBlockInvalid,
    /// A collaborator (store, validator) failed; pool state is untouched.
    Failed,
}

/// Lookup of persisted (already executed) transactions.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn get(&self, hash: &TxHash) -> Result<Option<Transaction>>;
}

/// Stateless validation of a single transaction.
#[async_trait]
pub trait TransactionValidator: Send + Sync {
    /// Pure well-formedness check.
    fn validate_structure(&self, tx: &Transaction) -> TxValidity;

    /// Freshness of the reference-block fields; may consult chain state.
    async fn validate_reference_block(&self, tx: &Transaction) -> Result<TxValidity>;
}

/// A pooled transaction plus its claim flag.
///
/// Claiming is a compare-and-swap; two concurrent selection passes can
/// never both claim the same record.
struct PoolRecord {
    tx: Transaction,
    claimed: AtomicBool,
}

impl PoolRecord {
    fn new(tx: Transaction) -> Self {
        Self {
            tx,
            claimed: AtomicBool::new(false),
        }
    }

    fn claim(&self) -> bool {
        self.claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn release(&self) {
        self.claimed.store(false, Ordering::Release);
    }
}

/// Thread-safe, dual-partition transaction pool.
pub struct TxPool {
    store: Arc<dyn TransactionStore>,
    validator: Arc<dyn TransactionValidator>,
    ordinary: DashMap<TxHash, Arc<PoolRecord>>,
    consensus: DashMap<TxHash, Arc<PoolRecord>>,
    seen_producers: RwLock<HashSet<Address>>,
    min_ordinary: AtomicUsize,
    max_ready: AtomicUsize,
}

impl TxPool {
    pub fn new(store: Arc<dyn TransactionStore>, validator: Arc<dyn TransactionValidator>) -> Self {
        Self {
            store,
            validator,
            ordinary: DashMap::new(),
            consensus: DashMap::new(),
            seen_producers: RwLock::new(HashSet::new()),
            min_ordinary: AtomicUsize::new(0),
            max_ready: AtomicUsize::new(usize::MAX),
        }
    }

    /// Validate and admit a transaction into its partition.
    ///
    /// Each gate short-circuits; a transaction is either absent from both
    /// partitions or present in exactly one.
    pub async fn add_transaction(&self, tx: Transaction) -> AddTxOutcome {
        let hash = tx.hash();

        match self.store.get(&hash).await {
            Ok(Some(_)) => return AddTxOutcome::AlreadyExecuted,
            Ok(None) => {}
            Err(err) => {
                warn!(target: "txpool", tx = %hash, "store lookup failed: {err:#}");
                return AddTxOutcome::Failed;
            }
        }

        match self.validator.validate_structure(&tx) {
            TxValidity::Valid => {}
            TxValidity::Invalid => return AddTxOutcome::Invalid,
            TxValidity::ReferenceBlockInvalid => return AddTxOutcome::ReferenceBlockInvalid,
        }

        match self.validator.validate_reference_block(&tx).await {
            Ok(TxValidity::Valid) => {}
            Ok(TxValidity::Invalid) => return AddTxOutcome::Invalid,
            Ok(TxValidity::ReferenceBlockInvalid) => return AddTxOutcome::ReferenceBlockInvalid,
            Err(err) => {
                warn!(target: "txpool", tx = %hash, "reference-block validation failed: {err:#}");
                return AddTxOutcome::Failed;
            }
        }

        let is_consensus = tx.is_consensus();
        let sender = tx.from;
        let partition = self.partition_for(tx.kind);

        match partition.entry(hash) {
            Entry::Occupied(_) => AddTxOutcome::AlreadyInserted,
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(PoolRecord::new(tx)));
                if is_consensus {
                    self.record_producer(sender);
                }
                AddTxOutcome::Success
            }
        }
    }

    /// Reinsert previously-removed transactions, e.g. from a rolled-back
    /// block, clearing each claim flag. Idempotent: hashes already pooled
    /// only have their claim cleared.
    pub fn revert(&self, txs: Vec<Transaction>) {
        for tx in txs {
            let hash = tx.hash();
            let partition = self.partition_for(tx.kind);
            match partition.entry(hash) {
                Entry::Occupied(slot) => slot.get().release(),
                Entry::Vacant(slot) => {
                    slot.insert(Arc::new(PoolRecord::new(tx)));
                }
            }
        }
    }

    /// Lookup across both partitions.
    pub fn try_get(&self, hash: &TxHash) -> Option<Transaction> {
        self.ordinary
            .get(hash)
            .or_else(|| self.consensus.get(hash))
            .map(|record| record.tx.clone())
    }

    /// Hashes from the block's transaction list that the pool cannot
    /// resolve, in block order. The caller requests these bodies from peers.
    pub fn missing_for_block(&self, block: &Block) -> Vec<TxHash> {
        block
            .tx_hashes
            .iter()
            .filter(|hash| !self.ordinary.contains_key(hash) && !self.consensus.contains_key(hash))
            .copied()
            .collect()
    }

    /// Remove from whichever partition holds the hash; no-op when absent.
    pub fn remove(&self, hash: &TxHash) -> Option<Transaction> {
        self.ordinary
            .remove(hash)
            .or_else(|| self.consensus.remove(hash))
            .map(|(_, record)| record.tx.clone())
    }

    /// Produce the ready set for block assembly.
    ///
    /// Consensus transactions are filtered for `producer` first. Ordinary
    /// transactions join only when the partition holds at least the
    /// configured minimum, each one claimed atomically and re-validated
    /// against the current tip; stale candidates are evicted.
    pub async fn select_ready(&self, producer: Address, interval_hint: Duration) -> Vec<Transaction> {
        let snapshot: Vec<Transaction> = self
            .consensus
            .iter()
            .map(|entry| entry.value().tx.clone())
            .collect();
        let mut selected = filter::filter_for_producer(snapshot, &producer);

        debug!(
            target: "txpool",
            producer = %hex::encode(&producer[0..8]),
            hint_ms = interval_hint.as_millis() as u64,
            consensus = selected.len(),
            ordinary = self.ordinary.len(),
            "selection pass"
        );

        if self.ordinary.len() < self.min_ordinary.load(Ordering::Relaxed) {
            return selected;
        }

        let max_ready = self.max_ready.load(Ordering::Relaxed);
        let candidates: Vec<Arc<PoolRecord>> = self
            .ordinary
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        let mut stale = Vec::new();

        for record in candidates {
            if selected.len() >= max_ready {
                break;
            }
            if !record.claim() {
                continue;
            }

            // Tip may have advanced since admission.
            match self.validator.validate_reference_block(&record.tx).await {
                Ok(TxValidity::Valid) => selected.push(record.tx.clone()),
                Ok(_) => stale.push(record.tx.hash()),
                Err(err) => {
                    // Candidate stays eligible for the next pass.
                    warn!(
                        target: "txpool",
                        tx = %record.tx.hash(),
                        "re-validation failed, skipping candidate: {err:#}"
                    );
                    record.release();
                }
            }
        }

        for hash in stale {
            self.ordinary.remove(&hash);
        }

        selected
    }

    /// Set the per-round volume bounds; takes effect on the next selection.
    pub fn set_volume_limits(&self, min_ordinary: usize, max_ready: usize) {
        self.min_ordinary.store(min_ordinary, Ordering::Relaxed);
        self.max_ready.store(max_ready, Ordering::Relaxed);
    }

    /// Ordinary-partition size. Consensus traffic is infrastructure, not
    /// user workload, and is excluded.
    pub fn pool_size(&self) -> usize {
        self.ordinary.len()
    }

    /// Number of distinct producers observed in admitted consensus
    /// transactions. Diagnostic only.
    pub fn producers_seen(&self) -> usize {
        self.seen_producers.read().len()
    }

    fn partition_for(&self, kind: TxKind) -> &DashMap<TxHash, Arc<PoolRecord>> {
        match kind {
            TxKind::Ordinary => &self.ordinary,
            TxKind::ConsensusProtocol => &self.consensus,
        }
    }

    fn record_producer(&self, sender: Address) {
        let mut seen = self.seen_producers.write();
        if seen.len() < SEEN_PRODUCERS_CAP {
            seen.insert(sender);
        }
    }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use parking_lot::Mutex;
    use saros_types::{BlockHeader, UnixMillis, PUBLISH_SECRET_METHOD};
    use std::collections::HashMap;

    const PRODUCER_A: Address = [0xAA; 32];
    const PRODUCER_B: Address = [0xBB; 32];
    const PRODUCER_C: Address = [0xCC; 32];

    #[derive(Default)]
    struct MockStore {
        executed: Mutex<HashMap<TxHash, Transaction>>,
        unavailable: AtomicBool,
    }

    impl MockStore {
        fn mark_executed(&self, tx: &Transaction) {
            self.executed.lock().insert(tx.hash(), tx.clone());
        }

        fn set_unavailable(&self, unavailable: bool) {
            self.unavailable.store(unavailable, Ordering::Relaxed);
        }
    }

    #[async_trait]
    impl TransactionStore for MockStore {
        async fn get(&self, hash: &TxHash) -> Result<Option<Transaction>> {
            if self.unavailable.load(Ordering::Relaxed) {
                return Err(anyhow!("store unavailable"));
            }
            Ok(self.executed.lock().get(hash).cloned())
        }
    }

    #[derive(Default)]
    struct MockValidator {
        malformed: Mutex<HashSet<TxHash>>,
        stale: Mutex<HashSet<TxHash>>,
        erroring: Mutex<HashSet<TxHash>>,
    }

    impl MockValidator {
        fn mark_malformed(&self, tx: &Transaction) {
            self.malformed.lock().insert(tx.hash());
        }

        fn mark_stale(&self, tx: &Transaction) {
            self.stale.lock().insert(tx.hash());
        }

        fn mark_erroring(&self, tx: &Transaction) {
            self.erroring.lock().insert(tx.hash());
        }

        fn clear_erroring(&self) {
            self.erroring.lock().clear();
        }
    }

    #[async_trait]
    impl TransactionValidator for MockValidator {
        fn validate_structure(&self, tx: &Transaction) -> TxValidity {
            if self.malformed.lock().contains(&tx.hash()) {
                TxValidity::Invalid
            } else {
                TxValidity::Valid
            }
        }

        async fn validate_reference_block(&self, tx: &Transaction) -> Result<TxValidity> {
            if self.erroring.lock().contains(&tx.hash()) {
                return Err(anyhow!("chain state unavailable"));
            }
            if self.stale.lock().contains(&tx.hash()) {
                Ok(TxValidity::ReferenceBlockInvalid)
            } else {
                Ok(TxValidity::Valid)
            }
        }
    }

    struct Fixture {
        store: Arc<MockStore>,
        validator: Arc<MockValidator>,
        pool: TxPool,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MockStore::default());
        let validator = Arc::new(MockValidator::default());
        let pool = TxPool::new(store.clone(), validator.clone());
        Fixture {
            store,
            validator,
            pool,
        }
    }

    fn transfer(from: Address, nonce: u64) -> Transaction {
        Transaction::ordinary(from, "transfer", vec![nonce as u8], nonce)
    }

    fn publish_secret(from: Address, nonce: u64) -> Transaction {
        Transaction::consensus(from, PUBLISH_SECRET_METHOD, vec![], nonce)
    }

    fn block_with(hashes: Vec<TxHash>) -> Block {
        Block::new(
            BlockHeader {
                height: 1,
                previous_hash: [0u8; 32],
                producer: PRODUCER_A,
                time: UnixMillis(0),
                extra_data: Vec::new(),
            },
            hashes,
        )
    }

    async fn select_all(pool: &TxPool, producer: Address) -> Vec<Transaction> {
        pool.select_ready(producer, Duration::from_millis(4000)).await
    }

    #[tokio::test]
    async fn admission_is_idempotent() {
        let f = fixture();
        let tx = transfer(PRODUCER_A, 1);

        assert_eq!(f.pool.add_transaction(tx.clone()).await, AddTxOutcome::Success);
        assert_eq!(
            f.pool.add_transaction(tx).await,
            AddTxOutcome::AlreadyInserted
        );
        assert_eq!(f.pool.pool_size(), 1);
    }

    #[tokio::test]
    async fn partitions_are_disjoint() {
        let f = fixture();
        let ordinary = transfer(PRODUCER_A, 1);
        let consensus = publish_secret(PRODUCER_A, 2);

        f.pool.add_transaction(ordinary.clone()).await;
        f.pool.add_transaction(consensus.clone()).await;

        assert!(f.pool.try_get(&ordinary.hash()).is_some());
        assert!(f.pool.try_get(&consensus.hash()).is_some());
        // Consensus traffic does not count toward user workload.
        assert_eq!(f.pool.pool_size(), 1);

        assert!(f.pool.remove(&consensus.hash()).is_some());
        assert!(f.pool.try_get(&consensus.hash()).is_none());
        assert_eq!(f.pool.pool_size(), 1);
    }

    #[tokio::test]
    async fn executed_transactions_are_rejected() {
        let f = fixture();
        let tx = transfer(PRODUCER_A, 1);
        f.store.mark_executed(&tx);

        assert_eq!(
            f.pool.add_transaction(tx.clone()).await,
            AddTxOutcome::AlreadyExecuted
        );
        assert!(f.pool.try_get(&tx.hash()).is_none());
    }

    #[tokio::test]
    async fn validation_gates_short_circuit() {
        let f = fixture();

        let malformed = transfer(PRODUCER_A, 1);
        f.validator.mark_malformed(&malformed);
        assert_eq!(
            f.pool.add_transaction(malformed.clone()).await,
            AddTxOutcome::Invalid
        );

        let stale = transfer(PRODUCER_A, 2);
        f.validator.mark_stale(&stale);
        assert_eq!(
            f.pool.add_transaction(stale.clone()).await,
            AddTxOutcome::ReferenceBlockInvalid
        );

        assert!(f.pool.try_get(&malformed.hash()).is_none());
        assert!(f.pool.try_get(&stale.hash()).is_none());
        assert_eq!(f.pool.pool_size(), 0);
    }

    #[tokio::test]
    async fn store_outage_reports_failed_without_admitting() {
        let f = fixture();
        let tx = transfer(PRODUCER_A, 1);
        f.store.set_unavailable(true);

        assert_eq!(f.pool.add_transaction(tx.clone()).await, AddTxOutcome::Failed);
        assert!(f.pool.try_get(&tx.hash()).is_none());

        f.store.set_unavailable(false);
        assert_eq!(f.pool.add_transaction(tx).await, AddTxOutcome::Success);
    }

    #[tokio::test]
    async fn missing_hashes_are_reported_in_block_order() {
        let f = fixture();
        let pooled = transfer(PRODUCER_A, 1);
        f.pool.add_transaction(pooled.clone()).await;

        let absent_one = transfer(PRODUCER_B, 2).hash();
        let absent_two = transfer(PRODUCER_C, 3).hash();
        let block = block_with(vec![pooled.hash(), absent_one, absent_two]);

        assert_eq!(f.pool.missing_for_block(&block), vec![absent_one, absent_two]);
        assert!(f
            .pool
            .missing_for_block(&block_with(vec![pooled.hash()]))
            .is_empty());
    }

    #[tokio::test]
    async fn volume_floor_returns_consensus_set_only() {
        let f = fixture();
        f.pool.set_volume_limits(5, 100);

        for nonce in 0..3 {
            f.pool.add_transaction(transfer(PRODUCER_B, nonce)).await;
        }
        let reveal = publish_secret(PRODUCER_A, 10);
        f.pool.add_transaction(reveal.clone()).await;

        let selected = select_all(&f.pool, PRODUCER_A).await;
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].hash(), reveal.hash());
    }

    #[tokio::test]
    async fn volume_ceiling_bounds_total_count() {
        let f = fixture();
        f.pool.set_volume_limits(0, 3);

        f.pool
            .add_transaction(Transaction::consensus(PRODUCER_A, "update_round", vec![], 0))
            .await;
        for nonce in 0..5 {
            f.pool.add_transaction(transfer(PRODUCER_B, nonce)).await;
        }

        let selected = select_all(&f.pool, PRODUCER_A).await;
        assert_eq!(selected.len(), 3);
        assert_eq!(
            selected
                .iter()
                .filter(|tx| tx.kind == TxKind::ConsensusProtocol)
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn publish_secret_exclusivity() {
        let f = fixture();
        let a_reveal = publish_secret(PRODUCER_A, 1);
        f.pool.add_transaction(a_reveal.clone()).await;
        f.pool.add_transaction(publish_secret(PRODUCER_B, 2)).await;
        f.pool.add_transaction(publish_secret(PRODUCER_B, 3)).await;

        // A has one reveal, B's duplicates drop entirely.
        let selected = select_all(&f.pool, PRODUCER_A).await;
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].hash(), a_reveal.hash());

        // C has no reveal of its own: nobody's reveal is eligible.
        let selected = select_all(&f.pool, PRODUCER_C).await;
        assert!(selected.is_empty());
    }

    #[tokio::test]
    async fn selection_claims_candidates_once() {
        let f = fixture();
        let tx = transfer(PRODUCER_A, 1);
        f.pool.add_transaction(tx.clone()).await;

        let first = select_all(&f.pool, PRODUCER_A).await;
        assert_eq!(first.len(), 1);

        // Already claimed by the first pass; still pooled, not re-offered.
        let second = select_all(&f.pool, PRODUCER_A).await;
        assert!(second.is_empty());
        assert_eq!(f.pool.pool_size(), 1);
    }

    #[tokio::test]
    async fn revert_restores_claimability() {
        let f = fixture();
        let tx = transfer(PRODUCER_A, 1);
        f.pool.add_transaction(tx.clone()).await;

        assert_eq!(select_all(&f.pool, PRODUCER_A).await.len(), 1);
        assert!(select_all(&f.pool, PRODUCER_A).await.is_empty());

        f.pool.revert(vec![tx.clone()]);
        let selected = select_all(&f.pool, PRODUCER_A).await;
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].hash(), tx.hash());
    }

    #[tokio::test]
    async fn revert_reinserts_removed_transactions() {
        let f = fixture();
        let ordinary = transfer(PRODUCER_A, 1);
        let consensus = publish_secret(PRODUCER_A, 2);
        f.pool.add_transaction(ordinary.clone()).await;
        f.pool.add_transaction(consensus.clone()).await;

        f.pool.remove(&ordinary.hash());
        f.pool.remove(&consensus.hash());
        assert!(f.pool.try_get(&ordinary.hash()).is_none());

        f.pool.revert(vec![ordinary.clone(), consensus.clone()]);
        assert!(f.pool.try_get(&ordinary.hash()).is_some());
        assert!(f.pool.try_get(&consensus.hash()).is_some());
        assert_eq!(f.pool.pool_size(), 1);
    }

    #[tokio::test]
    async fn stale_candidates_are_evicted_at_selection() {
        let f = fixture();
        let fresh = transfer(PRODUCER_A, 1);
        let going_stale = transfer(PRODUCER_A, 2);
        f.pool.add_transaction(fresh.clone()).await;
        f.pool.add_transaction(going_stale.clone()).await;

        // Tip advances past the second transaction's reference block.
        f.validator.mark_stale(&going_stale);

        let selected = select_all(&f.pool, PRODUCER_A).await;
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].hash(), fresh.hash());
        assert!(f.pool.try_get(&going_stale.hash()).is_none());
        assert_eq!(f.pool.pool_size(), 1);
    }

    #[tokio::test]
    async fn validator_outage_keeps_candidate_eligible() {
        let f = fixture();
        let tx = transfer(PRODUCER_A, 1);
        f.pool.add_transaction(tx.clone()).await;
        f.validator.mark_erroring(&tx);

        assert!(select_all(&f.pool, PRODUCER_A).await.is_empty());
        assert_eq!(f.pool.pool_size(), 1);

        f.validator.clear_erroring();
        let selected = select_all(&f.pool, PRODUCER_A).await;
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].hash(), tx.hash());
    }

    #[tokio::test]
    async fn producers_seen_counts_distinct_consensus_senders() {
        let f = fixture();
        f.pool.add_transaction(publish_secret(PRODUCER_A, 1)).await;
        f.pool.add_transaction(publish_secret(PRODUCER_A, 2)).await;
        f.pool.add_transaction(publish_secret(PRODUCER_B, 3)).await;
        f.pool.add_transaction(transfer(PRODUCER_C, 4)).await;

        assert_eq!(f.pool.producers_seen(), 2);
    }
}
