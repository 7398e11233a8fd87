//! Producer-scoped filtering of the consensus partition.
//!
//! Wrong output here corrupts the secret-sharing round: a block must carry
//! either the producer's own publish-secret transaction alongside everyone
//! else's unambiguous ones, or none at all.

use saros_types::{Address, Transaction};
use std::collections::HashMap;

/// Filter a consensus-partition snapshot for the node about to produce.
///
/// Rules, in order:
/// 1. another sender's transaction is only eligible if it is a
///    publish-secret reveal;
/// 2. if `producer` has no pending publish-secret transaction of its own,
///    no publish-secret transaction from anyone is eligible;
/// 3. a sender with more than one pending publish-secret transaction has
///    all of them excluded — an ambiguous duplicate is untrustworthy as a
///    whole, not a pick-one situation.
pub(crate) fn filter_for_producer(
    candidates: Vec<Transaction>,
    producer: &Address,
) -> Vec<Transaction> {
    let mut publish_counts: HashMap<Address, usize> = HashMap::new();
    for tx in candidates.iter().filter(|tx| tx.is_publish_secret()) {
        *publish_counts.entry(tx.from).or_default() += 1;
    }
    let producer_has_publish = publish_counts.contains_key(producer);

    candidates
        .into_iter()
        .filter(|tx| {
            if tx.is_publish_secret() {
                producer_has_publish && publish_counts[&tx.from] == 1
            } else {
                &tx.from == producer
            }
        })
        .collect()
}
