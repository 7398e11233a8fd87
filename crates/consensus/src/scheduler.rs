use crate::command::MiningEvent;
use crate::traits::MiningScheduler;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Tokio-backed single-slot mining timer.
///
/// Fired events are delivered to the block-assembly driver on an unbounded
/// channel. A generation stamp is checked right before delivery: `cancel`
/// (and re-`arm`) bump the generation first and then abort the slot task,
/// so a sleep that has already elapsed can no longer deliver a stale
/// payload once cancellation returns.
pub struct TokioScheduler {
    events: mpsc::UnboundedSender<MiningEvent>,
    slot: Mutex<Option<JoinHandle<()>>>,
    generation: Arc<AtomicU64>,
}

impl TokioScheduler {
    /// Create the scheduler and the receiving end of its event channel.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<MiningEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let scheduler = Arc::new(Self {
            events,
            slot: Mutex::new(None),
            generation: Arc::new(AtomicU64::new(0)),
        });
        (scheduler, receiver)
    }
}

impl MiningScheduler for TokioScheduler {
    fn arm(&self, delay: Duration, event: MiningEvent) {
        let armed_generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let generation = self.generation.clone();
        let events = self.events.clone();

        debug!(
            target: "consensus",
            delay_ms = delay.as_millis() as u64,
            height = event.block_height,
            "arming mining timer"
        );

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if generation.load(Ordering::SeqCst) != armed_generation {
                return;
            }
            let _ = events.send(event);
        });

        if let Some(previous) = self.slot.lock().replace(handle) {
            previous.abort();
        }
    }

    fn cancel(&self) {
        // Bump before abort: a task already past its sleep sees the new
        // generation and drops its payload.
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = self.slot.lock().take() {
            handle.abort();
        }
    }
}
