//! The apply loop (spec §4.7 "apply loop", I7 "total order apply").
//!
//! Applies committed entries to the [`crate::state_machine::StateMachine`] strictly in log
//! order, one batch per wakeup, then reports the new applied index back to the Raft loop so it
//! can clear the replay barrier (spec I6) and resolve pending client proposals.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::error;
use tracing::warn;

use crate::channel::AdvanceEvent;
use crate::channel::ApplyInbox;
use crate::snapshot::Snapshotter;
use crate::state_machine::StateMachine;
use crate::types::Index;
use crate::types::Term;
use crate::wal::Wal;

pub async fn run_apply_loop<S: StateMachine, W: Wal>(
    state_machine: Arc<S>,
    wal: Arc<W>,
    mut inbox: ApplyInbox,
    advance_tx: mpsc::Sender<AdvanceEvent>,
    snapshot_threshold: u64,
    min_snapshots_retention: u64,
) {
    let mut applied: Index = state_machine.applied_index().await.unwrap_or(0);
    let mut applied_term: Term = 0;
    let mut last_snapshot_index: Index = applied;
    let snapshotter = Snapshotter::new(wal.clone(), state_machine.clone(), min_snapshots_retention);

    while let Some(req) = inbox.rx.recv().await {
        if req.up_to <= applied {
            continue;
        }

        let from = applied + 1;
        let count = (req.up_to - applied) as usize;
        let entries = match wal.entries(from, count).await {
            Ok(entries) => entries,
            Err(err) => {
                // A storage read failure is not fatal: the next ApplyRequest retries from the
                // same `applied` boundary instead of killing the loop (spec §7 "Loops never die
                // on exceptions").
                error!(?err, from, "failed reading entries for apply, will retry on next advance");
                continue;
            }
        };
        if entries.is_empty() {
            continue;
        }

        if advance_tx.send(AdvanceEvent::ApplyStarted).await.is_err() {
            return;
        }
        if let Err(err) = state_machine.apply(&entries).await {
            // Exceptions from the user state machine are logged and not retried by the engine;
            // the applied index still advances regardless of outcome (spec §4.7, §7).
            error!(?err, from, up_to = req.up_to, "state machine apply failed");
        }
        let last = entries.last().expect("checked non-empty above");
        applied = last.index;
        applied_term = last.term;

        if advance_tx.send(AdvanceEvent::Applied { applied_index: applied }).await.is_err() {
            return;
        }

        // triggerToSnapshot (spec §4.6 step 5 / §4.8): build a new snapshot once the applied-index
        // delta since the last one exceeds the configured threshold.
        if snapshot_threshold > 0 && applied.saturating_sub(last_snapshot_index) >= snapshot_threshold {
            match snapshotter.save_and_compact(applied, applied_term).await {
                Ok(()) => {
                    last_snapshot_index = applied;
                    if advance_tx.send(AdvanceEvent::Compacted { index: applied, term: applied_term }).await.is_err() {
                        return;
                    }
                }
                Err(err) => {
                    // Snapshot save failures are logged and retried on the next trigger (spec §7
                    // "Snapshot save failures").
                    warn!(?err, applied, "snapshot save failed, will retry on next trigger");
                }
            }
        }
    }
}
