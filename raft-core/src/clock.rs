//! The logical clock driving election, heartbeat, and lease ticks (spec §2 item 1, §4.1 "TICK").
//!
//! The clock never touches [`crate::node::NodeCore`] directly; it only posts `TICK` events onto
//! the tick channel, keeping all state mutation confined to the Raft loop (spec §5 "Single-writer
//! rule").

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

/// Which timer fired (spec §4.1, §4.3).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TickKind {
    Election,
    Heartbeat,
    Lease,
}

/// Spawns a background task that ticks at `interval` and posts `kind` onto `tx` until the
/// receiver side is dropped. Mirrors the teacher's `tokio::time::interval`-driven loops in
/// `core/mod.rs`.
pub fn spawn_ticker(kind: TickKind, interval: Duration, tx: mpsc::Sender<TickKind>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            trace!(?kind, "tick");
            if tx.send(kind).await.is_err() {
                break;
            }
        }
    })
}
