//! An in-memory [`Wal`], [`StateMachine`], and [`Transporter`] used to exercise `raft-core` in
//! tests, mirroring the teacher's `memstore` crate and its `tests/fixtures/mod.rs` router.

mod router;
mod state_machine;
mod wal;

pub use router::MemRouter;
pub use router::RouterHandle;
pub use state_machine::MemStateMachine;
pub use wal::MemWal;
