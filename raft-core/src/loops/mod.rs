//! The three cooperating event loops (spec §4.5 "Raft loop", §4.6 "group-commit loop", §4.7
//! "apply loop"). Each loop owns exactly one piece of mutable state and communicates with the
//! others only through the [`crate::channel`] request channel, giving the "single-writer rule"
//! (spec §5) for free: the Raft loop is the only task that ever mutates [`crate::node::NodeCore`]
//! or [`crate::log::Log`].

mod apply_loop;
mod group_commit_loop;
mod raft_loop;

pub use apply_loop::run_apply_loop;
pub use group_commit_loop::run_group_commit_loop;
pub(crate) use raft_loop::RaftLoop;
pub use raft_loop::RaftLoopHandles;
