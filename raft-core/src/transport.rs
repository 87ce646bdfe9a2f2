//! The peer transport contract (spec §6 "Transporter").

use async_trait::async_trait;

use crate::message::Message;
use crate::types::NodeId;

/// Implemented by the application to carry [`Message`] values between cluster members. The Raft
/// loop calls [`Self::send`] fire-and-forget; responses arrive asynchronously back through the
/// same node's [`crate::channel::Senders::message`] channel, matching how the teacher's
/// `RaftNetwork::append_entries`/`install_snapshot`/`vote` trio round-trips.
#[async_trait]
pub trait Transporter: Send + Sync + 'static {
    async fn send(&self, to: NodeId, message: Message) -> anyhow::Result<()>;

    /// Called once when a peer's connection is judged lost, so the Raft loop can mark it
    /// disconnected and recompute [`crate::cluster::GroupState`] (spec §5 "Group-state refresh").
    async fn on_disconnect(&self, peer: NodeId);
}
