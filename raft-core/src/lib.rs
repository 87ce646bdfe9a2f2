//! `raft-core`: an event-driven Raft consensus engine built from a typed request channel and
//! three cooperating loops (spec §1 "Overview").

pub mod channel;
pub mod clock;
pub mod cluster;
pub mod config;
pub mod error;
pub mod log;
pub mod loops;
pub mod message;
pub mod metrics;
pub mod node;
pub mod raft;
pub mod raft_api;
pub mod snapshot;
pub mod state_machine;
pub mod transport;
pub mod types;
pub mod wal;

pub use config::Config;
pub use config::ConfigBuilder;
pub use error::ClientReadError;
pub use error::ClientWriteError;
pub use error::RaftError;
pub use message::MessageSummary;
pub use metrics::RaftMetrics;
pub use raft::Raft;
pub use state_machine::StateMachine;
pub use transport::Transporter;
pub use wal::Wal;
