//! Node configuration (spec §6 "Configuration").

use crate::error::ConfigError;
use crate::error::ConfigResult;
use crate::types::NodeId;

/// Where the write-ahead log and snapshots are persisted (spec §6 "storageType").
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StorageType {
    /// Entries never survive a restart; used in tests and ephemeral deployments.
    Memory,
    /// Entries are fsynced to a directory on disk.
    Disk,
    /// A bounded in-memory ring buffer backs recent entries, with disk as the fallback for
    /// anything the ring buffer has evicted (spec §6 "ringBufferSize").
    Combination,
}

/// Immutable, validated node configuration (spec §6). Build via [`ConfigBuilder`].
#[derive(Clone, Debug)]
pub struct Config {
    pub id: NodeId,
    pub members: Vec<(NodeId, String)>,
    pub data_dir: String,
    pub storage_type: StorageType,
    pub ring_buffer_size: Option<usize>,
    pub election_timeout_min_ms: u64,
    pub election_timeout_max_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub lease_timeout_ms: u64,
    pub max_entries_per_append: usize,
    pub max_payload_entries: usize,
    pub group_commit_max_batch: usize,
    pub group_commit_max_delay_ms: u64,
    pub min_snapshots_retention: u64,
    pub snapshot_threshold_entries: u64,
    pub request_channel_capacity: usize,
}

impl Config {
    pub fn builder(id: NodeId) -> ConfigBuilder {
        ConfigBuilder::new(id)
    }
}

/// Builds and validates a [`Config`], mirroring the teacher's `Config::build(...)` entry point.
#[derive(Clone, Debug)]
pub struct ConfigBuilder {
    id: NodeId,
    members: Vec<(NodeId, String)>,
    data_dir: String,
    storage_type: StorageType,
    ring_buffer_size: Option<usize>,
    election_timeout_min_ms: u64,
    election_timeout_max_ms: u64,
    heartbeat_interval_ms: u64,
    lease_timeout_ms: u64,
    max_entries_per_append: usize,
    max_payload_entries: usize,
    group_commit_max_batch: usize,
    group_commit_max_delay_ms: u64,
    min_snapshots_retention: u64,
    snapshot_threshold_entries: u64,
    request_channel_capacity: usize,
}

impl ConfigBuilder {
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            members: Vec::new(),
            data_dir: "./raft-data".into(),
            storage_type: StorageType::Memory,
            ring_buffer_size: None,
            election_timeout_min_ms: 150,
            election_timeout_max_ms: 300,
            heartbeat_interval_ms: 50,
            lease_timeout_ms: 150,
            max_entries_per_append: 100,
            max_payload_entries: 300,
            group_commit_max_batch: 100,
            group_commit_max_delay_ms: 1,
            min_snapshots_retention: 1,
            snapshot_threshold_entries: 10_000,
            request_channel_capacity: 1_000,
        }
    }

    pub fn members(mut self, members: Vec<(NodeId, String)>) -> Self {
        self.members = members;
        self
    }

    pub fn data_dir(mut self, dir: impl Into<String>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn storage_type(mut self, storage_type: StorageType) -> Self {
        self.storage_type = storage_type;
        self
    }

    pub fn ring_buffer_size(mut self, size: usize) -> Self {
        self.ring_buffer_size = Some(size);
        self
    }

    pub fn election_timeout_range(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.election_timeout_min_ms = min_ms;
        self.election_timeout_max_ms = max_ms;
        self
    }

    pub fn heartbeat_interval_ms(mut self, ms: u64) -> Self {
        self.heartbeat_interval_ms = ms;
        self
    }

    pub fn lease_timeout_ms(mut self, ms: u64) -> Self {
        self.lease_timeout_ms = ms;
        self
    }

    pub fn max_entries_per_append(mut self, n: usize) -> Self {
        self.max_entries_per_append = n;
        self
    }

    pub fn group_commit_max_batch(mut self, n: usize) -> Self {
        self.group_commit_max_batch = n;
        self
    }

    pub fn group_commit_max_delay_ms(mut self, ms: u64) -> Self {
        self.group_commit_max_delay_ms = ms;
        self
    }

    pub fn min_snapshots_retention(mut self, n: u64) -> Self {
        self.min_snapshots_retention = n;
        self
    }

    pub fn snapshot_threshold_entries(mut self, n: u64) -> Self {
        self.snapshot_threshold_entries = n;
        self
    }

    pub fn request_channel_capacity(mut self, n: usize) -> Self {
        self.request_channel_capacity = n;
        self
    }

    /// Validate and freeze the configuration (spec §6 "Validated at construction").
    pub fn build(self) -> ConfigResult<Config> {
        if self.id == 0 {
            return Err(ConfigError::InvalidId(self.id));
        }
        if self.members.is_empty() {
            return Err(ConfigError::EmptyCluster);
        }
        if !self.members.iter().any(|(id, _)| *id == self.id) {
            return Err(ConfigError::SelfNotInCluster(self.id));
        }
        let mut seen = std::collections::HashSet::new();
        for (id, _) in &self.members {
            if !seen.insert(*id) {
                return Err(ConfigError::DuplicateId(*id));
            }
        }
        if self.min_snapshots_retention == 0 {
            return Err(ConfigError::InvalidSnapshotRetention(self.min_snapshots_retention));
        }
        if self.election_timeout_min_ms >= self.election_timeout_max_ms {
            return Err(ConfigError::InvalidElectionTimeoutRange {
                min: self.election_timeout_min_ms,
                max: self.election_timeout_max_ms,
            });
        }
        if self.storage_type == StorageType::Combination && self.ring_buffer_size.unwrap_or(0) == 0
        {
            return Err(ConfigError::MissingRingBufferSize);
        }

        Ok(Config {
            id: self.id,
            members: self.members,
            data_dir: self.data_dir,
            storage_type: self.storage_type,
            ring_buffer_size: self.ring_buffer_size,
            election_timeout_min_ms: self.election_timeout_min_ms,
            election_timeout_max_ms: self.election_timeout_max_ms,
            heartbeat_interval_ms: self.heartbeat_interval_ms,
            lease_timeout_ms: self.lease_timeout_ms,
            max_entries_per_append: self.max_entries_per_append,
            max_payload_entries: self.max_payload_entries,
            group_commit_max_batch: self.group_commit_max_batch,
            group_commit_max_delay_ms: self.group_commit_max_delay_ms,
            min_snapshots_retention: self.min_snapshots_retention,
            snapshot_threshold_entries: self.snapshot_threshold_entries,
            request_channel_capacity: self.request_channel_capacity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn members() -> Vec<(NodeId, String)> {
        vec![(1, "127.0.0.1:9001".into()), (2, "127.0.0.1:9002".into()), (3, "127.0.0.1:9003".into())]
    }

    #[test]
    fn builds_with_defaults() {
        let cfg = Config::builder(1).members(members()).build().unwrap();
        assert_eq!(cfg.id, 1);
        assert_eq!(cfg.members.len(), 3);
    }

    #[test]
    fn rejects_self_not_in_cluster() {
        let err = Config::builder(9).members(members()).build().unwrap_err();
        assert_eq!(err, ConfigError::SelfNotInCluster(9));
    }

    #[test]
    fn rejects_duplicate_member_ids() {
        let mut m = members();
        m.push((1, "127.0.0.1:9099".into()));
        let err = Config::builder(1).members(m).build().unwrap_err();
        assert_eq!(err, ConfigError::DuplicateId(1));
    }

    #[test]
    fn rejects_inverted_election_timeout_range() {
        let err = Config::builder(1)
            .members(members())
            .election_timeout_range(300, 150)
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::InvalidElectionTimeoutRange { min: 300, max: 150 });
    }

    #[test]
    fn combination_storage_requires_ring_buffer_size() {
        let err = Config::builder(1)
            .members(members())
            .storage_type(StorageType::Combination)
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::MissingRingBufferSize);
    }
}
