//! Consistency Levels

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of replica acknowledgements a statement needs before it completes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsistencyLevel {
    Any,
    #[default]
    One,
    Two,
    Three,
    Quorum,
    All,
}

impl ConsistencyLevel {
    /// Replicas that must respond for a keyspace with the given replication factor
    pub fn required_replicas(self, replication_factor: usize) -> usize {
        match self {
            // ANY is satisfied by the coordinator alone
            ConsistencyLevel::Any => 1,
            ConsistencyLevel::One => 1,
            ConsistencyLevel::Two => 2,
            ConsistencyLevel::Three => 3,
            ConsistencyLevel::Quorum => replication_factor / 2 + 1,
            ConsistencyLevel::All => replication_factor,
        }
    }

    /// Wire name of the level
    pub fn as_str(self) -> &'static str {
        match self {
            ConsistencyLevel::Any => "ANY",
            ConsistencyLevel::One => "ONE",
            ConsistencyLevel::Two => "TWO",
            ConsistencyLevel::Three => "THREE",
            ConsistencyLevel::Quorum => "QUORUM",
            ConsistencyLevel::All => "ALL",
        }
    }
}

impl fmt::Display for ConsistencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
