//! Partition identity and connection roles.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ReplicateError, Result};

/// Which side of the replication a connection serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionRole {
    /// Read side.
    Source,
    /// Write side.
    Sink,
}

impl fmt::Display for ConnectionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionRole::Source => f.write_str("source"),
            ConnectionRole::Sink => f.write_str("sink"),
        }
    }
}

/// One slice of an N-way partitioned scan.
///
/// Immutable once built; `index` is always in `[0, total_partitions)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PartitionSpec {
    total_partitions: u32,
    index: u32,
}

impl PartitionSpec {
    /// Create a partition spec, rejecting `N = 0` and out-of-range indexes.
    pub fn new(total_partitions: u32, index: u32) -> Result<Self> {
        if total_partitions == 0 {
            return Err(ReplicateError::Config(
                "total partitions must be at least 1".into(),
            ));
        }
        if index >= total_partitions {
            return Err(ReplicateError::Config(format!(
                "partition index {} out of range for {} partitions",
                index, total_partitions
            )));
        }
        Ok(Self {
            total_partitions,
            index,
        })
    }

    /// All partitions of an N-way split, in index order.
    pub fn all(total_partitions: u32) -> Result<Vec<Self>> {
        if total_partitions == 0 {
            return Err(ReplicateError::Config(
                "total partitions must be at least 1".into(),
            ));
        }
        (0..total_partitions)
            .map(|index| Self::new(total_partitions, index))
            .collect()
    }

    pub fn total_partitions(&self) -> u32 {
        self.total_partitions
    }

    pub fn index(&self) -> u32 {
        self.index
    }
}

impl fmt::Display for PartitionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.index, self.total_partitions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_spec_bounds() {
        assert!(PartitionSpec::new(0, 0).is_err());
        assert!(PartitionSpec::new(4, 4).is_err());
        let spec = PartitionSpec::new(4, 3).unwrap();
        assert_eq!(spec.total_partitions(), 4);
        assert_eq!(spec.index(), 3);
        assert_eq!(spec.to_string(), "3/4");
    }

    #[test]
    fn test_all_partitions() {
        let all = PartitionSpec::all(3).unwrap();
        let indexes: Vec<u32> = all.iter().map(|p| p.index()).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
        assert!(PartitionSpec::all(0).is_err());
    }

    #[test]
    fn test_role_display() {
        assert_eq!(ConnectionRole::Source.to_string(), "source");
        assert_eq!(ConnectionRole::Sink.to_string(), "sink");
    }
}
