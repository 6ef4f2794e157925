//! Partition predicates.

use crate::core::traits::{Dialect, HashTarget};

/// `<hash> = <placeholder>` restricting a scan to one partition.
///
/// The fragment is identical for every partition of a run; only the value
/// bound to `bind_slot` differs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionPredicate {
    pub fragment: String,
    /// 1-based parameter slot receiving the partition index.
    pub bind_slot: usize,
}

impl PartitionPredicate {
    /// Number of parameters the fragment introduces.
    pub fn bind_slots(&self) -> usize {
        1
    }
}

pub struct PartitionPredicateBuilder<'a> {
    dialect: &'a dyn Dialect,
}

impl<'a> PartitionPredicateBuilder<'a> {
    pub fn new(dialect: &'a dyn Dialect) -> Self {
        Self { dialect }
    }

    /// Build the predicate for an N-way split, binding the index at `bind_slot`.
    pub fn predicate(
        &self,
        total_partitions: u32,
        target: HashTarget<'_>,
        bind_slot: usize,
    ) -> PartitionPredicate {
        let fragment = format!(
            "{} = {}",
            self.dialect.partition_hash(target, total_partitions),
            self.dialect.param_placeholder(bind_slot)
        );
        PartitionPredicate {
            fragment,
            bind_slot,
        }
    }
}
