//! PostgreSQL SQL dialect (Strategy pattern).

use crate::core::traits::{Dialect, HashTarget, SessionStep};

/// PostgreSQL dialect implementation.
///
/// Partitions hash the tuple id (`ctid`), which is stable for the lifetime
/// of a row version. Wrapped queries hash the text form of the whole row.
#[derive(Debug, Clone, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Create a new PostgreSQL dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for PostgresDialect {
    fn name(&self) -> &str {
        "postgres"
    }

    fn param_placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn session_statement(&self, step: SessionStep) -> Option<String> {
        let sql = match step {
            SessionStep::NumericFormat => "SET lc_numeric TO 'C'",
            SessionStep::DateFormat => "SET DateStyle TO 'ISO, YMD'",
            // DateStyle fixes the layout; the zone fixes the offset timestamptz renders in
            SessionStep::TimestampFormat => "SET TimeZone TO 'UTC'",
            SessionStep::FullScan => "SET enable_indexscan TO off; SET enable_bitmapscan TO off",
        };
        Some(sql.to_string())
    }

    fn partition_hash(&self, target: HashTarget<'_>, total_partitions: u32) -> String {
        let hashed = match target {
            HashTarget::PhysicalRow => "ctid::text".to_string(),
            HashTarget::DerivedRow { alias } => format!("{}::text", alias),
        };
        // hashtext returns int4; widen before abs() so i32::MIN cannot overflow
        format!(
            "mod(abs(hashtext({})::bigint), {})",
            hashed, total_partitions
        )
    }

    fn full_scan_select_hint(&self, table: &str) -> Option<String> {
        // Honored by pg_hint_plan, otherwise an ordinary comment
        Some(format!("/*+ SeqScan({}) */", table))
    }
}
