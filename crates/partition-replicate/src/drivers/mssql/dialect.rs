//! Microsoft SQL Server SQL dialect (Strategy pattern).

use crate::core::traits::{Dialect, HashTarget, SessionStep};

/// MSSQL dialect implementation.
///
/// Base tables hash the physical row locator (`%%physloc%%`); wrapped
/// queries fall back to `CHECKSUM(*)` over the derived row.
#[derive(Debug, Clone, Default)]
pub struct MssqlDialect;

impl MssqlDialect {
    /// Create a new MSSQL dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for MssqlDialect {
    fn name(&self) -> &str {
        "mssql"
    }

    fn param_placeholder(&self, index: usize) -> String {
        format!("@P{}", index)
    }

    fn session_statement(&self, step: SessionStep) -> Option<String> {
        match step {
            SessionStep::NumericFormat => Some("SET LANGUAGE us_english".to_string()),
            SessionStep::DateFormat => Some("SET DATEFORMAT ymd".to_string()),
            // DATEFORMAT covers datetime2 and datetimeoffset literals as well
            SessionStep::TimestampFormat => None,
            SessionStep::FullScan => None,
        }
    }

    fn partition_hash(&self, target: HashTarget<'_>, total_partitions: u32) -> String {
        let checksum = match target {
            HashTarget::PhysicalRow => "CHECKSUM(%%physloc%%)",
            HashTarget::DerivedRow { .. } => "CHECKSUM(*)",
        };
        format!("ABS(CAST({} AS BIGINT)) % {}", checksum, total_partitions)
    }

    fn full_scan_table_hint(&self) -> Option<String> {
        Some(" WITH (INDEX(0))".to_string())
    }

    fn bulk_insert_hint(&self) -> Option<String> {
        Some("WITH (TABLOCK)".to_string())
    }

    fn begin_transaction_sql(&self) -> &str {
        "BEGIN TRANSACTION"
    }

    fn commit_sql(&self) -> &str {
        "COMMIT TRANSACTION"
    }

    fn rollback_sql(&self) -> &str {
        "ROLLBACK TRANSACTION"
    }
}
