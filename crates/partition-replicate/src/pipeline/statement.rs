//! Read and insert statement construction.
//!
//! Table names, column lists, filters and queries are spliced in verbatim;
//! only the partition index travels as a bound parameter.

use crate::core::traits::{Dialect, HashTarget};
use crate::core::{ColumnSelection, TableDescriptor};
use crate::error::{ReplicateError, Result};

use super::predicate::PartitionPredicateBuilder;

/// Which of the three read forms was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadShape {
    /// `SELECT * FROM (<query>) <alias> WHERE ...`
    Query,
    /// `SELECT <columns> FROM <table> WHERE (<filter>) AND ...`
    Filter,
    /// `SELECT <hint> <columns> FROM <table><hint> WHERE ...`
    FullScan,
}

/// A per-partition read statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadStatement {
    pub sql: String,
    pub shape: ReadShape,
    /// Whether the session should favor full physical scans.
    pub for_full_scan: bool,
    /// 1-based parameter slot receiving the partition index.
    pub bind_slot: usize,
}

/// A positional INSERT for rows of a fixed width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertStatement {
    pub sql: String,
    pub param_count: usize,
}

pub struct StatementBuilder<'a> {
    dialect: &'a dyn Dialect,
}

impl<'a> StatementBuilder<'a> {
    pub fn new(dialect: &'a dyn Dialect) -> Self {
        Self { dialect }
    }

    /// Build the read statement for one partition of an N-way split.
    ///
    /// A query wins over a filter, and a filter wins over a full scan. Blank
    /// strings count as absent.
    pub fn build_read_statement(
        &self,
        table: &TableDescriptor,
        total_partitions: u32,
    ) -> Result<ReadStatement> {
        let predicates = PartitionPredicateBuilder::new(self.dialect);

        if let Some(query) = table.effective_query() {
            let alias = self.dialect.derived_table_alias();
            let predicate =
                predicates.predicate(total_partitions, HashTarget::DerivedRow { alias }, 1);
            return Ok(ReadStatement {
                sql: format!(
                    "SELECT * FROM ({}) {} WHERE {}",
                    query.trim(),
                    alias,
                    predicate.fragment
                ),
                shape: ReadShape::Query,
                for_full_scan: false,
                bind_slot: predicate.bind_slot,
            });
        }

        if table.name.trim().is_empty() {
            return Err(ReplicateError::preparation(
                "source needs either a table or a query",
            ));
        }

        let predicate = predicates.predicate(total_partitions, HashTarget::PhysicalRow, 1);
        let columns = table.columns.select_list();

        if let Some(filter) = table.effective_filter() {
            return Ok(ReadStatement {
                sql: format!(
                    "SELECT {} FROM {} WHERE ({}) AND {}",
                    columns,
                    table.name,
                    filter.trim(),
                    predicate.fragment
                ),
                shape: ReadShape::Filter,
                for_full_scan: false,
                bind_slot: predicate.bind_slot,
            });
        }

        let select_hint = self
            .dialect
            .full_scan_select_hint(&table.name)
            .map(|hint| format!("{} ", hint))
            .unwrap_or_default();
        let table_hint = self.dialect.full_scan_table_hint().unwrap_or_default();

        Ok(ReadStatement {
            sql: format!(
                "SELECT {}{} FROM {}{} WHERE {}",
                select_hint, columns, table.name, table_hint, predicate.fragment
            ),
            shape: ReadShape::FullScan,
            for_full_scan: true,
            bind_slot: predicate.bind_slot,
        })
    }

    /// Build the INSERT for rows `row_width` values wide.
    ///
    /// With an explicit column list the widths must agree.
    pub fn build_insert_statement(
        &self,
        table: &TableDescriptor,
        row_width: usize,
    ) -> Result<InsertStatement> {
        if row_width == 0 {
            return Err(ReplicateError::preparation(
                "cannot build an INSERT for rows with no columns",
            ));
        }
        if table.name.trim().is_empty() {
            return Err(ReplicateError::preparation("sink table name is empty"));
        }

        let column_list = match &table.columns {
            ColumnSelection::All => String::new(),
            ColumnSelection::Explicit(cols) if cols.len() == row_width => {
                format!(" ({})", cols.join(", "))
            }
            ColumnSelection::Explicit(cols) => {
                return Err(ReplicateError::preparation(format!(
                    "sink lists {} columns but source rows have {}",
                    cols.len(),
                    row_width
                )));
            }
        };

        let placeholders = (1..=row_width)
            .map(|i| self.dialect.param_placeholder(i))
            .collect::<Vec<_>>()
            .join(", ");

        let hint = self
            .dialect
            .bulk_insert_hint()
            .map(|hint| format!(" {}", hint))
            .unwrap_or_default();

        Ok(InsertStatement {
            sql: format!(
                "INSERT INTO {}{}{} VALUES ({})",
                table.name, hint, column_list, placeholders
            ),
            param_count: row_width,
        })
    }
}
