//! Table descriptors for the source and sink sides.
//!
//! Identifiers, column names, filters and queries are carried verbatim. No
//! quoting or escaping is applied; whatever the user configured is what the
//! server sees.

/// Which columns a statement touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnSelection {
    /// Every column of the table (`*` on reads, no column list on inserts).
    All,
    /// An explicit ordered column list.
    Explicit(Vec<String>),
}

impl ColumnSelection {
    /// Parse a comma-separated column list.
    ///
    /// Absent, blank and `*` inputs select all columns. Entries are trimmed and
    /// empty entries dropped.
    pub fn parse(list: Option<&str>) -> Self {
        let Some(list) = list.map(str::trim).filter(|s| !s.is_empty() && *s != "*") else {
            return ColumnSelection::All;
        };
        let columns: Vec<String> = list
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(String::from)
            .collect();
        if columns.is_empty() {
            ColumnSelection::All
        } else {
            ColumnSelection::Explicit(columns)
        }
    }

    /// Number of explicit columns, `None` for `All`.
    pub fn count(&self) -> Option<usize> {
        match self {
            ColumnSelection::All => None,
            ColumnSelection::Explicit(cols) => Some(cols.len()),
        }
    }

    /// Render as a select list (`*` for all columns).
    pub fn select_list(&self) -> String {
        match self {
            ColumnSelection::All => "*".to_string(),
            ColumnSelection::Explicit(cols) => cols.join(", "),
        }
    }
}

/// A table (or query) to read from or write into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    pub name: String,
    pub columns: ColumnSelection,
    /// Free-form SELECT wrapped as a derived table. Source side only.
    pub query: Option<String>,
    /// Free-form boolean expression ANDed with the partition predicate. Source side only.
    pub filter: Option<String>,
}

impl TableDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: ColumnSelection::All,
            query: None,
            filter: None,
        }
    }

    pub fn with_columns(mut self, columns: ColumnSelection) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// The configured query, treating blank strings as absent.
    pub fn effective_query(&self) -> Option<&str> {
        non_blank(self.query.as_deref())
    }

    /// The configured filter, treating blank strings as absent.
    pub fn effective_filter(&self) -> Option<&str> {
        non_blank(self.filter.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
