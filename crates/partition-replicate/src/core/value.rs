//! Row representation used on the transfer path.
//!
//! Every value travels as text. The source driver renders each column into
//! its canonical string form and the sink driver hands that string back to
//! the server, which applies its own input conversion. `None` is SQL NULL and
//! stays distinct from the empty string.

/// A single row as an ordered list of nullable text values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    values: Vec<Option<String>>,
}

impl Row {
    /// Create a row from its column values.
    pub fn new(values: Vec<Option<String>>) -> Self {
        Self { values }
    }

    /// Number of columns in the row.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at the given 0-based column position, `None` for NULL or out of range.
    pub fn get(&self, idx: usize) -> Option<&str> {
        self.values.get(idx).and_then(|v| v.as_deref())
    }

    /// Check if the value at the given position is SQL NULL.
    pub fn is_null(&self, idx: usize) -> bool {
        matches!(self.values.get(idx), Some(None))
    }

    pub fn values(&self) -> &[Option<String>] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Option<String>> {
        self.values
    }
}

impl From<Vec<Option<String>>> for Row {
    fn from(values: Vec<Option<String>>) -> Self {
        Self::new(values)
    }
}

impl FromIterator<Option<String>> for Row {
    fn from_iter<I: IntoIterator<Item = Option<String>>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_distinct_from_empty() {
        let row = Row::new(vec![None, Some(String::new()), Some("x".into())]);
        assert_eq!(row.len(), 3);
        assert!(row.is_null(0));
        assert!(!row.is_null(1));
        assert_eq!(row.get(1), Some(""));
        assert_eq!(row.get(2), Some("x"));
        assert_eq!(row.get(3), None);
        assert!(!row.is_null(3));
    }

    #[test]
    fn test_collect_row() {
        let row: Row = ["1", "a"].iter().map(|s| Some(s.to_string())).collect();
        assert_eq!(row.into_values(), vec![Some("1".to_string()), Some("a".to_string())]);
    }
}
