//! Column-oriented table of `f64` values keyed by a named index.
//!
//! Missing cells are stored as `NaN`, so an outer join or an empty resample
//! bucket never needs a separate validity mask.

use thiserror::Error;

/// Errors raised when a table would become ragged or ambiguous.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TableError {
    #[error("column '{name}' has {actual} values but the index has {expected}")]
    LengthMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("duplicate column name: {0}")]
    DuplicateColumn(String),
}

/// A named column of values.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<f64>,
}

/// Table with one index column and any number of value columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    index_name: String,
    index: Vec<f64>,
    columns: Vec<Column>,
}

impl Table {
    /// Creates a table with the given index and no value columns.
    pub fn new(index_name: impl Into<String>, index: Vec<f64>) -> Self {
        Self {
            index_name: index_name.into(),
            index,
            columns: Vec::new(),
        }
    }

    #[inline]
    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    #[inline]
    pub fn index(&self) -> &[f64] {
        &self.index
    }

    /// Number of rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    #[inline]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Looks up a column by exact name.
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    /// Appends a new column.
    pub fn push_column(
        &mut self,
        name: impl Into<String>,
        values: Vec<f64>,
    ) -> Result<(), TableError> {
        let name = name.into();
        if values.len() != self.index.len() {
            return Err(TableError::LengthMismatch {
                name,
                expected: self.index.len(),
                actual: values.len(),
            });
        }
        if self.column(&name).is_some() {
            return Err(TableError::DuplicateColumn(name));
        }
        self.columns.push(Column { name, values });
        Ok(())
    }

    /// Replaces a column if it exists, otherwise appends it.
    pub fn set_column(
        &mut self,
        name: impl Into<String>,
        values: Vec<f64>,
    ) -> Result<(), TableError> {
        let name = name.into();
        if values.len() != self.index.len() {
            return Err(TableError::LengthMismatch {
                name,
                expected: self.index.len(),
                actual: values.len(),
            });
        }
        match self.columns.iter_mut().find(|c| c.name == name) {
            Some(column) => column.values = values,
            None => self.columns.push(Column { name, values }),
        }
        Ok(())
    }

    /// Removes every column whose name matches the predicate.
    pub fn drop_columns<F>(&mut self, mut predicate: F)
    where
        F: FnMut(&str) -> bool,
    {
        self.columns.retain(|c| !predicate(&c.name));
    }

    /// Renames every column to `<prefix><name>`.
    pub fn add_prefix(&mut self, prefix: &str) {
        for column in &mut self.columns {
            column.name = format!("{}{}", prefix, column.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        let mut table = Table::new("Instant", vec![0.0, 1.0, 2.0]);
        table.push_column("X", vec![1.0, 2.0, 3.0]).unwrap();
        table.push_column("Frame", vec![1.0, 2.0, 3.0]).unwrap();
        table
    }

    #[test]
    fn test_push_and_lookup() {
        let table = sample();
        assert_eq!(table.len(), 3);
        assert_eq!(table.column("X"), Some(&[1.0, 2.0, 3.0][..]));
        assert_eq!(table.column("Y"), None);
        assert_eq!(table.column_names(), vec!["X", "Frame"]);
    }

    #[test]
    fn test_push_rejects_ragged_column() {
        let mut table = sample();
        let err = table.push_column("Y", vec![1.0]).unwrap_err();
        assert_eq!(
            err,
            TableError::LengthMismatch {
                name: "Y".to_string(),
                expected: 3,
                actual: 1
            }
        );
    }

    #[test]
    fn test_push_rejects_duplicate() {
        let mut table = sample();
        assert!(matches!(
            table.push_column("X", vec![0.0; 3]),
            Err(TableError::DuplicateColumn(_))
        ));
        table.set_column("X", vec![0.0; 3]).unwrap();
        assert_eq!(table.column("X"), Some(&[0.0, 0.0, 0.0][..]));
    }

    #[test]
    fn test_prefix_and_drop() {
        let mut table = sample();
        table.add_prefix("Reference_");
        table.drop_columns(|name| name.ends_with("Frame"));
        assert_eq!(table.column_names(), vec!["Reference_X"]);
        assert_eq!(table.len(), 3);
    }
}
