//! The dataframe container: an ordered set of equal-length named columns.
//!
//! Invariants enforced by every constructor: all columns share the same
//! height, and column names are unique and non-empty. Operations take a frame
//! by value and return a fresh one; nothing outlives a single `execute` call.

use thiserror::Error;

use crate::value::Value;

#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct FrameError(pub String);

/// A named column of values.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    values: Vec<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataFrame {
    columns: Vec<Column>,
}

impl DataFrame {
    /// An empty frame: zero columns, zero rows.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(columns: Vec<Column>) -> Result<Self, FrameError> {
        if let Some(first) = columns.first() {
            let height = first.values.len();
            for column in &columns {
                if column.values.len() != height {
                    return Err(FrameError(format!(
                        "column '{}' has {} row(s), expected {}",
                        column.name,
                        column.values.len(),
                        height
                    )));
                }
            }
        }
        let mut seen = std::collections::HashSet::new();
        for column in &columns {
            if column.name.is_empty() {
                return Err(FrameError("column names must be non-empty".to_string()));
            }
            if !seen.insert(column.name.clone()) {
                return Err(FrameError(format!("duplicate column name '{}'", column.name)));
            }
        }
        Ok(Self { columns })
    }

    pub fn from_pairs(pairs: Vec<(String, Vec<Value>)>) -> Result<Self, FrameError> {
        Self::new(
            pairs
                .into_iter()
                .map(|(name, values)| Column::new(name, values))
                .collect(),
        )
    }

    pub fn height(&self) -> usize {
        self.columns.first().map_or(0, |c| c.values.len())
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn values(&self, name: &str) -> Option<&[Value]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    pub fn cell(&self, name: &str, row: usize) -> Option<&Value> {
        self.values(name).and_then(|values| values.get(row))
    }

    /// Replaces the column if the name exists, otherwise appends it on the
    /// right. The replacement must match the frame height.
    pub fn with_column(
        mut self,
        name: impl Into<String>,
        values: Vec<Value>,
    ) -> Result<Self, FrameError> {
        let name = name.into();
        if name.is_empty() {
            return Err(FrameError("column names must be non-empty".to_string()));
        }
        if !self.columns.is_empty() && values.len() != self.height() {
            return Err(FrameError(format!(
                "column '{}' has {} row(s), expected {}",
                name,
                values.len(),
                self.height()
            )));
        }
        match self.column_index(&name) {
            Some(idx) => self.columns[idx].values = values,
            None => self.columns.push(Column::new(name, values)),
        }
        Ok(self)
    }

    pub fn drop_column(mut self, name: &str) -> Self {
        self.columns.retain(|c| c.name != name);
        self
    }

    /// Keeps the rows whose mask entry is true. The mask must cover every row.
    pub fn filter_rows(&self, mask: &[bool]) -> Self {
        debug_assert_eq!(mask.len(), self.height());
        let columns = self
            .columns
            .iter()
            .map(|column| {
                let values = column
                    .values
                    .iter()
                    .zip(mask)
                    .filter(|(_, keep)| **keep)
                    .map(|(value, _)| value.clone())
                    .collect();
                Column::new(column.name.clone(), values)
            })
            .collect();
        Self { columns }
    }

    /// Gathers rows by index, in the given order. Indices must be in range.
    pub fn take_rows(&self, indices: &[usize]) -> Self {
        let columns = self
            .columns
            .iter()
            .map(|column| {
                let values = indices.iter().map(|&i| column.values[i].clone()).collect();
                Column::new(column.name.clone(), values)
            })
            .collect();
        Self { columns }
    }

    /// Column-name/value pairs for one row, in column order.
    pub fn row(&self, idx: usize) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .iter()
            .map(move |c| (c.name.as_str(), &c.values[idx]))
    }

    /// One row as an ordered JSON object.
    pub fn row_object(&self, idx: usize) -> serde_json::Map<String, serde_json::Value> {
        self.row(idx)
            .map(|(name, value)| (name.to_string(), value.to_json()))
            .collect()
    }
}
