//! Schema normalizer: header validation and row/column realignment.
//!
//! Builds a [`Schema`] from the header row (trimmed, unique column names) and
//! brings body rows into alignment with it. One misalignment shape is
//! repairable: exports where an empty "droppable" column (typically
//! `where_coordinates`) loses its delimiter, leaving the row exactly one
//! field short. Those rows get an empty value re-inserted at the droppable
//! position. Every other field-count mismatch is rejected, not guessed at.

use std::collections::HashMap;

use serde::Serialize;

use crate::error::{SchemaError, SchemaResult};
use crate::models::{RejectReason, RejectedRow};
use crate::parser::RawRow;

/// Ordered, trimmed, unique column names for one load.
///
/// Built once from the header row; immutable afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct Schema {
    columns: Vec<String>,
    #[serde(skip)]
    index: HashMap<String, usize>,
    /// Index of the configured droppable column, if it exists in the header.
    #[serde(skip)]
    droppable: Option<usize>,
}

impl Schema {
    /// Build a schema from the header row.
    ///
    /// Column names are trimmed of surrounding whitespace. Duplicate names
    /// after trimming are a fatal error (the name→column mapping would be
    /// ambiguous). `droppable_column` names the column whose delimiter some
    /// source rows drop when it is empty; it is looked up by trimmed name.
    pub fn from_header(header: &RawRow, droppable_column: Option<&str>) -> SchemaResult<Self> {
        let columns: Vec<String> = header.fields.iter().map(|f| f.trim().to_string()).collect();

        if columns.is_empty() || columns.iter().all(|c| c.is_empty()) {
            return Err(SchemaError::NoColumns);
        }

        let mut index = HashMap::with_capacity(columns.len());
        for (i, name) in columns.iter().enumerate() {
            if index.insert(name.clone(), i).is_some() {
                return Err(SchemaError::DuplicateColumn(name.clone()));
            }
        }

        let droppable = droppable_column.and_then(|name| index.get(name.trim()).copied());

        Ok(Self {
            columns,
            index,
            droppable,
        })
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Trimmed column names, in header order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Index of a column by trimmed name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Index of the droppable column, if the header has it.
    pub fn droppable_index(&self) -> Option<usize> {
        self.droppable
    }

    /// Align one body row with the header.
    ///
    /// - Field count already matches: the row passes through untouched, so
    ///   applying the repair twice is a no-op.
    /// - Exactly one field short and a droppable column is configured: an
    ///   empty value is inserted at the droppable position, shifting the
    ///   fields at and after it right by one.
    /// - Anything else: rejected with `field_count_mismatch`.
    pub fn align(&self, mut row: RawRow) -> Result<RawRow, RejectedRow> {
        let expected = self.columns.len();

        if row.fields.len() == expected {
            return Ok(row);
        }

        if row.fields.len() + 1 == expected {
            if let Some(pos) = self.droppable {
                row.fields.insert(pos, String::new());
                return Ok(row);
            }
        }

        Err(RejectedRow {
            line: row.line,
            reason: RejectReason::FieldCountMismatch,
            raw: row.raw,
        })
    }
}
