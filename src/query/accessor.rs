//! Per-column value accessors.
//!
//! Each result column gets an [`Accessor`] that reads the current row's value
//! with the getter matching the column's inferred type. With caching on, a
//! column is read from the driver at most once per row.

use crate::driver::NativeCursor;
use crate::error::DriverError;
use crate::types::{CellValue, ColumnType};

/// Reads one column of the current row.
#[derive(Debug, Clone)]
pub struct Accessor {
    column: usize,
    column_type: ColumnType,
    caching: bool,
    cached: Option<(u64, CellValue)>,
}

impl Accessor {
    pub fn new(column: usize, column_type: ColumnType, caching: bool) -> Self {
        Self {
            column,
            column_type,
            caching,
            cached: None,
        }
    }

    pub fn column(&self) -> usize {
        self.column
    }

    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }

    /// Value of the column at row `row`.
    ///
    /// `row` is the statement's row counter. A cached value is only reused
    /// while the counter has not moved.
    pub fn get(&mut self, cursor: &mut dyn NativeCursor, row: u64) -> Result<CellValue, DriverError> {
        if let Some((cached_row, value)) = &self.cached {
            if *cached_row == row {
                return Ok(value.clone());
            }
        }

        let value = read_column(cursor, self.column, self.column_type)?;
        if self.caching {
            self.cached = Some((row, value.clone()));
        }
        Ok(value)
    }
}

/// Read one column with the getter for `column_type`.
///
/// Primitive getters report NULL as zero, so a zero is checked against
/// `was_null` before it is returned.
pub fn read_column(
    cursor: &mut dyn NativeCursor,
    column: usize,
    column_type: ColumnType,
) -> Result<CellValue, DriverError> {
    let value = match column_type {
        ColumnType::Object => match cursor.get_object(column)? {
            serde_json::Value::Null => CellValue::Null,
            value => CellValue::Object(value),
        },
        ColumnType::String => cursor
            .get_string(column)?
            .map(CellValue::String)
            .unwrap_or(CellValue::Null),
        ColumnType::Int => {
            let v = cursor.get_int(column)?;
            if v == 0 && cursor.was_null() {
                CellValue::Null
            } else {
                CellValue::Int(v)
            }
        }
        ColumnType::Long => {
            let v = cursor.get_long(column)?;
            if v == 0 && cursor.was_null() {
                CellValue::Null
            } else {
                CellValue::Long(v)
            }
        }
        ColumnType::Double => {
            let v = cursor.get_double(column)?;
            if v == 0.0 && cursor.was_null() {
                CellValue::Null
            } else {
                CellValue::Double(v)
            }
        }
    };
    Ok(value)
}

/// Accessors for all columns, indexed by zero-based ordinal.
#[derive(Debug, Clone, Default)]
pub struct AccessorTable {
    accessors: Vec<Accessor>,
}

impl AccessorTable {
    pub fn new(types: &[ColumnType], caching: bool) -> Self {
        Self {
            accessors: types
                .iter()
                .enumerate()
                .map(|(i, t)| Accessor::new(i, *t, caching))
                .collect(),
        }
    }

    pub fn get_mut(&mut self, ordinal: usize) -> Option<&mut Accessor> {
        self.accessors.get_mut(ordinal)
    }

    pub fn column_types(&self) -> Vec<ColumnType> {
        self.accessors.iter().map(Accessor::column_type).collect()
    }

    pub fn len(&self) -> usize {
        self.accessors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accessors.is_empty()
    }
}
