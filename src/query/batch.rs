//! Row-to-Arrow batch builder.
//!
//! Collects rows of [`CellValue`]s and turns them into a `RecordBatch` whose
//! schema follows the inferred column types.

use crate::error::ConversionError;
use crate::types::{CellValue, ColumnType};
use arrow::array::{ArrayRef, Float64Builder, Int32Builder, Int64Builder, StringBuilder};
use arrow::datatypes::{Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use std::sync::Arc;

enum ColumnBuilder {
    Int(Int32Builder),
    Long(Int64Builder),
    Double(Float64Builder),
    Utf8(StringBuilder),
}

impl ColumnBuilder {
    fn for_type(column_type: ColumnType) -> Self {
        match column_type {
            ColumnType::Int => ColumnBuilder::Int(Int32Builder::new()),
            ColumnType::Long => ColumnBuilder::Long(Int64Builder::new()),
            ColumnType::Double => ColumnBuilder::Double(Float64Builder::new()),
            ColumnType::String | ColumnType::Object => ColumnBuilder::Utf8(StringBuilder::new()),
        }
    }

    fn append(&mut self, value: &CellValue, row: usize, column: usize) -> Result<(), ConversionError> {
        let mismatch = |expected: &str| ConversionError::ValueConversionFailed {
            row,
            column,
            message: format!("expected {}, got {:?}", expected, value),
        };

        match self {
            ColumnBuilder::Int(builder) => match value {
                CellValue::Null => builder.append_null(),
                CellValue::Int(v) => builder.append_value(*v),
                _ => return Err(mismatch("INT")),
            },
            ColumnBuilder::Long(builder) => match value {
                CellValue::Null => builder.append_null(),
                CellValue::Int(v) => builder.append_value(i64::from(*v)),
                CellValue::Long(v) => builder.append_value(*v),
                _ => return Err(mismatch("LONG")),
            },
            ColumnBuilder::Double(builder) => match value.as_f64() {
                Some(v) => builder.append_value(v),
                None if value.is_null() => builder.append_null(),
                None => return Err(mismatch("DOUBLE")),
            },
            ColumnBuilder::Utf8(builder) => builder.append_option(value.to_text()),
        }
        Ok(())
    }

    fn finish(&mut self) -> ArrayRef {
        match self {
            ColumnBuilder::Int(builder) => Arc::new(builder.finish()),
            ColumnBuilder::Long(builder) => Arc::new(builder.finish()),
            ColumnBuilder::Double(builder) => Arc::new(builder.finish()),
            ColumnBuilder::Utf8(builder) => Arc::new(builder.finish()),
        }
    }
}

/// Accumulates rows into a `RecordBatch`.
pub struct RowBatchBuilder {
    schema: SchemaRef,
    builders: Vec<ColumnBuilder>,
    rows: usize,
}

impl RowBatchBuilder {
    /// Create a builder for columns with the given names and types.
    ///
    /// # Arguments
    /// * `names` - Column names, one per type
    /// * `types` - Inferred column types
    pub fn new(names: &[String], types: &[ColumnType]) -> Self {
        let fields = names
            .iter()
            .zip(types)
            .map(|(name, t)| Field::new(name, t.arrow_type(), true))
            .collect::<Vec<_>>();

        Self {
            schema: Arc::new(Schema::new(fields)),
            builders: types.iter().map(|t| ColumnBuilder::for_type(*t)).collect(),
            rows: 0,
        }
    }

    pub fn schema(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }

    /// Append one row.
    ///
    /// # Errors
    /// Returns `ConversionError::ValueConversionFailed` if the row has the
    /// wrong width or a value does not fit its column.
    pub fn append_row(&mut self, values: &[CellValue]) -> Result<(), ConversionError> {
        if values.len() != self.builders.len() {
            return Err(ConversionError::ValueConversionFailed {
                row: self.rows,
                column: values.len(),
                message: format!(
                    "row has {} values, schema has {} columns",
                    values.len(),
                    self.builders.len()
                ),
            });
        }

        for (column, (builder, value)) in self.builders.iter_mut().zip(values).enumerate() {
            builder.append(value, self.rows, column)?;
        }
        self.rows += 1;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Build the batch and reset the builder.
    pub fn finish(&mut self) -> Result<RecordBatch, ConversionError> {
        let arrays = self.builders.iter_mut().map(ColumnBuilder::finish).collect();
        self.rows = 0;
        Ok(RecordBatch::try_new(self.schema(), arrays)?)
    }
}
