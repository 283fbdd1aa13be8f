//! Column types, cell values and their Arrow mapping.

use arrow::datatypes::DataType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Read strategy assigned to a result column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnType {
    /// Opaque driver value
    Object,
    /// 64-bit float
    Double,
    /// 32-bit integer
    Int,
    /// 64-bit integer
    Long,
    /// Text
    String,
}

impl ColumnType {
    /// Arrow type used when materialising a column of this type.
    pub fn arrow_type(&self) -> DataType {
        match self {
            ColumnType::Int => DataType::Int32,
            ColumnType::Long => DataType::Int64,
            ColumnType::Double => DataType::Float64,
            ColumnType::String | ColumnType::Object => DataType::Utf8,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Object => write!(f, "OBJECT"),
            ColumnType::Double => write!(f, "DOUBLE"),
            ColumnType::Int => write!(f, "INT"),
            ColumnType::Long => write!(f, "LONG"),
            ColumnType::String => write!(f, "STRING"),
        }
    }
}

/// A value read from the current row.
///
/// Numeric columns never report NULL as zero: a SQL NULL is always
/// [`CellValue::Null`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Int(i32),
    Long(i64),
    Double(f64),
    String(String),
    Object(serde_json::Value),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Integer view of the value, if it is integral.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CellValue::Int(v) => Some(i64::from(*v)),
            CellValue::Long(v) => Some(*v),
            CellValue::Object(v) => v.as_i64(),
            _ => None,
        }
    }

    /// Floating view of the value, if it is numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Int(v) => Some(f64::from(*v)),
            CellValue::Long(v) => Some(*v as f64),
            CellValue::Double(v) => Some(*v),
            CellValue::Object(v) => v.as_f64(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::String(s) => Some(s),
            CellValue::Object(v) => v.as_str(),
            _ => None,
        }
    }

    /// Text rendering used for `Utf8` columns. `None` for NULL.
    pub fn to_text(&self) -> Option<String> {
        match self {
            CellValue::Null => None,
            CellValue::Int(v) => Some(v.to_string()),
            CellValue::Long(v) => Some(v.to_string()),
            CellValue::Double(v) => Some(v.to_string()),
            CellValue::String(s) => Some(s.clone()),
            CellValue::Object(serde_json::Value::Null) => None,
            CellValue::Object(serde_json::Value::String(s)) => Some(s.clone()),
            CellValue::Object(other) => Some(other.to_string()),
        }
    }
}
