//! Column type inference.
//!
//! Picks the read strategy for each result column from the caller's
//! suggestions, the dialect and the driver's column metadata, in that order.
//!
//! The built-in rules:
//!
//! | SQL type                      | precision / scale                 | Column type |
//! |-------------------------------|-----------------------------------|-------------|
//! | SMALLINT, INTEGER, BOOLEAN    |                                   | `Int`       |
//! | NUMERIC named NUMBER/NUMERIC  | 0 / 0 or undefined                | `Int` (`Object` for measure aliases `m0`, `m1`, ...) |
//! | NUMERIC, DECIMAL              | scale 0 or undefined, p <= 9 or p = 38 | `Int`  |
//! | NUMERIC, DECIMAL              | otherwise                         | `Double`    |
//! | DOUBLE, FLOAT, BIGINT         |                                   | `Double`    |
//! | anything else                 |                                   | `Object`    |
//!
//! Dialects that store wide integers in `NUMERIC(38, 0)` can opt into `Double`
//! for that case through [`Dialect::wide_integer_is_floating`].

use crate::driver::{ColumnDescriptor, SqlTypeCode, UNDEFINED_SCALE};
use crate::error::StatementFailure;
use std::fmt;
use tracing::debug;

use super::mapping::ColumnType;

const TYPES_LOG: &str = "rolap_sql::types";

/// Database product a dialect speaks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseProduct {
    Generic,
    Oracle,
    Netezza,
    Greenplum,
    Postgres,
    MySql,
    Vertica,
    Exasol,
}

impl fmt::Display for DatabaseProduct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DatabaseProduct::Generic => "GENERIC",
            DatabaseProduct::Oracle => "ORACLE",
            DatabaseProduct::Netezza => "NETEZZA",
            DatabaseProduct::Greenplum => "GREENPLUM",
            DatabaseProduct::Postgres => "POSTGRES",
            DatabaseProduct::MySql => "MYSQL",
            DatabaseProduct::Vertica => "VERTICA",
            DatabaseProduct::Exasol => "EXASOL",
        };
        write!(f, "{}", name)
    }
}

/// Database-specific hooks for column type inference.
pub trait Dialect: Send + Sync {
    /// The database product this dialect speaks for.
    fn database_product(&self) -> DatabaseProduct;

    /// Whether `NUMERIC(38, 0)` columns hold values too wide for an integer read.
    fn wide_integer_is_floating(&self) -> bool {
        self.database_product() == DatabaseProduct::Netezza
    }

    /// Full override of the inferred type for a column. `None` falls back to
    /// the built-in rules.
    fn column_type(&self, _column: &ColumnDescriptor) -> Option<ColumnType> {
        None
    }
}

/// Dialect with no overrides beyond its product's defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenericDialect {
    product: DatabaseProduct,
}

impl GenericDialect {
    pub fn new(product: DatabaseProduct) -> Self {
        Self { product }
    }
}

impl Default for GenericDialect {
    fn default() -> Self {
        Self::new(DatabaseProduct::Generic)
    }
}

impl Dialect for GenericDialect {
    fn database_product(&self) -> DatabaseProduct {
        self.product
    }
}

/// Infer the type of a single column.
///
/// # Arguments
/// * `suggested` - Caller's suggestion, used verbatim when present
/// * `column` - Driver metadata for the column
/// * `dialect` - Optional dialect hooks
pub fn infer_column_type(
    suggested: Option<ColumnType>,
    column: &ColumnDescriptor,
    dialect: Option<&dyn Dialect>,
) -> ColumnType {
    if let Some(column_type) = suggested {
        return column_type;
    }
    if let Some(column_type) = dialect.and_then(|d| d.column_type(column)) {
        debug!(
            target: TYPES_LOG,
            column = %column.name,
            column_type = %column_type,
            "dialect override"
        );
        return column_type;
    }

    match column.type_code {
        SqlTypeCode::SmallInt | SqlTypeCode::Integer | SqlTypeCode::Boolean => ColumnType::Int,
        SqlTypeCode::Numeric => {
            if column.precision == 0 && column.is_unscaled() && is_plain_number(&column.type_name)
            {
                // Unsized NUMBER: count-like unless it is an aggregated measure
                if is_measure_alias(&column.name) {
                    ColumnType::Object
                } else {
                    ColumnType::Int
                }
            } else {
                decimal_type(column, dialect)
            }
        }
        SqlTypeCode::Decimal => decimal_type(column, dialect),
        SqlTypeCode::Double | SqlTypeCode::Float | SqlTypeCode::BigInt => ColumnType::Double,
        _ => ColumnType::Object,
    }
}

/// Infer the types of all columns of a result.
///
/// # Errors
/// Returns `StatementFailure::ContractViolation` if a suggestion list is given
/// and its length differs from the column count.
pub fn infer_column_types(
    suggested: Option<&[Option<ColumnType>]>,
    columns: &[ColumnDescriptor],
    dialect: Option<&dyn Dialect>,
) -> Result<Vec<ColumnType>, StatementFailure> {
    if let Some(suggested) = suggested {
        if suggested.len() != columns.len() {
            return Err(StatementFailure::ContractViolation(format!(
                "{} suggested column types for {} result columns",
                suggested.len(),
                columns.len()
            )));
        }
    }

    let types = columns
        .iter()
        .enumerate()
        .map(|(i, column)| {
            let hint = suggested.and_then(|s| s[i]);
            infer_column_type(hint, column, dialect)
        })
        .collect::<Vec<_>>();

    debug!(target: TYPES_LOG, ?types, "inferred column types");
    Ok(types)
}

fn decimal_type(column: &ColumnDescriptor, dialect: Option<&dyn Dialect>) -> ColumnType {
    let precision = column.precision;
    let scale = column.scale;

    if scale == 0 && precision == 38 && dialect.is_some_and(|d| d.wide_integer_is_floating()) {
        return ColumnType::Double;
    }
    if (scale == 0 || scale == UNDEFINED_SCALE) && (precision <= 9 || precision == 38) {
        ColumnType::Int
    } else {
        ColumnType::Double
    }
}

fn is_plain_number(type_name: &str) -> bool {
    type_name.eq_ignore_ascii_case("NUMBER") || type_name.eq_ignore_ascii_case("NUMERIC")
}

/// Aggregated measures are aliased `m0`, `m1`, ... by the SQL generator.
fn is_measure_alias(name: &str) -> bool {
    name.strip_prefix('m')
        .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric(name: &str, precision: i32, scale: i32) -> ColumnDescriptor {
        ColumnDescriptor::new(name, SqlTypeCode::Numeric, "NUMERIC")
            .with_precision_scale(precision, scale)
    }

    fn decimal(precision: i32, scale: i32) -> ColumnDescriptor {
        ColumnDescriptor::new("c0", SqlTypeCode::Decimal, "DECIMAL")
            .with_precision_scale(precision, scale)
    }

    struct VarcharAsString;

    impl Dialect for VarcharAsString {
        fn database_product(&self) -> DatabaseProduct {
            DatabaseProduct::Postgres
        }

        fn column_type(&self, column: &ColumnDescriptor) -> Option<ColumnType> {
            (column.type_code == SqlTypeCode::Varchar).then_some(ColumnType::String)
        }
    }

    #[test]
    fn test_suggested_type_wins() {
        let column = decimal(10, 2);
        assert_eq!(
            infer_column_type(Some(ColumnType::Long), &column, None),
            ColumnType::Long
        );
    }

    #[test]
    fn test_integer_family() {
        for code in [SqlTypeCode::SmallInt, SqlTypeCode::Integer, SqlTypeCode::Boolean] {
            let column = ColumnDescriptor::new("c0", code, "INT");
            assert_eq!(infer_column_type(None, &column, None), ColumnType::Int);
        }
    }

    #[test]
    fn test_floating_family() {
        for code in [SqlTypeCode::Double, SqlTypeCode::Float, SqlTypeCode::BigInt] {
            let column = ColumnDescriptor::new("c0", code, "X");
            assert_eq!(infer_column_type(None, &column, None), ColumnType::Double);
        }
    }

    #[test]
    fn test_other_types_are_objects() {
        for code in [
            SqlTypeCode::Varchar,
            SqlTypeCode::Date,
            SqlTypeCode::Real,
            SqlTypeCode::TinyInt,
            SqlTypeCode::Other(2003),
        ] {
            let column = ColumnDescriptor::new("c0", code, "X");
            assert_eq!(infer_column_type(None, &column, None), ColumnType::Object);
        }
    }

    #[test]
    fn test_small_decimal_is_int() {
        assert_eq!(infer_column_type(None, &decimal(9, 0), None), ColumnType::Int);
        assert_eq!(infer_column_type(None, &numeric("c0", 5, 0), None), ColumnType::Int);
    }

    #[test]
    fn test_scaled_decimal_is_double() {
        assert_eq!(infer_column_type(None, &decimal(10, 2), None), ColumnType::Double);
        assert_eq!(infer_column_type(None, &decimal(10, 0), None), ColumnType::Double);
    }

    #[test]
    fn test_undefined_scale_counts_as_unscaled() {
        assert_eq!(
            infer_column_type(None, &decimal(9, UNDEFINED_SCALE), None),
            ColumnType::Int
        );
    }

    #[test]
    fn test_precision_38_is_int_unless_dialect_says_otherwise() {
        let column = numeric("c0", 38, 0);
        assert_eq!(infer_column_type(None, &column, None), ColumnType::Int);

        let generic = GenericDialect::new(DatabaseProduct::Oracle);
        assert_eq!(infer_column_type(None, &column, Some(&generic)), ColumnType::Int);

        let netezza = GenericDialect::new(DatabaseProduct::Netezza);
        assert_eq!(
            infer_column_type(None, &column, Some(&netezza)),
            ColumnType::Double
        );
    }

    #[test]
    fn test_unsized_number_measure_alias() {
        let count = ColumnDescriptor::new("c3", SqlTypeCode::Numeric, "NUMBER");
        assert_eq!(infer_column_type(None, &count, None), ColumnType::Int);

        let measure = ColumnDescriptor::new("m0", SqlTypeCode::Numeric, "number");
        assert_eq!(infer_column_type(None, &measure, None), ColumnType::Object);

        let measure = ColumnDescriptor::new("m12", SqlTypeCode::Numeric, "NUMERIC")
            .with_precision_scale(0, UNDEFINED_SCALE);
        assert_eq!(infer_column_type(None, &measure, None), ColumnType::Object);
    }

    #[test]
    fn test_measure_alias_requires_digits() {
        assert!(is_measure_alias("m0"));
        assert!(is_measure_alias("m42"));
        assert!(!is_measure_alias("m"));
        assert!(!is_measure_alias("month"));
        assert!(!is_measure_alias("M0"));

        let column = ColumnDescriptor::new("month", SqlTypeCode::Numeric, "NUMBER");
        assert_eq!(infer_column_type(None, &column, None), ColumnType::Int);
    }

    #[test]
    fn test_unsized_number_with_other_type_name_uses_decimal_rules() {
        let column = ColumnDescriptor::new("m0", SqlTypeCode::Numeric, "FLOAT8");
        // precision 0 <= 9 with scale 0
        assert_eq!(infer_column_type(None, &column, None), ColumnType::Int);
    }

    #[test]
    fn test_dialect_override_precedes_builtin_rules() {
        let column = ColumnDescriptor::new("name", SqlTypeCode::Varchar, "VARCHAR");
        assert_eq!(
            infer_column_type(None, &column, Some(&VarcharAsString)),
            ColumnType::String
        );
        assert_eq!(infer_column_type(None, &column, None), ColumnType::Object);

        // hints still win over the dialect
        assert_eq!(
            infer_column_type(Some(ColumnType::Object), &column, Some(&VarcharAsString)),
            ColumnType::Object
        );
    }

    #[test]
    fn test_infer_column_types_with_partial_hints() {
        let columns = vec![decimal(10, 2), decimal(5, 0)];
        let hints = vec![Some(ColumnType::String), None];

        let types = infer_column_types(Some(&hints), &columns, None).unwrap();
        assert_eq!(types, vec![ColumnType::String, ColumnType::Int]);
    }

    #[test]
    fn test_infer_column_types_rejects_length_mismatch() {
        let columns = vec![decimal(10, 2)];
        let hints = vec![None, None];

        let result = infer_column_types(Some(&hints), &columns, None);
        assert!(matches!(result, Err(StatementFailure::ContractViolation(_))));
    }

    #[test]
    fn test_product_display() {
        assert_eq!(DatabaseProduct::Netezza.to_string(), "NETEZZA");
        assert_eq!(GenericDialect::default().database_product(), DatabaseProduct::Generic);
    }
}
