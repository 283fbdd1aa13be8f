//! Column metadata reported by native cursors.

/// Scale value drivers report when a numeric column has no declared scale.
pub const UNDEFINED_SCALE: i32 = -127;

/// SQL type code of a result column, as reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlTypeCode {
    Boolean,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Numeric,
    Decimal,
    Double,
    Float,
    Real,
    Char,
    Varchar,
    Date,
    Timestamp,
    /// Any other vendor or standard code
    Other(i32),
}

impl SqlTypeCode {
    /// Map a standard SQL type code (the `java.sql.Types` numbering most
    /// drivers report) to a type code.
    pub fn from_code(code: i32) -> Self {
        match code {
            16 => SqlTypeCode::Boolean,
            -6 => SqlTypeCode::TinyInt,
            5 => SqlTypeCode::SmallInt,
            4 => SqlTypeCode::Integer,
            -5 => SqlTypeCode::BigInt,
            2 => SqlTypeCode::Numeric,
            3 => SqlTypeCode::Decimal,
            8 => SqlTypeCode::Double,
            6 => SqlTypeCode::Float,
            7 => SqlTypeCode::Real,
            1 => SqlTypeCode::Char,
            12 => SqlTypeCode::Varchar,
            91 => SqlTypeCode::Date,
            93 => SqlTypeCode::Timestamp,
            other => SqlTypeCode::Other(other),
        }
    }

    /// The standard numeric code for this type.
    pub fn code(&self) -> i32 {
        match self {
            SqlTypeCode::Boolean => 16,
            SqlTypeCode::TinyInt => -6,
            SqlTypeCode::SmallInt => 5,
            SqlTypeCode::Integer => 4,
            SqlTypeCode::BigInt => -5,
            SqlTypeCode::Numeric => 2,
            SqlTypeCode::Decimal => 3,
            SqlTypeCode::Double => 8,
            SqlTypeCode::Float => 6,
            SqlTypeCode::Real => 7,
            SqlTypeCode::Char => 1,
            SqlTypeCode::Varchar => 12,
            SqlTypeCode::Date => 91,
            SqlTypeCode::Timestamp => 93,
            SqlTypeCode::Other(code) => *code,
        }
    }
}

impl From<i32> for SqlTypeCode {
    fn from(code: i32) -> Self {
        SqlTypeCode::from_code(code)
    }
}

/// Metadata for one result column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    /// Column label
    pub name: String,
    /// SQL type code
    pub type_code: SqlTypeCode,
    /// Database-specific type name (e.g. `NUMBER`)
    pub type_name: String,
    /// Declared precision, 0 when unknown
    pub precision: i32,
    /// Declared scale, [`UNDEFINED_SCALE`] when the database has none
    pub scale: i32,
}

impl ColumnDescriptor {
    /// Create a descriptor with zero precision and scale.
    pub fn new(
        name: impl Into<String>,
        type_code: SqlTypeCode,
        type_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            type_code,
            type_name: type_name.into(),
            precision: 0,
            scale: 0,
        }
    }

    /// Set precision and scale.
    pub fn with_precision_scale(mut self, precision: i32, scale: i32) -> Self {
        self.precision = precision;
        self.scale = scale;
        self
    }

    /// Whether the scale is zero or undefined.
    pub fn is_unscaled(&self) -> bool {
        self.scale == 0 || self.scale == UNDEFINED_SCALE
    }
}

/// Cursor navigation mode requested when creating a native statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorKind {
    /// Rows can only be read in order
    #[default]
    ForwardOnly,
    /// The cursor can be positioned on an absolute row
    Scrollable,
}
