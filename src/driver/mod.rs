//! Native driver contract.
//!
//! The statement engine never talks to a database directly. It drives the
//! traits in this module, which a driver adapter (or a test fake) implements.

pub mod metadata;
pub mod protocol;

pub use metadata::{ColumnDescriptor, CursorKind, SqlTypeCode, UNDEFINED_SCALE};
pub use protocol::{CancelHandle, ConnectionSource, NativeConnection, NativeCursor, NativeStatement};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_exports() {
        let _ = CursorKind::Scrollable;
        let _ = SqlTypeCode::Numeric;
        assert_eq!(UNDEFINED_SCALE, -127);
    }
}
