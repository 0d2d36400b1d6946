//! Database utility functions for SQLite type conversions.
//!
//! SQLite has no native boolean column type, so booleans are stored as
//! `0`/`1` integers throughout the schema.

/// Convert a boolean to an integer (for SQLite storage).
pub fn bool_to_int(b: bool) -> i32 {
    if b { 1 } else { 0 }
}

/// Convert an integer to a boolean (from SQLite storage). Any non-zero
/// value is treated as `true`.
pub fn int_to_bool(i: i32) -> bool {
    i != 0
}

/// RFC3339 timestamp for `created_at`/`updated_at` columns.
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_int_roundtrip() {
        assert_eq!(bool_to_int(true), 1);
        assert_eq!(bool_to_int(false), 0);
        assert!(int_to_bool(1));
        assert!(!int_to_bool(0));
        assert!(int_to_bool(-7));
    }
}
