//! Validation error body conventions (HTTP 400)
//!
//! Body is a mapping from field path to a list of messages or,
//! for nested objects and tables, a nested mapping/array.

/// Ключ ошибок, не относящихся к конкретному полю
pub const NON_FIELD_ERRORS_KEY: &str = "non_field_errors";

/// Ключ «ошибки для всей формы»
pub const ALL_ERRORS_KEY: &str = "__all__";

pub fn is_non_field_key(key: &str) -> bool {
    key == NON_FIELD_ERRORS_KEY || key == ALL_ERRORS_KEY
}
