//! Wire contracts for API-driven forms
//!
//! Shapes exchanged with the REST backend:
//! - `field_type`: closed set of field type tags
//! - `schema`: OPTIONS introspection response (per-field metadata)
//! - `list`: collection responses (paged `{results, count}` or bare array)
//! - `validation`: 400 error body conventions
//!
//! ## Usage
//!
//! ```rust,ignore
//! use contracts::shared::forms::{FieldType, OptionsResponse};
//!
//! let options: OptionsResponse = serde_json::from_str(body)?;
//! if let Some(fields) = options.fields_for("POST") {
//!     for (name, field) in fields {
//!         println!("{}: {:?}", name, field.field_type);
//!     }
//! }
//! ```

mod field_type;
mod list;
mod schema;
mod validation;

pub use field_type::FieldType;
pub use list::{ListPage, ListResponse};
pub use schema::{ChoiceEntry, OptionsResponse, SchemaField, SchemaFields};
pub use validation::{is_non_field_key, ALL_ERRORS_KEY, NON_FIELD_ERRORS_KEY};
