//! Validation error mapping (HTTP 400 body → field paths)
//!
//! The body is a mapping from field name to a list of messages or a nested
//! mapping. Messages land on the owning field; anything the user cannot act
//! on (unknown field, hidden field, `non_field_errors`, `__all__`) is demoted
//! to the non-field list.

use contracts::shared::forms::is_non_field_key;
use serde_json::{Map, Value};

use crate::definition::{FieldDefinition, FieldKind, FieldSlot};
use crate::resolver::join_path;
use crate::state::ValidationErrorSet;

pub fn map_validation_errors(body: &Value, definitions: &[FieldSlot]) -> ValidationErrorSet {
    let mut errors = ValidationErrorSet::new();
    match body {
        Value::Object(map) => map_object(&mut errors, map, definitions, ""),
        other => errors.add_non_field_errors(collect_messages(other)),
    }
    errors
}

fn map_object(errors: &mut ValidationErrorSet, map: &Map<String, Value>, slots: &[FieldSlot], prefix: &str) {
    for (key, value) in map {
        if is_non_field_key(key) {
            if prefix.is_empty() {
                errors.add_non_field_errors(collect_messages(value));
            } else {
                // Общие ошибки вложенного объекта относятся к самому объекту
                errors.add_field_errors(prefix, collect_messages(value));
            }
            continue;
        }

        let path = join_path(prefix, key);
        let definition = slots
            .iter()
            .flatten()
            .find(|definition| definition.path == path)
            .map(FieldDefinition::effective);

        match definition {
            Some(definition) if !definition.hidden => map_field(errors, definition, value),
            _ => demote(errors, &path, value),
        }
    }
}

fn map_field(errors: &mut ValidationErrorSet, definition: &FieldDefinition, value: &Value) {
    let path = definition.path.as_str();
    match (&definition.kind, value) {
        (FieldKind::Nested(children), Value::Object(map)) => map_object(errors, map, children, path),
        (FieldKind::Table(_), Value::Array(rows)) if rows.iter().any(|row| !is_message(row)) => {
            for (index, row) in rows.iter().enumerate() {
                map_row(errors, path, &index.to_string(), row);
            }
        }
        // Вариант с индексами строк в виде ключей: {"0": {...}}
        (FieldKind::Table(_), Value::Object(rows)) => {
            for (index, row) in rows {
                if is_non_field_key(index) {
                    errors.add_field_errors(path, collect_messages(row));
                } else {
                    map_row(errors, path, index, row);
                }
            }
        }
        _ => errors.add_field_errors(path, collect_messages(value)),
    }
}

fn map_row(errors: &mut ValidationErrorSet, table_path: &str, index: &str, row: &Value) {
    let row_path = join_path(table_path, index);
    match row {
        Value::Object(cells) => {
            for (column, messages) in cells {
                if is_non_field_key(column) {
                    errors.add_field_errors(row_path.clone(), collect_messages(messages));
                } else {
                    errors.add_field_errors(join_path(&row_path, column), collect_messages(messages));
                }
            }
        }
        other => errors.add_field_errors(row_path, collect_messages(other)),
    }
}

fn demote(errors: &mut ValidationErrorSet, path: &str, value: &Value) {
    log::debug!("Validation error for unaddressable field '{}'", path);
    errors.add_non_field_errors(
        collect_messages(value)
            .into_iter()
            .map(|message| format!("{}: {}", path, message)),
    );
}

fn is_message(value: &Value) -> bool {
    matches!(value, Value::String(_))
}

/// Все сообщения из значения ошибки (строка, список, вложенный объект)
pub fn collect_messages(value: &Value) -> Vec<String> {
    match value {
        Value::Null => Vec::new(),
        Value::String(message) => vec![message.clone()],
        Value::Array(items) => items.iter().flat_map(collect_messages).collect(),
        Value::Object(map) => map.values().flat_map(collect_messages).collect(),
        other => vec![other.to_string()],
    }
}
