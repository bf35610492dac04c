//! Form state and validation error set

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::value::FieldValue;

/// Текущие значения формы по пути поля.
///
/// Изменяется только через сессию (`FormSession::set_value` и т.п.);
/// каждое поле владеет только своим путём.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormState {
    values: BTreeMap<String, FieldValue>,
}

impl FormState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<&FieldValue> {
        self.values.get(path)
    }

    pub fn set(&mut self, path: impl Into<String>, value: FieldValue) {
        self.values.insert(path.into(), value);
    }

    pub fn remove(&mut self, path: &str) -> Option<FieldValue> {
        self.values.remove(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.values.contains_key(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.values.iter()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Записать ячейку табличного поля (`table.idx.column`).
    ///
    /// Недостающие строки дополняются пустыми объектами.
    pub fn set_cell(&mut self, table_path: &str, row: usize, column: &str, value: Value) {
        let entry = self
            .values
            .entry(table_path.to_string())
            .or_insert_with(|| FieldValue::Rows(Vec::new()));
        if !matches!(entry, FieldValue::Rows(_)) {
            *entry = FieldValue::Rows(Vec::new());
        }
        if let FieldValue::Rows(rows) = entry {
            while rows.len() <= row {
                rows.push(Map::new());
            }
            rows[row].insert(column.to_string(), value);
        }
    }

    pub fn rows(&self, table_path: &str) -> &[Map<String, Value>] {
        match self.values.get(table_path) {
            Some(FieldValue::Rows(rows)) => rows,
            _ => &[],
        }
    }

    pub fn push_row(&mut self, table_path: &str, row: Map<String, Value>) -> usize {
        let entry = self
            .values
            .entry(table_path.to_string())
            .or_insert_with(|| FieldValue::Rows(Vec::new()));
        if !matches!(entry, FieldValue::Rows(_)) {
            *entry = FieldValue::Rows(Vec::new());
        }
        match entry {
            FieldValue::Rows(rows) => {
                rows.push(row);
                rows.len() - 1
            }
            _ => 0,
        }
    }

    pub fn remove_row(&mut self, table_path: &str, row: usize) -> bool {
        match self.values.get_mut(table_path) {
            Some(FieldValue::Rows(rows)) if row < rows.len() => {
                rows.remove(row);
                true
            }
            _ => false,
        }
    }
}

/// Ошибки валидации одной попытки отправки
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationErrorSet {
    pub field_errors: BTreeMap<String, Vec<String>>,
    pub non_field_errors: Vec<String>,
}

impl ValidationErrorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.field_errors.is_empty() && self.non_field_errors.is_empty()
    }

    pub fn clear(&mut self) {
        self.field_errors.clear();
        self.non_field_errors.clear();
    }

    pub fn add_field_errors(&mut self, path: impl Into<String>, messages: Vec<String>) {
        if messages.is_empty() {
            return;
        }
        self.field_errors
            .entry(path.into())
            .or_default()
            .extend(messages);
    }

    pub fn add_non_field_errors(&mut self, messages: impl IntoIterator<Item = String>) {
        self.non_field_errors.extend(messages);
    }

    pub fn get(&self, path: &str) -> &[String] {
        self.field_errors
            .get(path)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Ошибки под префиксом `prefix.` с путями относительно префикса
    pub fn under_prefix(&self, prefix: &str) -> BTreeMap<String, Vec<String>> {
        let prefix = format!("{}.", prefix);
        self.field_errors
            .iter()
            .filter_map(|(path, messages)| {
                path.strip_prefix(&prefix)
                    .map(|rest| (rest.to_string(), messages.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_cell_extends_rows() {
        let mut state = FormState::new();
        state.set_cell("choices", 2, "label", json!("Third"));

        let rows = state.rows("choices");
        assert_eq!(rows.len(), 3);
        assert!(rows[0].is_empty());
        assert_eq!(rows[2]["label"], json!("Third"));
    }

    #[test]
    fn test_push_and_remove_rows() {
        let mut state = FormState::new();
        state.push_row("lines", Map::new());
        let idx = state.push_row("lines", Map::new());
        assert_eq!(idx, 1);
        assert!(state.remove_row("lines", 0));
        assert!(!state.remove_row("lines", 5));
        assert_eq!(state.rows("lines").len(), 1);
    }

    #[test]
    fn test_errors_under_prefix() {
        let mut errors = ValidationErrorSet::new();
        errors.add_field_errors("choices.0.value", vec!["Required".into()]);
        errors.add_field_errors("choices", vec!["Bad".into()]);
        errors.add_field_errors("choicesx.1", vec!["Other".into()]);

        let under = errors.under_prefix("choices");
        assert_eq!(under.len(), 1);
        assert_eq!(under["0.value"], vec!["Required".to_string()]);
        assert_eq!(errors.get("choices"), ["Bad".to_string()]);
        assert!(errors.get("missing").is_empty());
    }

    #[test]
    fn test_empty_messages_ignored() {
        let mut errors = ValidationErrorSet::new();
        errors.add_field_errors("x", Vec::new());
        assert!(errors.is_empty());
    }
}
