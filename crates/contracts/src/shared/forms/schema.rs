//! OPTIONS introspection response
//!
//! Backend returns field metadata grouped by the write action:
//! `{"name": ..., "actions": {"POST": {"field": {...}}}}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub type SchemaFields = BTreeMap<String, SchemaField>;

/// Вариант выбора для поля типа `choice`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceEntry {
    pub value: Value,
    pub display_name: String,
}

impl ChoiceEntry {
    pub fn new(value: impl Into<Value>, display_name: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            display_name: display_name.into(),
        }
    }
}

/// Метаданные одного поля, как их описывает сервер
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaField {
    /// Строковый тег типа; разбирается через `FieldType::parse`
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub field_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_only: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<ChoiceEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<BTreeMap<String, Value>>,
    /// Дочерние поля для `nested object`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<SchemaFields>,
    /// Описание строки для `table` (колонки в `child.children`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child: Option<Box<SchemaField>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<Vec<String>>,
}

/// Ответ на OPTIONS-запрос к ресурсу
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptionsResponse {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub actions: BTreeMap<String, SchemaFields>,
}

impl OptionsResponse {
    /// Поля для указанного HTTP-метода.
    ///
    /// Сервер описывает только те действия, которые разрешены пользователю,
    /// поэтому при отсутствии точного совпадения берём POST, затем PUT.
    pub fn fields_for(&self, method: &str) -> Option<&SchemaFields> {
        let method = method.to_ascii_uppercase();
        self.actions
            .get(&method)
            .or_else(|| self.actions.get("POST"))
            .or_else(|| self.actions.get("PUT"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "name": "Sales Order",
        "actions": {
            "POST": {
                "reference": {"type": "string", "required": true, "label": "Reference"},
                "customer": {
                    "type": "related field",
                    "api_url": "/api/company/",
                    "model": "company",
                    "filters": {"is_customer": true}
                },
                "status": {
                    "type": "choice",
                    "choices": [{"value": 10, "display_name": "Pending"}]
                },
                "lines": {
                    "type": "table",
                    "child": {"children": {"quantity": {"type": "decimal"}}}
                }
            }
        }
    }"#;

    #[test]
    fn test_parse_options_response() {
        let options: OptionsResponse = serde_json::from_str(SAMPLE).unwrap();
        let fields = options.fields_for("post").unwrap();

        assert_eq!(fields["reference"].required, Some(true));
        assert_eq!(fields["customer"].api_url.as_deref(), Some("/api/company/"));
        assert_eq!(
            fields["status"].choices.as_ref().unwrap()[0],
            ChoiceEntry::new(10, "Pending")
        );
        let columns = fields["lines"].child.as_ref().unwrap().children.as_ref().unwrap();
        assert_eq!(columns["quantity"].field_type.as_deref(), Some("decimal"));
    }

    #[test]
    fn test_fields_for_falls_back_to_post() {
        let options: OptionsResponse = serde_json::from_str(SAMPLE).unwrap();
        assert!(options.fields_for("PATCH").is_some());
        assert!(OptionsResponse::default().fields_for("POST").is_none());
    }
}
