//! In-memory field values

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};

/// Значение поля в памяти формы.
///
/// Один вариант на семейство типов; конвертация из/в проводное
/// представление выполняется в `coercion`.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FieldValue {
    /// «Нет значения»
    #[default]
    Empty,
    Text(String),
    Bool(bool),
    Integer(i64),
    Number(f64),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Choice(Value),
    /// Первичный ключ связанной записи
    Related(Value),
    File(FileValue),
    /// Строки табличного поля
    Rows(Vec<Map<String, Value>>),
    /// Не приводится на этом уровне (вложенные/зависимые поля)
    Raw(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FileValue {
    /// Уже загруженный на сервер файл (URL)
    Existing(String),
    /// Новый файл, выбранный пользователем
    Upload(FileHandle),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileHandle {
    pub name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl FileHandle {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: None,
            bytes,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

impl FieldValue {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.is_empty(),
            Self::Choice(v) | Self::Related(v) | Self::Raw(v) => v.is_null(),
            _ => false,
        }
    }

    pub fn is_upload(&self) -> bool {
        matches!(self, Self::File(FileValue::Upload(_)))
    }

    /// Первичный ключ для связанного поля
    pub fn primary_key(&self) -> Option<&Value> {
        match self {
            Self::Related(v) if !v.is_null() => Some(v),
            _ => None,
        }
    }

    /// Строка для `<input value=...>`
    ///
    /// Даты в формате HTML-инпутов (`YYYY-MM-DD`, `YYYY-MM-DDTHH:MM:SS`).
    pub fn input_string(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Text(s) => s.clone(),
            Self::Bool(b) => b.to_string(),
            Self::Integer(n) => n.to_string(),
            Self::Number(n) => n.to_string(),
            Self::Date(d) => d.format("%Y-%m-%d").to_string(),
            Self::DateTime(dt) => dt.format("%Y-%m-%dT%H:%M:%S").to_string(),
            Self::Choice(v) | Self::Related(v) | Self::Raw(v) => value_to_plain_string(v),
            Self::File(FileValue::Existing(url)) => url.clone(),
            Self::File(FileValue::Upload(handle)) => handle.name.clone(),
            Self::Rows(rows) => format!("{} rows", rows.len()),
        }
    }
}

/// Значение JSON без кавычек для строк (для query-параметров, URL и инпутов)
pub fn value_to_plain_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(value_to_plain_string)
            .collect::<Vec<_>>()
            .join(","),
        other => other.to_string(),
    }
}
