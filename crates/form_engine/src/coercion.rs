//! Value coercion layer
//!
//! Converts between the wire representation (JSON) and `FieldValue`
//! per field type. Malformed input becomes `FieldValue::Empty`, never an error.

use chrono::{NaiveDate, NaiveDateTime};
use contracts::shared::forms::FieldType;
use serde_json::{Number, Value};

use crate::value::{FieldValue, FileValue};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Форматы, принимаемые на входе для datetime (провод + HTML-инпуты)
const DATETIME_INPUT_FORMATS: [&str; 3] = [DATETIME_FORMAT, "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coercer {
    decimal_places: u32,
}

impl Default for Coercer {
    fn default() -> Self {
        Self { decimal_places: 6 }
    }
}

impl Coercer {
    pub fn new(decimal_places: u32) -> Self {
        Self { decimal_places }
    }

    /// Провод -> значение в памяти
    pub fn coerce_in(&self, raw: &Value, field_type: FieldType) -> FieldValue {
        match field_type {
            FieldType::String
            | FieldType::Email
            | FieldType::Url
            | FieldType::Password
            | FieldType::Icon => match raw {
                Value::Null => FieldValue::Empty,
                Value::String(s) => FieldValue::Text(s.clone()),
                Value::Number(n) => FieldValue::Text(n.to_string()),
                Value::Bool(b) => FieldValue::Text(b.to_string()),
                other => FieldValue::Text(other.to_string()),
            },
            FieldType::Boolean => FieldValue::Bool(is_truthy(raw)),
            FieldType::Integer => match parse_number(raw).and_then(to_integer) {
                Some(n) => FieldValue::Integer(n),
                None => FieldValue::Empty,
            },
            FieldType::Decimal | FieldType::Float => match parse_number(raw) {
                Some(n) => FieldValue::Number(self.round(n)),
                None => FieldValue::Empty,
            },
            FieldType::Date => match raw.as_str().and_then(parse_date) {
                Some(date) => FieldValue::Date(date),
                None => FieldValue::Empty,
            },
            FieldType::DateTime => match raw.as_str().and_then(parse_datetime) {
                Some(dt) => FieldValue::DateTime(dt),
                None => FieldValue::Empty,
            },
            FieldType::Choice => match raw {
                Value::Null => FieldValue::Empty,
                Value::String(s) if s.is_empty() => FieldValue::Empty,
                other => FieldValue::Choice(other.clone()),
            },
            FieldType::RelatedModel => match raw {
                Value::Null => FieldValue::Empty,
                Value::String(s) if s.is_empty() => FieldValue::Empty,
                other => FieldValue::Related(other.clone()),
            },
            FieldType::FileUpload => match raw {
                Value::String(url) if !url.is_empty() => {
                    FieldValue::File(FileValue::Existing(url.clone()))
                }
                _ => FieldValue::Empty,
            },
            FieldType::NestedObject | FieldType::DependentField => match raw {
                Value::Null => FieldValue::Empty,
                other => FieldValue::Raw(other.clone()),
            },
            FieldType::Table => match raw {
                Value::Array(items) => FieldValue::Rows(
                    items
                        .iter()
                        .filter_map(|item| item.as_object().cloned())
                        .collect(),
                ),
                _ => FieldValue::Empty,
            },
        }
    }

    /// Значение в памяти -> провод
    ///
    /// Никогда не возвращает NaN/бесконечность: такие числа становятся `null`.
    pub fn coerce_out(&self, value: &FieldValue, field_type: FieldType) -> Value {
        match value {
            FieldValue::Empty => match field_type {
                FieldType::Boolean => Value::Bool(false),
                FieldType::Table => Value::Array(Vec::new()),
                _ => Value::Null,
            },
            FieldValue::Text(s) => {
                if field_type.is_numeric() || field_type == FieldType::Boolean {
                    let coerced = self.coerce_in(&Value::String(s.clone()), field_type);
                    self.coerce_out(&coerced, field_type)
                } else {
                    Value::String(s.clone())
                }
            }
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Integer(n) => match field_type {
                FieldType::Decimal | FieldType::Float => number_value(*n as f64),
                _ => Value::from(*n),
            },
            FieldValue::Number(n) => match field_type {
                FieldType::Integer => to_integer(*n).map(Value::from).unwrap_or(Value::Null),
                _ => number_value(self.round(*n)),
            },
            FieldValue::Date(date) => Value::String(date.format(DATE_FORMAT).to_string()),
            FieldValue::DateTime(dt) => match field_type {
                FieldType::Date => Value::String(dt.date().format(DATE_FORMAT).to_string()),
                _ => Value::String(dt.format(DATETIME_FORMAT).to_string()),
            },
            FieldValue::Choice(v) | FieldValue::Related(v) | FieldValue::Raw(v) => v.clone(),
            FieldValue::File(FileValue::Existing(url)) => Value::String(url.clone()),
            FieldValue::File(FileValue::Upload(handle)) => Value::String(handle.name.clone()),
            FieldValue::Rows(rows) => Value::Array(
                rows.iter().cloned().map(Value::Object).collect(),
            ),
        }
    }

    fn round(&self, n: f64) -> f64 {
        let factor = 10f64.powi(self.decimal_places as i32);
        let rounded = (n * factor).round() / factor;
        if rounded.is_finite() {
            rounded
        } else {
            n
        }
    }
}

/// `true`, `"true"` (без учёта регистра), `1`, `"1"` -> истина; всё остальное -> ложь
pub fn is_truthy(raw: &Value) -> bool {
    match raw {
        Value::Bool(b) => *b,
        Value::String(s) => {
            let s = s.trim();
            s.eq_ignore_ascii_case("true") || s == "1"
        }
        Value::Number(n) => n.as_f64() == Some(1.0),
        _ => false,
    }
}

/// Число из строки или числа; пустая строка и не-конечные значения -> `None`
pub fn parse_number(raw: &Value) -> Option<f64> {
    let n = match raw {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            s.parse::<f64>().ok()?
        }
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Целая часть числа; за пределами `i64` -> `None`
fn to_integer(n: f64) -> Option<i64> {
    let n = n.trunc();
    // i64::MAX как f64 округляется вверх до 2^63
    (n.is_finite() && n >= i64::MIN as f64 && n < i64::MAX as f64).then(|| n as i64)
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).ok()
}

pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    DATETIME_INPUT_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
}

fn number_value(n: f64) -> Value {
    Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
}
