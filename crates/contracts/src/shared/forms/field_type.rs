//! Field type enumeration for API-driven forms

use std::fmt;
use std::str::FromStr;

/// Тип поля формы (закрытое множество)
///
/// На проводе тип передаётся строкой (`"related field"`, `"nested object"` и т.д.),
/// поэтому в DTO схемы он хранится как `String` и разбирается здесь.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    String,
    Email,
    Url,
    Password,
    Boolean,
    Integer,
    Decimal,
    Float,
    Date,
    DateTime,
    Choice,
    RelatedModel,
    FileUpload,
    Icon,
    NestedObject,
    DependentField,
    Table,
}

impl FieldType {
    pub const ALL: [FieldType; 17] = [
        Self::String,
        Self::Email,
        Self::Url,
        Self::Password,
        Self::Boolean,
        Self::Integer,
        Self::Decimal,
        Self::Float,
        Self::Date,
        Self::DateTime,
        Self::Choice,
        Self::RelatedModel,
        Self::FileUpload,
        Self::Icon,
        Self::NestedObject,
        Self::DependentField,
        Self::Table,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Email => "email",
            Self::Url => "url",
            Self::Password => "password",
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::Float => "float",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::Choice => "choice",
            Self::RelatedModel => "related field",
            Self::FileUpload => "file upload",
            Self::Icon => "icon",
            Self::NestedObject => "nested object",
            Self::DependentField => "dependent field",
            Self::Table => "table",
        }
    }

    /// Разбор строкового тега с провода.
    ///
    /// Помимо канонических имён принимает `number` (как `float`) и
    /// варианты с подчёркиванием/camelCase для составных имён.
    pub fn parse(tag: &str) -> Option<Self> {
        let normalized = tag.trim().to_ascii_lowercase().replace(['_', '-'], " ");
        let found = match normalized.as_str() {
            "string" => Self::String,
            "email" => Self::Email,
            "url" => Self::Url,
            "password" => Self::Password,
            "boolean" => Self::Boolean,
            "integer" => Self::Integer,
            "decimal" => Self::Decimal,
            "float" | "number" => Self::Float,
            "date" => Self::Date,
            "datetime" | "date time" => Self::DateTime,
            "choice" => Self::Choice,
            "related field" | "related model" | "relatedmodel" => Self::RelatedModel,
            "file upload" | "fileupload" => Self::FileUpload,
            "icon" => Self::Icon,
            "nested object" | "nestedobject" => Self::NestedObject,
            "dependent field" | "dependentfield" => Self::DependentField,
            "table" => Self::Table,
            _ => return None,
        };
        Some(found)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer | Self::Decimal | Self::Float)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names_parse_back() {
        for field_type in FieldType::ALL {
            assert_eq!(FieldType::parse(field_type.as_str()), Some(field_type));
        }
    }

    #[test]
    fn test_aliases() {
        assert_eq!(FieldType::parse("number"), Some(FieldType::Float));
        assert_eq!(FieldType::parse("relatedModel"), Some(FieldType::RelatedModel));
        assert_eq!(FieldType::parse("nested_object"), Some(FieldType::NestedObject));
        assert_eq!(FieldType::parse("Date-Time"), Some(FieldType::DateTime));
    }

    #[test]
    fn test_unknown_tag() {
        assert_eq!(FieldType::parse("colour"), None);
        assert_eq!("colour".parse::<FieldType>(), Err("colour".to_string()));
    }
}
