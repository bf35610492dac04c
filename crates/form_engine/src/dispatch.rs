//! Field renderer dispatch
//!
//! Pure tag-based selection of a widget descriptor per field type.
//! UI layers map `Widget` to concrete components; edits go back through
//! `FormSession` using `BoundWidget::path`.

use contracts::shared::forms::{ChoiceEntry, FieldType};
use std::collections::BTreeMap;

use crate::definition::{
    DependentRef, ErrorDisplay, FieldDefinition, FieldKind, FieldSlot, RelatedModelRef,
};
use crate::value::FieldValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextInput {
    Text,
    Email,
    Url,
    Password,
}

impl TextInput {
    /// Значение атрибута `type` для `<input>`
    pub fn html_type(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Email => "email",
            Self::Url => "url",
            Self::Password => "password",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberInput {
    Integer,
    Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Widget {
    Text(TextInput),
    Checkbox,
    Number(NumberInput),
    Date,
    DateTime,
    Select(Vec<ChoiceEntry>),
    RelatedModel(RelatedModelRef),
    FileUpload,
    IconPicker,
    Nested(Vec<BoundWidget>),
    /// `child == None`, пока определение не получено с сервера
    Dependent {
        depends_on: Vec<String>,
        child: Option<Box<BoundWidget>>,
    },
    Table {
        columns: Vec<BoundWidget>,
        row_errors: BTreeMap<String, Vec<String>>,
    },
    /// Ничего не рисуется, значение участвует в отправке
    Hidden,
    /// Инлайн-маркер ошибки определения поля
    ErrorMarker { message: String },
}

impl Widget {
    /// Короткое имя вида виджета (ключ для пересоздания компонента)
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(TextInput::Text) => "text",
            Self::Text(TextInput::Email) => "email",
            Self::Text(TextInput::Url) => "url",
            Self::Text(TextInput::Password) => "password",
            Self::Checkbox => "checkbox",
            Self::Number(NumberInput::Integer) => "integer",
            Self::Number(NumberInput::Decimal) => "decimal",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::Select(_) => "select",
            Self::RelatedModel(_) => "related",
            Self::FileUpload => "file",
            Self::IconPicker => "icon",
            Self::Nested(_) => "nested",
            Self::Dependent { .. } => "dependent",
            Self::Table { .. } => "table",
            Self::Hidden => "hidden",
            Self::ErrorMarker { .. } => "error",
        }
    }
}

/// Виджет, привязанный к пути поля и текущему значению
#[derive(Debug, Clone, PartialEq)]
pub struct BoundWidget {
    pub path: String,
    pub label: String,
    pub description: Option<String>,
    pub placeholder: Option<String>,
    pub required: bool,
    pub disabled: bool,
    pub field_type: Option<FieldType>,
    pub value: FieldValue,
    pub error: ErrorDisplay,
    pub widget: Widget,
}

impl BoundWidget {
    pub fn is_rendered(&self) -> bool {
        !matches!(self.widget, Widget::Hidden)
    }
}

pub fn dispatch(slot: &FieldSlot) -> BoundWidget {
    match slot {
        Ok(definition) => dispatch_definition(definition),
        Err(error) => {
            let field = error.field().unwrap_or_default().to_string();
            BoundWidget {
                path: field.clone(),
                label: field,
                description: None,
                placeholder: None,
                required: false,
                disabled: true,
                field_type: None,
                value: FieldValue::Empty,
                error: ErrorDisplay::None,
                widget: Widget::ErrorMarker {
                    message: error.to_string(),
                },
            }
        }
    }
}

pub fn dispatch_all(slots: &[FieldSlot]) -> Vec<BoundWidget> {
    slots.iter().map(dispatch).collect()
}

/// Поиск виджета по пути с заходом во вложенные и зависимые
pub fn find_widget<'a>(widgets: &'a [BoundWidget], path: &str) -> Option<&'a BoundWidget> {
    for widget in widgets {
        match &widget.widget {
            Widget::Dependent {
                child: Some(child), ..
            } if widget.path == path => return Some(child.as_ref()),
            _ if widget.path == path => return Some(widget),
            Widget::Nested(children) => {
                if let Some(found) = find_widget(children, path) {
                    return Some(found);
                }
            }
            _ => {}
        }
    }
    None
}

fn dispatch_definition(definition: &FieldDefinition) -> BoundWidget {
    let widget = if definition.hidden {
        Widget::Hidden
    } else {
        select_widget(definition)
    };

    BoundWidget {
        path: definition.path.clone(),
        label: definition.label.clone(),
        description: definition.description.clone(),
        placeholder: definition.placeholder.clone(),
        required: definition.required,
        disabled: definition.disabled,
        field_type: Some(definition.field_type),
        value: definition.value.clone(),
        error: definition.display_error(),
        widget,
    }
}

fn select_widget(definition: &FieldDefinition) -> Widget {
    match (definition.field_type, &definition.kind) {
        (FieldType::String, _) => Widget::Text(TextInput::Text),
        (FieldType::Email, _) => Widget::Text(TextInput::Email),
        (FieldType::Url, _) => Widget::Text(TextInput::Url),
        (FieldType::Password, _) => Widget::Text(TextInput::Password),
        (FieldType::Boolean, _) => Widget::Checkbox,
        (FieldType::Integer, _) => Widget::Number(NumberInput::Integer),
        (FieldType::Decimal | FieldType::Float, _) => Widget::Number(NumberInput::Decimal),
        (FieldType::Date, _) => Widget::Date,
        (FieldType::DateTime, _) => Widget::DateTime,
        (FieldType::Choice, FieldKind::Choice(choices)) => Widget::Select(choices.clone()),
        (FieldType::RelatedModel, FieldKind::Related(reference)) => {
            Widget::RelatedModel(reference.clone())
        }
        (FieldType::FileUpload, _) => Widget::FileUpload,
        (FieldType::Icon, _) => Widget::IconPicker,
        (FieldType::NestedObject, FieldKind::Nested(children)) => {
            Widget::Nested(dispatch_all(children))
        }
        (FieldType::DependentField, FieldKind::Dependent(DependentRef { depends_on, child })) => {
            Widget::Dependent {
                depends_on: depends_on.clone(),
                child: child.as_ref().map(|slot| Box::new(dispatch(slot))),
            }
        }
        (FieldType::Table, FieldKind::Table(table)) => Widget::Table {
            columns: dispatch_all(&table.columns),
            row_errors: table.row_errors.clone(),
        },
        (field_type, _) => Widget::ErrorMarker {
            message: format!(
                "Поле '{}': несогласованное определение для типа '{}'",
                definition.name, field_type
            ),
        },
    }
}
