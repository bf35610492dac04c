//! Field specifications (author-supplied) and resolved field definitions

use contracts::shared::forms::{ChoiceEntry, FieldType};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::error::FormError;
use crate::state::FormState;
use crate::value::FieldValue;

pub type Filters = BTreeMap<String, Value>;

/// Результат разрешения поля: определение или инлайн-ошибка для этого поля
pub type FieldSlot = Result<FieldDefinition, FormError>;

/// Пользовательский хук поля.
///
/// Сравнивается по идентичности указателя, чтобы определения оставались
/// сравнимыми (`PartialEq`) и повторное разрешение давало равный результат.
pub struct Hook<F: ?Sized>(pub Rc<F>);

impl<F: ?Sized> Clone for Hook<F> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<F: ?Sized> PartialEq for Hook<F> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl<F: ?Sized> fmt::Debug for Hook<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Hook(..)")
    }
}

/// Преобразование значения после стандартного приведения при отправке
pub type AdjustValue = Hook<dyn Fn(Value) -> Value>;
/// Уведомление об изменении значения (со связанной записью, если есть)
pub type OnValueChange = Hook<dyn Fn(&FieldValue, Option<&Value>)>;
/// Пересчёт фильтров связанного поля по текущему состоянию формы
pub type AdjustFilters = Hook<dyn Fn(&Filters, &FormState) -> Filters>;

/// Статическое описание поля, задаваемое автором формы.
///
/// Все `Option` — переопределения поверх серверной схемы.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: Option<String>,
    pub value: Option<Value>,
    pub default: Option<Value>,
    pub required: Option<bool>,
    pub disabled: bool,
    pub hidden: bool,
    pub read_only: Option<bool>,
    /// Не отправлять поле на сервер
    pub exclude: bool,
    pub label: Option<String>,
    pub description: Option<String>,
    pub placeholder: Option<String>,
    pub choices: Option<Vec<ChoiceEntry>>,
    pub api_url: Option<String>,
    pub model: Option<String>,
    pub filters: Option<Filters>,
    pub page_size: Option<usize>,
    /// Автовыбор единственного подходящего варианта
    pub auto_fill: bool,
    pub depends_on: Vec<String>,
    pub children: Vec<FieldSpec>,
    pub adjust_value: Option<AdjustValue>,
    pub on_value_change: Option<OnValueChange>,
    pub adjust_filters: Option<AdjustFilters>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn field_type(mut self, field_type: FieldType) -> Self {
        self.field_type = Some(field_type.as_str().to_string());
        self
    }

    /// Тип строкой как есть (в том числе неизвестный)
    pub fn raw_type(mut self, tag: impl Into<String>) -> Self {
        self.field_type = Some(tag.into());
        self
    }

    pub fn value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = Some(required);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = Some(true);
        self
    }

    pub fn exclude(mut self) -> Self {
        self.exclude = true;
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(placeholder.into());
        self
    }

    pub fn choices(mut self, choices: Vec<ChoiceEntry>) -> Self {
        self.choices = Some(choices);
        self
    }

    pub fn api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = Some(api_url.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn filter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters
            .get_or_insert_with(Filters::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn auto_fill(mut self) -> Self {
        self.auto_fill = true;
        self
    }

    pub fn depends_on(mut self, sibling: impl Into<String>) -> Self {
        self.depends_on.push(sibling.into());
        self
    }

    pub fn child(mut self, child: FieldSpec) -> Self {
        self.children.push(child);
        self
    }

    pub fn adjust_value(mut self, hook: impl Fn(Value) -> Value + 'static) -> Self {
        self.adjust_value = Some(Hook(Rc::new(hook)));
        self
    }

    pub fn on_value_change(mut self, hook: impl Fn(&FieldValue, Option<&Value>) + 'static) -> Self {
        self.on_value_change = Some(Hook(Rc::new(hook)));
        self
    }

    pub fn adjust_filters(mut self, hook: impl Fn(&Filters, &FormState) -> Filters + 'static) -> Self {
        self.adjust_filters = Some(Hook(Rc::new(hook)));
        self
    }
}

/// Нормализованное определение поля после слияния spec + schema + live value
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDefinition {
    pub name: String,
    /// Полный путь через точку (`lines.0.quantity`, `address.city`)
    pub path: String,
    pub field_type: FieldType,
    pub value: FieldValue,
    pub default: FieldValue,
    pub required: bool,
    pub disabled: bool,
    pub hidden: bool,
    pub read_only: bool,
    pub exclude: bool,
    pub label: String,
    pub description: Option<String>,
    pub placeholder: Option<String>,
    pub errors: Vec<String>,
    pub kind: FieldKind,
    pub adjust_value: Option<AdjustValue>,
    pub on_value_change: Option<OnValueChange>,
}

/// Данные, специфичные для семейства типов.
///
/// Ровно один вариант на `field_type`: примитив, ссылка на модель или дочерние поля.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Primitive,
    Choice(Vec<ChoiceEntry>),
    Related(RelatedModelRef),
    Nested(Vec<FieldSlot>),
    Dependent(DependentRef),
    Table(TableRef),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelatedModelRef {
    pub api_url: String,
    pub model: Option<String>,
    pub filters: Filters,
    pub page_size: Option<usize>,
    pub auto_fill: bool,
    pub adjust_filters: Option<AdjustFilters>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DependentRef {
    pub depends_on: Vec<String>,
    /// Определение, полученное с сервера; `None` пока не загружено
    pub child: Option<Box<FieldSlot>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableRef {
    /// Колонки строки (пути относительно строки)
    pub columns: Vec<FieldSlot>,
    /// Ошибки ячеек и строк: `"0.value" -> [...]`
    pub row_errors: BTreeMap<String, Vec<String>>,
}

/// Как показывать ошибки поля
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorDisplay {
    None,
    Single(String),
    Multiple(Vec<String>),
}

impl FieldDefinition {
    /// Одна ошибка выводится строкой, несколько списком, без ошибок ничего не выводится
    pub fn display_error(&self) -> ErrorDisplay {
        match self.errors.as_slice() {
            [] => ErrorDisplay::None,
            [single] => ErrorDisplay::Single(single.clone()),
            many => ErrorDisplay::Multiple(many.to_vec()),
        }
    }

    pub fn related(&self) -> Option<&RelatedModelRef> {
        match &self.kind {
            FieldKind::Related(reference) => Some(reference),
            _ => None,
        }
    }

    pub fn children(&self) -> &[FieldSlot] {
        match &self.kind {
            FieldKind::Nested(children) => children,
            _ => &[],
        }
    }

    /// Фактическое определение для зависимого поля (иначе само поле)
    pub fn effective(&self) -> &FieldDefinition {
        match &self.kind {
            FieldKind::Dependent(DependentRef {
                child: Some(child), ..
            }) => match child.as_ref() {
                Ok(definition) => definition.effective(),
                Err(_) => self,
            },
            _ => self,
        }
    }
}

/// Поиск определения по пути среди разрешённых слотов (с заходом во вложенные)
pub fn find_definition<'a>(slots: &'a [FieldSlot], path: &str) -> Option<&'a FieldDefinition> {
    for slot in slots.iter().flatten() {
        if slot.path == path {
            return Some(slot);
        }
        let prefix = format!("{}.", slot.path);
        if path.starts_with(&prefix) {
            if let FieldKind::Nested(children) = &slot.kind {
                return find_definition(children, path);
            }
            return Some(slot);
        }
    }
    None
}
