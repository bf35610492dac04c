//! FieldDefinition resolver
//!
//! Explicit, ordered merge of three inputs per field. Precedence, highest first:
//! 1. live form value (`FormState`)
//! 2. author-supplied `FieldSpec` overrides
//! 3. server schema (`SchemaField`) defaults
//!
//! Pure function of its inputs: re-run whenever any of them changes.
//! The schema may be absent (not yet fetched).

use contracts::shared::forms::{FieldType, SchemaField, SchemaFields};
use std::collections::BTreeMap;

use crate::coercion::Coercer;
use crate::definition::{
    DependentRef, FieldDefinition, FieldKind, FieldSlot, FieldSpec, Filters, RelatedModelRef,
    TableRef,
};
use crate::error::FormError;
use crate::state::{FormState, ValidationErrorSet};
use crate::value::FieldValue;

pub struct Resolver<'a> {
    pub coercer: &'a Coercer,
    pub state: &'a FormState,
    pub errors: &'a ValidationErrorSet,
    /// Определения зависимых полей, полученные с сервера (по пути)
    pub dependent_schemas: &'a BTreeMap<String, SchemaField>,
}

pub fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

impl<'a> Resolver<'a> {
    pub fn resolve_all(&self, specs: &[FieldSpec], schema: Option<&SchemaFields>) -> Vec<FieldSlot> {
        specs
            .iter()
            .map(|spec| self.resolve(spec, schema.and_then(|fields| fields.get(&spec.name)), ""))
            .collect()
    }

    pub fn resolve(&self, spec: &FieldSpec, schema: Option<&SchemaField>, prefix: &str) -> FieldSlot {
        let path = join_path(prefix, &spec.name);
        let field_type = resolve_type(spec, schema)?;

        let read_only = spec
            .read_only
            .or_else(|| schema.and_then(|s| s.read_only))
            .unwrap_or(false);
        let required = spec
            .required
            .or_else(|| schema.and_then(|s| s.required))
            .unwrap_or(false);

        let kind = self.resolve_kind(spec, schema, field_type, &path, prefix);

        // Зависимое поле приводит значение по типу полученного с сервера определения
        let (value, default) = match &kind {
            FieldKind::Dependent(DependentRef {
                child: Some(child), ..
            }) if child.is_ok() => match child.as_ref() {
                Ok(definition) => (definition.value.clone(), definition.default.clone()),
                Err(_) => (FieldValue::Empty, FieldValue::Empty),
            },
            _ => {
                let default = spec
                    .default
                    .as_ref()
                    .or_else(|| schema.and_then(|s| s.default.as_ref()))
                    .map(|raw| self.coercer.coerce_in(raw, field_type))
                    .unwrap_or_default();
                let value = match self.state.get(&path) {
                    Some(live) => live.clone(),
                    None => spec
                        .value
                        .as_ref()
                        .map(|raw| self.coercer.coerce_in(raw, field_type))
                        .unwrap_or_else(|| default.clone()),
                };
                (value, default)
            }
        };

        Ok(FieldDefinition {
            name: spec.name.clone(),
            path: path.clone(),
            field_type,
            value,
            default,
            required,
            disabled: spec.disabled || read_only,
            hidden: spec.hidden,
            read_only,
            exclude: spec.exclude,
            label: spec
                .label
                .clone()
                .or_else(|| schema.and_then(|s| s.label.clone()))
                .unwrap_or_else(|| spec.name.clone()),
            description: spec
                .description
                .clone()
                .or_else(|| schema.and_then(|s| s.help_text.clone())),
            placeholder: spec
                .placeholder
                .clone()
                .or_else(|| schema.and_then(|s| s.placeholder.clone())),
            errors: self.errors.get(&path).to_vec(),
            kind,
            adjust_value: spec.adjust_value.clone(),
            on_value_change: spec.on_value_change.clone(),
        })
    }

    fn resolve_kind(
        &self,
        spec: &FieldSpec,
        schema: Option<&SchemaField>,
        field_type: FieldType,
        path: &str,
        prefix: &str,
    ) -> FieldKind {
        match field_type {
            FieldType::Choice => FieldKind::Choice(
                spec.choices
                    .clone()
                    .or_else(|| schema.and_then(|s| s.choices.clone()))
                    .unwrap_or_default(),
            ),
            FieldType::RelatedModel => {
                // Фильтры схемы, поверх: фильтры автора (поключево)
                let mut filters: Filters = schema
                    .and_then(|s| s.filters.clone())
                    .unwrap_or_default();
                if let Some(own) = &spec.filters {
                    filters.extend(own.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
                FieldKind::Related(RelatedModelRef {
                    api_url: spec
                        .api_url
                        .clone()
                        .or_else(|| schema.and_then(|s| s.api_url.clone()))
                        .unwrap_or_default(),
                    model: spec
                        .model
                        .clone()
                        .or_else(|| schema.and_then(|s| s.model.clone())),
                    filters,
                    page_size: spec.page_size,
                    auto_fill: spec.auto_fill,
                    adjust_filters: spec.adjust_filters.clone(),
                })
            }
            FieldType::NestedObject => {
                let children = schema.and_then(|s| s.children.as_ref());
                FieldKind::Nested(self.resolve_children(&spec.children, children, path))
            }
            FieldType::Table => {
                let columns = schema
                    .and_then(|s| s.child.as_ref())
                    .and_then(|child| child.children.as_ref());
                // Колонки: шаблоны строки: без живых значений и ошибок
                let empty_state = FormState::new();
                let empty_errors = ValidationErrorSet::new();
                let template = Resolver {
                    coercer: self.coercer,
                    state: &empty_state,
                    errors: &empty_errors,
                    dependent_schemas: self.dependent_schemas,
                };
                FieldKind::Table(TableRef {
                    columns: template.resolve_children(&spec.children, columns, ""),
                    row_errors: self.errors.under_prefix(path),
                })
            }
            FieldType::DependentField => {
                let depends_on = if spec.depends_on.is_empty() {
                    schema
                        .and_then(|s| s.depends_on.clone())
                        .unwrap_or_default()
                } else {
                    spec.depends_on.clone()
                };
                let child = self
                    .dependent_schemas
                    .get(path)
                    .map(|child_schema| Box::new(self.resolve_dependent_child(spec, child_schema, prefix)));
                FieldKind::Dependent(DependentRef { depends_on, child })
            }
            _ => FieldKind::Primitive,
        }
    }

    fn resolve_children(
        &self,
        specs: &[FieldSpec],
        schema: Option<&SchemaFields>,
        prefix: &str,
    ) -> Vec<FieldSlot> {
        if specs.is_empty() {
            // Автор не задал дочерние поля: берём все из схемы
            return schema
                .map(|fields| {
                    fields
                        .iter()
                        .map(|(name, field)| self.resolve(&FieldSpec::new(name.clone()), Some(field), prefix))
                        .collect()
                })
                .unwrap_or_default();
        }
        specs
            .iter()
            .map(|spec| self.resolve(spec, schema.and_then(|fields| fields.get(&spec.name)), prefix))
            .collect()
    }

    fn resolve_dependent_child(&self, spec: &FieldSpec, child_schema: &SchemaField, prefix: &str) -> FieldSlot {
        let nested_dependent = child_schema
            .field_type
            .as_deref()
            .and_then(FieldType::parse)
            == Some(FieldType::DependentField);
        if nested_dependent {
            return Err(FormError::UnknownFieldType {
                field: spec.name.clone(),
                type_name: FieldType::DependentField.as_str().to_string(),
            });
        }

        // Отображение и хуки остаются от автора, остальное: из полученной схемы
        let child_spec = FieldSpec {
            name: spec.name.clone(),
            hidden: spec.hidden,
            disabled: spec.disabled,
            exclude: spec.exclude,
            label: spec.label.clone(),
            description: spec.description.clone(),
            placeholder: spec.placeholder.clone(),
            adjust_value: spec.adjust_value.clone(),
            on_value_change: spec.on_value_change.clone(),
            ..FieldSpec::default()
        };
        self.resolve(&child_spec, Some(child_schema), prefix)
    }
}

fn resolve_type(spec: &FieldSpec, schema: Option<&SchemaField>) -> Result<FieldType, FormError> {
    let tag = spec
        .field_type
        .as_deref()
        .or_else(|| schema.and_then(|s| s.field_type.as_deref()));
    match tag {
        None => Err(FormError::MissingFieldType {
            field: spec.name.clone(),
        }),
        Some(tag) => FieldType::parse(tag).ok_or_else(|| {
            log::warn!("Field '{}' has unknown type '{}'", spec.name, tag);
            FormError::UnknownFieldType {
                field: spec.name.clone(),
                type_name: tag.to_string(),
            }
        }),
    }
}
