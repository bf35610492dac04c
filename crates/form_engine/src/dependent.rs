//! Dependent fields: schema re-fetched whenever a declared sibling changes

use contracts::shared::forms::{OptionsResponse, SchemaField};
use serde_json::Value;

use crate::coercion::Coercer;
use crate::definition::{find_definition, FieldKind, FieldSlot};
use crate::error::FormError;
use crate::resolver::join_path;
use crate::transport::{ApiRequest, ApiTransport, Method};
use crate::value::value_to_plain_string;

/// Зависимое поле, затронутое изменением
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependentTarget {
    pub path: String,
    pub name: String,
    /// Полные пути полей-источников
    pub sources: Vec<String>,
}

fn parent_prefix(path: &str) -> &str {
    path.rsplit_once('.').map(|(prefix, _)| prefix).unwrap_or("")
}

/// Все зависимые поля (включая вложенные)
pub fn dependent_targets(definitions: &[FieldSlot]) -> Vec<DependentTarget> {
    let mut targets = Vec::new();
    collect_targets(definitions, &mut targets);
    targets
}

fn collect_targets(slots: &[FieldSlot], targets: &mut Vec<DependentTarget>) {
    for definition in slots.iter().flatten() {
        match &definition.kind {
            FieldKind::Dependent(reference) => {
                let prefix = parent_prefix(&definition.path);
                targets.push(DependentTarget {
                    path: definition.path.clone(),
                    name: definition.name.clone(),
                    sources: reference
                        .depends_on
                        .iter()
                        .map(|sibling| join_path(prefix, sibling))
                        .collect(),
                });
            }
            FieldKind::Nested(children) => collect_targets(children, targets),
            _ => {}
        }
    }
}

/// Зависимые поля, которые нужно перезапросить после изменения `changed`
pub fn affected_by(definitions: &[FieldSlot], changed: &str) -> Vec<DependentTarget> {
    dependent_targets(definitions)
        .into_iter()
        .filter(|target| target.sources.iter().any(|source| source == changed))
        .collect()
}

/// `OPTIONS {url}?sibling=value...`
pub fn schema_request(url: &str, target: &DependentTarget, definitions: &[FieldSlot], coercer: &Coercer) -> ApiRequest {
    let mut request = ApiRequest::options(url);
    for source in &target.sources {
        let Some(definition) = find_definition(definitions, source) else {
            continue;
        };
        let wire = coercer.coerce_out(&definition.value, definition.field_type);
        if wire.is_null() {
            continue;
        }
        request = request.query(definition.name.clone(), value_to_plain_string(&wire));
    }
    request
}

/// Определение зависимого поля для текущих значений источников.
///
/// Принимает как полный OPTIONS-ответ, так и одиночное описание поля.
pub async fn fetch_dependent_schema(
    transport: &dyn ApiTransport,
    url: &str,
    method: Method,
    target: &DependentTarget,
    definitions: &[FieldSlot],
    coercer: &Coercer,
) -> Result<Option<SchemaField>, FormError> {
    let request = schema_request(url, target, definitions, coercer);
    let response = transport.send(request).await?;
    if !response.is_success() {
        return Err(FormError::UnexpectedStatus {
            status: response.status,
            url: url.to_string(),
        });
    }
    Ok(extract_field(response.body, method, &target.name))
}

fn extract_field(body: Value, method: Method, name: &str) -> Option<SchemaField> {
    if body.get("actions").is_some() {
        let options: OptionsResponse = serde_json::from_value(body).ok()?;
        return options.fields_for(method.as_str())?.get(name).cloned();
    }
    if body.get("type").is_some() {
        return serde_json::from_value(body).ok();
    }
    None
}
