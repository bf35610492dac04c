//! Submission pipeline
//!
//! - serialize resolved definitions into a JSON or multipart payload
//! - send the write request with the proper timeout
//! - dispatch the outcome: success hooks, 400 error mapping, generic failure

use serde_json::{Map, Value};
use std::rc::Rc;
use std::time::Duration;

use crate::coercion::Coercer;
use crate::config::FormEngineConfig;
use crate::definition::{FieldDefinition, FieldKind, FieldSlot};
use crate::error::FormError;
use crate::error_map::map_validation_errors;
use crate::lookup::{detail_url, record_primary_key};
use crate::registry::model_registry;
use crate::state::ValidationErrorSet;
use crate::transport::{ApiRequest, ApiTransport, Method, MultipartPart, RequestBody};
use crate::value::{FieldValue, FileHandle, FileValue};

/// Куда и как отправлять форму
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitTarget {
    /// URL коллекции (`/api/order/`) или самой записи
    pub url: String,
    pub method: Method,
    /// Первичный ключ редактируемой записи
    pub pk: Option<Value>,
    /// Имя модели для перехода к записи после сохранения
    pub model: Option<String>,
    /// Явный таймаут; иначе: таймаут загрузки файлов или транспорта
    pub timeout: Option<Duration>,
    /// Загрузить текущие данные записи перед показом формы
    pub fetch_initial_data: bool,
}

impl SubmitTarget {
    pub fn new(url: impl Into<String>, method: Method) -> Self {
        Self {
            url: url.into(),
            method,
            pk: None,
            model: None,
            timeout: None,
            fetch_initial_data: false,
        }
    }

    pub fn create(url: impl Into<String>) -> Self {
        Self::new(url, Method::Post)
    }

    /// Редактирование записи: PATCH + загрузка текущих данных
    pub fn edit(url: impl Into<String>, pk: impl Into<Value>) -> Self {
        Self {
            pk: Some(pk.into()),
            fetch_initial_data: true,
            ..Self::new(url, Method::Patch)
        }
    }

    pub fn delete(url: impl Into<String>, pk: impl Into<Value>) -> Self {
        Self {
            pk: Some(pk.into()),
            ..Self::new(url, Method::Delete)
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// URL записи, если задан `pk`, иначе URL как есть
    pub fn instance_url(&self) -> String {
        match &self.pk {
            Some(pk) if !pk.is_null() => detail_url(&self.url, pk),
            _ => self.url.clone(),
        }
    }
}

/// Переход к детальной странице записи
pub trait Navigator {
    fn navigate(&self, url: &str);
}

/// Связанная таблица, которую нужно обновить после сохранения
pub trait LinkedTable {
    /// Полная перезагрузка (создание, удаление)
    fn refresh(&self);
    /// Обновление одной строки на месте (редактирование)
    fn update_record(&self, pk: &Value, record: &Value);
}

/// Пользовательские уведомления
pub trait Notifier {
    fn error(&self, message: &str);

    fn success(&self, _message: &str) {}
}

type SuccessCallback = Rc<dyn Fn(&Value)>;
type ErrorCallback = Rc<dyn Fn(&SubmitOutcome)>;

/// Коллабораторы отправки, все необязательные
#[derive(Clone, Default)]
pub struct SubmitHooks {
    pub on_success: Option<SuccessCallback>,
    /// Вызывается и при ошибке валидации, и при сбое транспорта
    pub on_error: Option<ErrorCallback>,
    pub follow: bool,
    pub navigator: Option<Rc<dyn Navigator>>,
    pub table: Option<Rc<dyn LinkedTable>>,
    pub notifier: Option<Rc<dyn Notifier>>,
    pub success_message: Option<String>,
}

impl SubmitHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_success(mut self, callback: impl Fn(&Value) + 'static) -> Self {
        self.on_success = Some(Rc::new(callback));
        self
    }

    pub fn on_error(mut self, callback: impl Fn(&SubmitOutcome) + 'static) -> Self {
        self.on_error = Some(Rc::new(callback));
        self
    }

    pub fn follow(mut self, navigator: Rc<dyn Navigator>) -> Self {
        self.follow = true;
        self.navigator = Some(navigator);
        self
    }

    pub fn table(mut self, table: Rc<dyn LinkedTable>) -> Self {
        self.table = Some(table);
        self
    }

    pub fn notifier(mut self, notifier: Rc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn success_message(mut self, message: impl Into<String>) -> Self {
        self.success_message = Some(message.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Success { status: u16, data: Value },
    /// 400: ошибки разложены по полям
    Invalid(ValidationErrorSet),
    /// Сеть, таймаут или неожиданный статус
    Failed { message: String },
}

impl SubmitOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Тело запроса до передачи в транспорт
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Map<String, Value>),
    Multipart(Vec<MultipartPart>),
}

impl Payload {
    pub fn into_body(self) -> RequestBody {
        match self {
            Self::Json(map) => RequestBody::Json(Value::Object(map)),
            Self::Multipart(parts) => RequestBody::Multipart(parts),
        }
    }
}

/// Сериализация формы.
///
/// `exclude` не отправляется, скрытые поля отправляются. Новый файл в любом
/// поле переводит всё тело в multipart; уже загруженные файлы не отправляются.
pub fn serialize_payload(definitions: &[FieldSlot], coercer: &Coercer) -> Payload {
    let mut files = Vec::new();
    let fields = serialize_fields(definitions, coercer, &mut files);

    if files.is_empty() {
        return Payload::Json(fields);
    }

    let mut parts = Vec::new();
    flatten_multipart("", &Value::Object(fields), &mut parts);
    parts.extend(
        files
            .into_iter()
            .map(|(name, file)| MultipartPart::File { name, file }),
    );
    Payload::Multipart(parts)
}

fn serialize_fields(
    slots: &[FieldSlot],
    coercer: &Coercer,
    files: &mut Vec<(String, FileHandle)>,
) -> Map<String, Value> {
    let mut out = Map::new();
    for definition in slots.iter().flatten() {
        let definition = definition.effective();
        if definition.exclude {
            continue;
        }
        if let Some(value) = serialize_field(definition, coercer, files) {
            out.insert(definition.name.clone(), value);
        }
    }
    out
}

fn serialize_field(
    definition: &FieldDefinition,
    coercer: &Coercer,
    files: &mut Vec<(String, FileHandle)>,
) -> Option<Value> {
    match (&definition.kind, &definition.value) {
        (FieldKind::Nested(children), _) => {
            return Some(Value::Object(serialize_fields(children, coercer, files)));
        }
        // Файл уже на сервере: не трогаем
        (_, FieldValue::File(FileValue::Existing(_))) => return None,
        (_, FieldValue::File(FileValue::Upload(handle))) => {
            files.push((definition.path.clone(), handle.clone()));
            return None;
        }
        _ => {}
    }

    let wire = coercer.coerce_out(&definition.value, definition.field_type);
    Some(match &definition.adjust_value {
        Some(hook) => (hook.0)(wire),
        None => wire,
    })
}

/// Текстовые части multipart: одно поле верхнего уровня = одна часть,
/// непримитивные значения (объекты, массивы) сериализуются в JSON-строку
fn flatten_multipart(prefix: &str, value: &Value, parts: &mut Vec<MultipartPart>) {
    match value {
        Value::Object(map) if prefix.is_empty() => {
            for (key, child) in map {
                flatten_multipart(key, child, parts);
            }
        }
        Value::Null => {}
        Value::String(s) => parts.push(MultipartPart::Text {
            name: prefix.to_string(),
            value: s.clone(),
        }),
        other => parts.push(MultipartPart::Text {
            name: prefix.to_string(),
            value: other.to_string(),
        }),
    }
}

/// Таймаут запроса: явный > загрузка файлов > транспорт по умолчанию
pub fn request_timeout(target: &SubmitTarget, multipart: bool, config: &FormEngineConfig) -> Option<Duration> {
    target.timeout.or_else(|| {
        if multipart {
            Some(config.upload_timeout())
        } else {
            config.request_timeout()
        }
    })
}

/// Одна попытка отправки. Защита от повторной отправки: на уровне сессии.
pub async fn submit(
    transport: &dyn ApiTransport,
    target: &SubmitTarget,
    definitions: &[FieldSlot],
    coercer: &Coercer,
    config: &FormEngineConfig,
    hooks: &SubmitHooks,
) -> SubmitOutcome {
    let body = if target.method == Method::Delete {
        RequestBody::Empty
    } else {
        serialize_payload(definitions, coercer).into_body()
    };
    let url = target.instance_url();
    let timeout = request_timeout(target, matches!(body, RequestBody::Multipart(_)), config);
    log::debug!("Submitting form: {} {}", target.method, url);

    let request = ApiRequest::new(target.method, url.clone())
        .body(body)
        .timeout(timeout);

    let outcome = match transport.send(request).await {
        Ok(response) if response.is_success() => SubmitOutcome::Success {
            status: response.status,
            data: response.body,
        },
        Ok(response) if response.status == 400 => {
            SubmitOutcome::Invalid(map_validation_errors(&response.body, definitions))
        }
        Ok(response) => SubmitOutcome::Failed {
            message: FormError::UnexpectedStatus {
                status: response.status,
                url,
            }
            .to_string(),
        },
        Err(e) => SubmitOutcome::Failed {
            message: FormError::from(e).to_string(),
        },
    };

    match &outcome {
        SubmitOutcome::Success { data, .. } => on_success(target, hooks, data),
        SubmitOutcome::Invalid(errors) => {
            log::info!(
                "Form rejected: {} field error(s), {} non-field error(s)",
                errors.field_errors.len(),
                errors.non_field_errors.len()
            );
            if let Some(callback) = &hooks.on_error {
                callback(&outcome);
            }
        }
        SubmitOutcome::Failed { message } => {
            log::error!("Form submission failed: {}", message);
            if let Some(notifier) = &hooks.notifier {
                notifier.error(message);
            }
            if let Some(callback) = &hooks.on_error {
                callback(&outcome);
            }
        }
    }
    outcome
}

fn on_success(target: &SubmitTarget, hooks: &SubmitHooks, data: &Value) {
    if let Some(callback) = &hooks.on_success {
        callback(data);
    }
    if let (Some(notifier), Some(message)) = (&hooks.notifier, &hooks.success_message) {
        notifier.success(message);
    }

    let pk = record_primary_key(data).or_else(|| target.pk.clone());

    if hooks.follow {
        let url = match (&target.model, &pk) {
            (Some(model), Some(pk)) => model_registry().detail_url(model, pk),
            _ => None,
        };
        match (url, &hooks.navigator) {
            (Some(url), Some(navigator)) => navigator.navigate(&url),
            _ => log::debug!("Nothing to follow after submit"),
        }
    }

    if let Some(table) = &hooks.table {
        match (&pk, target.method.is_edit()) {
            (Some(pk), true) => table.update_record(pk, data),
            _ => table.refresh(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::FieldSpec;
    use crate::error::TransportError;
    use crate::registry::{init_model_registry, ModelRegistry};
    use crate::resolver::Resolver;
    use crate::state::FormState;
    use crate::testing::RecordingTransport;
    use crate::transport::ApiResponse;
    use contracts::shared::forms::FieldType;
    use serde_json::json;
    use std::cell::RefCell;
    use std::collections::BTreeMap;

    fn resolve(specs: &[FieldSpec], state: &FormState) -> Vec<FieldSlot> {
        let coercer = Coercer::default();
        let errors = ValidationErrorSet::new();
        let dependent = BTreeMap::new();
        Resolver {
            coercer: &coercer,
            state,
            errors: &errors,
            dependent_schemas: &dependent,
        }
        .resolve_all(specs, None)
    }

    #[derive(Default)]
    struct Calls(RefCell<Vec<String>>);

    impl Navigator for Calls {
        fn navigate(&self, url: &str) {
            self.0.borrow_mut().push(format!("navigate {}", url));
        }
    }

    impl LinkedTable for Calls {
        fn refresh(&self) {
            self.0.borrow_mut().push("refresh".to_string());
        }

        fn update_record(&self, pk: &Value, _record: &Value) {
            self.0.borrow_mut().push(format!("update {}", pk));
        }
    }

    impl Notifier for Calls {
        fn error(&self, message: &str) {
            self.0.borrow_mut().push(format!("error {}", message));
        }
    }

    #[test]
    fn test_hidden_kept_excluded_dropped() {
        let slots = resolve(
            &[
                FieldSpec::new("title").field_type(FieldType::String).value("Order"),
                FieldSpec::new("owner").field_type(FieldType::Integer).value(5).hidden(),
                FieldSpec::new("secret")
                    .field_type(FieldType::String)
                    .value("x")
                    .hidden()
                    .exclude(),
            ],
            &FormState::new(),
        );
        let payload = serialize_payload(&slots, &Coercer::default());
        assert_eq!(
            payload,
            Payload::Json(json!({"title": "Order", "owner": 5}).as_object().unwrap().clone())
        );
    }

    #[test]
    fn test_adjust_value_runs_after_coercion() {
        let slots = resolve(
            &[FieldSpec::new("active")
                .field_type(FieldType::Boolean)
                .value("1")
                .adjust_value(|v| match v {
                    Value::Bool(true) => json!("True"),
                    _ => json!("False"),
                })],
            &FormState::new(),
        );
        let Payload::Json(map) = serialize_payload(&slots, &Coercer::default()) else {
            panic!("expected JSON payload");
        };
        assert_eq!(map["active"], json!("True"));
    }

    #[test]
    fn test_nested_and_table_in_json() {
        let mut state = FormState::new();
        state.set_cell("lines", 0, "quantity", json!(3));
        let slots = resolve(
            &[
                FieldSpec::new("address")
                    .field_type(FieldType::NestedObject)
                    .child(FieldSpec::new("city").field_type(FieldType::String).value("Riga")),
                FieldSpec::new("lines").field_type(FieldType::Table),
            ],
            &state,
        );
        let Payload::Json(map) = serialize_payload(&slots, &Coercer::default()) else {
            panic!("expected JSON payload");
        };
        // JSON-режим: без строковой сериализации вложенных значений
        assert_eq!(map["address"], json!({"city": "Riga"}));
        assert_eq!(map["lines"], json!([{"quantity": 3}]));
    }

    #[test]
    fn test_upload_switches_to_multipart() {
        let mut state = FormState::new();
        state.set(
            "attachment",
            FieldValue::File(FileValue::Upload(FileHandle::new("a.pdf", vec![1, 2]))),
        );
        state.set("image", FieldValue::File(FileValue::Existing("/media/old.png".into())));
        state.set_cell("lines", 0, "quantity", json!(3));
        let slots = resolve(
            &[
                FieldSpec::new("title").field_type(FieldType::String).value("Order"),
                FieldSpec::new("count").field_type(FieldType::Integer).value(2),
                FieldSpec::new("lines").field_type(FieldType::Table),
                FieldSpec::new("address")
                    .field_type(FieldType::NestedObject)
                    .child(FieldSpec::new("city").field_type(FieldType::String).value("Oslo")),
                FieldSpec::new("attachment").field_type(FieldType::FileUpload),
                FieldSpec::new("image").field_type(FieldType::FileUpload),
            ],
            &state,
        );

        let Payload::Multipart(parts) = serialize_payload(&slots, &Coercer::default()) else {
            panic!("expected multipart payload");
        };
        assert!(parts.contains(&MultipartPart::Text {
            name: "title".into(),
            value: "Order".into()
        }));
        assert!(parts.contains(&MultipartPart::Text {
            name: "count".into(),
            value: "2".into()
        }));
        assert!(parts.contains(&MultipartPart::Text {
            name: "lines".into(),
            value: r#"[{"quantity":3}]"#.into()
        }));
        // Вложенный объект: одна часть с JSON, без раскладки по путям
        assert!(parts.contains(&MultipartPart::Text {
            name: "address".into(),
            value: r#"{"city":"Oslo"}"#.into()
        }));
        assert!(!parts.iter().any(|p| matches!(p, MultipartPart::Text { name, .. } if name == "address.city")));
        assert!(parts.contains(&MultipartPart::File {
            name: "attachment".into(),
            file: FileHandle::new("a.pdf", vec![1, 2])
        }));
        assert!(!parts.iter().any(|p| matches!(p, MultipartPart::Text { name, .. } if name == "image")));
    }

    #[test]
    fn test_request_timeout() {
        let config = FormEngineConfig::default();
        let target = SubmitTarget::create("/api/order/");
        assert_eq!(request_timeout(&target, false, &config), None);
        assert_eq!(request_timeout(&target, true, &config), Some(Duration::from_secs(30)));
        let explicit = target.timeout(Duration::from_secs(5));
        assert_eq!(request_timeout(&explicit, true, &config), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_instance_url() {
        assert_eq!(SubmitTarget::edit("/api/order/", 3).instance_url(), "/api/order/3/");
        assert_eq!(SubmitTarget::create("/api/order/").instance_url(), "/api/order/");
    }

    #[tokio::test]
    async fn test_validation_failure_maps_errors() {
        let transport = RecordingTransport::new(|_| {
            Ok(ApiResponse::new(
                400,
                json!({"quantity": ["Must be positive"], "non_field_errors": ["General failure"]}),
            ))
        });
        let slots = resolve(&[FieldSpec::new("quantity").field_type(FieldType::Integer)], &FormState::new());
        let calls = Rc::new(Calls::default());
        let seen = calls.clone();
        let hooks = SubmitHooks::new()
            .notifier(calls.clone())
            .on_error(move |_| seen.0.borrow_mut().push("on_error".into()));

        let outcome = submit(
            &transport,
            &SubmitTarget::create("/api/order/"),
            &slots,
            &Coercer::default(),
            &FormEngineConfig::default(),
            &hooks,
        )
        .await;

        let SubmitOutcome::Invalid(errors) = outcome else {
            panic!("expected validation errors");
        };
        assert_eq!(errors.get("quantity"), ["Must be positive".to_string()]);
        assert_eq!(errors.non_field_errors, vec!["General failure".to_string()]);
        // Ошибки валидации: без общего уведомления
        assert_eq!(*calls.0.borrow(), vec!["on_error".to_string()]);
    }

    #[tokio::test]
    async fn test_transport_failure_notifies() {
        let transport = RecordingTransport::new(|_| Err(TransportError::Timeout));
        let calls = Rc::new(Calls::default());
        let seen = calls.clone();
        let hooks = SubmitHooks::new()
            .notifier(calls.clone())
            .on_error(move |_| seen.0.borrow_mut().push("on_error".into()));

        let outcome = submit(
            &transport,
            &SubmitTarget::create("/api/order/"),
            &[],
            &Coercer::default(),
            &FormEngineConfig::default(),
            &hooks,
        )
        .await;

        assert!(matches!(outcome, SubmitOutcome::Failed { .. }));
        assert_eq!(
            *calls.0.borrow(),
            vec!["error Request timed out".to_string(), "on_error".to_string()]
        );
    }

    #[tokio::test]
    async fn test_edit_updates_linked_row_and_follows() {
        init_model_registry(ModelRegistry::new().with_model("salesorder", "/sales/order/{pk}/"));
        let transport = RecordingTransport::new(|request| {
            assert_eq!(request.method, Method::Patch);
            assert_eq!(request.url, "/api/order/9/");
            Ok(ApiResponse::new(200, json!({"pk": 9, "reference": "SO-9"})))
        });
        let calls = Rc::new(Calls::default());
        let hooks = SubmitHooks::new()
            .follow(calls.clone())
            .table(calls.clone());

        let outcome = submit(
            &transport,
            &SubmitTarget::edit("/api/order/", 9).model("salesorder"),
            &[],
            &Coercer::default(),
            &FormEngineConfig::default(),
            &hooks,
        )
        .await;

        assert!(outcome.is_success());
        assert_eq!(
            *calls.0.borrow(),
            vec!["navigate /sales/order/9/".to_string(), "update 9".to_string()]
        );
    }

    #[tokio::test]
    async fn test_create_and_delete_refresh_table() {
        let transport = RecordingTransport::new(|request| match request.method {
            Method::Delete => Ok(ApiResponse::new(204, Value::Null)),
            _ => Ok(ApiResponse::new(201, json!({"pk": 1}))),
        });
        let calls = Rc::new(Calls::default());
        let hooks = SubmitHooks::new().table(calls.clone());
        let config = FormEngineConfig::default();

        submit(&transport, &SubmitTarget::create("/api/order/"), &[], &Coercer::default(), &config, &hooks).await;
        submit(&transport, &SubmitTarget::delete("/api/order/", 1), &[], &Coercer::default(), &config, &hooks).await;

        assert_eq!(*calls.0.borrow(), vec!["refresh".to_string(), "refresh".to_string()]);
        let requests = transport.requests.borrow();
        assert_eq!(requests[1].url, "/api/order/1/");
        assert_eq!(requests[1].body, RequestBody::Empty);
    }
}
