//! Form session: one open form instance
//!
//! Owns `FormState`, the fetched schema and the validation errors, and
//! re-resolves field definitions whenever any of them changes. Schema and
//! initial data may arrive in either order.

use contracts::shared::forms::{OptionsResponse, SchemaField, SchemaFields};
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::coercion::Coercer;
use crate::config::FormEngineConfig;
use crate::definition::{find_definition, FieldDefinition, FieldKind, FieldSlot, FieldSpec, RelatedModelRef};
use crate::dependent::{affected_by, dependent_targets, fetch_dependent_schema, DependentTarget};
use crate::dispatch::{dispatch_all, BoundWidget};
use crate::error::{FormError, TransportError};
use crate::lookup::{RelatedModelCacheEntry, RelatedModelLookup};
use crate::resolver::Resolver;
use crate::state::{FormState, ValidationErrorSet};
use crate::submission::{self, SubmitHooks, SubmitOutcome, SubmitTarget};
use crate::timer::Sleeper;
use crate::transport::{ApiRequest, ApiTransport};
use crate::value::FieldValue;

type Listener = Rc<dyn Fn()>;

struct SessionState {
    specs: Vec<FieldSpec>,
    target: SubmitTarget,
    title: Option<String>,
    schema: Option<SchemaFields>,
    dependent_schemas: BTreeMap<String, SchemaField>,
    initial_data: Option<Value>,
    state: FormState,
    errors: ValidationErrorSet,
    definitions: Vec<FieldSlot>,
    submitting: bool,
    pending_fetches: usize,
    opened: bool,
    lookups: BTreeMap<String, RelatedModelLookup>,
    listeners: Vec<Listener>,
}

#[derive(Clone)]
pub struct FormSession {
    inner: Rc<RefCell<SessionState>>,
    transport: Rc<dyn ApiTransport>,
    sleeper: Rc<dyn Sleeper>,
    config: Rc<FormEngineConfig>,
    coercer: Coercer,
}

impl FormSession {
    pub fn new(
        specs: Vec<FieldSpec>,
        target: SubmitTarget,
        transport: Rc<dyn ApiTransport>,
        sleeper: Rc<dyn Sleeper>,
        config: Rc<FormEngineConfig>,
    ) -> Self {
        let session = Self {
            inner: Rc::new(RefCell::new(SessionState {
                specs,
                target,
                title: None,
                schema: None,
                dependent_schemas: BTreeMap::new(),
                initial_data: None,
                state: FormState::new(),
                errors: ValidationErrorSet::new(),
                definitions: Vec::new(),
                submitting: false,
                pending_fetches: 0,
                opened: false,
                lookups: BTreeMap::new(),
                listeners: Vec::new(),
            })),
            transport,
            sleeper,
            coercer: Coercer::new(config.coercion.decimal_places),
            config,
        };
        // Первая отрисовка: без схемы
        session.resolve(&mut session.inner.borrow_mut());
        session
    }

    fn resolve(&self, inner: &mut SessionState) {
        let resolver = Resolver {
            coercer: &self.coercer,
            state: &inner.state,
            errors: &inner.errors,
            dependent_schemas: &inner.dependent_schemas,
        };
        let definitions = resolver.resolve_all(&inner.specs, inner.schema.as_ref());
        inner.definitions = definitions;
    }

    /// Подписка на любые изменения формы
    pub fn subscribe(&self, listener: impl Fn() + 'static) {
        self.inner.borrow_mut().listeners.push(Rc::new(listener));
    }

    fn notify(&self) {
        // Слушатели могут читать сессию: вызываем без заимствования
        let listeners = self.inner.borrow().listeners.clone();
        for listener in listeners {
            listener();
        }
    }

    // ---- чтение ----

    pub fn config(&self) -> &FormEngineConfig {
        &self.config
    }

    pub fn target(&self) -> SubmitTarget {
        self.inner.borrow().target.clone()
    }

    /// Заголовок из OPTIONS-ответа
    pub fn title(&self) -> Option<String> {
        self.inner.borrow().title.clone()
    }

    pub fn definitions(&self) -> Vec<FieldSlot> {
        self.inner.borrow().definitions.clone()
    }

    pub fn definition(&self, path: &str) -> Option<FieldDefinition> {
        find_definition(&self.inner.borrow().definitions, path).cloned()
    }

    pub fn render(&self) -> Vec<BoundWidget> {
        dispatch_all(&self.inner.borrow().definitions)
    }

    pub fn state(&self) -> FormState {
        self.inner.borrow().state.clone()
    }

    pub fn value(&self, path: &str) -> FieldValue {
        self.inner
            .borrow()
            .state
            .get(path)
            .cloned()
            .unwrap_or_else(|| {
                self.definition(path)
                    .map(|definition| definition.value)
                    .unwrap_or_default()
            })
    }

    pub fn errors(&self) -> ValidationErrorSet {
        self.inner.borrow().errors.clone()
    }

    pub fn non_field_errors(&self) -> Vec<String> {
        self.inner.borrow().errors.non_field_errors.clone()
    }

    pub fn is_submitting(&self) -> bool {
        self.inner.borrow().submitting
    }

    pub fn is_loading(&self) -> bool {
        self.inner.borrow().pending_fetches > 0
    }

    /// `open()` завершён: схема, исходные данные и зависимые поля загружены
    pub fn is_opened(&self) -> bool {
        self.inner.borrow().opened
    }

    /// Кнопка отправки доступна: нет отправки и незавершённых загрузок
    pub fn can_submit(&self) -> bool {
        let inner = self.inner.borrow();
        !inner.submitting && inner.pending_fetches == 0
    }

    // ---- загрузка ----

    /// Схема и исходные данные загружаются параллельно, затем зависимые поля
    pub async fn open(&self) -> Result<(), FormError> {
        let fetch_data = self.inner.borrow().target.fetch_initial_data;
        let (schema, data) = futures::join!(self.fetch_schema(), async {
            if fetch_data {
                self.fetch_initial_data().await
            } else {
                Ok(())
            }
        });

        let targets = dependent_targets(&self.definitions());
        self.refresh_dependents(targets).await;

        self.inner.borrow_mut().opened = true;
        self.notify();
        schema.and(data)
    }

    pub async fn fetch_schema(&self) -> Result<(), FormError> {
        let url = self.inner.borrow().target.instance_url();
        let body = self.fetch(ApiRequest::options(url)).await?;
        let options: OptionsResponse =
            serde_json::from_value(body).map_err(|e| TransportError::Decode(e.to_string()))?;
        self.apply_schema(options);
        Ok(())
    }

    pub async fn fetch_initial_data(&self) -> Result<(), FormError> {
        let url = self.inner.borrow().target.instance_url();
        let data = self.fetch(ApiRequest::get(url)).await?;
        self.apply_initial_data(data);
        Ok(())
    }

    async fn fetch(&self, request: ApiRequest) -> Result<Value, FormError> {
        let url = request.url.clone();
        self.inner.borrow_mut().pending_fetches += 1;
        self.notify();

        let result = self.transport.send(request).await;

        self.inner.borrow_mut().pending_fetches -= 1;
        self.notify();

        match result {
            Ok(response) if response.is_success() => Ok(response.body),
            Ok(response) => {
                log::warn!("Form fetch {} returned status {}", url, response.status);
                Err(FormError::UnexpectedStatus {
                    status: response.status,
                    url,
                })
            }
            Err(e) => {
                log::warn!("Form fetch {} failed: {}", url, e);
                Err(e.into())
            }
        }
    }

    /// Схема пришла: пересобрать определения и доложить исходные данные
    /// в поля, которые до этого не удалось разрешить
    pub fn apply_schema(&self, options: OptionsResponse) {
        {
            let mut inner = self.inner.borrow_mut();
            let method = inner.target.method;
            inner.schema = Some(options.fields_for(method.as_str()).cloned().unwrap_or_default());
            inner.title = options.name.clone();
            self.resolve(&mut inner);
            if let Some(data) = inner.initial_data.clone() {
                self.fill_initial(&mut inner, &data, true);
            }
        }
        self.notify();
    }

    /// Исходные данные записи (поверх значений по умолчанию)
    pub fn apply_initial_data(&self, data: Value) {
        {
            let mut inner = self.inner.borrow_mut();
            self.fill_initial(&mut inner, &data, false);
            inner.initial_data = Some(data);
        }
        self.notify();
    }

    fn fill_initial(&self, inner: &mut SessionState, data: &Value, only_missing: bool) {
        let mut values = Vec::new();
        collect_initial(&self.coercer, &inner.definitions, data, &mut values);
        for (path, value) in values {
            if only_missing && inner.state.contains(&path) {
                continue;
            }
            inner.state.set(path, value);
        }
        self.resolve(inner);
    }

    // ---- изменения ----

    /// Записать значение поля. Возвращает зависимые поля, которые нужно перезапросить.
    pub fn set_value(&self, path: &str, value: FieldValue) -> Vec<DependentTarget> {
        self.set_value_with_record(path, value, None)
    }

    /// Ввод пользователя: приведение по типу поля, затем запись
    pub fn set_input(&self, path: &str, raw: &Value) -> Vec<DependentTarget> {
        let value = match self.definition(path) {
            Some(definition) => {
                let definition = definition.effective();
                self.coercer.coerce_in(raw, definition.field_type)
            }
            None => FieldValue::Raw(raw.clone()),
        };
        self.set_value(path, value)
    }

    /// Выбор записи в связанном поле (запись передаётся в `on_value_change`)
    pub fn set_related(&self, path: &str, pk: Option<Value>, record: Option<Value>) -> Vec<DependentTarget> {
        let value = match pk {
            Some(pk) if !pk.is_null() => FieldValue::Related(pk),
            _ => FieldValue::Empty,
        };
        self.set_value_with_record(path, value, record)
    }

    fn set_value_with_record(&self, path: &str, value: FieldValue, record: Option<Value>) -> Vec<DependentTarget> {
        let (hook, targets, lookups) = {
            let mut inner = self.inner.borrow_mut();
            inner.state.set(path, value.clone());
            self.resolve(&mut inner);
            let hook = find_definition(&inner.definitions, path)
                .filter(|definition| definition.path == path)
                .and_then(|definition| definition.effective().on_value_change.clone());
            let targets = affected_by(&inner.definitions, path);
            let lookups: Vec<(String, RelatedModelLookup)> = inner
                .lookups
                .iter()
                .filter(|(lookup_path, _)| lookup_path.as_str() != path)
                .map(|(lookup_path, lookup)| (lookup_path.clone(), lookup.clone()))
                .collect();
            (hook, targets, lookups)
        };

        if let Some(hook) = hook {
            (hook.0)(&value, record.as_ref());
        }
        self.rerun_adjust_filters(&lookups);
        self.notify();
        targets
    }

    /// Изменение поля с перезапросом зависимых полей
    pub async fn update(&self, path: &str, raw: &Value) {
        let targets = self.set_input(path, raw);
        self.refresh_dependents(targets).await;
    }

    /// Фильтры связанных полей зависят от других полей формы
    fn rerun_adjust_filters(&self, lookups: &[(String, RelatedModelLookup)]) {
        let state = self.state();
        for (path, lookup) in lookups {
            let Some(reference) = self.definition(path).and_then(|d| d.related().cloned()) else {
                continue;
            };
            if lookup.apply_adjust_filters(&reference, &state) {
                log::debug!("Filters of '{}' changed", path);
            }
        }
    }

    /// Перезапрос схем зависимых полей; изменённая схема сбрасывает значение поля
    pub async fn refresh_dependents(&self, targets: Vec<DependentTarget>) {
        if targets.is_empty() {
            return;
        }
        let (url, method) = {
            let inner = self.inner.borrow();
            (inner.target.url.clone(), inner.target.method)
        };

        for target in targets {
            let definitions = self.definitions();
            // Поле ещё без схемы: отправка недоступна, как и при загрузке формы
            self.inner.borrow_mut().pending_fetches += 1;
            self.notify();
            let fetched =
                fetch_dependent_schema(self.transport.as_ref(), &url, method, &target, &definitions, &self.coercer).await;

            let mut inner = self.inner.borrow_mut();
            inner.pending_fetches -= 1;
            match fetched {
                Ok(Some(schema)) => {
                    let previous = inner.dependent_schemas.insert(target.path.clone(), schema.clone());
                    if previous.is_some_and(|previous| previous != schema) {
                        inner.state.remove(&target.path);
                    }
                }
                Ok(None) => {
                    inner.dependent_schemas.remove(&target.path);
                }
                Err(e) => {
                    log::warn!("Failed to refresh dependent field '{}': {}", target.path, e);
                    drop(inner);
                    self.notify();
                    continue;
                }
            }
            self.resolve(&mut inner);
            drop(inner);
            self.notify();
        }
    }

    // ---- табличные поля ----

    /// Записать ячейку; значение приводится по типу колонки
    pub fn set_cell(&self, table_path: &str, row: usize, column: &str, raw: &Value) {
        {
            let mut inner = self.inner.borrow_mut();
            let wire = match column_type(&inner.definitions, table_path, column) {
                Some(field_type) => {
                    let value = self.coercer.coerce_in(raw, field_type);
                    self.coercer.coerce_out(&value, field_type)
                }
                None => raw.clone(),
            };
            inner.state.set_cell(table_path, row, column, wire);
            self.resolve(&mut inner);
        }
        self.notify();
    }

    /// Новая строка со значениями колонок по умолчанию
    pub fn add_row(&self, table_path: &str) -> usize {
        let index = {
            let mut inner = self.inner.borrow_mut();
            let mut row = Map::new();
            if let Some(definition) = find_definition(&inner.definitions, table_path) {
                if let FieldKind::Table(table) = &definition.kind {
                    for column in table.columns.iter().flatten() {
                        if !column.default.is_empty() {
                            row.insert(
                                column.name.clone(),
                                self.coercer.coerce_out(&column.default, column.field_type),
                            );
                        }
                    }
                }
            }
            let index = inner.state.push_row(table_path, row);
            self.resolve(&mut inner);
            index
        };
        self.notify();
        index
    }

    pub fn remove_row(&self, table_path: &str, row: usize) -> bool {
        let removed = {
            let mut inner = self.inner.borrow_mut();
            let removed = inner.state.remove_row(table_path, row);
            if removed {
                self.resolve(&mut inner);
            }
            removed
        };
        if removed {
            self.notify();
        }
        removed
    }

    // ---- связанные поля ----

    /// Поиск для экземпляра связанного поля (создаётся при первом обращении)
    pub fn lookup(&self, path: &str, reference: &RelatedModelRef) -> RelatedModelLookup {
        let mut inner = self.inner.borrow_mut();
        if let Some(existing) = inner.lookups.get(path) {
            return existing.clone();
        }
        let lookup = RelatedModelLookup::new(
            reference,
            self.transport.clone(),
            self.sleeper.clone(),
            &self.config,
        );
        if reference.adjust_filters.is_some() {
            lookup.apply_adjust_filters(reference, &inner.state);
        }
        inner.lookups.insert(path.to_string(), lookup.clone());
        lookup
    }

    /// Связанное поле по текущему значению: запись выбранного значения
    /// (`GET {api_url}{pk}/`) или однократный автовыбор для пустого поля.
    ///
    /// Автовыбор ждёт завершения `open()`: значение с сервера приоритетнее.
    /// `None`, если значение сменилось, пока шёл запрос.
    pub async fn sync_related(&self, path: &str) -> Option<RelatedModelCacheEntry> {
        let reference = self.definition(path)?.effective().related().cloned()?;
        let lookup = self.lookup(path, &reference);
        let current = self.value(path);

        if let Some(pk) = current.primary_key().cloned() {
            let record = lookup.hydrate(&pk).await?;
            if self.value(path).primary_key() != Some(&pk) {
                return None;
            }
            return Some(RelatedModelCacheEntry {
                primary_key: pk,
                record,
            });
        }

        if !reference.auto_fill || !self.is_opened() || self.is_loading() {
            return None;
        }
        let entry = lookup.auto_fill(&current).await?;
        if !self.value(path).is_empty() {
            log::debug!("Auto-fill of '{}' skipped: value changed meanwhile", path);
            return None;
        }
        let targets = self.set_related(path, Some(entry.primary_key.clone()), Some(entry.record.clone()));
        self.refresh_dependents(targets).await;
        Some(entry)
    }

    /// Виджет размонтирован: следующий экземпляр начнёт с чистого состояния
    pub fn release_lookup(&self, path: &str) {
        self.inner.borrow_mut().lookups.remove(path);
    }

    // ---- отправка ----

    /// Отправка формы. Одновременно возможна только одна отправка.
    pub async fn submit(&self, hooks: &SubmitHooks) -> Result<SubmitOutcome, FormError> {
        let (target, definitions) = {
            let mut inner = self.inner.borrow_mut();
            if inner.submitting {
                return Err(FormError::AlreadySubmitting);
            }
            if inner.pending_fetches > 0 {
                return Err(FormError::NotReady);
            }
            inner.submitting = true;
            inner.errors.clear();
            self.resolve(&mut inner);
            (inner.target.clone(), inner.definitions.clone())
        };
        self.notify();

        let outcome = submission::submit(
            self.transport.as_ref(),
            &target,
            &definitions,
            &self.coercer,
            &self.config,
            hooks,
        )
        .await;

        {
            let mut inner = self.inner.borrow_mut();
            inner.submitting = false;
            if let SubmitOutcome::Invalid(errors) = &outcome {
                inner.errors = errors.clone();
            }
            self.resolve(&mut inner);
        }
        self.notify();
        Ok(outcome)
    }
}

fn column_type(
    definitions: &[FieldSlot],
    table_path: &str,
    column: &str,
) -> Option<contracts::shared::forms::FieldType> {
    let definition = find_definition(definitions, table_path)?;
    match &definition.kind {
        FieldKind::Table(table) => table
            .columns
            .iter()
            .flatten()
            .find(|c| c.name == column)
            .map(|c| c.field_type),
        _ => None,
    }
}

/// Значения из ответа сервера по путям разрешённых полей
fn collect_initial(coercer: &Coercer, slots: &[FieldSlot], data: &Value, out: &mut Vec<(String, FieldValue)>) {
    for definition in slots.iter().flatten() {
        let Some(raw) = data.get(&definition.name) else {
            continue;
        };
        match &definition.kind {
            FieldKind::Nested(children) => collect_initial(coercer, children, raw, out),
            _ => {
                let field_type = definition.effective().field_type;
                out.push((definition.path.clone(), coercer.coerce_in(raw, field_type)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingTransport, TokioSleeper};
    use crate::transport::{ApiResponse, Method, RequestBody};
    use contracts::shared::forms::FieldType;
    use serde_json::json;
    use std::time::Duration;

    fn options() -> Value {
        json!({
            "name": "Sales Order",
            "actions": {
                "POST": {
                    "reference": {"type": "string", "required": true, "label": "Reference"},
                    "quantity": {"type": "integer"},
                    "customer": {"type": "related field", "api_url": "/api/company/"},
                    "contact": {"type": "related field", "api_url": "/api/contact/"},
                    "template": {"type": "integer"},
                    "value": {"type": "dependent field", "depends_on": ["template"]}
                }
            }
        })
    }

    fn specs() -> Vec<FieldSpec> {
        vec![
            FieldSpec::new("reference"),
            FieldSpec::new("quantity"),
            FieldSpec::new("customer"),
            FieldSpec::new("contact").adjust_filters(|base, form| {
                let mut filters = base.clone();
                if let Some(FieldValue::Related(customer)) = form.get("customer") {
                    filters.insert("company".into(), customer.clone());
                }
                filters
            }),
            FieldSpec::new("owner").field_type(FieldType::Integer).value(1).hidden(),
            FieldSpec::new("note").field_type(FieldType::String).hidden().exclude(),
        ]
    }

    fn responder(request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        match (request.method, request.url.as_str()) {
            (Method::Options, _) if request.query_value("template") == Some("1") => Ok(ApiResponse::new(
                200,
                json!({"actions": {"POST": {"value": {"type": "boolean"}}}}),
            )),
            (Method::Options, _) if request.query_value("template").is_some() => Ok(ApiResponse::new(
                200,
                json!({"actions": {"POST": {"value": {"type": "choice", "choices": []}}}}),
            )),
            (Method::Options, _) => Ok(ApiResponse::new(200, options())),
            (Method::Get, "/api/order/5/") => Ok(ApiResponse::new(
                200,
                json!({"pk": 5, "reference": "SO-5", "quantity": "7", "customer": 2}),
            )),
            (Method::Get, _) => Ok(ApiResponse::new(200, json!({"results": [], "count": 0}))),
            (Method::Post, _) => Ok(ApiResponse::new(201, json!({"pk": 6}))),
            (Method::Patch, _) => Ok(ApiResponse::new(400, json!({"quantity": ["Must be positive"]}))),
            _ => Ok(ApiResponse::new(405, Value::Null)),
        }
    }

    fn related_responder(request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        match (request.method, request.url.as_str()) {
            (Method::Get, "/api/company/2/") => Ok(ApiResponse::new(200, json!({"pk": 2, "name": "Server choice"}))),
            (Method::Get, "/api/company/") => Ok(ApiResponse::new(
                200,
                json!({"results": [{"pk": 3, "name": "Only match"}], "count": 1}),
            )),
            _ => responder(request),
        }
    }

    fn related_specs() -> Vec<FieldSpec> {
        vec![
            FieldSpec::new("reference"),
            FieldSpec::new("customer")
                .field_type(FieldType::RelatedModel)
                .api_url("/api/company/")
                .auto_fill(),
        ]
    }

    fn session(transport: Rc<RecordingTransport>, target: SubmitTarget) -> FormSession {
        session_with(specs(), transport, target)
    }

    fn session_with(specs: Vec<FieldSpec>, transport: Rc<RecordingTransport>, target: SubmitTarget) -> FormSession {
        FormSession::new(
            specs,
            target,
            transport,
            Rc::new(TokioSleeper),
            Rc::new(FormEngineConfig::default()),
        )
    }

    #[test]
    fn test_first_render_without_schema() {
        let transport = Rc::new(RecordingTransport::new(responder));
        let session = session(transport, SubmitTarget::create("/api/order/"));
        let definitions = session.definitions();
        // Тип ещё неизвестен: инлайн-ошибка, остальные поля разрешены
        assert!(matches!(definitions[0], Err(FormError::MissingFieldType { .. })));
        assert!(definitions[4].is_ok());
    }

    #[test]
    fn test_schema_and_initial_data_in_any_order() {
        let transport = Rc::new(RecordingTransport::new(responder));
        let target = SubmitTarget::edit("/api/order/", 5);
        let data = json!({"reference": "SO-5", "quantity": "7", "customer": 2});
        let options: OptionsResponse = serde_json::from_value(options()).unwrap();

        // Общие хуки: определения сравниваются по идентичности хуков
        let specs = specs();

        let schema_first = session_with(specs.clone(), transport.clone(), target.clone());
        schema_first.apply_schema(options.clone());
        schema_first.apply_initial_data(data.clone());

        let data_first = session_with(specs, transport, target);
        data_first.apply_initial_data(data);
        data_first.apply_schema(options);

        assert_eq!(schema_first.definitions(), data_first.definitions());
        assert_eq!(data_first.value("quantity"), FieldValue::Integer(7));
        assert_eq!(data_first.value("reference"), FieldValue::Text("SO-5".into()));
        assert_eq!(data_first.title().as_deref(), Some("Sales Order"));
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let transport = Rc::new(RecordingTransport::new(responder));
        let session = session(transport, SubmitTarget::create("/api/order/"));
        session.apply_schema(serde_json::from_value(options()).unwrap());
        let before = session.definitions();
        session.resolve(&mut session.inner.borrow_mut());
        assert_eq!(before, session.definitions());
    }

    #[test]
    fn test_user_edit_survives_late_schema() {
        let transport = Rc::new(RecordingTransport::new(responder));
        let session = session(transport, SubmitTarget::edit("/api/order/", 5));
        session.apply_initial_data(json!({"reference": "SO-5"}));
        session.set_value("reference", FieldValue::Text("SO-5b".into()));
        session.apply_schema(serde_json::from_value(options()).unwrap());
        assert_eq!(session.value("reference"), FieldValue::Text("SO-5b".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_fetches_schema_and_data() {
        let transport = Rc::new(RecordingTransport::new(responder).with_latency(Duration::from_millis(50)));
        let session = session(transport.clone(), SubmitTarget::edit("/api/order/", 5));

        assert!(session.can_submit());
        let (opened, loading_seen) = futures::join!(session.open(), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            !session.can_submit()
        });
        opened.unwrap();

        assert!(loading_seen);
        assert!(session.can_submit());
        assert_eq!(session.value("customer"), FieldValue::Related(json!(2)));
        let definition = session.definition("reference").unwrap();
        assert!(definition.required);
        assert_eq!(definition.label, "Reference");
        assert_eq!(transport.count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hidden_value_submitted_unless_excluded() {
        let transport = Rc::new(RecordingTransport::new(responder));
        let session = session(transport.clone(), SubmitTarget::create("/api/order/"));
        session.apply_schema(serde_json::from_value(options()).unwrap());
        session.set_input("reference", &json!("SO-1"));
        session.set_input("note", &json!("internal"));

        let rendered: Vec<String> = session
            .render()
            .into_iter()
            .filter(|widget| widget.is_rendered())
            .map(|widget| widget.path)
            .collect();
        assert!(!rendered.contains(&"owner".to_string()));

        let outcome = session.submit(&SubmitHooks::new()).await.unwrap();
        assert!(outcome.is_success());

        let requests = transport.requests.borrow();
        let RequestBody::Json(body) = &requests[0].body else {
            panic!("expected JSON body");
        };
        assert_eq!(body["owner"], json!(1));
        assert_eq!(body["reference"], json!("SO-1"));
        assert!(body.get("note").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_submit_is_rejected() {
        let transport = Rc::new(RecordingTransport::new(responder).with_latency(Duration::from_millis(100)));
        let session = session(transport.clone(), SubmitTarget::create("/api/order/"));
        let hooks = SubmitHooks::new();

        let (first, second) = futures::join!(session.submit(&hooks), session.submit(&hooks));

        assert!(first.unwrap().is_success());
        assert_eq!(second, Err(FormError::AlreadySubmitting));
        assert_eq!(transport.count(), 1);
        assert!(!session.is_submitting());
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_cleared_on_next_submit() {
        let transport = Rc::new(RecordingTransport::new(responder));
        let session = session(transport, SubmitTarget::edit("/api/order/", 5));
        session.apply_schema(serde_json::from_value(options()).unwrap());

        let outcome = session.submit(&SubmitHooks::new()).await.unwrap();
        assert!(matches!(outcome, SubmitOutcome::Invalid(_)));
        assert_eq!(session.definition("quantity").unwrap().errors, vec!["Must be positive".to_string()]);

        let errors_seen = Rc::new(RefCell::new(Vec::new()));
        let seen = errors_seen.clone();
        let observer = session.clone();
        session.subscribe(move || seen.borrow_mut().push(observer.errors().is_empty()));

        session.submit(&SubmitHooks::new()).await.unwrap();
        // Первое уведомление: начало отправки: ошибки уже очищены
        assert!(errors_seen.borrow()[0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dependent_field_refetches_schema() {
        let transport = Rc::new(RecordingTransport::new(responder));
        let mut all_specs = specs();
        all_specs.push(FieldSpec::new("template"));
        all_specs.push(FieldSpec::new("value"));
        let session = session_with(all_specs, transport.clone(), SubmitTarget::create("/api/setting/"));
        session.apply_schema(serde_json::from_value(options()).unwrap());

        session.update("template", &json!("1")).await;
        assert_eq!(session.definition("value").unwrap().effective().field_type, FieldType::Boolean);
        session.set_input("value", &json!(true));
        assert_eq!(session.value("value"), FieldValue::Bool(true));

        // Другая схема: значение сбрасывается
        session.update("template", &json!("2")).await;
        let value = session.definition("value").unwrap();
        assert_eq!(value.effective().field_type, FieldType::Choice);
        assert_eq!(value.value, FieldValue::Empty);

        let last = transport.requests.borrow().last().cloned().unwrap();
        assert_eq!(last.method, Method::Options);
        assert_eq!(last.query_value("template"), Some("2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_blocked_while_dependent_schema_loads() {
        let transport = Rc::new(RecordingTransport::new(responder).with_latency(Duration::from_millis(50)));
        let mut all_specs = specs();
        all_specs.push(FieldSpec::new("template"));
        all_specs.push(FieldSpec::new("value"));
        let session = session_with(all_specs, transport.clone(), SubmitTarget::create("/api/setting/"));
        let hooks = SubmitHooks::new();

        let (opened, during) = futures::join!(session.open(), async {
            // Схема формы пришла на 50 мс, схема зависимого поля ещё в пути
            tokio::time::sleep(Duration::from_millis(75)).await;
            (session.can_submit(), session.submit(&hooks).await)
        });
        opened.unwrap();

        let (can_submit, submitted) = during;
        assert!(!can_submit);
        assert_eq!(submitted, Err(FormError::NotReady));
        assert!(session.can_submit());
        assert_eq!(transport.count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_related_field_mounted_before_initial_data_keeps_server_value() {
        let transport = Rc::new(RecordingTransport::new(related_responder).with_latency(Duration::from_millis(20)));
        let session = session_with(related_specs(), transport.clone(), SubmitTarget::edit("/api/order/", 5));

        // Виджет смонтирован до ответа сервера
        let (opened, early) = futures::join!(session.open(), session.sync_related("customer"));
        opened.unwrap();
        assert!(early.is_none());

        let entry = session.sync_related("customer").await.unwrap();
        assert_eq!(entry.primary_key, json!(2));
        assert_eq!(entry.record["name"], json!("Server choice"));
        assert_eq!(session.value("customer"), FieldValue::Related(json!(2)));

        let urls = transport.urls();
        assert!(urls.contains(&"/api/company/2/".to_string()));
        assert!(!urls.contains(&"/api/company/".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_fill_waits_for_open_and_runs_once() {
        let transport = Rc::new(RecordingTransport::new(related_responder).with_latency(Duration::from_millis(20)));
        let session = session_with(related_specs(), transport.clone(), SubmitTarget::create("/api/order/"));

        let (opened, early) = futures::join!(session.open(), session.sync_related("customer"));
        opened.unwrap();
        assert!(early.is_none());

        let entry = session.sync_related("customer").await.unwrap();
        assert_eq!(entry.primary_key, json!(3));
        assert_eq!(session.value("customer"), FieldValue::Related(json!(3)));

        // Пользователь очистил поле: автовыбор не повторяется
        let reference = session.definition("customer").unwrap().related().cloned().unwrap();
        session.lookup("customer", &reference).reset();
        session.set_related("customer", None, None);
        let sent = transport.count();
        assert!(session.sync_related("customer").await.is_none());
        assert_eq!(transport.count(), sent);
        assert!(session.value("customer").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_fill_keeps_value_chosen_meanwhile() {
        let transport = Rc::new(RecordingTransport::new(related_responder).with_latency(Duration::from_millis(20)));
        let session = session_with(related_specs(), transport, SubmitTarget::create("/api/order/"));
        session.open().await.unwrap();

        let (filled, _) = futures::join!(session.sync_related("customer"), async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            session.set_related("customer", Some(json!(9)), Some(json!({"pk": 9})));
        });

        assert!(filled.is_none());
        assert_eq!(session.value("customer"), FieldValue::Related(json!(9)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sibling_change_reruns_adjust_filters() {
        let transport = Rc::new(RecordingTransport::new(responder));
        let session = session(transport, SubmitTarget::create("/api/order/"));
        session.apply_schema(serde_json::from_value(options()).unwrap());

        let reference = session.definition("contact").unwrap().related().cloned().unwrap();
        let contacts = session.lookup("contact", &reference);
        assert!(contacts.filters().get("company").is_none());

        session.set_related("customer", Some(json!(3)), Some(json!({"pk": 3, "name": "ACME"})));
        assert_eq!(contacts.filters().get("company"), Some(&json!(3)));
    }

    #[test]
    fn test_on_value_change_receives_record() {
        let transport = Rc::new(RecordingTransport::new(responder));
        let seen = Rc::new(RefCell::new(None));
        let sink = seen.clone();
        let session = FormSession::new(
            vec![FieldSpec::new("customer")
                .field_type(FieldType::RelatedModel)
                .api_url("/api/company/")
                .on_value_change(move |value, record| {
                    *sink.borrow_mut() = Some((value.clone(), record.cloned()));
                })],
            SubmitTarget::create("/api/order/"),
            transport,
            Rc::new(TokioSleeper),
            Rc::new(FormEngineConfig::default()),
        );

        session.set_related("customer", Some(json!(3)), Some(json!({"pk": 3})));
        assert_eq!(
            *seen.borrow(),
            Some((FieldValue::Related(json!(3)), Some(json!({"pk": 3}))))
        );
    }

    #[test]
    fn test_table_rows() {
        let transport = Rc::new(RecordingTransport::new(responder));
        let session = FormSession::new(
            vec![FieldSpec::new("lines")
                .field_type(FieldType::Table)
                .child(FieldSpec::new("quantity").field_type(FieldType::Integer).default_value(1))
                .child(FieldSpec::new("note").field_type(FieldType::String))],
            SubmitTarget::create("/api/order/"),
            transport,
            Rc::new(TokioSleeper),
            Rc::new(FormEngineConfig::default()),
        );

        assert_eq!(session.add_row("lines"), 0);
        assert_eq!(session.add_row("lines"), 1);
        session.set_cell("lines", 1, "quantity", &json!("4.7"));
        assert!(session.remove_row("lines", 0));
        assert!(!session.remove_row("lines", 5));

        let state = session.state();
        let rows = state.rows("lines");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["quantity"], json!(4));
    }
}
