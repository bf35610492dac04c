//! Related-model lookup
//!
//! Searchable, paginated choice list for a related-model field plus
//! resolution of a known primary key to its display record.
//!
//! - search text changes are debounced; a newer search aborts the query in flight
//! - every result is checked against the query key (generation, search, offset,
//!   filters) before it is applied, so stale results never overwrite fresh ones
//! - offset pagination appends pages
//! - failures degrade silently to an empty option list

use contracts::shared::forms::ListResponse;
use futures::future::{AbortHandle, Abortable};
use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use crate::config::FormEngineConfig;
use crate::definition::{Filters, RelatedModelRef};
use crate::state::FormState;
use crate::timer::Sleeper;
use crate::transport::{ApiRequest, ApiTransport};
use crate::value::{value_to_plain_string, FieldValue};

/// Кэш выбранной записи: первичный ключ + запись для отображения
#[derive(Debug, Clone, PartialEq)]
pub struct RelatedModelCacheEntry {
    pub primary_key: Value,
    pub record: Value,
}

/// Что произошло с результатом запроса
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupUpdate {
    /// Результат применён к списку вариантов
    Applied,
    /// Запрос вытеснен более новым (или отменён)
    Stale,
    /// Ошибка запроса: список очищен
    Failed,
    /// Запрос не выполнялся (нет следующей страницы / уже идёт загрузка)
    Skipped,
}

#[derive(Debug, Clone, PartialEq)]
struct QueryKey {
    generation: u64,
    search: String,
    offset: usize,
    filters: Filters,
}

struct LookupState {
    api_url: String,
    filters: Filters,
    search: String,
    options: Vec<Value>,
    total: Option<usize>,
    generation: u64,
    in_flight: Option<AbortHandle>,
    loading: bool,
    cache: Option<RelatedModelCacheEntry>,
    auto_fill_done: bool,
}

impl LookupState {
    fn key(&self, offset: usize) -> QueryKey {
        QueryKey {
            generation: self.generation,
            search: self.search.clone(),
            offset,
            filters: self.filters.clone(),
        }
    }

    /// Сбросить варианты и вытеснить запрос в полёте
    fn invalidate(&mut self) {
        self.generation += 1;
        self.options.clear();
        self.total = None;
        self.loading = false;
        if let Some(handle) = self.in_flight.take() {
            handle.abort();
        }
    }
}

/// Состояние поиска одного экземпляра связанного поля
#[derive(Clone)]
pub struct RelatedModelLookup {
    inner: Rc<RefCell<LookupState>>,
    transport: Rc<dyn ApiTransport>,
    sleeper: Rc<dyn Sleeper>,
    debounce: Duration,
    page_size: usize,
    auto_fill: bool,
}

impl RelatedModelLookup {
    pub fn new(
        reference: &RelatedModelRef,
        transport: Rc<dyn ApiTransport>,
        sleeper: Rc<dyn Sleeper>,
        config: &FormEngineConfig,
    ) -> Self {
        Self {
            inner: Rc::new(RefCell::new(LookupState {
                api_url: reference.api_url.clone(),
                filters: reference.filters.clone(),
                search: String::new(),
                options: Vec::new(),
                total: None,
                generation: 0,
                in_flight: None,
                loading: false,
                cache: None,
                auto_fill_done: false,
            })),
            transport,
            sleeper,
            debounce: config.debounce(),
            page_size: reference.page_size.unwrap_or(config.lookup.page_size).max(1),
            auto_fill: reference.auto_fill,
        }
    }

    pub fn options(&self) -> Vec<Value> {
        self.inner.borrow().options.clone()
    }

    pub fn search(&self) -> String {
        self.inner.borrow().search.clone()
    }

    pub fn filters(&self) -> Filters {
        self.inner.borrow().filters.clone()
    }

    pub fn selected(&self) -> Option<RelatedModelCacheEntry> {
        self.inner.borrow().cache.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.borrow().loading
    }

    /// Есть ли ещё страницы на сервере
    pub fn has_more(&self) -> bool {
        let state = self.inner.borrow();
        match state.total {
            Some(total) => state.options.len() < total,
            None => false,
        }
    }

    /// Начальная загрузка виджета.
    ///
    /// Если значение задано, один запрос детальной записи (до любого поиска),
    /// иначе однократная попытка автовыбора.
    pub async fn mount(&self, current: &FieldValue) -> Option<RelatedModelCacheEntry> {
        if let Some(pk) = current.primary_key() {
            let pk = pk.clone();
            return self.hydrate(&pk).await.map(|record| RelatedModelCacheEntry {
                primary_key: pk,
                record,
            });
        }
        if self.auto_fill {
            return self.auto_fill(current).await;
        }
        None
    }

    /// `GET {api_url}{pk}/`: запись для отображения уже выбранного значения.
    ///
    /// Поле со значением больше не участвует в автовыборе.
    pub async fn hydrate(&self, pk: &Value) -> Option<Value> {
        let url = {
            let mut state = self.inner.borrow_mut();
            state.auto_fill_done = true;
            if let Some(entry) = &state.cache {
                if &entry.primary_key == pk {
                    return Some(entry.record.clone());
                }
            }
            detail_url(&state.api_url, pk)
        };

        let response = match self.transport.send(ApiRequest::get(url.clone())).await {
            Ok(response) if response.is_success() => response,
            Ok(response) => {
                log::warn!("Related record {} returned status {}", url, response.status);
                return None;
            }
            Err(e) => {
                log::warn!("Failed to load related record {}: {}", url, e);
                return None;
            }
        };

        self.inner.borrow_mut().cache = Some(RelatedModelCacheEntry {
            primary_key: pk.clone(),
            record: response.body.clone(),
        });
        Some(response.body)
    }

    /// Запомнить выбор пользователя
    pub fn select(&self, primary_key: Value, record: Value) {
        self.inner.borrow_mut().cache = Some(RelatedModelCacheEntry {
            primary_key,
            record,
        });
    }

    /// Изменение текста поиска: пауза `debounce`, затем запрос первой страницы
    pub async fn set_search(&self, text: &str) -> LookupUpdate {
        let generation = {
            let mut state = self.inner.borrow_mut();
            state.search = text.to_string();
            state.generation += 1;
            if let Some(handle) = state.in_flight.take() {
                handle.abort();
            }
            state.generation
        };

        self.sleeper.sleep(self.debounce).await;

        if self.inner.borrow().generation != generation {
            return LookupUpdate::Stale;
        }
        self.query(0).await
    }

    /// Перезапрос первой страницы без паузы (открытие списка, смена фильтров)
    pub async fn refresh(&self) -> LookupUpdate {
        {
            let mut state = self.inner.borrow_mut();
            state.generation += 1;
            if let Some(handle) = state.in_flight.take() {
                handle.abort();
            }
        }
        self.query(0).await
    }

    /// Прокрутка до конца списка: следующая страница добавляется к вариантам
    pub async fn load_next_page(&self) -> LookupUpdate {
        let offset = {
            let state = self.inner.borrow();
            if state.loading {
                return LookupUpdate::Skipped;
            }
            state.options.len()
        };
        if !self.has_more() {
            return LookupUpdate::Skipped;
        }
        self.query(offset).await
    }

    /// Заменить фильтры. При изменении сбрасывает варианты, пагинацию и кэш.
    pub fn set_filters(&self, filters: Filters) -> bool {
        let mut state = self.inner.borrow_mut();
        if state.filters == filters {
            return false;
        }
        log::debug!("Lookup {}: filters changed", state.api_url);
        state.filters = filters;
        state.cache = None;
        state.invalidate();
        true
    }

    /// Пересчитать фильтры хуком поля по текущему состоянию формы
    pub fn apply_adjust_filters(&self, reference: &RelatedModelRef, form: &FormState) -> bool {
        match &reference.adjust_filters {
            Some(hook) => self.set_filters((hook.0)(&reference.filters, form)),
            None => false,
        }
    }

    /// Автовыбор: если поле пустое и фильтрам соответствует ровно одна запись.
    ///
    /// Выполняется не более одного раза за жизнь виджета.
    pub async fn auto_fill(&self, current: &FieldValue) -> Option<RelatedModelCacheEntry> {
        let request = {
            let mut state = self.inner.borrow_mut();
            if state.auto_fill_done {
                return None;
            }
            state.auto_fill_done = true;
            if !current.is_empty() {
                return None;
            }
            list_request(&state.api_url, "", 0, 1, &state.filters)
        };

        let response = match self.transport.send(request).await {
            Ok(response) if response.is_success() => response,
            _ => return None,
        };
        let page = serde_json::from_value::<ListResponse>(response.body)
            .ok()?
            .into_page();
        if page.count != 1 || page.results.len() != 1 {
            return None;
        }

        let record = page.results.into_iter().next()?;
        let primary_key = record_primary_key(&record)?;
        let entry = RelatedModelCacheEntry {
            primary_key,
            record,
        };
        log::debug!("Lookup auto-filled with {:?}", entry.primary_key);
        self.inner.borrow_mut().cache = Some(entry.clone());
        Some(entry)
    }

    /// Сброс поля: кэш и варианты очищаются, автовыбор повторно не срабатывает
    pub fn reset(&self) {
        let mut state = self.inner.borrow_mut();
        state.cache = None;
        state.auto_fill_done = true;
        state.search.clear();
        state.invalidate();
    }

    async fn query(&self, offset: usize) -> LookupUpdate {
        let (key, request, registration) = {
            let mut state = self.inner.borrow_mut();
            let key = state.key(offset);
            let request = list_request(&state.api_url, &state.search, offset, self.page_size, &state.filters);
            let (handle, registration) = AbortHandle::new_pair();
            state.in_flight = Some(handle);
            state.loading = true;
            (key, request, registration)
        };

        let result = Abortable::new(self.transport.send(request), registration).await;

        let mut state = self.inner.borrow_mut();
        if state.key(offset) != key {
            log::debug!("Discarding stale lookup result for '{}'", key.search);
            return LookupUpdate::Stale;
        }
        state.in_flight = None;
        state.loading = false;

        let response = match result {
            Err(_aborted) => return LookupUpdate::Stale,
            Ok(Ok(response)) if response.is_success() => response,
            Ok(Ok(response)) => {
                log::warn!("Lookup {} returned status {}", state.api_url, response.status);
                state.options.clear();
                state.total = None;
                return LookupUpdate::Failed;
            }
            Ok(Err(e)) => {
                log::warn!("Lookup {} failed: {}", state.api_url, e);
                state.options.clear();
                state.total = None;
                return LookupUpdate::Failed;
            }
        };

        let page = match serde_json::from_value::<ListResponse>(response.body) {
            Ok(list) => list.into_page(),
            Err(e) => {
                log::warn!("Lookup {} returned unexpected body: {}", state.api_url, e);
                state.options.clear();
                state.total = None;
                return LookupUpdate::Failed;
            }
        };

        if offset == 0 {
            state.options = page.results;
        } else {
            state.options.extend(page.results);
        }
        let total = if page.paged { page.count } else { state.options.len() };
        state.total = Some(total);
        LookupUpdate::Applied
    }
}

fn list_request(api_url: &str, search: &str, offset: usize, limit: usize, filters: &Filters) -> ApiRequest {
    let mut request = ApiRequest::get(api_url);
    if !search.is_empty() {
        request = request.query("search", search);
    }
    request = request
        .query("offset", offset.to_string())
        .query("limit", limit.to_string());
    for (key, value) in filters {
        if value.is_null() {
            continue;
        }
        request = request.query(key.clone(), value_to_plain_string(value));
    }
    request
}

/// `{api_url}{pk}/` с гарантированным разделителем
pub fn detail_url(api_url: &str, pk: &Value) -> String {
    let pk = urlencoding::encode(&value_to_plain_string(pk)).into_owned();
    if api_url.ends_with('/') {
        format!("{}{}/", api_url, pk)
    } else {
        format!("{}/{}/", api_url, pk)
    }
}

/// Первичный ключ записи (`pk`, затем `id`)
pub fn record_primary_key(record: &Value) -> Option<Value> {
    record
        .get("pk")
        .or_else(|| record.get("id"))
        .filter(|v| !v.is_null())
        .cloned()
}

/// Подпись записи для списка вариантов
pub fn record_label(record: &Value) -> String {
    for key in ["display_name", "full_name", "name", "reference", "description"] {
        if let Some(label) = record.get(key).and_then(Value::as_str) {
            if !label.is_empty() {
                return label.to_string();
            }
        }
    }
    record_primary_key(record)
        .map(|pk| value_to_plain_string(&pk))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::Hook;
    use crate::error::TransportError;
    use crate::testing::{RecordingTransport, TokioSleeper};
    use crate::transport::ApiResponse;
    use serde_json::json;

    fn reference(api_url: &str) -> RelatedModelRef {
        RelatedModelRef {
            api_url: api_url.to_string(),
            model: None,
            filters: Filters::new(),
            page_size: Some(2),
            auto_fill: false,
            adjust_filters: None,
        }
    }

    fn list_responder(request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        if request.url.ends_with("/42/") {
            return Ok(ApiResponse::new(200, json!({"pk": 42, "name": "Widget"})));
        }
        let search = request.query_value("search").unwrap_or("").to_string();
        let offset: usize = request.query_value("offset").unwrap_or("0").parse().unwrap();
        let results: Vec<Value> = (offset..(offset + 2).min(5))
            .map(|i| json!({"pk": i, "name": format!("{}{}", search, i)}))
            .collect();
        Ok(ApiResponse::new(200, json!({"results": results, "count": 5})))
    }

    fn lookup(transport: Rc<RecordingTransport>, reference: &RelatedModelRef) -> RelatedModelLookup {
        RelatedModelLookup::new(
            reference,
            transport,
            Rc::new(TokioSleeper),
            &FormEngineConfig::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_mount_hydrates_before_search() {
        let transport = Rc::new(RecordingTransport::new(list_responder));
        let lookup = lookup(transport.clone(), &reference("/api/thing/"));

        let entry = lookup.mount(&FieldValue::Related(json!(42))).await.unwrap();
        assert_eq!(entry.record["name"], json!("Widget"));
        assert_eq!(transport.urls(), vec!["/api/thing/42/".to_string()]);

        lookup.set_search("wid").await;
        let urls = transport.urls();
        assert_eq!(urls.len(), 2);
        assert_eq!(urls[0], "/api/thing/42/");
        assert_eq!(urls[1], "/api/thing/");
        assert_eq!(lookup.selected().unwrap().primary_key, json!(42));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_search_changes_issue_one_query() {
        let transport = Rc::new(RecordingTransport::new(list_responder));
        let lookup = lookup(transport.clone(), &reference("/api/thing/"));
        let sleeper = TokioSleeper;

        let (first, second) = futures::join!(lookup.set_search("a"), async {
            sleeper.sleep(Duration::from_millis(100)).await;
            lookup.set_search("ab").await
        });

        assert_eq!(first, LookupUpdate::Stale);
        assert_eq!(second, LookupUpdate::Applied);
        assert_eq!(transport.count(), 1);
        assert_eq!(transport.requests.borrow()[0].query_value("search"), Some("ab"));
        assert_eq!(lookup.options()[0]["name"], json!("ab0"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_query_is_superseded() {
        let transport = Rc::new(
            RecordingTransport::new(list_responder).with_latency(Duration::from_millis(500)),
        );
        let lookup = lookup(transport.clone(), &reference("/api/thing/"));
        let sleeper = TokioSleeper;

        // "a" уже отправлен (250ms debounce), "ab" приходит пока он в полёте
        let (first, second) = futures::join!(lookup.set_search("a"), async {
            sleeper.sleep(Duration::from_millis(400)).await;
            lookup.set_search("ab").await
        });

        assert_eq!(first, LookupUpdate::Stale);
        assert_eq!(second, LookupUpdate::Applied);
        assert_eq!(transport.count(), 2);
        assert!(lookup.options().iter().all(|o| o["name"].as_str().unwrap().starts_with("ab")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pagination_appends() {
        let transport = Rc::new(RecordingTransport::new(list_responder));
        let lookup = lookup(transport.clone(), &reference("/api/thing/"));

        assert_eq!(lookup.refresh().await, LookupUpdate::Applied);
        assert_eq!(lookup.options().len(), 2);
        assert!(lookup.has_more());

        assert_eq!(lookup.load_next_page().await, LookupUpdate::Applied);
        assert_eq!(lookup.load_next_page().await, LookupUpdate::Applied);
        assert_eq!(lookup.options().len(), 5);
        assert!(!lookup.has_more());
        assert_eq!(lookup.load_next_page().await, LookupUpdate::Skipped);

        let offsets: Vec<String> = transport
            .requests
            .borrow()
            .iter()
            .map(|r| r.query_value("offset").unwrap().to_string())
            .collect();
        assert_eq!(offsets, vec!["0", "2", "4"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_degrades_to_empty_options() {
        let failing = Rc::new(RefCell::new(false));
        let flag = failing.clone();
        let transport = Rc::new(RecordingTransport::new(move |request| {
            if *flag.borrow() {
                Err(TransportError::Network("offline".into()))
            } else {
                list_responder(request)
            }
        }));
        let lookup = lookup(transport, &reference("/api/thing/"));

        lookup.refresh().await;
        assert_eq!(lookup.options().len(), 2);

        *failing.borrow_mut() = true;
        assert_eq!(lookup.set_search("x").await, LookupUpdate::Failed);
        assert!(lookup.options().is_empty());
        assert!(!lookup.is_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn test_filter_change_resets_options_and_cache() {
        let transport = Rc::new(RecordingTransport::new(list_responder));
        let mut related = reference("/api/contact/");
        related.adjust_filters = Some(Hook(Rc::new(|base: &Filters, form: &FormState| {
            let mut filters = base.clone();
            if let Some(FieldValue::Related(customer)) = form.get("customer") {
                filters.insert("company".into(), customer.clone());
            }
            filters
        })));
        let lookup = lookup(transport.clone(), &related);

        lookup.refresh().await;
        lookup.select(json!(1), json!({"pk": 1}));
        assert_eq!(lookup.options().len(), 2);

        let mut form = FormState::new();
        form.set("customer", FieldValue::Related(json!(7)));
        assert!(lookup.apply_adjust_filters(&related, &form));
        assert!(lookup.options().is_empty());
        assert!(lookup.selected().is_none());
        assert!(!lookup.apply_adjust_filters(&related, &form));

        lookup.refresh().await;
        let last = transport.requests.borrow().last().cloned().unwrap();
        assert_eq!(last.query_value("company"), Some("7"));
        assert_eq!(last.query_value("offset"), Some("0"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_fill_runs_once() {
        let transport = Rc::new(RecordingTransport::new(|_| {
            Ok(ApiResponse::new(200, json!({"results": [{"pk": 3, "name": "Only"}], "count": 1})))
        }));
        let mut related = reference("/api/contact/");
        related.auto_fill = true;
        let lookup = lookup(transport.clone(), &related);

        let entry = lookup.mount(&FieldValue::Empty).await.unwrap();
        assert_eq!(entry.primary_key, json!(3));
        assert_eq!(transport.requests.borrow()[0].query_value("limit"), Some("1"));

        // Пользователь очистил поле, автовыбор не повторяется
        lookup.reset();
        assert!(lookup.auto_fill(&FieldValue::Empty).await.is_none());
        assert_eq!(transport.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hydrated_field_skips_auto_fill() {
        let transport = Rc::new(RecordingTransport::new(list_responder));
        let mut related = reference("/api/thing/");
        related.auto_fill = true;
        let lookup = lookup(transport.clone(), &related);

        assert!(lookup.hydrate(&json!(42)).await.is_some());
        // Значение с сервера очищено: автовыбор не подставляет другую запись
        lookup.reset();
        assert!(lookup.auto_fill(&FieldValue::Empty).await.is_none());
        assert_eq!(transport.urls(), vec!["/api/thing/42/".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_fill_requires_single_match() {
        let transport = Rc::new(RecordingTransport::new(|_| {
            Ok(ApiResponse::new(200, json!({"results": [{"pk": 3}], "count": 4})))
        }));
        let mut related = reference("/api/contact/");
        related.auto_fill = true;
        let lookup = lookup(transport, &related);
        assert!(lookup.mount(&FieldValue::Empty).await.is_none());
    }

    #[test]
    fn test_detail_url() {
        assert_eq!(detail_url("/api/thing/", &json!(42)), "/api/thing/42/");
        assert_eq!(detail_url("/api/thing", &json!("a b")), "/api/thing/a%20b/");
    }

    #[test]
    fn test_record_label() {
        assert_eq!(record_label(&json!({"pk": 1, "name": "ACME"})), "ACME");
        assert_eq!(record_label(&json!({"id": 9})), "9");
    }
}
