//! Reactive handle around a `FormSession`
//!
//! The session itself is `!Send` (Rc inside), so it lives in a local
//! `StoredValue`; a version counter signal is bumped on every session change
//! and is what components subscribe to.

use form_engine::dispatch::find_widget;
use form_engine::{BoundWidget, FieldValue, FormSession};
use leptos::prelude::*;
use leptos::task::spawn_local;
use serde_json::Value;

#[derive(Clone, Copy)]
pub struct FormHandle {
    session: StoredValue<FormSession, LocalStorage>,
    version: RwSignal<u64>,
    id_prefix: StoredValue<String>,
}

impl FormHandle {
    pub fn new(session: FormSession) -> Self {
        let version = RwSignal::new(0u64);
        session.subscribe(move || version.update(|v| *v += 1));
        Self {
            session: StoredValue::new_local(session),
            version,
            id_prefix: StoredValue::new(format!("form-{}", uuid::Uuid::new_v4().simple())),
        }
    }

    pub fn session(&self) -> FormSession {
        self.session.get_value()
    }

    /// `None`, если владелец формы уже уничтожен (вызовы из cleanup)
    pub fn try_session(&self) -> Option<FormSession> {
        self.session.try_get_value()
    }

    /// Подписаться на изменения формы в текущем реактивном контексте
    pub fn track(&self) {
        self.version.track();
    }

    /// Виджет по пути (реактивно)
    pub fn bound(&self, path: &str) -> Option<BoundWidget> {
        self.track();
        self.bound_untracked(path)
    }

    pub fn bound_untracked(&self, path: &str) -> Option<BoundWidget> {
        self.session
            .with_value(|session| find_widget(&session.render(), path).cloned())
    }

    /// Пути полей верхнего уровня
    pub fn paths(&self) -> Vec<String> {
        self.track();
        self.session.with_value(|session| {
            session
                .render()
                .into_iter()
                .map(|widget| widget.path)
                .collect()
        })
    }

    pub fn title(&self) -> Option<String> {
        self.track();
        self.session.with_value(FormSession::title)
    }

    pub fn is_loading(&self) -> bool {
        self.track();
        self.session.with_value(FormSession::is_loading)
    }

    /// Форма загружена: можно запускать автовыбор связанных полей
    pub fn is_ready(&self) -> bool {
        self.track();
        self.session
            .with_value(|session| session.is_opened() && !session.is_loading())
    }

    pub fn input_string(&self, path: &str) -> String {
        self.bound(path)
            .map(|widget| widget.value.input_string())
            .unwrap_or_default()
    }

    pub fn value(&self, path: &str) -> FieldValue {
        self.track();
        self.session.with_value(|session| session.value(path))
    }

    pub fn is_disabled(&self, path: &str) -> bool {
        self.bound(path).map(|widget| widget.disabled).unwrap_or(true)
    }

    pub fn can_submit(&self) -> bool {
        self.track();
        self.session.with_value(FormSession::can_submit)
    }

    pub fn is_submitting(&self) -> bool {
        self.track();
        self.session.with_value(FormSession::is_submitting)
    }

    pub fn non_field_errors(&self) -> Vec<String> {
        self.track();
        self.session.with_value(FormSession::non_field_errors)
    }

    /// Ввод пользователя; зависимые поля перезапрашиваются в фоне
    pub fn change(&self, path: &str, raw: Value) {
        let session = self.session();
        let targets = session.set_input(path, &raw);
        if !targets.is_empty() {
            spawn_local(async move { session.refresh_dependents(targets).await });
        }
    }

    pub fn set_value(&self, path: &str, value: FieldValue) {
        let session = self.session();
        let targets = session.set_value(path, value);
        if !targets.is_empty() {
            spawn_local(async move { session.refresh_dependents(targets).await });
        }
    }

    /// Выбор записи в связанном поле (`None` очищает поле)
    pub fn select_related(&self, path: &str, pk: Option<Value>, record: Option<Value>) {
        let session = self.session();
        let targets = session.set_related(path, pk, record);
        if !targets.is_empty() {
            spawn_local(async move { session.refresh_dependents(targets).await });
        }
    }

    /// Значение ячейки табличного поля
    pub fn cell(&self, table_path: &str, row: usize, column: &str) -> Value {
        self.track();
        self.session.with_value(|session| {
            session
                .state()
                .rows(table_path)
                .get(row)
                .and_then(|cells| cells.get(column))
                .cloned()
                .unwrap_or(Value::Null)
        })
    }

    pub fn row_count(&self, table_path: &str) -> usize {
        self.track();
        self.session
            .with_value(|session| session.state().rows(table_path).len())
    }

    /// id HTML-элемента поля, уникальный в пределах страницы
    pub fn input_id(&self, path: &str) -> String {
        format!("{}-{}", self.id_prefix.get_value(), path.replace('.', "-"))
    }
}
