//! Реестр моделей: имя модели → шаблон URL детальной страницы.
//!
//! Инициализируется один раз при старте приложения, далее только читается.

use once_cell::sync::OnceCell;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::value::value_to_plain_string;

/// Плейсхолдер первичного ключа в шаблоне URL
pub const PK_PLACEHOLDER: &str = "{pk}";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelRegistry {
    detail_routes: BTreeMap<String, String>,
}

static MODEL_REGISTRY: OnceCell<ModelRegistry> = OnceCell::new();
static EMPTY_REGISTRY: ModelRegistry = ModelRegistry {
    detail_routes: BTreeMap::new(),
};

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `route` — шаблон вида `/sales/order/{pk}/`
    pub fn with_model(mut self, model: impl Into<String>, route: impl Into<String>) -> Self {
        self.detail_routes.insert(model.into(), route.into());
        self
    }

    /// URL детальной страницы записи; `None` для незарегистрированной модели
    pub fn detail_url(&self, model: &str, pk: &Value) -> Option<String> {
        if pk.is_null() {
            return None;
        }
        let route = self.detail_routes.get(model)?;
        let pk = value_to_plain_string(pk);
        if route.contains(PK_PLACEHOLDER) {
            Some(route.replace(PK_PLACEHOLDER, &pk))
        } else {
            Some(format!("{}/{}/", route.trim_end_matches('/'), pk))
        }
    }
}

/// Установить реестр. Повторная инициализация игнорируется (возвращает `false`).
pub fn init_model_registry(registry: ModelRegistry) -> bool {
    match MODEL_REGISTRY.set(registry) {
        Ok(()) => true,
        Err(_) => {
            log::warn!("Model registry is already initialized");
            false
        }
    }
}

/// Глобальный реестр (пустой, если не инициализирован)
pub fn model_registry() -> &'static ModelRegistry {
    MODEL_REGISTRY.get().unwrap_or(&EMPTY_REGISTRY)
}
