//! Collection responses

use serde::Deserialize;
use serde_json::Value;

/// Ответ списочного endpoint'а: либо страница с `count`, либо голый массив
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ListResponse {
    Paged {
        results: Vec<Value>,
        #[serde(default)]
        count: Option<usize>,
    },
    Bare(Vec<Value>),
}

/// Нормализованная страница результатов
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListPage {
    pub results: Vec<Value>,
    /// Общее число записей на сервере (для голого массива это длина массива)
    pub count: usize,
    /// `true`, если сервер поддерживает постраничную выдачу
    pub paged: bool,
}

impl ListResponse {
    pub fn into_page(self) -> ListPage {
        match self {
            Self::Paged { results, count } => ListPage {
                count: count.unwrap_or(results.len()),
                results,
                paged: true,
            },
            Self::Bare(results) => ListPage {
                count: results.len(),
                results,
                paged: false,
            },
        }
    }
}
