use thiserror::Error;

/// Ошибки транспортного уровня
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Request aborted")]
    Aborted,

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Failed to build request: {0}")]
    Request(String),
}

/// Ошибки движка форм
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormError {
    #[error("Поле '{field}': неизвестный тип '{type_name}'")]
    UnknownFieldType { field: String, type_name: String },

    #[error("Поле '{field}': тип не задан")]
    MissingFieldType { field: String },

    #[error("Форма уже отправляется")]
    AlreadySubmitting,

    #[error("Форма ещё загружается")]
    NotReady,

    #[error("Неожиданный статус ответа {status} от {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl FormError {
    /// Имя поля, к которому относится ошибка (для инлайн-маркера)
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::UnknownFieldType { field, .. } | Self::MissingFieldType { field } => Some(field),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_error_messages() {
        let status = FormError::UnexpectedStatus {
            status: 502,
            url: "/api/order/".into(),
        };
        assert_eq!(status.to_string(), "Неожиданный статус ответа 502 от /api/order/");
        assert_eq!(FormError::NotReady.to_string(), "Форма ещё загружается");
        assert_eq!(status.field(), None);

        let unknown = FormError::UnknownFieldType {
            field: "colour".into(),
            type_name: "rgb".into(),
        };
        assert_eq!(unknown.field(), Some("colour"));
    }
}
