//! Leptos-компоненты форм поверх `form_engine`

pub mod api_form;
pub mod field_widget;
pub mod file_input;
pub mod form_modal;
pub mod handle;
pub mod related_model_field;
pub mod table_field;

pub use api_form::ApiForm;
pub use field_widget::FieldWidget;
pub use form_modal::FormModal;
pub use handle::FormHandle;
