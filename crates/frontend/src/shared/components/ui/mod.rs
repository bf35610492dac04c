pub mod badge;
pub mod button;
pub mod checkbox;
pub mod input;
pub mod select;

pub use badge::Badge;
pub use button::Button;
pub use checkbox::Checkbox;
pub use input::Input;
pub use select::Select;

/// CSS-класс подписи поля (обязательные помечаются звёздочкой в стилях)
pub(crate) fn label_class(required: bool) -> &'static str {
    if required {
        "form__label form__label--required"
    } else {
        "form__label"
    }
}
