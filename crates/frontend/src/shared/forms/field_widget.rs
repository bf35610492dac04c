//! Field widgets: `BoundWidget` → Leptos component
//!
//! The control is rebuilt only when the widget kind at the path changes
//! (schema arrived, dependent field re-fetched); values, errors and the
//! disabled flag are read reactively.

use form_engine::value::value_to_plain_string;
use form_engine::{ErrorDisplay, FieldValue, Widget};
use leptos::prelude::*;
use serde_json::Value;
use thaw::{Spinner, SpinnerSize};

use super::file_input::FileInput;
use super::handle::FormHandle;
use super::related_model_field::RelatedModelField;
use super::table_field::TableField;
use crate::shared::components::ui::{Checkbox, Input, Select};

#[component]
pub fn FieldWidget(form: FormHandle, path: String) -> impl IntoView {
    let kind = {
        let path = path.clone();
        Memo::new(move |_| {
            form.bound(&path)
                .map(|bound| bound.widget.kind())
                .unwrap_or("missing")
        })
    };
    let data_path = path.clone();

    view! {
        <div class="api-form__field" data-path=data_path>
            {move || {
                kind.track();
                render_control(form, path.clone())
            }}
        </div>
    }
}

/// Ошибки поля: одна строкой, несколько списком
#[component]
pub fn FieldErrors(form: FormHandle, path: String) -> impl IntoView {
    move || match form.bound(&path).map(|bound| bound.error) {
        Some(ErrorDisplay::Single(message)) => view! { <div class="form__error">{message}</div> }.into_any(),
        Some(ErrorDisplay::Multiple(messages)) => view! {
            <ul class="form__errors">
                {messages.into_iter().map(|m| view! { <li>{m}</li> }).collect_view()}
            </ul>
        }
        .into_any(),
        _ => ().into_any(),
    }
}

fn render_control(form: FormHandle, path: String) -> AnyView {
    let Some(bound) = form.bound_untracked(&path) else {
        return ().into_any();
    };

    let id = form.input_id(&path);
    let label = bound.label.clone();
    let description = bound.description.clone();
    let placeholder = bound.placeholder.clone();
    let required = bound.required;
    let disabled = {
        let path = path.clone();
        Signal::derive(move || form.is_disabled(&path))
    };
    let value = {
        let path = path.clone();
        Signal::derive(move || form.input_string(&path))
    };
    let widget_kind = bound.widget.kind();

    let control = match bound.widget {
        Widget::Hidden => return ().into_any(),
        Widget::ErrorMarker { message } => {
            return view! {
                <div class="form__group form__group--invalid">
                    <div class="form__error">{message}</div>
                </div>
            }
            .into_any()
        }
        Widget::Text(kind) => {
            let path = path.clone();
            view! {
                <Input
                    id=id
                    label=label
                    description=description
                    placeholder=placeholder
                    input_type=kind.html_type()
                    value=value
                    required=required
                    disabled=disabled
                    on_input=Callback::new(move |text: String| form.change(&path, Value::String(text)))
                />
            }
            .into_any()
        }
        Widget::IconPicker => {
            let path = path.clone();
            view! {
                <div class="form__icon-field">
                    <span class=move || format!("form__icon-preview icon icon-{}", value.get())></span>
                    <Input
                        id=id
                        label=label
                        description=description
                        placeholder=placeholder
                        value=value
                        required=required
                        disabled=disabled
                        on_input=Callback::new(move |text: String| form.change(&path, Value::String(text)))
                    />
                </div>
            }
            .into_any()
        }
        Widget::Number(kind) => {
            let path = path.clone();
            let step = match kind {
                form_engine::dispatch::NumberInput::Integer => "1",
                form_engine::dispatch::NumberInput::Decimal => "any",
            };
            // Значение применяется по change, чтобы не мешать вводу «1.»
            view! {
                <Input
                    id=id
                    label=label
                    description=description
                    placeholder=placeholder
                    input_type="number"
                    step=step
                    value=value
                    required=required
                    disabled=disabled
                    on_change=Callback::new(move |text: String| form.change(&path, Value::String(text)))
                />
            }
            .into_any()
        }
        Widget::Date | Widget::DateTime => {
            let path = path.clone();
            let input_type = if widget_kind == "date" { "date" } else { "datetime-local" };
            view! {
                <Input
                    id=id
                    label=label
                    description=description
                    input_type=input_type
                    value=value
                    required=required
                    disabled=disabled
                    on_change=Callback::new(move |text: String| form.change(&path, Value::String(text)))
                />
            }
            .into_any()
        }
        Widget::Checkbox => {
            let checked = {
                let path = path.clone();
                Signal::derive(move || matches!(form.value(&path), FieldValue::Bool(true)))
            };
            let path = path.clone();
            view! {
                <Checkbox
                    id=id
                    label=label
                    description=description
                    checked=checked
                    disabled=disabled
                    on_change=Callback::new(move |flag: bool| form.change(&path, Value::Bool(flag)))
                />
            }
            .into_any()
        }
        Widget::Select(_) => {
            // Варианты читаются реактивно: у зависимого поля они меняются без смены вида
            let choices = {
                let path = path.clone();
                Memo::new(move |_| match form.bound(&path).map(|bound| bound.widget) {
                    Some(Widget::Select(choices)) => choices,
                    _ => Vec::new(),
                })
            };
            let options = Signal::derive(move || {
                choices
                    .get()
                    .into_iter()
                    .map(|choice| (value_to_plain_string(&choice.value), choice.display_name))
                    .collect::<Vec<_>>()
            });
            let path = path.clone();
            view! {
                <Select
                    id=id
                    label=label
                    description=description
                    placeholder=placeholder
                    value=value
                    options=options
                    required=required
                    disabled=disabled
                    on_change=Callback::new(move |selected: String| {
                        let raw = choices
                            .get_untracked()
                            .into_iter()
                            .find(|choice| value_to_plain_string(&choice.value) == selected)
                            .map(|choice| choice.value)
                            .unwrap_or(Value::Null);
                        form.change(&path, raw);
                    })
                />
            }
            .into_any()
        }
        Widget::RelatedModel(_) => view! { <RelatedModelField form=form path=path.clone() /> }.into_any(),
        Widget::FileUpload => view! { <FileInput form=form path=path.clone() /> }.into_any(),
        Widget::Table { .. } => view! { <TableField form=form path=path.clone() /> }.into_any(),
        Widget::Nested(children) => {
            let children = children
                .into_iter()
                .map(|child| view! { <FieldWidget form=form path=child.path /> }.into_any())
                .collect_view();
            view! {
                <fieldset class="form__fieldset">
                    <legend class="form__legend">{label}</legend>
                    {description.map(|d| view! { <div class="form__help">{d}</div> })}
                    {children}
                </fieldset>
            }
            .into_any()
        }
        // Определение ещё не получено
        Widget::Dependent { .. } => view! {
            <div class="form__group">
                <label class="form__label">{label}</label>
                <Spinner size=SpinnerSize::Small />
            </div>
        }
        .into_any(),
    };

    view! {
        {control}
        <FieldErrors form=form path=path />
    }
    .into_any()
}
