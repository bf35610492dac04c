use form_engine::dispatch::NumberInput;
use form_engine::value::value_to_plain_string;
use form_engine::Widget;
use leptos::prelude::*;
use serde_json::Value;

use super::handle::FormHandle;
use crate::shared::components::ui::{label_class, Button};

/// Редактор ячейки, выбранный по виджету колонки
#[derive(Clone)]
enum CellInput {
    /// `<input type=...>`
    Input(&'static str),
    Checkbox,
    Select(Vec<(String, Value, String)>),
}

#[derive(Clone)]
struct Column {
    name: String,
    label: String,
    required: bool,
    input: CellInput,
}

impl Column {
    fn from_widget(widget: &form_engine::BoundWidget) -> Option<Self> {
        let input = match &widget.widget {
            Widget::Hidden | Widget::ErrorMarker { .. } => return None,
            Widget::Checkbox => CellInput::Checkbox,
            Widget::Select(choices) => CellInput::Select(
                choices
                    .iter()
                    .map(|c| (value_to_plain_string(&c.value), c.value.clone(), c.display_name.clone()))
                    .collect(),
            ),
            Widget::Number(NumberInput::Integer) | Widget::Number(NumberInput::Decimal) => {
                CellInput::Input("number")
            }
            Widget::Date => CellInput::Input("date"),
            Widget::DateTime => CellInput::Input("datetime-local"),
            Widget::Text(kind) => CellInput::Input(kind.html_type()),
            // В ячейке связанное поле редактируется как первичный ключ
            _ => CellInput::Input("text"),
        };
        Some(Self {
            name: widget.path.clone(),
            label: widget.label.clone(),
            required: widget.required,
            input,
        })
    }
}

/// Табличное поле: строки с колонками, ошибки по ячейкам
#[component]
pub fn TableField(form: FormHandle, path: String) -> impl IntoView {
    let Some(bound) = form.bound_untracked(&path) else {
        return ().into_any();
    };
    let Widget::Table { columns, .. } = &bound.widget else {
        return ().into_any();
    };
    let columns: Vec<Column> = columns.iter().filter_map(Column::from_widget).collect();
    let columns_sv = StoredValue::new(columns);
    let path_sv = StoredValue::new(path.clone());

    let row_count = Memo::new(move |_| form.row_count(&path_sv.get_value()));

    let cell_errors = move |key: String| -> Vec<String> {
        match form.bound(&path_sv.get_value()).map(|b| b.widget) {
            Some(Widget::Table { row_errors, .. }) => row_errors.get(&key).cloned().unwrap_or_default(),
            _ => Vec::new(),
        }
    };

    let add_row = move |_| {
        form.session().add_row(&path_sv.get_value());
    };

    let disabled = move || form.is_disabled(&path_sv.get_value());

    view! {
        <div class="form__group form__table-field">
            <label class=label_class(bound.required)>{bound.label.clone()}</label>
            {bound.description.clone().map(|d| view! { <div class="form__help">{d}</div> })}
            <table class="form__table">
                <thead>
                    <tr>
                        {columns_sv.with_value(|columns| {
                            columns
                                .iter()
                                .map(|c| view! { <th class=label_class(c.required)>{c.label.clone()}</th> })
                                .collect_view()
                        })}
                        <th></th>
                    </tr>
                </thead>
                <tbody>
                    <For
                        each=move || 0..row_count.get()
                        key=|row| *row
                        children=move |row| {
                            let cells = columns_sv
                                .get_value()
                                .into_iter()
                                .map(|column| {
                                    let key = format!("{}.{}", row, column.name);
                                    view! {
                                        <td>
                                            {cell_editor(form, path_sv, row, column)}
                                            {move || {
                                                cell_errors(key.clone())
                                                    .into_iter()
                                                    .map(|e| view! { <div class="form__error">{e}</div> })
                                                    .collect_view()
                                            }}
                                        </td>
                                    }
                                })
                                .collect_view();
                            view! {
                                <tr>
                                    {cells}
                                    <td class="form__table-actions">
                                        <Button
                                            variant="ghost"
                                            size="sm"
                                            disabled=Signal::derive(disabled)
                                            on_click=Callback::new(move |_| {
                                                form.session().remove_row(&path_sv.get_value(), row);
                                            })
                                        >
                                            "Удалить"
                                        </Button>
                                        {move || {
                                            cell_errors(row.to_string())
                                                .into_iter()
                                                .map(|e| view! { <div class="form__error">{e}</div> })
                                                .collect_view()
                                        }}
                                    </td>
                                </tr>
                            }
                        }
                    />
                </tbody>
            </table>
            <Button variant="secondary" size="sm" disabled=Signal::derive(disabled) on_click=Callback::new(add_row)>
                "Добавить строку"
            </Button>
        </div>
    }
    .into_any()
}

fn cell_editor(form: FormHandle, path: StoredValue<String>, row: usize, column: Column) -> AnyView {
    let name = column.name.clone();
    let value = {
        let name = name.clone();
        move || value_to_plain_string(&form.cell(&path.get_value(), row, &name))
    };
    let disabled = move || form.is_disabled(&path.get_value());
    let write = move |raw: Value| form.session().set_cell(&path.get_value(), row, &name, &raw);

    match column.input {
        CellInput::Checkbox => {
            let checked = move || value() == "true";
            view! {
                <input
                    type="checkbox"
                    class="form__checkbox"
                    prop:checked=checked
                    disabled=disabled
                    on:change=move |ev| write(Value::Bool(event_target_checked(&ev)))
                />
            }
            .into_any()
        }
        CellInput::Select(choices) => {
            let options = choices.clone();
            view! {
                <select
                    class="form__select"
                    disabled=disabled
                    on:change=move |ev| {
                        let selected = event_target_value(&ev);
                        let raw = choices
                            .iter()
                            .find(|(plain, _, _)| *plain == selected)
                            .map(|(_, raw, _)| raw.clone())
                            .unwrap_or(Value::Null);
                        write(raw);
                    }
                >
                    <option value="">"—"</option>
                    {options
                        .into_iter()
                        .map(|(plain, _, label)| {
                            let current = value.clone();
                            let option_value = plain.clone();
                            view! {
                                <option value=plain selected=move || current() == option_value>
                                    {label}
                                </option>
                            }
                        })
                        .collect_view()}
                </select>
            }
            .into_any()
        }
        CellInput::Input(input_type) => view! {
            <input
                type=input_type
                class="form__input"
                step=(input_type == "number").then_some("any")
                prop:value=value
                disabled=disabled
                on:change=move |ev| write(Value::String(event_target_value(&ev)))
            />
        }
        .into_any(),
    }
}
