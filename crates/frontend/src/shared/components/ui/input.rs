use leptos::prelude::*;

use super::label_class;

/// Input component with label and help text
#[component]
pub fn Input(
    /// Label text (optional)
    #[prop(optional, into)]
    label: MaybeProp<String>,
    /// Input value
    #[prop(into)]
    value: Signal<String>,
    /// Input event handler
    #[prop(optional)]
    on_input: Option<Callback<String>>,
    /// Called on blur with the final value
    #[prop(optional)]
    on_change: Option<Callback<String>>,
    #[prop(optional, into)]
    placeholder: MaybeProp<String>,
    /// Help text under the input
    #[prop(optional, into)]
    description: MaybeProp<String>,
    /// Input type: "text" (default), "password", "email", "number", "date", etc.
    #[prop(optional, into)]
    input_type: MaybeProp<String>,
    /// `step` for numeric inputs
    #[prop(optional, into)]
    step: MaybeProp<String>,
    #[prop(optional, into)]
    disabled: Signal<bool>,
    /// Required attribute (also marks the label)
    #[prop(optional)]
    required: bool,
    #[prop(optional, into)]
    id: MaybeProp<String>,
    /// Additional CSS classes
    #[prop(optional, into)]
    class: MaybeProp<String>,
) -> impl IntoView {
    let input_id = move || id.get().unwrap_or_default();
    let input_placeholder = move || placeholder.get().unwrap_or_default();
    let input_t = move || input_type.get().unwrap_or_else(|| "text".to_string());
    let additional_class = move || class.get().unwrap_or_default();

    view! {
        <div class="form__group">
            {move || label.get().map(|l| view! {
                <label class=label_class(required) for=input_id>
                    {l}
                </label>
            })}
            <input
                id=input_id
                class=move || format!("form__input {}", additional_class())
                type=input_t
                step=move || step.get()
                prop:value=move || value.get()
                placeholder=input_placeholder
                disabled=move || disabled.get()
                required=required
                on:input=move |ev| {
                    if let Some(handler) = on_input {
                        handler.run(event_target_value(&ev));
                    }
                }
                on:change=move |ev| {
                    if let Some(handler) = on_change {
                        handler.run(event_target_value(&ev));
                    }
                }
            />
            {move || description.get().map(|d| view! { <div class="form__help">{d}</div> })}
        </div>
    }
}
