use leptos::prelude::*;

/// Checkbox component
#[component]
pub fn Checkbox(
    #[prop(into)]
    label: Signal<String>,
    #[prop(into)]
    checked: Signal<bool>,
    #[prop(optional)]
    on_change: Option<Callback<bool>>,
    #[prop(optional, into)]
    disabled: Signal<bool>,
    #[prop(optional, into)]
    description: MaybeProp<String>,
    #[prop(optional, into)]
    id: MaybeProp<String>,
) -> impl IntoView {
    let checkbox_id = move || id.get().unwrap_or_default();
    let wrapper_class = move || {
        if disabled.get() {
            "form__checkbox-wrapper form__checkbox-wrapper--disabled"
        } else {
            "form__checkbox-wrapper"
        }
    };

    view! {
        <div class="form__group">
            <div class=wrapper_class>
                <input
                    id=checkbox_id
                    type="checkbox"
                    class="form__checkbox"
                    prop:checked=move || checked.get()
                    disabled=move || disabled.get()
                    on:change=move |ev| {
                        if let Some(handler) = on_change {
                            handler.run(event_target_checked(&ev));
                        }
                    }
                />
                <label class="form__checkbox-label" for=checkbox_id>
                    {label}
                </label>
            </div>
            {move || description.get().map(|d| view! { <div class="form__help">{d}</div> })}
        </div>
    }
}
