//! Связанное поле: поиск записи другой модели
//!
//! Вся логика запросов (debounce, пагинация, отмена устаревших ответов)
//! живёт в `RelatedModelLookup`; компонент только отражает его состояние.

use form_engine::lookup::{record_label, record_primary_key};
use form_engine::{LookupUpdate, RelatedModelLookup, Widget};
use leptos::prelude::*;
use leptos::task::spawn_local;
use serde_json::Value;
use thaw::{Spinner, SpinnerSize};

use super::handle::FormHandle;
use crate::shared::components::ui::label_class;

/// Запас в пикселях до конца списка, при котором грузится следующая страница
const SCROLL_THRESHOLD: i32 = 24;

#[component]
pub fn RelatedModelField(form: FormHandle, path: String) -> impl IntoView {
    let Some(bound) = form.bound_untracked(&path) else {
        return ().into_any();
    };
    let Widget::RelatedModel(reference) = bound.widget.clone() else {
        return ().into_any();
    };

    let lookup_sv = StoredValue::new_local(form.session().lookup(&path, &reference));
    let path_sv = StoredValue::new(path.clone());
    let id = form.input_id(&path);

    let (options, set_options) = signal(Vec::<Value>::new());
    let (has_more, set_has_more) = signal(false);
    let (loading, set_loading) = signal(false);
    let (selected_label, set_selected_label) = signal(String::new());
    let (search, set_search) = signal(String::new());
    let (open, set_open) = signal(false);

    let sync = move |lookup: &RelatedModelLookup, update: LookupUpdate| {
        if update == LookupUpdate::Stale {
            return;
        }
        let _ = set_options.try_set(lookup.options());
        let _ = set_has_more.try_set(lookup.has_more());
        let _ = set_loading.try_set(lookup.is_loading());
    };

    // Значение меняется и извне (ответ сервера, сброс формы): подпись по pk
    // или однократный автовыбор после загрузки формы
    let sync_key = Memo::new(move |_| (form.input_string(&path_sv.get_value()), form.is_ready()));
    Effect::new(move |_| {
        sync_key.track();
        let (Some(session), Some(path)) = (form.try_session(), path_sv.try_get_value()) else {
            return;
        };
        spawn_local(async move {
            match session.sync_related(&path).await {
                Some(entry) => {
                    let _ = set_selected_label.try_set(record_label(&entry.record));
                }
                None if session.value(&path).is_empty() => {
                    let _ = set_selected_label.try_set(String::new());
                }
                None => {}
            }
        });
    });

    // Фильтры могли измениться вместе с другими полями формы
    Effect::new(move |_| {
        form.track();
        let Some(lookup) = lookup_sv.try_get_value() else {
            return;
        };
        set_options.set(lookup.options());
        set_has_more.set(lookup.has_more());
    });

    on_cleanup(move || {
        if let (Some(session), Some(path)) = (form.try_session(), path_sv.try_get_value()) {
            session.release_lookup(&path);
        }
    });

    let handle_focus = move |_| {
        if open.get_untracked() {
            return;
        }
        set_open.set(true);
        let lookup = lookup_sv.get_value();
        set_loading.set(true);
        spawn_local(async move {
            let update = lookup.refresh().await;
            sync(&lookup, update);
        });
    };

    let handle_search = move |ev| {
        let text = event_target_value(&ev);
        set_search.set(text.clone());
        set_open.set(true);
        let lookup = lookup_sv.get_value();
        set_loading.set(true);
        spawn_local(async move {
            let update = lookup.set_search(&text).await;
            sync(&lookup, update);
        });
    };

    let handle_scroll = move |ev: leptos::ev::Event| {
        let element = event_target::<web_sys::Element>(&ev);
        let bottom = element.scroll_top() + element.client_height();
        if bottom + SCROLL_THRESHOLD < element.scroll_height() {
            return;
        }
        if !has_more.get_untracked() || loading.get_untracked() {
            return;
        }
        let lookup = lookup_sv.get_value();
        set_loading.set(true);
        spawn_local(async move {
            let update = lookup.load_next_page().await;
            sync(&lookup, update);
        });
    };

    let choose = move |record: Value| {
        let Some(pk) = record_primary_key(&record) else {
            log::warn!("Запись без первичного ключа: {}", record);
            return;
        };
        set_selected_label.set(record_label(&record));
        lookup_sv.with_value(|lookup| lookup.select(pk.clone(), record.clone()));
        form.select_related(&path_sv.get_value(), Some(pk), Some(record));
        set_search.set(String::new());
        set_open.set(false);
    };

    let clear = move |_| {
        lookup_sv.with_value(|lookup| lookup.reset());
        form.select_related(&path_sv.get_value(), None, None);
        set_selected_label.set(String::new());
    };

    let disabled = move || form.is_disabled(&path_sv.get_value());
    let required = bound.required;
    let placeholder = bound.placeholder.clone().unwrap_or_else(|| "Поиск...".to_string());

    view! {
        <div class="form__group form__related">
            <label class=label_class(required) for=id.clone()>{bound.label}</label>
            <div class="form__related-control">
                <input
                    id=id
                    class="form__input"
                    type="text"
                    autocomplete="off"
                    placeholder=move || {
                        let label = selected_label.get();
                        if label.is_empty() { placeholder.clone() } else { label }
                    }
                    prop:value=move || search.get()
                    disabled=disabled
                    on:focus=handle_focus
                    on:input=handle_search
                    on:blur=move |_| set_open.set(false)
                />
                <Show when=move || loading.get()>
                    <Spinner size=SpinnerSize::Small />
                </Show>
                <Show when=move || !selected_label.get().is_empty() && !disabled()>
                    <button type="button" class="form__related-clear" title="Очистить" on:click=clear>
                        "×"
                    </button>
                </Show>
            </div>
            <Show when=move || open.get()>
                <ul class="form__related-options" on:scroll=handle_scroll>
                    {move || {
                        let items = options.get();
                        if items.is_empty() && !loading.get() {
                            return view! { <li class="form__related-empty">"Ничего не найдено"</li> }.into_any();
                        }
                        items
                            .into_iter()
                            .map(|record| {
                                let label = record_label(&record);
                                // mousedown срабатывает раньше blur у инпута
                                view! {
                                    <li
                                        class="form__related-option"
                                        on:mousedown=move |ev| {
                                            ev.prevent_default();
                                            choose(record.clone());
                                        }
                                    >
                                        {label}
                                    </li>
                                }
                            })
                            .collect_view()
                            .into_any()
                    }}
                </ul>
            </Show>
            {bound.description.map(|d| view! { <div class="form__help">{d}</div> })}
        </div>
    }
    .into_any()
}
