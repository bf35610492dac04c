//! `ApiForm`: форма, построенная по описанию полей и OPTIONS-схеме endpoint'а

use std::rc::Rc;

use form_engine::{ApiTransport, FieldSpec, FormEngineConfig, FormSession, SubmitHooks, SubmitTarget};
use leptos::prelude::*;
use leptos::task::spawn_local;
use thaw::{Spinner, SpinnerSize};

use super::field_widget::FieldWidget;
use super::handle::FormHandle;
use crate::shared::components::ui::Button;
use crate::shared::transport::{GlooSleeper, GlooTransport};

#[component]
pub fn ApiForm(
    /// Поля формы в порядке отображения
    fields: Vec<FieldSpec>,
    target: SubmitTarget,
    #[prop(optional)]
    hooks: Option<SubmitHooks>,
    /// Заголовок; по умолчанию берётся из схемы endpoint'а
    #[prop(optional, into)]
    title: MaybeProp<String>,
    #[prop(optional, into)]
    submit_text: MaybeProp<String>,
    #[prop(optional)]
    on_cancel: Option<Callback<()>>,
    /// Вызывается после успешной отправки
    #[prop(optional)]
    on_submitted: Option<Callback<()>>,
) -> impl IntoView {
    let config = Rc::new(use_context::<FormEngineConfig>().unwrap_or_default());
    let transport: Rc<dyn ApiTransport> = Rc::new(GlooTransport::new(&config.api.base_url));
    let session = FormSession::new(fields, target, transport, Rc::new(GlooSleeper), config);
    let form = FormHandle::new(session.clone());
    let hooks_sv = StoredValue::new_local(hooks.unwrap_or_default());

    spawn_local(async move {
        if let Err(e) = session.open().await {
            log::error!("Не удалось загрузить форму: {}", e);
        }
    });

    let handle_submit = move |ev: leptos::ev::SubmitEvent| {
        ev.prevent_default();
        let session = form.session();
        let hooks = hooks_sv.get_value();
        spawn_local(async move {
            match session.submit(&hooks).await {
                Ok(outcome) if outcome.is_success() => {
                    if let Some(callback) = on_submitted {
                        let _ = callback.try_run(());
                    }
                }
                Ok(_) => {}
                Err(e) => log::warn!("Отправка не выполнена: {}", e),
            }
        });
    };

    let header = move || title.get().or_else(|| form.title());

    view! {
        <form class="api-form" novalidate=true on:submit=handle_submit>
            {move || header().map(|t| view! { <h3 class="api-form__title">{t}</h3> })}

            <Show when=move || form.is_loading()>
                <div class="api-form__loading">
                    <Spinner size=SpinnerSize::Small />
                </div>
            </Show>

            {move || {
                let errors = form.non_field_errors();
                (!errors.is_empty()).then(|| view! {
                    <div class="alert alert--error api-form__errors">
                        {errors.into_iter().map(|e| view! { <div>{e}</div> }).collect_view()}
                    </div>
                })
            }}

            <div class="api-form__fields">
                <For
                    each=move || form.paths()
                    key=|path| path.clone()
                    children=move |path| view! { <FieldWidget form=form path=path /> }
                />
            </div>

            <div class="api-form__actions">
                {on_cancel.map(|cancel| view! {
                    <Button variant="secondary" on_click=Callback::new(move |_| cancel.run(()))>
                        "Отмена"
                    </Button>
                })}
                <Button
                    button_type="submit"
                    disabled=Signal::derive(move || !form.can_submit())
                >
                    <Show when=move || form.is_submitting()>
                        <Spinner size=SpinnerSize::Small />
                    </Show>
                    {move || submit_text.get().unwrap_or_else(|| "Сохранить".to_string())}
                </Button>
            </div>
        </form>
    }
}
