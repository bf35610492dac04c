use form_engine::{FieldSpec, SubmitHooks, SubmitTarget};
use gloo_timers::future::TimeoutFuture;
use leptos::ev;
use leptos::prelude::*;
use leptos::task::spawn_local;

use super::api_form::ApiForm;

/// Форма в модальном окне
///
/// Закрывается по Escape, по клику на оверлей, по «Отмена» и после успешной
/// отправки.
#[component]
pub fn FormModal(
    fields: Vec<FieldSpec>,
    target: SubmitTarget,
    #[prop(optional)]
    hooks: Option<SubmitHooks>,
    #[prop(optional, into)]
    title: MaybeProp<String>,
    #[prop(optional, into)]
    submit_text: MaybeProp<String>,
    on_close: Callback<()>,
) -> impl IntoView {
    let overlay_mouse_down = RwSignal::new(false);

    let is_direct_overlay_event = |ev: &ev::MouseEvent| -> bool {
        match (ev.target(), ev.current_target()) {
            (Some(t), Some(ct)) => t == ct,
            _ => false,
        }
    };

    // Закрываем только если и нажатие, и отпускание были на самом оверлее
    let handle_overlay_mouse_down =
        move |ev: ev::MouseEvent| overlay_mouse_down.set(is_direct_overlay_event(&ev));

    let close_deferred = move || {
        // Оверлей удаляется не в обработчике его же события
        spawn_local(async move {
            TimeoutFuture::new(0).await;
            let _ = on_close.try_run(());
        });
    };

    let handle_overlay_click = move |ev: ev::MouseEvent| {
        let should_close = overlay_mouse_down.get() && is_direct_overlay_event(&ev);
        overlay_mouse_down.set(false);
        if should_close {
            close_deferred();
        }
    };

    let escape = window_event_listener(ev::keydown, move |ev| {
        if ev.key() == "Escape" {
            close_deferred();
        }
    });
    on_cleanup(move || escape.remove());

    view! {
        <div
            class="modal-overlay"
            on:mousedown=handle_overlay_mouse_down
            on:click=handle_overlay_click
        >
            <div class="modal api-form-modal" on:click=|ev: ev::MouseEvent| ev.stop_propagation()>
                <div class="modal-body">
                    <ApiForm
                        fields=fields
                        target=target
                        hooks=hooks.unwrap_or_default()
                        title=title
                        submit_text=submit_text
                        on_cancel=Callback::new(move |_| close_deferred())
                        on_submitted=Callback::new(move |_| close_deferred())
                    />
                </div>
            </div>
        </div>
    }
}
