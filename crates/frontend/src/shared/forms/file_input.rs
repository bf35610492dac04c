use form_engine::{FieldValue, FileHandle, FileValue};
use leptos::prelude::*;
use wasm_bindgen::JsCast;

use super::handle::FormHandle;
use crate::shared::components::ui::label_class;

/// Читает выбранный файл целиком в память
async fn read_file(file: web_sys::File) -> Result<FileHandle, String> {
    use wasm_bindgen_futures::JsFuture;

    let array_buffer = JsFuture::from(file.array_buffer())
        .await
        .map_err(|e| format!("Ошибка чтения файла: {:?}", e))?;

    let uint8_array = js_sys::Uint8Array::new(&array_buffer);
    let mut bytes = vec![0; uint8_array.length() as usize];
    uint8_array.copy_to(&mut bytes);

    let mut handle = FileHandle::new(file.name(), bytes);
    let content_type = file.type_();
    if !content_type.is_empty() {
        handle = handle.with_content_type(content_type);
    }
    Ok(handle)
}

/// Поле загрузки файла
///
/// Уже загруженный файл показывается ссылкой; новый уходит в multipart.
#[component]
pub fn FileInput(form: FormHandle, path: String) -> impl IntoView {
    let Some(bound) = form.bound_untracked(&path) else {
        return ().into_any();
    };
    let id = form.input_id(&path);
    let required = bound.required;
    let (read_error, set_read_error) = signal(None::<String>);

    let current = {
        let path = path.clone();
        move || match form.value(&path) {
            FieldValue::File(FileValue::Existing(url)) => {
                let name = url.rsplit('/').next().unwrap_or(&url).to_string();
                view! { <a class="form__file-current" href=url target="_blank">{name}</a> }.into_any()
            }
            FieldValue::File(FileValue::Upload(handle)) => {
                view! { <span class="form__file-current">{handle.name}</span> }.into_any()
            }
            _ => ().into_any(),
        }
    };

    let disabled = {
        let path = path.clone();
        move || form.is_disabled(&path)
    };

    let handle_file_select = move |ev: web_sys::Event| {
        let file = ev
            .target()
            .and_then(|t| t.dyn_into::<web_sys::HtmlInputElement>().ok())
            .and_then(|input| input.files())
            .and_then(|files| files.get(0));

        let Some(file) = file else {
            form.set_value(&path, FieldValue::Empty);
            return;
        };

        set_read_error.set(None);
        let path = path.clone();
        leptos::task::spawn_local(async move {
            match read_file(file).await {
                Ok(handle) => form.set_value(&path, FieldValue::File(FileValue::Upload(handle))),
                Err(e) => {
                    log::error!("{}", e);
                    let _ = set_read_error.try_set(Some(e));
                }
            }
        });
    };

    view! {
        <div class="form__group">
            <label class=label_class(required) for=id.clone()>{bound.label}</label>
            {current}
            <input
                id=id
                type="file"
                class="form__file"
                disabled=disabled
                on:change=handle_file_select
            />
            {bound.description.map(|d| view! { <div class="form__help">{d}</div> })}
            {move || read_error.get().map(|e| view! { <div class="form__error">{e}</div> })}
        </div>
    }
    .into_any()
}
