pub mod app;
pub mod shared;

use form_engine::{init_model_registry, ModelRegistry};
use wasm_bindgen::prelude::wasm_bindgen;

#[wasm_bindgen]
pub fn hydrate() {
    // initializes logging using the `log` crate
    _ = console_log::init_with_level(log::Level::Debug);
    console_error_panic_hook::set_once();

    // Страницы просмотра записей для перехода после сохранения
    init_model_registry(
        ModelRegistry::new()
            .with_model("salesorder", "/sales/order/{pk}/")
            .with_model("company", "/company/{pk}/"),
    );

    leptos::mount::mount_to_body(app::App);
}

#[wasm_bindgen(start)]
pub fn start() {
    hydrate();
}
