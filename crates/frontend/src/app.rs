//! Демо-страница: заказ покупателя, создаваемый и редактируемый через `ApiForm`

use std::rc::Rc;

use contracts::shared::forms::{ChoiceEntry, FieldType};
use form_engine::{FieldSpec, FieldValue, FormEngineConfig, Navigator, Notifier, SubmitHooks, SubmitTarget};
use leptos::prelude::*;
use thaw::{Flex, FlexGap};

use crate::shared::components::ui::{Badge, Button, Input};
use crate::shared::forms::FormModal;

const ORDER_API: &str = "/api/order/";

/// Уведомления формы в баннер страницы
struct BannerNotifier {
    banner: RwSignal<Option<(bool, String)>>,
}

impl Notifier for BannerNotifier {
    fn error(&self, message: &str) {
        log::error!("{}", message);
        self.banner.set(Some((false, message.to_string())));
    }

    fn success(&self, message: &str) {
        self.banner.set(Some((true, message.to_string())));
    }
}

struct LocationNavigator;

impl Navigator for LocationNavigator {
    fn navigate(&self, url: &str) {
        if let Some(window) = web_sys::window() {
            if let Err(e) = window.location().set_href(url) {
                log::error!("Переход на {} не выполнен: {:?}", url, e);
            }
        }
    }
}

#[derive(Clone, Copy, PartialEq)]
enum OrderModal {
    Create,
    Edit(i64),
}

fn order_fields() -> Vec<FieldSpec> {
    vec![
        FieldSpec::new("customer")
            .field_type(FieldType::RelatedModel)
            .api_url("/api/company/")
            .model("company")
            .filter("is_customer", true)
            .auto_fill(),
        FieldSpec::new("contact")
            .field_type(FieldType::RelatedModel)
            .api_url("/api/company/contact/")
            .model("contact")
            .adjust_filters(|filters, state| {
                let mut filters = filters.clone();
                match state.get("customer").and_then(FieldValue::primary_key) {
                    Some(pk) => {
                        filters.insert("company".to_string(), pk.clone());
                    }
                    None => {
                        filters.remove("company");
                    }
                }
                filters
            }),
        FieldSpec::new("reference").placeholder("SO-0001"),
        FieldSpec::new("target_date").field_type(FieldType::Date),
        FieldSpec::new("priority").field_type(FieldType::Choice).choices(vec![
            ChoiceEntry::new(1, "Низкий"),
            ChoiceEntry::new(2, "Обычный"),
            ChoiceEntry::new(3, "Срочный"),
        ]),
        FieldSpec::new("lines")
            .field_type(FieldType::Table)
            .label("Позиции")
            .child(FieldSpec::new("part").field_type(FieldType::String).label("Товар"))
            .child(FieldSpec::new("quantity").field_type(FieldType::Decimal).default_value(1))
            .child(FieldSpec::new("price").field_type(FieldType::Decimal)),
        FieldSpec::new("shipping_method")
            .field_type(FieldType::DependentField)
            .depends_on("customer"),
        FieldSpec::new("attachment").field_type(FieldType::FileUpload),
        FieldSpec::new("notes").description("Видно только сотрудникам"),
    ]
}

#[component]
pub fn App() -> impl IntoView {
    provide_context(FormEngineConfig::default());

    let (modal, set_modal) = signal(None::<OrderModal>);
    let (edit_pk, set_edit_pk) = signal(String::new());
    let banner = RwSignal::new(None::<(bool, String)>);

    let open_edit = move |_| match edit_pk.get_untracked().trim().parse::<i64>() {
        Ok(pk) => set_modal.set(Some(OrderModal::Edit(pk))),
        Err(_) => banner.set(Some((false, "Укажите номер заказа".to_string()))),
    };

    let hooks = move || {
        SubmitHooks::new()
            .notifier(Rc::new(BannerNotifier { banner }))
            .success_message("Заказ сохранён")
    };

    view! {
        <div class="page">
            <h1 class="page__title">"Заказы покупателей"</h1>

            {move || banner.get().map(|(ok, message)| view! {
                <div class=if ok { "alert alert--success" } else { "alert alert--error" }>
                    <Badge variant=if ok { "success" } else { "error" }>
                        {if ok { "OK" } else { "Ошибка" }}
                    </Badge>
                    " "
                    {message}
                </div>
            })}

            <Flex gap=FlexGap::Medium style="align-items: flex-end; margin-bottom: var(--spacing-md);">
                <Button on_click=Callback::new(move |_| set_modal.set(Some(OrderModal::Create)))>
                    "Новый заказ"
                </Button>
                <Input
                    label="Номер заказа"
                    value=edit_pk
                    input_type="number"
                    on_input=Callback::new(move |v: String| set_edit_pk.set(v))
                />
                <Button variant="secondary" on_click=Callback::new(open_edit)>
                    "Редактировать"
                </Button>
            </Flex>

            {move || modal.get().map(|mode| {
                let on_close = Callback::new(move |_: ()| set_modal.set(None));
                match mode {
                    OrderModal::Create => view! {
                        <FormModal
                            fields=order_fields()
                            target=SubmitTarget::create(ORDER_API).model("salesorder")
                            hooks=hooks().follow(Rc::new(LocationNavigator))
                            title="Новый заказ"
                            submit_text="Создать"
                            on_close=on_close
                        />
                    }
                    .into_any(),
                    OrderModal::Edit(pk) => view! {
                        <FormModal
                            fields=order_fields()
                            target=SubmitTarget::edit(ORDER_API, pk).model("salesorder")
                            hooks=hooks()
                            on_close=on_close
                        />
                    }
                    .into_any(),
                }
            })}
        </div>
    }
}
