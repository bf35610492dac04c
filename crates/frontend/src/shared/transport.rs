//! Browser transport for the form engine (gloo-net + fetch)

use async_trait::async_trait;
use futures::future::{select, Either};
use gloo_net::http::{Method as HttpMethod, RequestBuilder};
use gloo_timers::future::TimeoutFuture;
use std::time::Duration;
use wasm_bindgen::JsValue;
use web_sys::{Blob, BlobPropertyBag, FormData};

use form_engine::transport::parse_body;
use form_engine::{ApiRequest, ApiResponse, ApiTransport, FileHandle, Method, MultipartPart, RequestBody, Sleeper, TransportError};

use super::api_utils::{api_base, api_url};

pub struct GlooTransport {
    base_url: String,
}

impl GlooTransport {
    pub fn new(configured_base: &str) -> Self {
        Self {
            base_url: api_base(configured_base),
        }
    }
}

fn http_method(method: Method) -> HttpMethod {
    match method {
        Method::Get => HttpMethod::GET,
        Method::Options => HttpMethod::OPTIONS,
        Method::Post => HttpMethod::POST,
        Method::Put => HttpMethod::PUT,
        Method::Patch => HttpMethod::PATCH,
        Method::Delete => HttpMethod::DELETE,
    }
}

fn millis(duration: Duration) -> u32 {
    duration.as_millis().min(u32::MAX as u128) as u32
}

fn js_error(e: JsValue) -> TransportError {
    TransportError::Request(format!("{:?}", e))
}

fn file_blob(file: &FileHandle) -> Result<Blob, TransportError> {
    let bytes = js_sys::Uint8Array::from(file.bytes.as_slice());
    let parts = js_sys::Array::of1(&bytes);
    let props = BlobPropertyBag::new();
    if let Some(content_type) = &file.content_type {
        props.set_type(content_type);
    }
    Blob::new_with_u8_array_sequence_and_options(&parts, &props).map_err(js_error)
}

fn form_data(parts: &[MultipartPart]) -> Result<FormData, TransportError> {
    let data = FormData::new().map_err(js_error)?;
    for part in parts {
        match part {
            MultipartPart::Text { name, value } => data.append_with_str(name, value).map_err(js_error)?,
            MultipartPart::File { name, file } => data
                .append_with_blob_and_filename(name, &file_blob(file)?, &file.name)
                .map_err(js_error)?,
        }
    }
    Ok(data)
}

#[async_trait(?Send)]
impl ApiTransport for GlooTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = api_url(&self.base_url, &request.url);
        let builder = RequestBuilder::new(&url)
            .method(http_method(request.method))
            .query(request.query.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        // Content-Type для multipart выставляет браузер (с boundary)
        let built = match &request.body {
            RequestBody::Empty => builder.build(),
            RequestBody::Json(body) => builder.json(body),
            RequestBody::Multipart(parts) => builder.body(form_data(parts)?),
        }
        .map_err(|e| TransportError::Request(e.to_string()))?;

        let send = Box::pin(async move {
            let response = built
                .send()
                .await
                .map_err(|e| TransportError::Network(e.to_string()))?;
            let status = response.status();
            let text = response
                .text()
                .await
                .map_err(|e| TransportError::Decode(e.to_string()))?;
            Ok::<_, TransportError>(ApiResponse::new(status, parse_body(&text)))
        });

        match request.timeout {
            Some(timeout) => {
                let timer = Box::pin(TimeoutFuture::new(millis(timeout)));
                match select(send, timer).await {
                    Either::Left((result, _)) => result,
                    Either::Right(_) => {
                        log::warn!("Request to {} timed out", url);
                        Err(TransportError::Timeout)
                    }
                }
            }
            None => send.await,
        }
    }
}

/// Таймер на `setTimeout`
pub struct GlooSleeper;

#[async_trait(?Send)]
impl Sleeper for GlooSleeper {
    async fn sleep(&self, duration: Duration) {
        TimeoutFuture::new(millis(duration)).await;
    }
}
