//! Test doubles: recording transport and tokio-backed sleeper

use async_trait::async_trait;
use std::cell::RefCell;
use std::time::Duration;

use crate::error::TransportError;
use crate::timer::Sleeper;
use crate::transport::{ApiRequest, ApiResponse, ApiTransport};

type Responder = Box<dyn Fn(&ApiRequest) -> Result<ApiResponse, TransportError>>;

/// Записывает все запросы и отвечает через замыкание.
///
/// `latency` имитирует время ответа сервера (виртуальное время tokio).
pub struct RecordingTransport {
    pub requests: RefCell<Vec<ApiRequest>>,
    responder: Responder,
    latency: Duration,
}

impl RecordingTransport {
    pub fn new(
        responder: impl Fn(&ApiRequest) -> Result<ApiResponse, TransportError> + 'static,
    ) -> Self {
        Self {
            requests: RefCell::new(Vec::new()),
            responder: Box::new(responder),
            latency: Duration::ZERO,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn urls(&self) -> Vec<String> {
        self.requests.borrow().iter().map(|r| r.url.clone()).collect()
    }

    pub fn count(&self) -> usize {
        self.requests.borrow().len()
    }
}

#[async_trait(?Send)]
impl ApiTransport for RecordingTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        self.requests.borrow_mut().push(request.clone());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        (self.responder)(&request)
    }
}

pub struct TokioSleeper;

#[async_trait(?Send)]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
