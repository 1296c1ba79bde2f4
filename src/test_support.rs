//! Shared fakes for unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

use crate::data::{ApiConfig, HttpRequest, HttpResponse, Transport, TransportError};

/// Transport that records requests and replays queued responses in order
#[derive(Default)]
pub(crate) struct FakeTransport {
    pub requests: Mutex<Vec<HttpRequest>>,
    responses: Mutex<VecDeque<HttpResponse>>,
}

impl FakeTransport {
    pub fn respond(&self, status: u16, body: &str) {
        self.responses.lock().push_back(HttpResponse {
            status,
            body: body.as_bytes().to_vec(),
        });
    }

    pub fn urls(&self) -> Vec<String> {
        self.requests.lock().iter().map(|r| r.url.clone()).collect()
    }

    pub fn count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Decoded JSON body of the `index`th request
    pub fn body_json(&self, index: usize) -> serde_json::Value {
        let requests = self.requests.lock();
        let body = requests[index].body.as_deref().unwrap_or(b"null");
        serde_json::from_slice(body).expect("request body should be JSON")
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().push(request);
        self.responses
            .lock()
            .pop_front()
            .ok_or_else(|| TransportError::InvalidRequest("no response queued".to_string()))
    }
}

pub(crate) fn api_config() -> ApiConfig {
    ApiConfig::new("https://api.test", "sub-key")
}
