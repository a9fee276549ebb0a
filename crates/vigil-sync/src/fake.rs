//! Scripted in-process backend for tests.

use crate::api::ApiClient;
use crate::transport::{Method, RequestBody, Response, Transport, TransportError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
enum Scripted {
    Reply(u16, Value),
    Unreachable,
}

#[derive(Debug, Clone)]
pub(crate) struct Recorded {
    pub method: Method,
    pub path: String,
    pub body: Option<RequestBody>,
}

type Route = (Method, String);

#[derive(Default)]
pub(crate) struct FakeBackend {
    once: Mutex<HashMap<Route, VecDeque<Scripted>>>,
    sticky: Mutex<HashMap<Route, Scripted>>,
    requests: Mutex<Vec<Recorded>>,
    latency: Mutex<Duration>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn api(self: &Arc<Self>) -> ApiClient {
        ApiClient::new(Arc::clone(self) as Arc<dyn Transport>, "http://fake.test")
    }

    /// Answer every request to this route with `body`.
    pub fn reply(&self, method: Method, path: &str, status: u16, body: Value) {
        self.sticky
            .lock()
            .unwrap()
            .insert((method, path.to_string()), Scripted::Reply(status, body));
    }

    /// Answer the next request to this route with `body`, ahead of any sticky reply.
    pub fn reply_once(&self, method: Method, path: &str, status: u16, body: Value) {
        self.once
            .lock()
            .unwrap()
            .entry((method, path.to_string()))
            .or_default()
            .push_back(Scripted::Reply(status, body));
    }

    pub fn unreachable(&self, method: Method, path: &str) {
        self.sticky
            .lock()
            .unwrap()
            .insert((method, path.to_string()), Scripted::Unreachable);
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, method: Method, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }

    fn next_reply(&self, route: &Route) -> Option<Scripted> {
        if let Some(queued) = self.once.lock().unwrap().get_mut(route).and_then(VecDeque::pop_front) {
            return Some(queued);
        }
        self.sticky.lock().unwrap().get(route).cloned()
    }
}

#[async_trait]
impl Transport for FakeBackend {
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<RequestBody>,
    ) -> Result<Response, TransportError> {
        self.requests.lock().unwrap().push(Recorded {
            method,
            path: path.to_string(),
            body,
        });
        let route = (method, path.to_string());
        let scripted = self.next_reply(&route);

        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        match scripted {
            Some(Scripted::Reply(status, body)) => Ok(Response {
                status,
                body: serde_json::to_vec(&body).unwrap(),
            }),
            Some(Scripted::Unreachable) => Err(TransportError::Network(format!(
                "{} {path}: connection refused",
                method.as_str()
            ))),
            None => Ok(Response {
                status: 404,
                body: b"{\"detail\":\"Not Found\"}".to_vec(),
            }),
        }
    }
}
