//! Scripted in-memory transport for tests.
//!
//! Replies are queued per `(method, url)`. Each request pops the next queued reply; the last reply
//! for a route is sticky so repeated invocations keep getting it. A route with no reply answers
//! `404`. Every request is recorded for later assertions.

use crate::transport::{CdsTransport, TransportError};
use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
}

#[derive(Clone, Debug)]
pub enum Reply {
    Respond(Result<Value, TransportError>),
    /// Never completes; used to hold a request in flight.
    Hang,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecordedRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<Value>,
}

#[derive(Debug, Default)]
pub struct FakeTransport {
    routes: Mutex<HashMap<(Method, String), VecDeque<Reply>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_get(&self, url: &str, reply: Result<Value, TransportError>) {
        self.push(Method::Get, url, Reply::Respond(reply));
    }

    pub fn on_post(&self, url: &str, reply: Result<Value, TransportError>) {
        self.push(Method::Post, url, Reply::Respond(reply));
    }

    pub fn hang_post(&self, url: &str) {
        self.push(Method::Post, url, Reply::Hang);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Bodies of every POST sent to `url`, in order.
    pub fn posts_to(&self, url: &str) -> Vec<Value> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == Method::Post && r.url == url)
            .filter_map(|r| r.body)
            .collect()
    }

    /// Number of POSTs whose URL starts with `prefix`.
    pub fn post_count(&self, prefix: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.method == Method::Post && r.url.starts_with(prefix))
            .count()
    }

    fn push(&self, method: Method, url: &str, reply: Reply) {
        self.routes
            .lock()
            .unwrap()
            .entry((method, url.to_string()))
            .or_default()
            .push_back(reply);
    }

    fn next_reply(&self, method: Method, url: &Url) -> Reply {
        let mut routes = self.routes.lock().unwrap();
        match routes.get_mut(&(method, url.to_string())) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) if !queue.is_empty() => queue[0].clone(),
            _ => Reply::Respond(Err(TransportError::Status {
                status: 404,
                body: String::new(),
            })),
        }
    }

    async fn answer(&self, method: Method, url: &Url, body: Option<Value>) -> Result<Value, TransportError> {
        self.requests.lock().unwrap().push(RecordedRequest {
            method,
            url: url.to_string(),
            body,
        });
        match self.next_reply(method, url) {
            Reply::Respond(result) => result,
            Reply::Hang => std::future::pending().await,
        }
    }
}

#[async_trait]
impl CdsTransport for FakeTransport {
    async fn get_json(&self, url: &Url) -> Result<Value, TransportError> {
        self.answer(Method::Get, url, None).await
    }

    async fn post_json(&self, url: &Url, body: &Value) -> Result<Value, TransportError> {
        self.answer(Method::Post, url, Some(body.clone())).await
    }
}
