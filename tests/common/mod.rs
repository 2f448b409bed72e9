//! Test doubles shared by the integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use promptchain::adapters::{
    ActionBackend, ActionError, CompletionProvider, CompletionRequest, CompletionResponse,
    ProviderError,
};
use promptchain::domain::{ActionResult, CalendarRequest};

/// Replays scripted responses in order, counting and keeping every request
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<Result<CompletionResponse, ProviderError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<Result<CompletionResponse, ProviderError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    /// Provider answering each call with the next JSON value as text
    pub fn json(values: Vec<Value>) -> Arc<Self> {
        Self::new(
            values
                .into_iter()
                .map(|v| Ok(CompletionResponse::text(v.to_string())))
                .collect(),
        )
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Content of the last user message of the `index`-th request
    pub fn user_message(&self, index: usize) -> String {
        let requests = self.requests.lock().unwrap();
        requests[index]
            .messages
            .iter()
            .rev()
            .find(|m| m.role == promptchain::adapters::Role::User)
            .and_then(|m| m.content.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(ProviderError::EmptyResponse))
    }
}

/// How a [`CountingBackend`] answers
pub enum BackendBehavior {
    Succeed(Option<String>),
    Reject(String),
    Indeterminate(String),
    /// Never answers within any reasonable timeout
    Hang,
    /// Cancels the token, then succeeds
    CancelThenSucceed(CancellationToken),
}

/// Action backend that counts calls and keeps every request
pub struct CountingBackend {
    behavior: BackendBehavior,
    requests: Mutex<Vec<CalendarRequest>>,
    calls: AtomicUsize,
}

impl CountingBackend {
    pub fn new(behavior: BackendBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn succeeding(link: &str) -> Arc<Self> {
        Self::new(BackendBehavior::Succeed(Some(link.to_string())))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<CalendarRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ActionBackend for CountingBackend {
    fn name(&self) -> &str {
        "counting"
    }

    async fn create_event(&self, request: &CalendarRequest) -> Result<ActionResult, ActionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        match &self.behavior {
            BackendBehavior::Succeed(link) => Ok(ActionResult::success(link.clone())),
            BackendBehavior::Reject(reason) => Ok(ActionResult::failure(reason.clone())),
            BackendBehavior::Indeterminate(reason) => {
                Err(ActionError::Indeterminate(reason.clone()))
            }
            BackendBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(ActionResult::success(None))
            }
            BackendBehavior::CancelThenSucceed(token) => {
                token.cancel();
                tokio::task::yield_now().await;
                Ok(ActionResult::success(Some("evt-after-cancel".to_string())))
            }
        }
    }
}

pub fn extraction(description: &str, is_event: bool, confidence: f64) -> Value {
    json!({
        "description": description,
        "is_event": is_event,
        "confidence": confidence,
    })
}

pub fn details(name: &str, start_time: &str, duration_minutes: i64, participants: &[&str]) -> Value {
    json!({
        "name": name,
        "start_time": start_time,
        "duration_minutes": duration_minutes,
        "participants": participants,
    })
}

pub fn confirmation(message: &str, link: Option<&str>) -> Value {
    json!({
        "message": message,
        "reference_link": link,
    })
}
