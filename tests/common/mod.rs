//! Shared mocks for integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

use aim::agent::{AgentError, BrowserAgent, CodebaseAgent};
use aim::browser::{BrowserBackend, ContextConfig};
use aim::devbox::ReadinessProbe;
use aim::session::Fault;

/// Context handle handed out by [`MockBrowser`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MockContext {
    pub id: usize,
}

/// In-memory browser that counts calls and can be told to fail
#[derive(Default)]
pub struct MockBrowser {
    pub created: AtomicUsize,
    pub closed: AtomicUsize,
    pub shutdowns: AtomicUsize,
    pub fail_create: AtomicBool,
    pub fail_close: AtomicBool,
    pub create_delay_ms: AtomicU64,
    pub close_delay_ms: AtomicU64,
}

impl MockBrowser {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn set_fail_close(&self, fail: bool) {
        self.fail_close.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn set_create_delay(&self, delay: Duration) {
        self.create_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set_close_delay(&self, delay: Duration) {
        self.close_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

async fn pause(millis: &AtomicU64) {
    let millis = millis.load(Ordering::SeqCst);
    if millis > 0 {
        tokio::time::sleep(Duration::from_millis(millis)).await;
    }
}

#[async_trait]
impl BrowserBackend for MockBrowser {
    type Context = MockContext;

    async fn create_context(&self, _config: &ContextConfig) -> Result<MockContext, Fault> {
        pause(&self.create_delay_ms).await;
        if self.fail_create.load(Ordering::SeqCst) {
            return Err("browser unavailable".into());
        }
        let id = self.created.fetch_add(1, Ordering::SeqCst);
        Ok(MockContext { id })
    }

    async fn close_context(&self, _context: &MockContext) -> Result<(), Fault> {
        pause(&self.close_delay_ms).await;
        if self.fail_close.load(Ordering::SeqCst) {
            return Err("context close timed out".into());
        }
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), Fault> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// How [`CountingProbe`] answers for an address
#[derive(Debug, Clone, Copy)]
pub enum Readiness {
    Ready,
    NotReady,
    Unreachable,
}

/// Probe with per-address answers (default: ready) and a call counter
#[derive(Default)]
pub struct CountingProbe {
    answers: Mutex<HashMap<String, Readiness>>,
    calls: AtomicUsize,
    pub delay_ms: AtomicU64,
}

impl CountingProbe {
    pub fn answer(&self, address: &str, readiness: Readiness) {
        self.answers
            .lock()
            .unwrap()
            .insert(address.to_string(), readiness);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReadinessProbe for CountingProbe {
    async fn check(&self, project_address: &str) -> Result<bool, Fault> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        pause(&self.delay_ms).await;
        let readiness = self
            .answers
            .lock()
            .unwrap()
            .get(project_address)
            .copied()
            .unwrap_or(Readiness::Ready);
        match readiness {
            Readiness::Ready => Ok(true),
            Readiness::NotReady => Ok(false),
            Readiness::Unreachable => Err(format!("connect error: {}", project_address).into()),
        }
    }
}

/// Codebase agent that echoes its input, or fails when told to
#[derive(Default)]
pub struct EchoCodebaseAgent {
    pub fail: AtomicBool,
}

#[async_trait]
impl CodebaseAgent for EchoCodebaseAgent {
    async fn run(&self, project_address: &str, prompt: &str) -> Result<String, AgentError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AgentError::Unreachable("devbox went away".to_string()));
        }
        Ok(format!("{} <- {}", project_address, prompt))
    }
}

/// Browser agent that reports what it was asked to do
#[derive(Default)]
pub struct EchoBrowserAgent;

#[async_trait]
impl<C: Serialize + Send + Sync> BrowserAgent<C> for EchoBrowserAgent {
    async fn run(&self, context: &C, website_url: &str, prompt: &str) -> Result<Value, AgentError> {
        Ok(json!({
            "context": context,
            "website_url": website_url,
            "prompt": prompt,
        }))
    }
}

/// JSON object literal as project metadata
pub fn meta(value: Value) -> Option<serde_json::Map<String, Value>> {
    value.as_object().cloned()
}
