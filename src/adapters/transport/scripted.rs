//! Scripted transport for testing and dry runs without a real messenger.
//!
//! Each chat follows a script (deliver, fail, hang, ...). Records every attempt and the peak
//! number of concurrent sends.

use crate::domain::{ChatId, TransportError};
use crate::ports::MessageTransport;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::info;

/// Behaviour of one chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendScript {
    Deliver,
    Permanent(String),
    /// Transient failure for the first `n` attempts, delivered afterwards.
    TransientThenOk(u32),
    /// Always throttled with the given retry-after.
    RateLimited(u64),
    /// Never completes; only the dispatcher's timeout ends the attempt.
    Hang,
    /// Panics inside the send future.
    Panic,
}

pub struct ScriptedTransport {
    scripts: HashMap<ChatId, SendScript>,
    latency: Duration,
    attempts: Mutex<HashMap<ChatId, u32>>,
    sent: Mutex<Vec<(ChatId, String)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedTransport {
    /// Delivers everything, no latency.
    pub fn new() -> Self {
        Self {
            scripts: HashMap::new(),
            latency: Duration::ZERO,
            attempts: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_script(mut self, chat_id: ChatId, script: SendScript) -> Self {
        self.scripts.insert(chat_id, script);
        self
    }

    /// Simulated network delay per attempt.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn attempts(&self, chat_id: ChatId) -> u32 {
        self.attempts
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(&chat_id)
            .copied()
            .unwrap_or(0)
    }

    /// Successful deliveries in completion order.
    pub fn sent(&self) -> Vec<(ChatId, String)> {
        self.sent.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageTransport for ScriptedTransport {
    async fn send(&self, chat_id: ChatId, content: &str) -> Result<(), TransportError> {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap_or_else(|p| p.into_inner());
            let n = attempts.entry(chat_id).or_insert(0);
            *n += 1;
            *n
        };
        let script = self
            .scripts
            .get(&chat_id)
            .cloned()
            .unwrap_or(SendScript::Deliver);

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match script {
            SendScript::Deliver => {}
            SendScript::Permanent(reason) => return Err(TransportError::Permanent(reason)),
            SendScript::TransientThenOk(n) if attempt <= n => {
                return Err(TransportError::Transient(format!(
                    "scripted transient failure {attempt}/{n}"
                )));
            }
            SendScript::TransientThenOk(_) => {}
            SendScript::RateLimited(secs) => {
                return Err(TransportError::RateLimited {
                    retry_after_secs: secs,
                });
            }
            SendScript::Hang => std::future::pending::<()>().await,
            SendScript::Panic => panic!("scripted transport panic for chat {chat_id}"),
        }

        info!(chat_id, len = content.len(), "[SCRIPTED] delivered");
        self.sent
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push((chat_id, content.to_string()));
        Ok(())
    }
}
