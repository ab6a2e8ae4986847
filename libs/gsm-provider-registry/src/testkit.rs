//! Test doubles for providers. Enabled with the `testkit` feature.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use gsm_core::{ContactType, InboundMessage, ProviderError, SendReceipt};

use crate::provider::{Provider, ProviderContext, SharedProvider, receive_batch};
use crate::registry::ProviderFactory;

/// What a [`RecordingProvider`] does with a send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendScript {
    Accept,
    Deliver,
    Unavailable,
    InvalidRecipient,
    /// Sleeps before accepting; used to trip call timeouts.
    Hang(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub provider: String,
    pub to: String,
    pub body: String,
    pub title: Option<String>,
    pub tracking_id: String,
}

#[derive(Default)]
struct RecordingState {
    default_script: Option<SendScript>,
    scripts: HashMap<String, SendScript>,
    sent: Vec<SentMessage>,
    attempts: Vec<String>,
}

/// Shared handle to the state behind every [`RecordingProvider`] it builds.
#[derive(Clone, Default)]
pub struct RecordingHandle {
    state: Arc<Mutex<RecordingState>>,
    builds: Arc<AtomicUsize>,
    contact_type: Option<ContactType>,
}

impl RecordingHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forces the built provider's contact type, ignoring config.
    pub fn with_contact_type(mut self, contact_type: ContactType) -> Self {
        self.contact_type = Some(contact_type);
        self
    }

    pub fn script_default(&self, script: SendScript) {
        self.lock().default_script = Some(script);
    }

    pub fn script_recipient(&self, to: impl Into<String>, script: SendScript) {
        self.lock().scripts.insert(to.into(), script);
    }

    pub fn factory(&self) -> ProviderFactory {
        let handle = self.clone();
        Arc::new(move |ctx: ProviderContext| -> anyhow::Result<SharedProvider> {
            handle.builds.fetch_add(1, Ordering::SeqCst);
            let ctx = match handle.contact_type {
                Some(kind) => ctx.with_contact_type(kind),
                None => ctx,
            };
            Ok(Arc::new(RecordingProvider {
                ctx,
                handle: handle.clone(),
            }))
        })
    }

    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.lock().sent.clone()
    }

    /// Recipients in the order sends were attempted, including failures.
    pub fn attempts(&self) -> Vec<String> {
        self.lock().attempts.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RecordingState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Provider that records sends and fails on demand.
pub struct RecordingProvider {
    ctx: ProviderContext,
    handle: RecordingHandle,
}

#[async_trait]
impl Provider for RecordingProvider {
    fn context(&self) -> &ProviderContext {
        &self.ctx
    }

    async fn send(
        &self,
        to: &str,
        body: &str,
        title: Option<&str>,
    ) -> Result<SendReceipt, ProviderError> {
        let script = {
            let mut state = self.handle.lock();
            state.attempts.push(to.to_string());
            state
                .scripts
                .get(to)
                .or(state.default_script.as_ref())
                .cloned()
                .unwrap_or(SendScript::Accept)
        };
        match script {
            SendScript::Unavailable => {
                return Err(ProviderError::unavailable(self.name(), "scripted outage"));
            }
            SendScript::InvalidRecipient => {
                return Err(ProviderError::invalid_recipient(
                    self.name(),
                    to,
                    "scripted rejection",
                ));
            }
            SendScript::Hang(delay) => tokio::time::sleep(delay).await,
            SendScript::Accept | SendScript::Deliver => {}
        }
        let tracking_id = self.ctx.next_tracking_id();
        self.handle.lock().sent.push(SentMessage {
            provider: self.name().to_string(),
            to: to.to_string(),
            body: body.to_string(),
            title: title.map(str::to_string),
            tracking_id: tracking_id.clone(),
        });
        let receipt = SendReceipt::sent(tracking_id);
        Ok(if script == SendScript::Deliver {
            receipt.delivered()
        } else {
            receipt
        })
    }
}

#[derive(Default)]
struct InboxState {
    queue: VecDeque<InboundMessage>,
    fail_next: Option<String>,
    fetches: usize,
}

/// Polling provider whose remote inbox is a scripted queue.
///
/// Fetched items are not removed unless `drain` is set, so repeated fetches
/// see the same remote ids the way a real poll API returns unread items.
#[derive(Clone, Default)]
pub struct ScriptedInbox {
    state: Arc<Mutex<InboxState>>,
    drain: bool,
}

impl ScriptedInbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draining(mut self) -> Self {
        self.drain = true;
        self
    }

    pub fn push(&self, item: InboundMessage) {
        self.lock().queue.push_back(item);
    }

    pub fn fail_next_fetch(&self, reason: impl Into<String>) {
        self.lock().fail_next = Some(reason.into());
    }

    pub fn fetches(&self) -> usize {
        self.lock().fetches
    }

    pub fn factory(&self) -> ProviderFactory {
        let inbox = self.clone();
        Arc::new(move |ctx: ProviderContext| -> anyhow::Result<SharedProvider> {
            Ok(Arc::new(ScriptedInboxProvider {
                ctx,
                inbox: inbox.clone(),
            }))
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, InboxState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct ScriptedInboxProvider {
    ctx: ProviderContext,
    inbox: ScriptedInbox,
}

#[async_trait]
impl Provider for ScriptedInboxProvider {
    fn context(&self) -> &ProviderContext {
        &self.ctx
    }

    fn supports_polling(&self) -> bool {
        true
    }

    async fn send(
        &self,
        _to: &str,
        _body: &str,
        _title: Option<&str>,
    ) -> Result<SendReceipt, ProviderError> {
        Ok(SendReceipt::sent(self.ctx.next_tracking_id()))
    }

    async fn fetch(&self, limit: Option<usize>) -> Result<usize, ProviderError> {
        let batch: Vec<InboundMessage> = {
            let mut state = self.inbox.lock();
            state.fetches += 1;
            if let Some(reason) = state.fail_next.take() {
                return Err(ProviderError::unavailable(self.name(), reason));
            }
            let take = limit.unwrap_or(usize::MAX).min(state.queue.len());
            if self.inbox.drain {
                state.queue.drain(..take).collect()
            } else {
                state.queue.iter().take(take).cloned().collect()
            }
        };
        receive_batch(self, batch).await
    }
}
