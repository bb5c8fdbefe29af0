//! Scripted assistant double for tests and local runs without credentials.

use super::{AssistantClient, AssistantError, Delay, MessageRole, ThreadMessage};
use crate::models::{MessageContent, RunStatus};
use crate::services::assistants::reply::{ReplyPart, TextValue};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Vendor call selector for injected failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptedCall {
    CreateThread,
    AddMessage,
    StartRun,
    PollRun,
    ListMessages,
}

/// Number of times each vendor call was made.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub create_thread: u32,
    pub add_message: u32,
    pub start_run: u32,
    pub poll_run: u32,
    pub list_messages: u32,
}

impl CallCounts {
    pub fn total(&self) -> u32 {
        self.create_thread + self.add_message + self.start_run + self.poll_run + self.list_messages
    }
}

#[derive(Default)]
struct ScriptState {
    statuses: VecDeque<RunStatus>,
    calls: CallCounts,
    added: Vec<(String, MessageContent)>,
    runs: Vec<(String, String)>,
}

/// Assistant that answers from a script instead of the network.
///
/// Poll results are taken from the status script in order, then from the
/// fallback status. The reply is the last message added to the thread,
/// prefixed with the reply text, unless a fixed message list is set.
pub struct ScriptedAssistant {
    state: Mutex<ScriptState>,
    fallback_status: RunStatus,
    reply: String,
    messages: Option<Vec<ThreadMessage>>,
    failures: HashMap<ScriptedCall, AssistantError>,
    poll_latency: Option<Duration>,
    configured: bool,
}

impl Default for ScriptedAssistant {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedAssistant {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ScriptState::default()),
            fallback_status: RunStatus::Completed,
            reply: "Scripted reply".to_string(),
            messages: None,
            failures: HashMap::new(),
            poll_latency: None,
            configured: true,
        }
    }

    pub fn with_statuses(self, statuses: impl IntoIterator<Item = RunStatus>) -> Self {
        lock(&self.state).statuses = statuses.into_iter().collect();
        self
    }

    pub fn with_fallback_status(mut self, status: RunStatus) -> Self {
        self.fallback_status = status;
        self
    }

    pub fn with_reply(mut self, reply: impl Into<String>) -> Self {
        self.reply = reply.into();
        self
    }

    /// Fixed message listing returned by `list_messages`.
    pub fn with_messages(mut self, messages: Vec<ThreadMessage>) -> Self {
        self.messages = Some(messages);
        self
    }

    pub fn fail_on(mut self, call: ScriptedCall, error: AssistantError) -> Self {
        self.failures.insert(call, error);
        self
    }

    /// Real sleep inside every poll, for exercising concurrent turns.
    pub fn with_poll_latency(mut self, latency: Duration) -> Self {
        self.poll_latency = Some(latency);
        self
    }

    pub fn unconfigured(mut self) -> Self {
        self.configured = false;
        self
    }

    pub fn calls(&self) -> CallCounts {
        lock(&self.state).calls
    }

    /// `(vendor thread id, content)` for every message added, in order.
    pub fn added_messages(&self) -> Vec<(String, MessageContent)> {
        lock(&self.state).added.clone()
    }

    /// `(vendor thread id, run id)` for every run started, in order.
    pub fn started_runs(&self) -> Vec<(String, String)> {
        lock(&self.state).runs.clone()
    }

    fn record(&self, call: ScriptedCall) -> Result<(), AssistantError> {
        let mut state = lock(&self.state);
        let counts = &mut state.calls;
        match call {
            ScriptedCall::CreateThread => counts.create_thread += 1,
            ScriptedCall::AddMessage => counts.add_message += 1,
            ScriptedCall::StartRun => counts.start_run += 1,
            ScriptedCall::PollRun => counts.poll_run += 1,
            ScriptedCall::ListMessages => counts.list_messages += 1,
        }
        match self.failures.get(&call) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn reply_for(&self, thread_id: &str) -> Vec<ThreadMessage> {
        let state = lock(&self.state);
        let last_text = state
            .added
            .iter()
            .rev()
            .find(|(thread, _)| thread == thread_id)
            .map(|(_, content)| match content {
                MessageContent::Text(text) => text.clone(),
                MessageContent::ImageUrl(_) | MessageContent::InlineImage(_) => {
                    "[image]".to_string()
                }
            })
            .unwrap_or_default();
        let run_id = state
            .runs
            .iter()
            .rev()
            .find(|(thread, _)| thread == thread_id)
            .map(|(_, run)| run.clone());

        vec![ThreadMessage {
            id: format!("msg_{}", state.calls.list_messages),
            role: MessageRole::Assistant,
            created_at: i64::from(state.calls.list_messages),
            run_id,
            content: vec![ReplyPart::Text {
                text: TextValue::Structured {
                    value: format!("{}: {}", self.reply, last_text),
                },
            }],
        }]
    }
}

#[async_trait]
impl AssistantClient for ScriptedAssistant {
    async fn create_thread(&self) -> Result<String, AssistantError> {
        self.record(ScriptedCall::CreateThread)?;
        Ok(format!("thread_{}", self.calls().create_thread))
    }

    async fn add_message(
        &self,
        thread_id: &str,
        content: &MessageContent,
    ) -> Result<(), AssistantError> {
        self.record(ScriptedCall::AddMessage)?;
        lock(&self.state)
            .added
            .push((thread_id.to_string(), content.clone()));
        Ok(())
    }

    async fn start_run(&self, thread_id: &str) -> Result<String, AssistantError> {
        if !self.configured {
            return Err(AssistantError::Configuration(
                "Scripted assistant has no agent identity".to_string(),
            ));
        }
        self.record(ScriptedCall::StartRun)?;
        let mut state = lock(&self.state);
        let run_id = format!("run_{}", state.calls.start_run);
        state.runs.push((thread_id.to_string(), run_id.clone()));
        Ok(run_id)
    }

    async fn poll_run(&self, _thread_id: &str, _run_id: &str) -> Result<RunStatus, AssistantError> {
        self.record(ScriptedCall::PollRun)?;
        if let Some(latency) = self.poll_latency {
            tokio::time::sleep(latency).await;
        }
        let next = lock(&self.state).statuses.pop_front();
        Ok(next.unwrap_or(self.fallback_status))
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, AssistantError> {
        self.record(ScriptedCall::ListMessages)?;
        match &self.messages {
            Some(messages) => Ok(messages.clone()),
            None => Ok(self.reply_for(thread_id)),
        }
    }

    fn is_configured(&self) -> bool {
        self.configured
    }
}

/// Delay that returns immediately and records what was requested.
#[derive(Default)]
pub struct InstantDelay {
    sleeps: Mutex<Vec<Duration>>,
}

impl InstantDelay {
    pub fn sleeps(&self) -> Vec<Duration> {
        lock(&self.sleeps).clone()
    }
}

#[async_trait]
impl Delay for InstantDelay {
    async fn sleep(&self, duration: Duration) {
        lock(&self.sleeps).push(duration);
    }
}
