//! One chat turn: validate, relay to the skill's assistant, journal.

use super::assistants::{
    await_completion, fetch_latest_reply, AssistantClient, AssistantError, Delay,
    OpenAiAssistantClient, OpenAiAssistantConfig, PollPolicy, TokioDelay,
};
use super::journal::{JournalEntry, MessageJournal, Role};
use super::metrics;
use crate::config::SkillsConfig;
use crate::models::{ContentKind, MessageContent, Skill};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{instrument, Span};
use uuid::Uuid;

/// Local conversation key: the owning user and the client-visible thread id.
pub type ThreadKey = (String, String);

/// Default cap on local threads remembered per skill.
pub const DEFAULT_MAX_THREADS: usize = 10_000;

/// Default time a local thread is remembered after its last turn.
pub const DEFAULT_THREAD_IDLE_TTL: Duration = Duration::from_secs(24 * 3600);

struct Binding {
    vendor_thread_id: String,
    last_used: Instant,
}

/// Maps local thread ids to vendor thread ids and serializes turns per
/// thread.
///
/// Bindings idle for longer than the TTL are forgotten, and once the map
/// exceeds its capacity the least recently used binding is evicted. A
/// forgotten thread gets a fresh vendor thread on its next turn. Turn locks
/// exist only while a turn holds or waits on them.
pub struct ThreadRegistry {
    bindings: DashMap<ThreadKey, Binding>,
    turn_locks: DashMap<ThreadKey, Arc<Mutex<()>>>,
    max_threads: usize,
    idle_ttl: Duration,
}

impl Default for ThreadRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_THREADS, DEFAULT_THREAD_IDLE_TTL)
    }
}

impl ThreadRegistry {
    pub fn new(max_threads: usize, idle_ttl: Duration) -> Self {
        Self {
            bindings: DashMap::new(),
            turn_locks: DashMap::new(),
            max_threads: max_threads.max(1),
            idle_ttl,
        }
    }

    /// Vendor thread bound to `key`, refreshing its last use.
    pub fn vendor_thread(&self, key: &ThreadKey) -> Option<String> {
        let ttl = self.idle_ttl;
        self.bindings
            .remove_if(key, |_, binding| binding.last_used.elapsed() > ttl);
        self.bindings.get_mut(key).map(|mut binding| {
            binding.last_used = Instant::now();
            binding.vendor_thread_id.clone()
        })
    }

    /// Number of remembered local threads.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Number of turn locks currently allocated.
    pub fn lock_count(&self) -> usize {
        self.turn_locks.len()
    }

    fn bind(&self, key: ThreadKey, vendor_thread_id: String) {
        self.bindings.insert(
            key,
            Binding {
                vendor_thread_id,
                last_used: Instant::now(),
            },
        );
        if self.bindings.len() > self.max_threads {
            self.evict();
        }
    }

    fn evict(&self) {
        let ttl = self.idle_ttl;
        self.bindings
            .retain(|_, binding| binding.last_used.elapsed() <= ttl);

        while self.bindings.len() > self.max_threads {
            let oldest = self
                .bindings
                .iter()
                .min_by_key(|entry| entry.value().last_used)
                .map(|entry| entry.key().clone());
            match oldest {
                Some(key) => {
                    self.bindings.remove(&key);
                    tracing::debug!(user_id = %key.0, thread_id = %key.1, "Evicted thread binding");
                }
                None => break,
            }
        }
    }

    async fn lock(&self, key: &ThreadKey) -> TurnGuard<'_> {
        let lock = Arc::clone(&self.turn_locks.entry(key.clone()).or_default());
        TurnGuard {
            registry: self,
            key: key.clone(),
            guard: Some(lock.lock_owned().await),
        }
    }
}

/// Exclusive hold on one local thread for a turn. Dropping it frees the
/// lock entry once no other turn holds or waits on it.
struct TurnGuard<'a> {
    registry: &'a ThreadRegistry,
    key: ThreadKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.registry
            .turn_locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Inbound turn before validation.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub user_id: String,
    pub thread_id: Option<String>,
    pub content: String,
    /// `text`, `image_url` or `image_inline`.
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReply {
    pub thread_id: String,
    pub reply: String,
}

/// Drives one skill's assistant through thread, message, run, poll and
/// reply for each turn.
pub struct ConversationOrchestrator {
    skill: Skill,
    client: Arc<dyn AssistantClient>,
    journal: Arc<dyn MessageJournal>,
    threads: ThreadRegistry,
    delay: Arc<dyn Delay>,
    policy: PollPolicy,
    max_image_bytes: usize,
}

impl ConversationOrchestrator {
    pub fn new(
        skill: Skill,
        client: Arc<dyn AssistantClient>,
        journal: Arc<dyn MessageJournal>,
        policy: PollPolicy,
        max_image_bytes: usize,
    ) -> Self {
        Self {
            skill,
            client,
            journal,
            threads: ThreadRegistry::default(),
            delay: Arc::new(TokioDelay),
            policy,
            max_image_bytes,
        }
    }

    pub fn with_delay(mut self, delay: Arc<dyn Delay>) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_thread_limits(mut self, max_threads: usize, idle_ttl: Duration) -> Self {
        self.threads = ThreadRegistry::new(max_threads, idle_ttl);
        self
    }

    pub fn skill(&self) -> Skill {
        self.skill
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_configured()
    }

    pub fn threads(&self) -> &ThreadRegistry {
        &self.threads
    }

    /// Validation happens before any vendor call. The first vendor failure
    /// is returned unchanged. Journal failures never fail the turn.
    #[instrument(
        skip(self, request),
        fields(skill = %self.skill, user_id = %request.user_id, thread_id)
    )]
    pub async fn handle_turn(&self, request: TurnRequest) -> Result<TurnReply, AssistantError> {
        let content = match self.validate(&request) {
            Ok(content) => content,
            Err(err) => {
                metrics::record_turn(self.skill.slug(), err.kind());
                return Err(err);
            }
        };

        let thread_id = request
            .thread_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        Span::current().record("thread_id", thread_id.as_str());

        let key: ThreadKey = (request.user_id.clone(), thread_id.clone());
        let _turn = self.threads.lock(&key).await;

        let reply = match self.run_turn(&key, &content).await {
            Ok((reply, polls)) => {
                metrics::record_turn(self.skill.slug(), "ok");
                metrics::observe_run_polls(self.skill.slug(), polls);
                reply
            }
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    kind = err.kind(),
                    retryable = err.is_retryable(),
                    "Turn failed"
                );
                metrics::record_turn(self.skill.slug(), err.kind());
                return Err(err);
            }
        };

        self.journal_turn(&request.user_id, &thread_id, &content, &reply)
            .await;

        Ok(TurnReply { thread_id, reply })
    }

    fn validate(&self, request: &TurnRequest) -> Result<MessageContent, AssistantError> {
        let kind: ContentKind = request.kind.trim().parse()?;
        if kind.is_image() && !self.skill.accepts_images() {
            return Err(AssistantError::Validation(format!(
                "{} only accepts text messages",
                self.skill.display_name()
            )));
        }
        Ok(MessageContent::parse(
            kind,
            &request.content,
            self.max_image_bytes,
        )?)
    }

    async fn run_turn(
        &self,
        key: &ThreadKey,
        content: &MessageContent,
    ) -> Result<(String, u32), AssistantError> {
        let vendor_thread = match self.threads.vendor_thread(key) {
            Some(vendor_thread) => vendor_thread,
            None => {
                let vendor_thread = self.client.create_thread().await?;
                self.threads.bind(key.clone(), vendor_thread.clone());
                vendor_thread
            }
        };

        self.client.add_message(&vendor_thread, content).await?;
        let run_id = self.client.start_run(&vendor_thread).await?;
        let polls = await_completion(
            self.client.as_ref(),
            self.delay.as_ref(),
            self.policy,
            &vendor_thread,
            &run_id,
        )
        .await?;
        let reply = fetch_latest_reply(self.client.as_ref(), &vendor_thread, &run_id).await?;

        tracing::info!(run_id = %run_id, polls, "Turn completed");
        Ok((reply, polls))
    }

    async fn journal_turn(
        &self,
        user_id: &str,
        thread_id: &str,
        content: &MessageContent,
        reply: &str,
    ) {
        let entries = [
            (Role::User, content.journal_form()),
            (Role::Assistant, reply.to_string()),
        ];

        for (role, text) in entries {
            let entry = JournalEntry {
                user_id: user_id.to_string(),
                thread_id: thread_id.to_string(),
                role,
                content: text,
            };
            if let Err(e) = self.journal.append(&entry).await {
                tracing::error!(error = %e, role = %role, "Failed to journal message");
                metrics::record_journal_failure(role.as_str());
            }
        }
    }
}

/// Orchestrators by skill.
#[derive(Default)]
pub struct SkillRegistry {
    orchestrators: HashMap<Skill, Arc<ConversationOrchestrator>>,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, orchestrator: ConversationOrchestrator) {
        self.orchestrators
            .insert(orchestrator.skill(), Arc::new(orchestrator));
    }

    /// One vendor-backed orchestrator per skill, sharing the journal.
    pub fn from_config(
        config: &SkillsConfig,
        journal: Arc<dyn MessageJournal>,
    ) -> Result<Self, AssistantError> {
        let policy = PollPolicy {
            interval: config.openai.poll_interval,
            max_attempts: config.openai.poll_max_attempts,
        };

        let mut registry = Self::new();
        for skill in Skill::ALL {
            let assistant_id = match skill {
                Skill::CapivaraAnalista => &config.skills.analista_assistant_id,
                Skill::CapivaraConteudo => &config.skills.conteudo_assistant_id,
            };
            if assistant_id.is_empty() {
                tracing::warn!(skill = %skill, "No assistant configured for skill");
            }

            let client = OpenAiAssistantClient::new(OpenAiAssistantConfig {
                api_key: config.openai.api_key.clone(),
                base_url: config.openai.base_url.clone(),
                assistant_id: assistant_id.clone(),
                request_timeout: config.openai.request_timeout,
            })?;

            registry.insert(ConversationOrchestrator::new(
                skill,
                Arc::new(client),
                Arc::clone(&journal),
                policy,
                config.uploads.max_image_bytes,
            )
            .with_thread_limits(config.threads.max_threads, config.threads.idle_ttl));
        }
        Ok(registry)
    }

    pub fn get(&self, skill: Skill) -> Option<Arc<ConversationOrchestrator>> {
        self.orchestrators.get(&skill).cloned()
    }

    /// Every known skill is registered and has a configured assistant.
    pub fn all_configured(&self) -> bool {
        Skill::ALL.iter().all(|skill| {
            self.orchestrators
                .get(skill)
                .is_some_and(|orchestrator| orchestrator.is_configured())
        })
    }
}
