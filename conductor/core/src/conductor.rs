//! Conductor - The Orchestration Core
//!
//! The Conductor is the session object a chat front-end talks to. It owns:
//! - the credential sets of every provider
//! - the single-flight generation queue
//! - the completion client and the search aggregator
//! - the in-memory transcript
//!
//! # Design Philosophy
//!
//! The Conductor is UI-agnostic. Callers submit [`GenerationRequest`]s and
//! receive [`ConductorEvent`]s through an mpsc channel; they never see retry
//! attempts, key rotation or stream framing.
//!
//! # Generation Pipeline
//!
//! ```text
//! submit ─► queue ─► Started ─► [search ─► Sources] ─► prompt ─► stream
//!                                                                 │
//!             next queued request ◄── Settled ◄── Token* ◄────────┘
//! ```
//!
//! A driver task runs one request at a time and keeps draining the queue
//! until it is empty.
//!
//! Events are pushed onto an unbounded outbox and a forwarder task relays
//! them, in order, to the caller's channel. Admission and the driver never
//! wait on the caller. `Settled` is pushed while the scheduler lock is held,
//! so it always precedes the `Started` of whatever runs next.

use std::sync::Arc;

use chrono::Local;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::backend::{CompletionBackend, OpenAiCompatBackend};
use crate::cancel::AbortSignal;
use crate::completion::CompletionClient;
use crate::config::{ConductorConfig, ConfigError};
use crate::credentials::KeyRotator;
use crate::events::{GenerationRequest, RequestId};
use crate::messages::{ChatRequest, ConductorEvent, GenerationOutcome};
use crate::prompt::{user_turn, PromptBuilder, SearchContext};
use crate::queue::{Admission, GenerationQueue, QueueState};
use crate::retry::RetryController;
use crate::search::{
    BraveSource, SearchAggregator, SearchSource, SourceResult, WikipediaSource, BRAVE_TAG,
};
use crate::session::Transcript;

/// Provider name of the completion endpoint
pub const COMPLETION_PROVIDER: &str = "completion";

/// Per-session generation defaults
#[derive(Clone, Debug)]
pub struct ConductorOptions {
    /// Model used when a request names none
    pub default_model: String,
    /// Search sources used for search-enabled requests
    pub search_sources: Vec<String>,
    /// Transcript messages fed to the model
    pub history_window: usize,
    /// Instructions appended to every system prompt
    pub custom_instructions: Option<String>,
}

impl Default for ConductorOptions {
    fn default() -> Self {
        let config = ConductorConfig::default();
        Self::from(&config)
    }
}

impl From<&ConductorConfig> for ConductorOptions {
    fn from(config: &ConductorConfig) -> Self {
        Self {
            default_model: config.completion.default_model.clone(),
            search_sources: config.search.default_sources.clone(),
            history_window: config.session.history_window,
            custom_instructions: config.session.custom_instructions.clone(),
        }
    }
}

/// How a submission was admitted
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Submission {
    /// Generation started immediately
    Started {
        /// Submitted request
        request_id: RequestId,
    },
    /// Another generation is running; this one waits
    Queued {
        /// Submitted request
        request_id: RequestId,
        /// 1-based position among waiting requests
        position: usize,
    },
}

impl Submission {
    /// Submitted request
    #[must_use]
    pub fn request_id(&self) -> &RequestId {
        match self {
            Self::Started { request_id } | Self::Queued { request_id, .. } => request_id,
        }
    }
}

/// The running generation and its abort signal
struct ActiveGeneration {
    request_id: RequestId,
    cancel: AbortSignal,
}

/// Queue plus the running generation, updated together
#[derive(Default)]
struct Scheduler {
    queue: GenerationQueue,
    active: Option<ActiveGeneration>,
}

struct Inner {
    completion: CompletionClient,
    aggregator: SearchAggregator,
    prompt: PromptBuilder,
    options: ConductorOptions,
    scheduler: Mutex<Scheduler>,
    transcript: Mutex<Transcript>,
    outbox: mpsc::UnboundedSender<ConductorEvent>,
}

/// The Conductor - session object driving generations
#[derive(Clone)]
pub struct Conductor {
    inner: Arc<Inner>,
    keys: Arc<KeyRotator>,
}

impl std::fmt::Debug for Conductor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conductor")
            .field("completion", &self.inner.completion)
            .field("aggregator", &self.inner.aggregator)
            .field("queue_state", &self.queue_state())
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

impl Conductor {
    /// Create a Conductor from prebuilt parts
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime (the event forwarder is
    /// spawned here).
    pub fn new(
        completion: CompletionClient,
        aggregator: SearchAggregator,
        options: ConductorOptions,
        tx: mpsc::Sender<ConductorEvent>,
    ) -> Self {
        let mut keys = KeyRotator::new();
        keys.insert(Arc::clone(completion.credentials()));
        Self::with_keys(completion, aggregator, options, keys, tx)
    }

    fn with_keys(
        completion: CompletionClient,
        aggregator: SearchAggregator,
        options: ConductorOptions,
        keys: KeyRotator,
        tx: mpsc::Sender<ConductorEvent>,
    ) -> Self {
        let prompt = PromptBuilder::new(options.history_window)
            .with_custom_instructions(options.custom_instructions.clone());

        let (outbox, pending_events) = mpsc::unbounded_channel();
        tokio::spawn(forward_events(pending_events, tx));

        Self {
            inner: Arc::new(Inner {
                completion,
                aggregator,
                prompt,
                options,
                scheduler: Mutex::new(Scheduler::default()),
                transcript: Mutex::new(Transcript::new()),
                outbox,
            }),
            keys: Arc::new(keys),
        }
    }

    /// Build the completion backend, search sources and credential sets
    /// described by `config`
    ///
    /// Brave is only registered when it has keys; Wikipedia needs none.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::ValidationError`] for invalid values
    /// - [`ConfigError::EmptyCredentials`] if no completion key is configured
    /// - [`ConfigError::HttpClient`] if an HTTP client cannot be built
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn from_config(
        config: &ConductorConfig,
        tx: mpsc::Sender<ConductorEvent>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let retry = RetryController::new(config.retry.clone());
        let mut keys = KeyRotator::new();

        let completion_keys =
            keys.register(COMPLETION_PROVIDER, config.completion.api_keys.clone())?;
        let backend: Arc<dyn CompletionBackend> = Arc::new(OpenAiCompatBackend::new(
            COMPLETION_PROVIDER,
            config.completion.api_url.clone(),
            config.completion.request_timeout,
        )?);
        let completion = CompletionClient::new(backend, completion_keys, retry.clone());

        let search = &config.search;
        let mut aggregator = SearchAggregator::new(search.result_count, search.source_timeout);

        match keys.register(BRAVE_TAG, search.brave_api_keys.clone()) {
            Ok(brave_keys) => {
                let brave: Arc<dyn SearchSource> = Arc::new(BraveSource::new(
                    search.brave_url.clone(),
                    brave_keys,
                    retry,
                    search.source_timeout,
                )?);
                aggregator = aggregator.with_source(brave);
            }
            Err(ConfigError::EmptyCredentials { .. }) => {
                tracing::info!("No Brave API keys configured, web search disabled");
            }
            Err(e) => return Err(e),
        }

        let wikipedia: Arc<dyn SearchSource> = Arc::new(WikipediaSource::new(
            search.wikipedia_url.clone(),
            search.source_timeout,
        )?);
        aggregator = aggregator.with_source(wikipedia);

        tracing::debug!(
            sources = ?aggregator.tags(),
            providers = ?keys.providers().collect::<Vec<_>>(),
            "Conductor configured"
        );

        Ok(Self::with_keys(
            completion,
            aggregator,
            ConductorOptions::from(config),
            keys,
            tx,
        ))
    }

    /// Credential sets of every configured provider
    #[must_use]
    pub fn credentials(&self) -> &KeyRotator {
        &self.keys
    }

    /// Submit a generation request
    ///
    /// Never waits: progress arrives as [`ConductorEvent`]s. When no
    /// generation is running the request starts right away, otherwise it
    /// waits its turn.
    pub fn submit_generation(&self, request: GenerationRequest) -> Submission {
        let request_id = request.id.clone();
        let mut scheduler = self.inner.scheduler.lock();

        match scheduler.queue.submit(request) {
            Admission::Started(request) => {
                scheduler.active = Some(ActiveGeneration {
                    request_id: request_id.clone(),
                    cancel: AbortSignal::new(),
                });
                drop(scheduler);

                tracing::info!(request_id = %request_id, "Generation started");
                tokio::spawn(Arc::clone(&self.inner).drive(request));
                Submission::Started { request_id }
            }
            Admission::Queued { position } => {
                // Pushed under the lock so it precedes this request's Started
                self.inner.emit(ConductorEvent::Queued {
                    request_id: request_id.clone(),
                    position,
                });
                drop(scheduler);

                tracing::info!(request_id = %request_id, position, "Generation queued");
                Submission::Queued {
                    request_id,
                    position,
                }
            }
        }
    }

    /// Stop the running generation
    ///
    /// Text streamed so far is kept and reported as
    /// [`GenerationOutcome::Stopped`]. Queued requests are unaffected.
    /// Returns `false` if nothing was running or it was already stopped.
    pub fn stop_current_generation(&self) -> bool {
        let scheduler = self.inner.scheduler.lock();
        match scheduler.active {
            Some(ref active) => {
                let fired = active.cancel.signal();
                if fired {
                    tracing::info!(request_id = %active.request_id, "Stopping generation");
                }
                fired
            }
            None => false,
        }
    }

    /// Run a search outside any generation
    pub async fn aggregate_search(&self, query: &str, sources: &[String]) -> Vec<SourceResult> {
        self.inner.aggregator.aggregate(query, sources).await
    }

    /// Whether a generation is running
    #[must_use]
    pub fn queue_state(&self) -> QueueState {
        self.inner.scheduler.lock().queue.state()
    }

    /// Number of requests waiting behind the running one
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.scheduler.lock().queue.pending()
    }

    /// The running request, if any
    #[must_use]
    pub fn active_request(&self) -> Option<RequestId> {
        self.inner
            .scheduler
            .lock()
            .active
            .as_ref()
            .map(|a| a.request_id.clone())
    }

    /// Snapshot of the conversation so far
    #[must_use]
    pub fn transcript(&self) -> Transcript {
        self.inner.transcript.lock().clone()
    }
}

impl Inner {
    /// Run `first`, then every request the queue hands back, one at a time
    async fn drive(self: Arc<Self>, first: GenerationRequest) {
        let mut current = Some(first);

        while let Some(request) = current.take() {
            let cancel = {
                let scheduler = self.scheduler.lock();
                scheduler
                    .active
                    .as_ref()
                    .filter(|a| a.request_id == request.id)
                    .map(|a| a.cancel.clone())
                    .unwrap_or_default()
            };

            let request_id = request.id.clone();
            let outcome = self.run(&request, &cancel).await;

            current = {
                let mut scheduler = self.scheduler.lock();
                self.emit(ConductorEvent::Settled {
                    request_id,
                    outcome,
                });
                let next = scheduler.queue.on_request_settled();
                scheduler.active = next.as_ref().map(|n| ActiveGeneration {
                    request_id: n.id.clone(),
                    cancel: AbortSignal::new(),
                });
                next
            };
        }

        tracing::debug!("Generation queue drained");
    }

    /// One generation pipeline
    async fn run(&self, request: &GenerationRequest, cancel: &AbortSignal) -> GenerationOutcome {
        self.emit(ConductorEvent::Started {
            request_id: request.id.clone(),
        });

        let history = {
            let mut transcript = self.transcript.lock();
            let history = transcript.window(self.options.history_window);
            transcript.push_user(user_turn(request));
            history
        };

        let mut sources = Vec::new();
        let mut search_failed = false;
        if request.wants_search() {
            let report = tokio::select! {
                biased;
                () = cancel.signalled() => {
                    return self.settle(request, GenerationOutcome::Stopped { partial: String::new() }, Vec::new());
                }
                report = self.aggregator.search(&request.query, &self.options.search_sources) => report,
            };

            search_failed = report.all_failed();
            sources = report.results;
            if !sources.is_empty() {
                self.emit(ConductorEvent::Sources {
                    request_id: request.id.clone(),
                    sources: sources.clone(),
                });
            }
        }

        let model = if request.model.trim().is_empty() {
            self.options.default_model.clone()
        } else {
            request.model.clone()
        };
        let messages = self.prompt.build_messages(
            request,
            &history,
            SearchContext::from_results(&sources, search_failed),
            Local::now(),
        );
        let chat = ChatRequest::streaming(model, messages);

        let mut text = String::new();
        let result = self
            .completion
            .stream(&chat, cancel, |fragment| {
                text.push_str(fragment);
                self.emit(ConductorEvent::Token {
                    request_id: request.id.clone(),
                    fragment: fragment.to_string(),
                });
            })
            .await;

        let outcome = match result {
            Ok(summary) => {
                tracing::info!(
                    request_id = %request.id,
                    fragments = summary.fragments,
                    "Generation completed"
                );
                GenerationOutcome::Completed { text }
            }
            Err(e) if e.is_aborted() => {
                tracing::info!(request_id = %request.id, chars = text.len(), "Generation stopped");
                GenerationOutcome::Stopped { partial: text }
            }
            Err(e) => {
                tracing::error!(request_id = %request.id, error = %e, "Generation failed");
                GenerationOutcome::Failed {
                    error: e.to_string(),
                    partial: text,
                }
            }
        };

        self.settle(request, outcome, sources)
    }

    fn settle(
        &self,
        request: &GenerationRequest,
        outcome: GenerationOutcome,
        sources: Vec<SourceResult>,
    ) -> GenerationOutcome {
        let recorded = self.transcript.lock().record_outcome(&outcome, sources);
        tracing::debug!(request_id = %request.id, recorded, "Outcome recorded");
        outcome
    }

    /// Queue an event for the caller
    fn emit(&self, event: ConductorEvent) {
        if self.outbox.send(event).is_err() {
            tracing::warn!("Event forwarder stopped, dropping event");
        }
    }
}

/// Relay outbox events to the caller's channel in order
async fn forward_events(
    mut pending: mpsc::UnboundedReceiver<ConductorEvent>,
    tx: mpsc::Sender<ConductorEvent>,
) {
    while let Some(event) = pending.recv().await {
        if let Err(e) = tx.send(event).await {
            tracing::warn!("Failed to send event to caller: {}", e);
            break;
        }
    }
}
