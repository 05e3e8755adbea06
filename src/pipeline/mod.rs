//! Request orchestration.
//!
//! [`Orchestrator::send`] threads one request through the stages of the
//! pipeline:
//!
//! ```text
//! Idle → Interpolating → PreScripting → Building → Sending → Normalizing → Testing → Done
//! ```
//!
//! Any stage up to and including `Sending` may end in `Aborted`, in which case
//! the caller gets a single [`PipelineError`] and nothing is recorded. The
//! test stage never aborts: failing assertions are reported as data.

pub mod runner;
pub mod session;

pub use runner::{BatchRunner, RequestRun, RunStatus, RunSummary};
pub use session::Session;

use crate::config::{get_config, ClientConfig};
use crate::executor::{
    build_request, execute, normalize_response, BuildError, ExecutionConfig, ReqwestTransport,
    Transport, TransportError,
};
use crate::history::HistoryEntry;
use crate::models::{
    ProcessedRequest, ProcessedResponse, RequestDefinition, TestResult, TestSummary,
};
use crate::scripts::{run_pre_request_script, run_test_script, ScriptError, ScriptWarning};
use crate::storage::{Storage, StorageError};
use crate::variables::resolve_request;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Stage of a single send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Interpolating,
    PreScripting,
    Building,
    Sending,
    Normalizing,
    Testing,
    Done,
    /// Terminal failure with the reason shown to the user
    Aborted(String),
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Aborted(_))
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Idle => f.write_str("Idle"),
            PipelineState::Interpolating => f.write_str("Interpolating"),
            PipelineState::PreScripting => f.write_str("PreScripting"),
            PipelineState::Building => f.write_str("Building"),
            PipelineState::Sending => f.write_str("Sending"),
            PipelineState::Normalizing => f.write_str("Normalizing"),
            PipelineState::Testing => f.write_str("Testing"),
            PipelineState::Done => f.write_str("Done"),
            PipelineState::Aborted(reason) => write!(f, "Aborted({})", reason),
        }
    }
}

/// Why a send was aborted.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The request could not be built, e.g. a malformed JSON body.
    #[error("Validation error: {0}")]
    Validation(#[from] BuildError),

    /// A pre-request script referenced a variable no scope defines.
    #[error("{0}")]
    UndefinedVariable(#[from] ScriptError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A storage operation the caller asked for failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Receives pipeline events.
///
/// Both methods default to doing nothing.
pub trait PipelineObserver: Send + Sync {
    /// Called on every state transition, including the initial `Idle`.
    fn on_state(&self, _request_id: &str, _state: &PipelineState) {}

    /// Called once a send reaches `Done`.
    fn on_complete(&self, _request_id: &str, _outcome: &PipelineOutcome) {}
}

/// Everything a completed send produced.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutcome {
    pub request: ProcessedRequest,
    pub response: ProcessedResponse,
    /// Test results in script order
    pub test_results: Vec<TestResult>,
    /// Pre-request lines that were skipped
    pub warnings: Vec<ScriptWarning>,
    /// The states the send went through, `Idle` first and `Done` last
    pub states: Vec<PipelineState>,
    /// Id of the history entry, when one was written
    pub history_id: Option<String>,
}

impl PipelineOutcome {
    pub fn summary(&self) -> TestSummary {
        TestSummary::from_results(&self.test_results)
    }

    /// Attaches this outcome to a request as last-execution metadata.
    pub fn record_on(&self, request: &mut RequestDefinition) {
        request.record_execution(&self.request, &self.response, &self.test_results);
    }
}

/// Tracks and reports the state of one send.
struct StateTrail<'a> {
    request_id: &'a str,
    states: Vec<PipelineState>,
    observer: Option<&'a dyn PipelineObserver>,
}

impl<'a> StateTrail<'a> {
    fn start(request_id: &'a str, observer: Option<&'a dyn PipelineObserver>) -> Self {
        let mut trail = Self {
            request_id,
            states: Vec::new(),
            observer,
        };
        trail.enter(PipelineState::Idle);
        trail
    }

    fn enter(&mut self, state: PipelineState) {
        log::debug!("[{}] {}", self.request_id, state);
        if let Some(observer) = self.observer {
            observer.on_state(self.request_id, &state);
        }
        self.states.push(state);
    }

    fn abort(&mut self, error: PipelineError) -> PipelineError {
        self.enter(PipelineState::Aborted(error.to_string()));
        log::warn!(
            "[{}] Send aborted after {}: {}",
            self.request_id,
            self.states
                .iter()
                .rev()
                .nth(1)
                .map(ToString::to_string)
                .unwrap_or_default(),
            error
        );
        error
    }
}

/// Runs requests through the pipeline.
///
/// # Examples
///
/// ```no_run
/// use rest_workbench::models::{HttpMethod, RequestDefinition};
/// use rest_workbench::pipeline::{Orchestrator, Session};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let orchestrator = Orchestrator::from_config(&Default::default())?;
/// let mut session = Session::new();
/// let request = RequestDefinition::new("r1", HttpMethod::GET, "https://api.example.com/users");
///
/// let outcome = orchestrator.send(&mut session, &request).await?;
/// println!("{} in {} ms", outcome.response.status, outcome.response.duration);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Orchestrator {
    transport: Arc<dyn Transport>,
    storage: Option<Arc<dyn Storage>>,
    observer: Option<Arc<dyn PipelineObserver>>,
    execution: ExecutionConfig,
    save_history: bool,
    sanitize_history: bool,
    history_limit: usize,
}

impl Orchestrator {
    /// Creates an orchestrator over `transport`, configured from the global
    /// configuration.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let config = get_config();
        Self {
            transport,
            storage: None,
            observer: None,
            execution: ExecutionConfig::from_client_config(&config),
            save_history: config.save_history,
            sanitize_history: config.sanitize_history,
            history_limit: config.history_limit,
        }
    }

    /// Creates an orchestrator with a [`ReqwestTransport`] built from `config`.
    pub fn from_config(config: &ClientConfig) -> Result<Self, TransportError> {
        let transport = ReqwestTransport::new(config)?;
        Ok(Self::new(Arc::new(transport)).with_config(config))
    }

    /// Applies timeout and history settings from `config`.
    pub fn with_config(mut self, config: &ClientConfig) -> Self {
        self.execution = ExecutionConfig::from_client_config(config);
        self.save_history = config.save_history;
        self.sanitize_history = config.sanitize_history;
        self.history_limit = config.history_limit;
        self
    }

    pub fn with_execution_config(mut self, execution: ExecutionConfig) -> Self {
        self.execution = execution;
        self
    }

    /// Persists variable writes and history through `storage`.
    pub fn with_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn storage(&self) -> Option<&Arc<dyn Storage>> {
        self.storage.as_ref()
    }

    /// Sends one request.
    ///
    /// `request` is never modified; the pipeline works on a resolved copy.
    /// Test-script variable writes land in `session` and, when storage is
    /// configured, are flushed to it after the test stage. Persistence
    /// failures of variables or history are logged and do not fail the send.
    ///
    /// # Errors
    ///
    /// Returns the [`PipelineError`] of the first stage that failed. No
    /// request reaches the transport when a stage before `Sending` fails.
    pub async fn send(
        &self,
        session: &mut Session,
        request: &RequestDefinition,
    ) -> Result<PipelineOutcome, PipelineError> {
        let mut trail = StateTrail::start(&request.id, self.observer.as_deref());

        trail.enter(PipelineState::Interpolating);
        let mut working = resolve_request(request, &session.store);

        trail.enter(PipelineState::PreScripting);
        let script = working.pre_request_script.clone();
        let warnings = match run_pre_request_script(&script, &mut working, &session.store) {
            Ok(outcome) => outcome.warnings,
            Err(e) => return Err(trail.abort(e.into())),
        };

        trail.enter(PipelineState::Building);
        let built = match build_request(&working) {
            Ok(built) => built,
            Err(e) => return Err(trail.abort(e.into())),
        };

        trail.enter(PipelineState::Sending);
        let timeout = self.execution.timeout_duration();
        let (raw, elapsed) = match execute(self.transport.as_ref(), &built, timeout).await {
            Ok(sent) => sent,
            Err(e) => return Err(trail.abort(e.into())),
        };

        trail.enter(PipelineState::Normalizing);
        let response = normalize_response(raw, elapsed);

        trail.enter(PipelineState::Testing);
        let test_results = run_test_script(&working.test_script, &response, &mut session.store);
        let summary = TestSummary::from_results(&test_results);
        log::debug!(
            "[{}] {} passed, {} failed",
            request.id,
            summary.passed,
            summary.failed
        );

        let processed = built.to_processed();
        let history_id = match &self.storage {
            Some(storage) => {
                session.store.flush(storage.as_ref()).await;
                self.record_history(storage.as_ref(), request, &processed, &response, &test_results)
                    .await
            }
            None => None,
        };

        trail.enter(PipelineState::Done);
        let outcome = PipelineOutcome {
            request: processed,
            response,
            test_results,
            warnings,
            states: trail.states,
            history_id,
        };
        if let Some(observer) = &self.observer {
            observer.on_complete(&request.id, &outcome);
        }
        Ok(outcome)
    }

    async fn record_history(
        &self,
        storage: &dyn Storage,
        request: &RequestDefinition,
        processed: &ProcessedRequest,
        response: &ProcessedResponse,
        test_results: &[TestResult],
    ) -> Option<String> {
        if !self.save_history {
            return None;
        }

        let entry = HistoryEntry::new(processed.clone(), response.clone(), test_results.to_vec())
            .with_request_id(request.id.clone())
            .prepare_for_storage(self.sanitize_history);
        let id = entry.id.clone();

        match storage.append_history(entry, self.history_limit).await {
            Ok(()) => Some(id),
            Err(e) => {
                log::warn!("Failed to save history for '{}': {}", request.id, e);
                None
            }
        }
    }
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("execution", &self.execution)
            .field("has_storage", &self.storage.is_some())
            .field("save_history", &self.save_history)
            .field("history_limit", &self.history_limit)
            .finish()
    }
}
