//! Sequential runs over many requests.
//!
//! Requests run one at a time over the same [`Session`], so variables written
//! by one request's test script are visible to the next request's
//! pre-request script. An aborted request is reported and the run continues.

use super::{Orchestrator, Session};
use crate::models::{Collection, RequestDefinition, TestResult, TestSummary};
use serde::{Deserialize, Serialize};

/// How one request of a run ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum RunStatus {
    #[serde(rename_all = "camelCase")]
    Completed {
        code: u16,
        duration: u64,
        test_results: Vec<TestResult>,
    },
    Aborted {
        error: String,
    },
}

/// One request of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRun {
    pub request_id: String,
    pub name: String,
    #[serde(flatten)]
    pub status: RunStatus,
}

impl RequestRun {
    pub fn summary(&self) -> TestSummary {
        match &self.status {
            RunStatus::Completed { test_results, .. } => TestSummary::from_results(test_results),
            RunStatus::Aborted { .. } => TestSummary::default(),
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self.status, RunStatus::Aborted { .. })
    }
}

/// Result of a whole run, in request order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub runs: Vec<RequestRun>,
}

impl RunSummary {
    /// Test totals over every completed request.
    pub fn tests(&self) -> TestSummary {
        self.runs.iter().fold(TestSummary::default(), |acc, run| {
            let summary = run.summary();
            TestSummary {
                passed: acc.passed + summary.passed,
                failed: acc.failed + summary.failed,
            }
        })
    }

    pub fn aborted(&self) -> usize {
        self.runs.iter().filter(|run| run.is_aborted()).count()
    }

    /// True when every request completed and every test passed.
    pub fn is_success(&self) -> bool {
        self.aborted() == 0 && self.tests().failed == 0
    }
}

/// Runs requests through an [`Orchestrator`] one after another.
#[derive(Debug, Clone)]
pub struct BatchRunner {
    orchestrator: Orchestrator,
}

impl BatchRunner {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }

    /// Runs every request of `collection` in order.
    ///
    /// The session's current collection is switched to `collection` for the
    /// run. Completed requests get their last-execution metadata updated.
    pub async fn run_collection(&self, session: &mut Session, collection: &mut Collection) -> RunSummary {
        session
            .store
            .set_current_collection(Some(collection.id.clone()));
        log::info!(
            "Running collection '{}' ({} requests)",
            collection.name,
            collection.requests.len()
        );
        self.run(session, &mut collection.requests).await
    }

    /// Runs `requests` in order.
    pub async fn run(&self, session: &mut Session, requests: &mut [RequestDefinition]) -> RunSummary {
        let mut summary = RunSummary::default();

        for request in requests.iter_mut() {
            let status = match self.orchestrator.send(session, request).await {
                Ok(outcome) => {
                    outcome.record_on(request);
                    RunStatus::Completed {
                        code: outcome.response.status,
                        duration: outcome.response.duration,
                        test_results: outcome.test_results,
                    }
                }
                Err(e) => {
                    log::warn!("Request '{}' aborted: {}", request.id, e);
                    RunStatus::Aborted {
                        error: e.to_string(),
                    }
                }
            };

            summary.runs.push(RequestRun {
                request_id: request.id.clone(),
                name: request.name.clone(),
                status,
            });
        }

        summary
    }
}
