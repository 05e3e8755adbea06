//! Request pipeline for an interactive API client.
//!
//! Takes a stored request definition, resolves `{{variable}}` references
//! against layered variable scopes, runs a pre-request script that can rewrite
//! the request, sends it over HTTP, normalizes the response and runs a test
//! script that produces named pass/fail results and can write variables back.
//!
//! # Architecture
//!
//! - **models**: Request definitions, responses, collections and test results
//! - **variables**: Scoped variable store and `{{name}}` interpolation
//! - **auth**: Basic, bearer and API-key credentials
//! - **scripts**: Pre-request line commands, test line commands and the `pm` sandbox
//! - **executor**: Request building, HTTP transport and response normalization
//! - **storage**: Persistence of variables, collections and history
//! - **history**: History entries and their sanitization
//! - **config**: Client settings (timeout, redirects, TLS, history)
//! - **pipeline**: The send state machine and the collection runner
//!
//! # Pipeline
//!
//! [`pipeline::Orchestrator::send`] moves one request through
//! `Interpolating → PreScripting → Building → Sending → Normalizing → Testing → Done`.
//! A failure before `Testing` aborts the send with a [`pipeline::PipelineError`];
//! failures inside test scripts become failed test results instead.
//!
//! # Usage
//!
//! ```no_run
//! use rest_workbench::models::{HttpMethod, RequestDefinition};
//! use rest_workbench::pipeline::{Orchestrator, Session};
//! use rest_workbench::variables::VariableScope;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut session = Session::new();
//! session.store.set_active_environment(Some("dev".to_string()));
//! session
//!     .store
//!     .set(VariableScope::Environment, "apiUrl", "https://api.example.com", "")?;
//!
//! let mut request = RequestDefinition::new("users", HttpMethod::GET, "{{apiUrl}}/users");
//! request.test_script = "status 200\nheaderExists Content-Type".to_string();
//!
//! let orchestrator = Orchestrator::from_config(&Default::default())?;
//! let outcome = orchestrator.send(&mut session, &request).await?;
//! for result in &outcome.test_results {
//!     println!("{}: {}", result.name, if result.passed { "ok" } else { "failed" });
//! }
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod executor;
pub mod history;
pub mod models;
pub mod pipeline;
pub mod scripts;
pub mod storage;
pub mod variables;
