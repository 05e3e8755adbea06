//! Data models for requests, responses, collections and test results.
//!
//! This module contains the core data structures that flow through the
//! request pipeline.

pub mod collection;
pub mod request;
pub mod response;
pub mod test_result;

pub use collection::Collection;
pub use request::{
    ApiKeyLocation, AuthSpec, BodyType, HttpMethod, LastResponseExecution, ProcessedRequest,
    RequestBody, RequestDefinition,
};
pub use response::{HeaderMap, ProcessedResponse, RawResponse};
pub use test_result::{TestResult, TestSummary};
