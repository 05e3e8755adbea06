//! Request history.
//!
//! Every completed send is recorded as a [`HistoryEntry`] holding the request
//! as sent, the normalized response and the test results. Entries are
//! sanitized of sensitive headers and stripped of oversized bodies before
//! they reach [`Storage`](crate::storage::Storage), which persists them and
//! enforces the configured history limit.
//!
//! # Example
//!
//! ```ignore
//! use rest_workbench::history::HistoryEntry;
//!
//! let entry = HistoryEntry::new(request, response, results).prepare_for_storage(true);
//! storage.append_history(entry, config.history_limit).await?;
//! ```

pub mod models;

pub use models::{is_sensitive_header, HistoryEntry, MAX_BODY_SIZE, SENSITIVE_HEADERS};
