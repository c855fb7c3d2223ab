//! Retry and backoff for opening data connections.
//!
//! Errors are classified (timeouts, throttling, connection failures) and fed
//! to an exponential backoff policy. Only the worker's current host is
//! retried; once the policy gives up the caller moves to another mirror.

mod classify;
mod policy;
mod run;

pub use classify::{classify, classify_curl_error, classify_http_status};
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
pub use run::run_with_retry;
