//! Retry loop: run a closure until success or the policy says stop.

use super::policy::{ErrorKind, RetryDecision, RetryPolicy};

/// Calls `f` with the 1-based attempt number until it succeeds or the policy
/// stops; sleeps for the backoff between attempts. Returns the last error.
pub fn run_with_retry<T, E, F, C>(policy: &RetryPolicy, classify: C, mut f: F) -> Result<T, E>
where
    F: FnMut(u32) -> Result<T, E>,
    C: Fn(&E) -> ErrorKind,
{
    let mut attempt = 1u32;
    loop {
        match f(attempt) {
            Ok(v) => return Ok(v),
            Err(e) => match policy.decide(attempt, classify(&e)) {
                RetryDecision::NoRetry => return Err(e),
                RetryDecision::RetryAfter(d) => {
                    std::thread::sleep(d);
                    attempt += 1;
                }
            },
        }
    }
}
