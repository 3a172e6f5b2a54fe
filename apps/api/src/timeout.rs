//! Deadline combinator for calls to external services.
//!
//! A call raced against a timer settles into one of three tagged outcomes so
//! the caller can branch on each explicitly. The losing future is dropped;
//! nothing is retried.

use std::future::Future;
use std::time::Duration;

#[derive(Debug, PartialEq)]
pub enum Outcome<T, E> {
    Ok(T),
    Timeout(Duration),
    Error(E),
}

impl<T, E> Outcome<T, E> {
    /// Collapses back into a `Result`, building the error for the timeout case.
    pub fn into_result(self, on_timeout: impl FnOnce(Duration) -> E) -> Result<T, E> {
        match self {
            Outcome::Ok(value) => Ok(value),
            Outcome::Timeout(limit) => Err(on_timeout(limit)),
            Outcome::Error(e) => Err(e),
        }
    }
}

/// Races `call` against a `limit` timer.
pub async fn with_timeout<T, E, F>(limit: Duration, call: F) -> Outcome<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => Outcome::Ok(value),
        Ok(Err(e)) => Outcome::Error(e),
        Err(_) => Outcome::Timeout(limit),
    }
}
