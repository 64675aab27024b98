//! Network-side timeouts for in-flight requests.
//!
//! # Design
//! [`govern`] races the in-flight operation against a one-shot timer on the
//! reactor's clock. Exactly one side finishes the race. If the timer wins,
//! the operation future is dropped, which aborts the request in the engine.
//! If the operation wins, the timer is dropped before it can fire. Without a
//! deadline no timer is created at all.

use std::future::Future;
use std::time::Duration;

use crate::error::FetchError;

/// Which network-side limit a [`Deadline`] enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    /// Time until the complete response has been received.
    Response,
    /// Time until the TCP (and TLS) connection is established.
    Connect,
}

/// A network-side time limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    kind: TimeoutKind,
    after: Duration,
}

impl Deadline {
    pub fn response(after: Duration) -> Self {
        Self {
            kind: TimeoutKind::Response,
            after,
        }
    }

    pub fn connect(after: Duration) -> Self {
        Self {
            kind: TimeoutKind::Connect,
            after,
        }
    }

    pub fn kind(&self) -> TimeoutKind {
        self.kind
    }

    pub fn after(&self) -> Duration {
        self.after
    }

    /// The error recorded when this deadline aborts an operation.
    pub fn expired(&self) -> FetchError {
        match self.kind {
            TimeoutKind::Response => FetchError::ResponseTimeout { timeout: self.after },
            TimeoutKind::Connect => FetchError::ConnectTimeout { timeout: self.after },
        }
    }
}

/// Run `operation` under `deadline`. A zero deadline fires on the next timer
/// tick unless the operation completes first.
pub async fn govern<T, F>(operation: F, deadline: Option<Deadline>) -> Result<T, FetchError>
where
    F: Future<Output = Result<T, FetchError>>,
{
    let Some(deadline) = deadline else {
        return operation.await;
    };

    tokio::select! {
        biased;
        outcome = operation => outcome,
        () = tokio::time::sleep(deadline.after) => {
            tracing::warn!(kind = ?deadline.kind, after = ?deadline.after, "aborting request on timeout");
            Err(deadline.expired())
        }
    }
}
