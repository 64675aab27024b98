//! Error types for the fetch client.
//!
//! # Design
//! One outcome recorded on the reactor thread may be read by any number of
//! `wait` / `peek_error` calls from other threads, so `FetchError` is `Clone`
//! and keeps its underlying causes behind `Arc`. Network failures are carried
//! untouched in `Network` so callers can downcast to the engine's own error.
//!
//! Two timeout domains stay apart: `ResponseTimeout` / `ConnectTimeout` mean
//! the request itself was aborted, `WaitTimeout` only means the caller
//! stopped waiting.

use std::error::Error as StdError;
use std::io;
use std::sync::Arc;
use std::time::Duration;

/// Errors surfaced by `fetch` and by the eventual result it returns.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    /// Proxy configuration could not be parsed or the agent could not be built.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The reactor runtime or its thread could not be started.
    #[error("failed to start reactor thread: {0}")]
    ReactorStart(#[source] Arc<io::Error>),

    /// The request could not be assembled (bad method, URL, or header).
    #[error("invalid request: {0}")]
    RequestConstruction(String),

    /// No response arrived within the configured `timeout`.
    #[error(
        "operation aborted: response took longer than timeout={} seconds",
        .timeout.as_secs_f64()
    )]
    ResponseTimeout { timeout: Duration },

    /// The connection was not established within the configured `connect_timeout`.
    #[error(
        "operation aborted: connection took longer than connect_timeout={} seconds",
        .timeout.as_secs_f64()
    )]
    ConnectTimeout { timeout: Duration },

    /// Failure reported by the network engine, passed through unmodified.
    #[error("network error: {0}")]
    Network(#[source] Arc<dyn StdError + Send + Sync + 'static>),

    /// The caller's own wait deadline elapsed. The request keeps running.
    #[error("timed out after {} seconds waiting for the result", .waited.as_secs_f64())]
    WaitTimeout { waited: Duration },

    /// The response body is not valid JSON.
    #[error("failed to decode response body as JSON: {0}")]
    Decode(#[source] Arc<serde_json::Error>),

    /// The fetch task on the reactor panicked or was cancelled.
    #[error("fetch task failed: {0}")]
    TaskFailed(String),
}

impl FetchError {
    /// Wrap an engine failure without altering it.
    pub fn network<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        FetchError::Network(Arc::new(err))
    }

    /// True for the two timeouts that abort the request on the reactor.
    pub fn is_network_timeout(&self) -> bool {
        matches!(
            self,
            FetchError::ResponseTimeout { .. } | FetchError::ConnectTimeout { .. }
        )
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Decode(Arc::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_timeout_names_the_timeout_class() {
        let err = FetchError::ResponseTimeout {
            timeout: Duration::from_secs(1),
        };
        assert_eq!(
            err.to_string(),
            "operation aborted: response took longer than timeout=1 seconds"
        );
    }

    #[test]
    fn connect_timeout_names_the_timeout_class() {
        let err = FetchError::ConnectTimeout {
            timeout: Duration::from_millis(1500),
        };
        assert!(err
            .to_string()
            .contains("connection took longer than connect_timeout=1.5 seconds"));
    }

    #[test]
    fn network_error_keeps_the_original_cause() {
        let err = FetchError::network(io::Error::new(io::ErrorKind::ConnectionReset, "I failed :("));
        let FetchError::Network(cause) = &err else {
            panic!("expected a network error, got {err:?}");
        };
        let io_err = cause.downcast_ref::<io::Error>().unwrap();
        assert_eq!(io_err.kind(), io::ErrorKind::ConnectionReset);
        assert_eq!(io_err.to_string(), "I failed :(");
        assert!(err.source().is_some());
    }

    #[test]
    fn wait_timeout_is_not_a_network_timeout() {
        let wait = FetchError::WaitTimeout {
            waited: Duration::from_secs(1),
        };
        assert!(!wait.is_network_timeout());
        assert!(FetchError::ResponseTimeout {
            timeout: Duration::from_secs(1)
        }
        .is_network_timeout());
    }

    #[test]
    fn clones_share_the_cause() {
        let err = FetchError::network(io::Error::other("boom"));
        let copy = err.clone();
        match (&err, &copy) {
            (FetchError::Network(a), FetchError::Network(b)) => assert!(Arc::ptr_eq(a, b)),
            _ => unreachable!(),
        }
    }
}
