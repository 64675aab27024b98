//! The process-wide reactor thread.
//!
//! # Design
//! All network I/O runs on one tokio `current_thread` runtime driven by a
//! dedicated OS thread. The thread is started on first use behind a
//! `OnceCell`, so concurrent first callers still start exactly one reactor,
//! and it lives for the rest of the process.
//!
//! [`Reactor::schedule`] moves a unit of work onto that thread and hands back
//! an [`Eventual`] right away. Whatever the unit returns, and any panic it
//! raises, is recorded in the `Eventual` and never escapes into the event
//! loop. A panicking fetch fails on its own and does not affect the others
//! sharing the reactor.

use std::any::Any;
use std::future::{self, Future};
use std::io;
use std::sync::Arc;
use std::thread;

use once_cell::sync::OnceCell;
use tokio::runtime::{Builder, Handle};

use crate::error::FetchError;
use crate::eventual::Eventual;

/// Name of the OS thread driving the reactor.
pub const THREAD_NAME: &str = "fido-reactor";

static GLOBAL: OnceCell<Reactor> = OnceCell::new();

/// Handle to a running reactor thread.
#[derive(Debug)]
pub struct Reactor {
    handle: Handle,
}

impl Reactor {
    /// The shared reactor, started on first call.
    pub fn global() -> Result<&'static Reactor, FetchError> {
        GLOBAL.get_or_try_init(Reactor::start)
    }

    /// Start a new reactor thread. Most callers want [`Reactor::global`].
    pub fn start() -> Result<Self, FetchError> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(start_failed)?;
        let handle = runtime.handle().clone();

        thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || runtime.block_on(future::pending::<()>()))
            .map_err(start_failed)?;

        tracing::info!(thread = THREAD_NAME, "reactor started");
        Ok(Self { handle })
    }

    /// Run `unit` on the reactor thread and return its eventual outcome.
    pub fn schedule<T, F>(&self, unit: F) -> Eventual<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        let (eventual, resolver) = Eventual::new();
        let task = self.handle.spawn(unit);

        self.handle.spawn(async move {
            let outcome = match task.await {
                Ok(outcome) => outcome,
                Err(err) if err.is_panic() => {
                    let message = panic_message(err.into_panic());
                    tracing::error!(%message, "fetch task panicked");
                    Err(FetchError::TaskFailed(message))
                }
                Err(_) => Err(FetchError::TaskFailed("fetch task was cancelled".to_string())),
            };
            resolver.resolve(outcome);
        });

        eventual
    }
}

fn start_failed(err: io::Error) -> FetchError {
    FetchError::ReactorStart(Arc::new(err))
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
