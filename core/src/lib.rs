//! Blocking-friendly HTTP fetches over a background reactor.
//!
//! # Overview
//! [`fetch`] and [`Request::send`] return immediately with an
//! [`EventualResponse`]. The request itself runs on a single, lazily started
//! reactor thread shared by the whole process. Any thread can later block on
//! the result with [`Eventual::wait`], with or without its own deadline.
//!
//! ```no_run
//! use std::time::Duration;
//!
//! let eventual = fido_core::Request::new("http://localhost:3000/")
//!     .timeout(Duration::from_secs(5))
//!     .send()?;
//! let response = eventual.wait(Some(Duration::from_secs(10)))?;
//! println!("{} {}", response.status(), response.parsed()?);
//! # Ok::<(), fido_core::FetchError>(())
//! ```
//!
//! # Design
//! - `reactor` owns the thread and converts reactor-side futures into
//!   cross-thread [`Eventual`]s; failures and panics never escape it.
//! - `governor` enforces the network-side response timeout; the connect
//!   timeout is applied by the agent and reported the same way.
//! - `agent` is the seam to the network engine (`reqwest`), selected per
//!   fetch from the proxy environment.
//! - Two kinds of timeout stay separate: network-side timeouts abort the
//!   request, `wait` timeouts only stop the caller from waiting.

pub mod agent;
pub mod body;
pub mod config;
pub mod error;
pub mod eventual;
pub mod fetch;
pub mod governor;
pub mod headers;
pub mod reactor;
pub mod response;

pub use agent::{Agent, AgentFactory, AgentSelector, HttpAgent, Prepared, MAX_CACHED_AGENTS};
pub use body::{build_body_producer, BodyProducer};
pub use config::{Environment, ProcessEnv, Route, DEFAULT_USER_AGENT, MAX_REDIRECTS};
pub use error::FetchError;
pub use eventual::{Eventual, EventualResponse};
pub use fetch::{fetch, normalize_url, Fetcher, Request};
pub use governor::{govern, Deadline, TimeoutKind};
pub use headers::Headers;
pub use reactor::Reactor;
pub use response::Response;
