//! Network engine seam and agent selection.
//!
//! # Design
//! An [`Agent`] takes a fully validated [`Prepared`] request and drives it to
//! a [`Response`]. The production agent is [`HttpAgent`], a `reqwest::Client`
//! configured for one [`Route`] and connect timeout, following redirects up
//! to [`MAX_REDIRECTS`].
//!
//! [`AgentSelector`] reads the proxy configuration on every fetch but keeps
//! one `HttpAgent` per `(route, connect_timeout)`, so fetches with the same
//! settings share a connection pool. At most [`MAX_CACHED_AGENTS`] agents are
//! kept; the least recently selected one is evicted first, and its pool
//! closes once the last fetch using it finishes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::redirect::Policy;
use reqwest::{Method, Proxy, Url};

use crate::body::BodyProducer;
use crate::config::{Environment, ProcessEnv, Route, MAX_REDIRECTS};
use crate::error::FetchError;
use crate::governor::Deadline;
use crate::headers::Headers;
use crate::response::Response;

/// A request in the engine's own types, ready to be sent.
#[derive(Debug)]
pub struct Prepared {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<BodyProducer>,
}

impl Prepared {
    /// Validate the caller's strings. Any rejection is a
    /// [`FetchError::RequestConstruction`].
    pub fn new(
        method: &str,
        url: &str,
        headers: &Headers,
        body: Option<BodyProducer>,
    ) -> Result<Self, FetchError> {
        let method = Method::from_bytes(method.as_bytes())
            .map_err(|e| invalid(format!("method {method:?}: {e}")))?;
        let url = Url::parse(url).map_err(|e| invalid(format!("URL {url:?}: {e}")))?;

        let mut map = HeaderMap::new();
        for (name, values) in headers.iter() {
            let header = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| invalid(format!("header name {name:?}: {e}")))?;
            for value in values {
                let value = HeaderValue::from_bytes(value.as_bytes())
                    .map_err(|e| invalid(format!("value of header {name:?}: {e}")))?;
                map.append(header.clone(), value);
            }
        }

        Ok(Self {
            method,
            url,
            headers: map,
            body,
        })
    }
}

fn invalid(message: String) -> FetchError {
    FetchError::RequestConstruction(message)
}

/// The network engine as seen by the fetch pipeline.
#[async_trait]
pub trait Agent: Send + Sync {
    async fn request(&self, request: Prepared) -> Result<Response, FetchError>;
}

/// Produces the agent for one fetch.
pub trait AgentFactory: Send + Sync {
    fn agent(&self, connect_timeout: Option<Duration>) -> Result<Arc<dyn Agent>, FetchError>;
}

/// A fixed agent serves every fetch; the connect timeout is its own business.
impl<A: Agent + 'static> AgentFactory for Arc<A> {
    fn agent(&self, _connect_timeout: Option<Duration>) -> Result<Arc<dyn Agent>, FetchError> {
        let agent: Arc<dyn Agent> = self.clone();
        Ok(agent)
    }
}

/// `reqwest`-backed agent for one route and connect timeout.
#[derive(Debug)]
pub struct HttpAgent {
    client: reqwest::Client,
    route: Route,
    connect_timeout: Option<Duration>,
}

impl HttpAgent {
    pub fn new(route: Route, connect_timeout: Option<Duration>) -> Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder().redirect(Policy::limited(MAX_REDIRECTS));
        builder = match route.proxy_url() {
            Some(url) => builder.proxy(
                Proxy::http(url.as_str())
                    .map_err(|e| FetchError::Configuration(format!("invalid proxy {url}: {e}")))?,
            ),
            None => builder.no_proxy(),
        };
        if let Some(timeout) = connect_timeout {
            builder = builder.connect_timeout(timeout);
        }

        let client = builder
            .build()
            .map_err(|e| FetchError::Configuration(format!("failed to build HTTP agent: {e}")))?;

        Ok(Self {
            client,
            route,
            connect_timeout,
        })
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout
    }

    fn classify(&self, err: reqwest::Error) -> FetchError {
        match self.connect_timeout {
            Some(timeout) if err.is_connect() && err.is_timeout() => Deadline::connect(timeout).expired(),
            _ => FetchError::network(err),
        }
    }
}

#[async_trait]
impl Agent for HttpAgent {
    async fn request(&self, request: Prepared) -> Result<Response, FetchError> {
        let Prepared {
            method,
            url,
            headers,
            body,
        } = request;

        let mut builder = self.client.request(method, url).headers(headers);
        if let Some(body) = body {
            builder = builder.body(body.into_body());
        }

        let response = builder.send().await.map_err(|e| self.classify(e))?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = response.bytes().await.map_err(|e| self.classify(e))?;

        Ok(Response::new(status, headers, body, url))
    }
}

/// Upper bound on the agents an [`AgentSelector`] keeps alive.
pub const MAX_CACHED_AGENTS: usize = 16;

type AgentKey = (Route, Option<Duration>);

/// Chooses between a direct and a proxying [`HttpAgent`] from the environment.
pub struct AgentSelector {
    env: Box<dyn Environment>,
    agents: Mutex<IndexMap<AgentKey, Arc<HttpAgent>>>,
}

impl AgentSelector {
    pub fn new(env: impl Environment + 'static) -> Self {
        Self {
            env: Box::new(env),
            agents: Mutex::new(IndexMap::new()),
        }
    }

    /// Selector over the real process environment.
    pub fn from_process_env() -> Self {
        Self::new(ProcessEnv)
    }

    /// Read the proxy configuration and return the matching agent.
    pub fn select(&self, connect_timeout: Option<Duration>) -> Result<Arc<HttpAgent>, FetchError> {
        let route = Route::from_env(self.env.as_ref())?;
        let key = (route, connect_timeout);

        let mut agents = self.agents.lock();
        if let Some(index) = agents.get_index_of(&key) {
            // most recently used lives at the back
            let last = agents.len() - 1;
            agents.move_index(index, last);
            return Ok(Arc::clone(&agents[last]));
        }

        let agent = Arc::new(HttpAgent::new(key.0.clone(), connect_timeout)?);
        tracing::debug!(route = ?key.0, ?connect_timeout, "built HTTP agent");
        while agents.len() >= MAX_CACHED_AGENTS {
            if let Some((evicted, _)) = agents.shift_remove_index(0) {
                tracing::debug!(route = ?evicted.0, connect_timeout = ?evicted.1, "evicted HTTP agent");
            }
        }
        agents.insert(key, Arc::clone(&agent));
        Ok(agent)
    }
}

impl AgentFactory for AgentSelector {
    fn agent(&self, connect_timeout: Option<Duration>) -> Result<Arc<dyn Agent>, FetchError> {
        let agent: Arc<dyn Agent> = self.select(connect_timeout)?;
        Ok(agent)
    }
}

impl std::fmt::Debug for AgentSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentSelector")
            .field("agents", &self.agents.lock().len())
            .finish()
    }
}
