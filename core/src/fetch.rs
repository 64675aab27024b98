//! Public fetch API.
//!
//! # Overview
//! [`Request`] describes one fetch. [`Fetcher::send`] normalizes it on the
//! caller's thread, schedules the rest onto the reactor and returns an
//! [`EventualResponse`] without blocking.
//!
//! # Design
//! On the reactor the fetch runs in this order: the body producer is built,
//! the agent is selected, the request is validated into the engine's types
//! and issued under the response-timeout governor. Failures in any of these
//! steps land in the `EventualResponse`. Only a reactor that cannot start is
//! reported synchronously from `send`.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use once_cell::sync::Lazy;
use tracing::Instrument;
use uuid::Uuid;

use crate::agent::{AgentFactory, AgentSelector, Prepared};
use crate::body::build_body_producer;
use crate::config::DEFAULT_USER_AGENT;
use crate::error::FetchError;
use crate::eventual::EventualResponse;
use crate::governor::{govern, Deadline};
use crate::headers::Headers;
use crate::reactor::Reactor;
use crate::response::Response;

const USER_AGENT: &str = "User-Agent";

static DEFAULT_FETCHER: Lazy<Fetcher> = Lazy::new(Fetcher::default);

/// Fetch `url` with `GET` and default settings.
pub fn fetch(url: &str) -> Result<EventualResponse, FetchError> {
    Request::new(url).send()
}

/// One HTTP request. Defaults to `GET` with no body and no timeouts.
#[derive(Debug, Clone)]
pub struct Request {
    method: String,
    url: String,
    headers: Headers,
    body: Option<Bytes>,
    user_agent: Option<String>,
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
}

impl Request {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
            headers: Headers::new(),
            body: None,
            user_agent: None,
            timeout: None,
            connect_timeout: None,
        }
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    /// Replace all headers.
    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Sent as `User-Agent`, replacing any such header set by the caller.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Abort the request unless the full response arrives within `timeout`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Abort the request unless the connection is established within `timeout`.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Send through the process-wide default [`Fetcher`].
    pub fn send(self) -> Result<EventualResponse, FetchError> {
        DEFAULT_FETCHER.send(self)
    }

    fn outgoing_headers(&self) -> Headers {
        let mut headers = self.headers.clone();
        match &self.user_agent {
            Some(user_agent) => headers.set(USER_AGENT, vec![user_agent.clone()]),
            None if !headers.contains(USER_AGENT) => {
                headers.set(USER_AGENT, vec![DEFAULT_USER_AGENT.to_string()])
            }
            None => {}
        }
        headers
    }
}

/// Percent-encode the UTF-8 bytes of every non-ASCII character in `url`.
/// ASCII, existing `%XX` escapes included, passes through unchanged.
pub fn normalize_url(url: &str) -> String {
    let mut normalized = String::with_capacity(url.len());
    for ch in url.chars() {
        if ch.is_ascii() {
            normalized.push(ch);
            continue;
        }
        let mut buf = [0u8; 4];
        for byte in ch.encode_utf8(&mut buf).bytes() {
            normalized.push_str(&format!("%{byte:02X}"));
        }
    }
    normalized
}

type ReactorSource = fn() -> Result<&'static Reactor, FetchError>;

/// Sends [`Request`]s through an [`AgentFactory`] on the shared reactor.
pub struct Fetcher {
    agents: Arc<dyn AgentFactory>,
    reactor: ReactorSource,
}

impl Default for Fetcher {
    fn default() -> Self {
        Self::new(AgentSelector::from_process_env())
    }
}

impl Fetcher {
    pub fn new(agents: impl AgentFactory + 'static) -> Self {
        Self {
            agents: Arc::new(agents),
            reactor: Reactor::global,
        }
    }

    #[cfg(test)]
    fn with_reactor(mut self, reactor: ReactorSource) -> Self {
        self.reactor = reactor;
        self
    }

    /// Schedule `request` and return at once.
    pub fn send(&self, request: Request) -> Result<EventualResponse, FetchError> {
        let reactor = (self.reactor)()?;

        let url = normalize_url(&request.url);
        let headers = request.outgoing_headers();
        let span = tracing::debug_span!(
            "fetch",
            fetch_id = %Uuid::new_v4(),
            method = %request.method,
            url = %url,
        );
        span.in_scope(|| tracing::debug!("scheduling fetch"));

        let agents = Arc::clone(&self.agents);
        let unit = async move { execute(agents.as_ref(), request, url, headers).await };
        Ok(reactor.schedule(unit.instrument(span)))
    }
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher").finish_non_exhaustive()
    }
}

async fn execute(
    agents: &dyn AgentFactory,
    request: Request,
    url: String,
    headers: Headers,
) -> Result<Response, FetchError> {
    let (producer, headers) = build_body_producer(request.body.as_ref(), &headers);
    let agent = agents.agent(request.connect_timeout)?;
    let prepared = Prepared::new(&request.method, &url, &headers, producer)?;

    let response = govern(agent.request(prepared), request.timeout.map(Deadline::response)).await?;
    tracing::debug!(status = response.status(), "fetch completed");
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Agent;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use reqwest::header::HeaderMap;
    use reqwest::Url;
    use std::io;
    use tokio::sync::oneshot;

    const ERROR_MESSAGE: &str = "I failed :(";
    const WAIT: Option<Duration> = Some(Duration::from_secs(5));

    fn ok_response(url: Url) -> Response {
        Response::new(200, HeaderMap::new(), Bytes::from_static(b"{}"), url)
    }

    /// Answers immediately and keeps every request it saw.
    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<Prepared>>,
    }

    #[async_trait]
    impl Agent for Recording {
        async fn request(&self, request: Prepared) -> Result<Response, FetchError> {
            let url = request.url.clone();
            self.seen.lock().push(request);
            Ok(ok_response(url))
        }
    }

    /// Completes with whatever the test sends down the channel.
    struct Remote {
        outcome: Mutex<Option<oneshot::Receiver<Result<Response, FetchError>>>>,
    }

    #[async_trait]
    impl Agent for Remote {
        async fn request(&self, _request: Prepared) -> Result<Response, FetchError> {
            let receiver = self.outcome.lock().take();
            match receiver {
                Some(receiver) => receiver
                    .await
                    .unwrap_or_else(|_| Err(FetchError::TaskFailed("sender dropped".into()))),
                None => Err(FetchError::TaskFailed("agent reused".into())),
            }
        }
    }

    /// Never answers.
    struct Silent;

    #[async_trait]
    impl Agent for Silent {
        async fn request(&self, _request: Prepared) -> Result<Response, FetchError> {
            std::future::pending().await
        }
    }

    struct Panicking;

    #[async_trait]
    impl Agent for Panicking {
        async fn request(&self, _request: Prepared) -> Result<Response, FetchError> {
            panic!("{ERROR_MESSAGE}")
        }
    }

    struct Misconfigured;

    impl AgentFactory for Misconfigured {
        fn agent(
            &self,
            _connect_timeout: Option<Duration>,
        ) -> Result<Arc<dyn Agent>, FetchError> {
            Err(FetchError::Configuration(ERROR_MESSAGE.to_string()))
        }
    }

    fn sent_through(request: Request) -> Prepared {
        let agent = Arc::new(Recording::default());
        Fetcher::new(Arc::clone(&agent))
            .send(request)
            .unwrap()
            .wait(WAIT)
            .unwrap();
        let mut seen = agent.seen.lock();
        assert_eq!(seen.len(), 1);
        seen.remove(0)
    }

    #[test]
    fn unicode_url_is_utf8_percent_encoded() {
        assert_eq!(normalize_url("繁"), "%E7%B9%81");
        assert_eq!("繁".as_bytes(), &[0xe7, 0xb9, 0x81]);
    }

    #[test]
    fn ascii_and_existing_escapes_are_untouched() {
        let url = "http://localhost:8080/a%20b?q=%E7%B9%81&x=y#frag";
        assert_eq!(normalize_url(url), url);
    }

    #[test]
    fn default_user_agent_is_added() {
        let headers = Request::new("http://localhost/").outgoing_headers();
        assert_eq!(headers.get_all("user-agent"), vec![DEFAULT_USER_AGENT]);
    }

    #[test]
    fn caller_user_agent_header_is_kept() {
        let headers = Request::new("http://localhost/")
            .header("user-agent", "custom")
            .outgoing_headers();
        assert_eq!(headers.get_all("User-Agent"), vec!["custom"]);
    }

    #[test]
    fn user_agent_override_wins_over_header() {
        let headers = Request::new("http://localhost/")
            .header("user-agent", "custom")
            .user_agent("skynet")
            .outgoing_headers();
        assert_eq!(headers.get_all("User-Agent"), vec!["skynet"]);
    }

    #[test]
    fn request_reaches_the_agent_normalized() {
        let prepared = sent_through(
            Request::new("http://localhost/繁")
                .method("POST")
                .header("Content-Length", "22")
                .header("foo", "bar")
                .user_agent("skynet")
                .body(r#"{"some_json_data": 30}"#),
        );

        assert_eq!(prepared.method, reqwest::Method::POST);
        assert_eq!(prepared.url.path(), "/%E7%B9%81");
        assert!(prepared.headers.get("content-length").is_none());
        assert_eq!(prepared.headers["foo"], "bar");
        assert_eq!(prepared.headers["user-agent"], "skynet");
        assert_eq!(prepared.body.map(|b| b.len()), Some(22));
    }

    #[test]
    fn content_length_is_kept_without_body() {
        let prepared = sent_through(Request::new("http://localhost/").header("Content-Length", "0"));

        assert_eq!(prepared.headers["content-length"], "0");
        assert!(prepared.body.is_none());
    }

    #[test]
    fn engine_failure_reaches_the_caller_verbatim() {
        let (sender, receiver) = oneshot::channel();
        let agent = Arc::new(Remote {
            outcome: Mutex::new(Some(receiver)),
        });

        let eventual = Fetcher::new(agent)
            .send(Request::new("http://some_url/"))
            .unwrap();
        assert!(eventual.peek_error().is_none());

        sender
            .send(Err(FetchError::network(io::Error::new(
                io::ErrorKind::ConnectionReset,
                ERROR_MESSAGE,
            ))))
            .unwrap();

        let err = eventual.wait(WAIT).unwrap_err();
        let FetchError::Network(cause) = err else {
            panic!("expected a network error, got {err:?}");
        };
        assert_eq!(cause.to_string(), ERROR_MESSAGE);
        assert_eq!(
            cause.downcast_ref::<io::Error>().map(io::Error::kind),
            Some(io::ErrorKind::ConnectionReset)
        );
    }

    #[test]
    fn construction_failure_is_recorded_not_raised() {
        let eventual = Fetcher::new(Arc::new(Recording::default()))
            .send(Request::new("http://some_url/").header("bad header", "x"))
            .unwrap();

        assert!(matches!(
            eventual.wait(WAIT),
            Err(FetchError::RequestConstruction(_))
        ));
    }

    #[test]
    fn agent_selection_failure_is_recorded_not_raised() {
        let eventual = Fetcher::new(Misconfigured)
            .send(Request::new("http://some_url/"))
            .unwrap();

        let err = eventual.wait(WAIT).unwrap_err();
        assert_eq!(err.to_string(), format!("configuration error: {ERROR_MESSAGE}"));
    }

    #[test]
    fn panicking_agent_fails_only_its_fetch() {
        let broken = Fetcher::new(Arc::new(Panicking))
            .send(Request::new("http://some_url/"))
            .unwrap();
        assert!(matches!(
            broken.wait(WAIT),
            Err(FetchError::TaskFailed(message)) if message == ERROR_MESSAGE
        ));

        let healthy = Fetcher::new(Arc::new(Recording::default()))
            .send(Request::new("http://some_url/"))
            .unwrap();
        assert_eq!(healthy.wait(WAIT).unwrap().status(), 200);
    }

    #[test]
    fn reactor_start_failure_is_raised_synchronously() {
        fn broken() -> Result<&'static Reactor, FetchError> {
            Err(FetchError::ReactorStart(Arc::new(io::Error::other(ERROR_MESSAGE))))
        }

        let err = Fetcher::new(Arc::new(Recording::default()))
            .with_reactor(broken)
            .send(Request::new("http://some_url/"))
            .unwrap_err();
        assert!(matches!(err, FetchError::ReactorStart(_)));
        assert!(err.to_string().contains(ERROR_MESSAGE));
    }

    #[test]
    fn response_timeout_aborts_a_silent_agent() {
        let eventual = Fetcher::new(Arc::new(Silent))
            .send(Request::new("http://some_url/").timeout(Duration::from_millis(100)))
            .unwrap();
        assert!(eventual.peek_error().is_none());

        std::thread::sleep(Duration::from_millis(500));
        assert!(matches!(
            eventual.peek_error(),
            Some(FetchError::ResponseTimeout { .. })
        ));

        let err = eventual.wait(None).unwrap_err();
        assert!(err.to_string().contains("timeout=0.1 seconds"), "{err}");
    }

    #[test]
    fn wait_timeout_leaves_the_fetch_running() {
        let (sender, receiver) = oneshot::channel();
        let agent = Arc::new(Remote {
            outcome: Mutex::new(Some(receiver)),
        });
        let eventual = Fetcher::new(agent)
            .send(Request::new("http://some_url/"))
            .unwrap();

        let err = eventual.wait(Some(Duration::from_millis(50))).unwrap_err();
        assert!(matches!(err, FetchError::WaitTimeout { .. }));
        assert!(eventual.peek_error().is_none());

        sender
            .send(Ok(ok_response(Url::parse("http://some_url/").unwrap())))
            .unwrap();
        assert_eq!(eventual.wait(None).unwrap().status(), 200);
    }

    #[test]
    fn free_function_records_invalid_urls() {
        let eventual = fetch("not a url").unwrap();
        assert!(matches!(
            eventual.wait(WAIT),
            Err(FetchError::RequestConstruction(_) | FetchError::Configuration(_))
        ));
    }
}
