//! Process configuration consumed by the fetch client.
//!
//! # Design
//! The only runtime configuration is the HTTP proxy, read from the
//! environment on every fetch through the [`Environment`] trait so tests can
//! substitute a plain map for the process environment.

use std::collections::HashMap;

use crate::error::FetchError;

/// User agent sent when the caller supplies none.
pub const DEFAULT_USER_AGENT: &str = concat!("fido/", env!("CARGO_PKG_VERSION"));

/// Redirect hops followed before the engine gives up.
pub const MAX_REDIRECTS: usize = 20;

/// Environment variables consulted for the proxy, in order.
pub const PROXY_VARS: [&str; 2] = ["http_proxy", "HTTP_PROXY"];

/// Flat string-keyed configuration source.
pub trait Environment: Send + Sync {
    fn var(&self, key: &str) -> Option<String>;
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl Environment for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl Environment for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Where connections go: straight to the origin, or through an HTTP proxy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Route {
    Direct,
    Proxy { host: String, port: u16 },
}

impl Route {
    /// Pick the route from the first non-empty proxy variable.
    pub fn from_env(env: &dyn Environment) -> Result<Self, FetchError> {
        let configured = PROXY_VARS
            .iter()
            .filter_map(|key| env.var(key))
            .map(|value| value.trim().to_string())
            .find(|value| !value.is_empty());

        match configured {
            Some(raw) => parse_proxy(&raw),
            None => Ok(Route::Direct),
        }
    }

    pub fn proxy_url(&self) -> Option<String> {
        match self {
            Route::Direct => None,
            Route::Proxy { host, port } => Some(format!("http://{host}:{port}")),
        }
    }
}

fn parse_proxy(raw: &str) -> Result<Route, FetchError> {
    let url = reqwest::Url::parse(raw)
        .map_err(|e| FetchError::Configuration(format!("invalid proxy URL {raw:?}: {e}")))?;
    let host = url
        .host_str()
        .ok_or_else(|| FetchError::Configuration(format!("proxy URL {raw:?} has no host")))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| FetchError::Configuration(format!("proxy URL {raw:?} has no port")))?;

    Ok(Route::Proxy {
        host: host.to_string(),
        port,
    })
}
