//! Completed HTTP response.
//!
//! # Design
//! A [`Response`] is built only after the whole body has arrived, so every
//! accessor is a plain read. Decoding is deferred until a caller asks for it.

use std::sync::OnceLock;

use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::Url;
use serde::de::DeserializeOwned;

use crate::error::FetchError;

/// Read-only view over a fully received response.
///
/// The JSON view returned by [`Response::parsed`] is decoded on first use and
/// kept for the life of the value. A body that fails to decode is not
/// cached, so every call reports the same error.
#[derive(Debug, Clone)]
pub struct Response {
    status: u16,
    headers: HeaderMap,
    body: Bytes,
    url: Url,
    parsed: OnceLock<serde_json::Value>,
}

impl Response {
    pub fn new(status: u16, headers: HeaderMap, body: Bytes, url: Url) -> Self {
        Self {
            status,
            headers,
            body,
            url,
            parsed: OnceLock::new(),
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Final URL, after any redirects were followed.
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn parsed(&self) -> Result<&serde_json::Value, FetchError> {
        if let Some(value) = self.parsed.get() {
            return Ok(value);
        }
        let value: serde_json::Value = serde_json::from_slice(&self.body)?;
        Ok(self.parsed.get_or_init(|| value))
    }

    /// Decode the body into `T`. Not cached.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, FetchError> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}
