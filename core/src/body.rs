//! Request body producer and `Content-Length` reconciliation.
//!
//! # Design
//! A request with a body hands the engine a [`BodyProducer`], and the engine
//! writes `Content-Length` from the body's actual size. Any caller-supplied
//! `Content-Length` is therefore stripped, in every casing, from a copy of the
//! headers; the caller's own [`Headers`] are never modified. An empty body
//! needs no producer and leaves the headers as they were.

use bytes::Bytes;

use crate::headers::Headers;

const CONTENT_LENGTH: &str = "Content-Length";

/// A fixed request body handed to the network engine, which computes its
/// length and writes the `Content-Length` header itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyProducer {
    bytes: Bytes,
}

impl BodyProducer {
    pub fn new(bytes: Bytes) -> Self {
        Self { bytes }
    }

    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub(crate) fn into_body(self) -> reqwest::Body {
        reqwest::Body::from(self.bytes)
    }
}

/// Decide whether the request needs a body producer and return the headers
/// to send alongside it.
///
/// With a non-empty body, any `Content-Length` (any casing) is dropped from
/// the returned copy because the engine recomputes it. Without a body the
/// headers come back unchanged, caller-set `Content-Length` included. The
/// caller's `headers` are never modified.
pub fn build_body_producer(body: Option<&Bytes>, headers: &Headers) -> (Option<BodyProducer>, Headers) {
    match body {
        Some(bytes) if !bytes.is_empty() => {
            let mut headers = headers.clone();
            headers.remove(CONTENT_LENGTH);
            (Some(BodyProducer::new(bytes.clone())), headers)
        }
        _ => (None, headers.clone()),
    }
}
