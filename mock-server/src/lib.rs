//! Echo server used as the remote end in fetch tests.
//!
//! # Design
//! Every request, whatever its method or path, is answered with an [`Echo`]
//! describing what the server observed on the wire. Two path conventions
//! change the behavior:
//! - a path containing `/slow` is answered after [`SLOW_DELAY`];
//! - a path starting with `/redirect` is answered with `302 Found` pointing
//!   at `/`.

use std::{collections::BTreeMap, time::Duration};

use axum::{
    body::Bytes,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

/// How long `/slow` requests are held before the response is written.
pub const SLOW_DELAY: Duration = Duration::from_secs(2);

/// What the server saw of a single request.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Echo {
    pub method: String,
    /// Raw path and query, exactly as received (percent-encoding intact).
    pub path: String,
    /// Lower-cased header names; repeated headers are joined with `", "`.
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

pub fn app() -> Router {
    Router::new().fallback(echo)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Response {
    if uri.path().starts_with("/redirect") {
        return (StatusCode::FOUND, [(header::LOCATION, "/")]).into_response();
    }
    if uri.path().contains("/slow") {
        tokio::time::sleep(SLOW_DELAY).await;
    }

    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());

    Json(Echo {
        method: method.to_string(),
        path,
        headers: flatten_headers(&headers),
        body: String::from_utf8_lossy(&body).into_owned(),
    })
    .into_response()
}

fn flatten_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut flat: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes());
        flat.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }
    flat
}
