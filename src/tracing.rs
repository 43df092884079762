//! Request-scoped identifiers threaded through responses and error bodies.
//!
//! A `RequestId` is taken from the `x-request-id` header (populated by the
//! tower-http request-id layer) or generated, then held in a task-local so
//! that error responses and `ResponseMeta` can report it without threading a
//! parameter through every call.

use std::cell::RefCell;
use std::fmt;

use axum::{extract::Request, middleware::Next, response::Response};
use futures::Future;
use tracing::{info_span, Instrument};
use uuid::Uuid;

pub use tracing::{debug, error, info, trace, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

impl Default for RequestId {
    fn default() -> Self {
        RequestId(Uuid::new_v4().to_string())
    }
}

impl RequestId {
    pub fn new(value: impl Into<String>) -> Self {
        RequestId(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

tokio::task_local! {
    static CURRENT_REQUEST_ID: RefCell<Option<RequestId>>;
}

pub async fn scope_request_id<Fut, R>(request_id: RequestId, future: Fut) -> R
where
    Fut: Future<Output = R>,
{
    CURRENT_REQUEST_ID
        .scope(RefCell::new(Some(request_id)), future)
        .await
}

pub fn current_request_id() -> Option<RequestId> {
    CURRENT_REQUEST_ID
        .try_with(|cell| cell.borrow().clone())
        .ok()
        .flatten()
}

fn request_id_from_headers(request: &Request) -> RequestId {
    request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(RequestId::new)
        .unwrap_or_default()
}

/// Axum middleware scoping the task-local request id around handler execution.
pub async fn request_id_middleware(request: Request, next: Next) -> Response {
    let request_id = request_id_from_headers(&request);
    let span = info_span!(
        "http.request",
        request_id = %request_id,
        method = %request.method(),
        uri = %request.uri(),
    );
    scope_request_id(request_id, next.run(request).instrument(span)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn request_id_visible_inside_scope() {
        let seen = scope_request_id(RequestId::new("req-7"), async {
            current_request_id().map(|rid| rid.as_str().to_string())
        })
        .await;
        assert_eq!(seen.as_deref(), Some("req-7"));
    }

    #[tokio::test]
    async fn request_id_absent_outside_scope() {
        assert!(current_request_id().is_none());
    }
}
