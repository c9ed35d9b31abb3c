//! Request identifier assignment.
//!
//! Every request leaves this stage with an `X-Request-Id` header: the
//! caller's own value when it is usable, otherwise a fresh UUIDv4. The same
//! value is echoed on the response so clients can correlate log lines.

use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::header::HeaderValue;
use axum::http::{Request, Response};
use tower::{Layer, Service};
use uuid::Uuid;

/// Header name for request ID.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Longest caller-supplied identifier that is kept as-is.
pub const MAX_REQUEST_ID_LENGTH: usize = 128;

/// Request ID layer for Tower middleware stack.
#[derive(Clone, Default)]
pub struct RequestIdLayer;

impl RequestIdLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for RequestIdLayer {
    type Service = RequestIdService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestIdService { inner }
    }
}

/// Request ID service wrapper.
#[derive(Clone)]
pub struct RequestIdService<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for RequestIdService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let request_id = assign_request_id(&req);
        req.headers_mut()
            .insert(REQUEST_ID_HEADER, request_id.clone());

        let mut inner = self.inner.clone();

        Box::pin(async move {
            let mut response = inner.call(req).await?;
            response.headers_mut().insert(REQUEST_ID_HEADER, request_id);
            Ok(response)
        })
    }
}

/// Keep a usable caller-supplied identifier or mint a new one.
///
/// Caller values must be non-empty visible ASCII up to
/// [`MAX_REQUEST_ID_LENGTH`] bytes; anything else is replaced so log lines
/// cannot be forged or bloated through this header.
fn assign_request_id<B>(req: &Request<B>) -> HeaderValue {
    if let Some(value) = req.headers().get(REQUEST_ID_HEADER)
        && is_usable_request_id(value.as_bytes())
    {
        return value.clone();
    }

    // A hyphenated UUID is always a valid header value
    HeaderValue::from_str(&Uuid::new_v4().to_string())
        .unwrap_or_else(|_| HeaderValue::from_static("unknown"))
}

fn is_usable_request_id(bytes: &[u8]) -> bool {
    !bytes.is_empty()
        && bytes.len() <= MAX_REQUEST_ID_LENGTH
        && bytes.iter().all(|b| b.is_ascii_graphic())
}

/// Extension trait to read the request ID assigned by [`RequestIdLayer`].
pub trait RequestIdExt {
    fn request_id(&self) -> Option<&str>;
}

impl<B> RequestIdExt for Request<B> {
    fn request_id(&self) -> Option<&str> {
        self.headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::convert::Infallible;

    use tower::ServiceExt;

    use super::*;

    #[test]
    fn test_caller_request_id_kept() {
        let req = Request::builder()
            .header(REQUEST_ID_HEADER, "existing-id-123")
            .body(Body::empty())
            .unwrap();

        assert_eq!(assign_request_id(&req), "existing-id-123");
    }

    #[test]
    fn test_missing_request_id_generated() {
        let req = Request::builder().body(Body::empty()).unwrap();
        let id = assign_request_id(&req);
        assert!(Uuid::parse_str(id.to_str().unwrap()).is_ok());
    }

    #[test]
    fn test_unusable_request_id_replaced() {
        for bad in ["", "has space", &"x".repeat(MAX_REQUEST_ID_LENGTH + 1)] {
            let req = Request::builder()
                .header(REQUEST_ID_HEADER, bad)
                .body(Body::empty())
                .unwrap();
            let id = assign_request_id(&req);
            assert!(Uuid::parse_str(id.to_str().unwrap()).is_ok(), "{bad:?}");
        }
    }

    #[tokio::test]
    async fn test_handler_and_response_see_same_id() {
        let svc = RequestIdLayer::new().layer(tower::service_fn(|req: Request<Body>| async move {
            let seen = req.request_id().unwrap_or_default().to_string();
            Ok::<_, Infallible>(Response::new(Body::from(seen)))
        }));

        let response = svc
            .oneshot(Request::builder().body(Body::empty()).unwrap())
            .await
            .unwrap();

        let header = response
            .headers()
            .get(REQUEST_ID_HEADER)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(body, header.as_bytes());
    }
}
