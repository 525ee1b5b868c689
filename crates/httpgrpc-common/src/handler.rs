//! The request/response handler interface both adapters speak.
//!
//! The server adapter wraps a [`Handler`]; the client adapter is one. Bodies
//! are fully materialized in both directions.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use http::{Request, Response};
use hyper::body::Bytes;
use tokio_util::sync::CancellationToken;

use crate::protocol::TenantId;

/// Error type handlers may fail with.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Per-call context passed explicitly to every handler.
///
/// `tenant` is what arrived in the tenant header (server side) or what the
/// caller wants propagated (client side). `deadline` and `cancel` bound how
/// long anyone should keep working on the call.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub tenant: Option<TenantId>,
    pub deadline: Option<Instant>,
    pub cancel: CancellationToken,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            tenant: None,
            deadline: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_tenant(mut self, tenant: TenantId) -> Self {
        self.tenant = Some(tenant);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sets the deadline `timeout` from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Time left before the deadline; `Some(ZERO)` once it has passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// An HTTP-style request handler.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(
        &self,
        ctx: RequestContext,
        request: Request<Bytes>,
    ) -> Result<Response<Bytes>, BoxError>;
}

#[async_trait]
impl<H: Handler + ?Sized> Handler for Arc<H> {
    async fn handle(
        &self,
        ctx: RequestContext,
        request: Request<Bytes>,
    ) -> Result<Response<Bytes>, BoxError> {
        (**self).handle(ctx, request).await
    }
}

/// Handler built from a closure, see [`handler_fn`].
#[derive(Clone)]
pub struct HandlerFn<F> {
    f: F,
}

/// Wraps an async closure as a [`Handler`].
///
/// # Example
///
/// ```
/// use httpgrpc_common::handler::{handler_fn, BoxError, RequestContext};
/// use http::{Request, Response};
/// use hyper::body::Bytes;
///
/// let hello = handler_fn(|_ctx: RequestContext, _req: Request<Bytes>| async {
///     Ok::<_, BoxError>(Response::new(Bytes::from_static(b"world")))
/// });
/// ```
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(RequestContext, Request<Bytes>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response<Bytes>, BoxError>> + Send + 'static,
{
    HandlerFn { f }
}

#[async_trait]
impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(RequestContext, Request<Bytes>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response<Bytes>, BoxError>> + Send + 'static,
{
    async fn handle(
        &self,
        ctx: RequestContext,
        request: Request<Bytes>,
    ) -> Result<Response<Bytes>, BoxError> {
        (self.f)(ctx, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_handler_fn_sees_context() {
        let handler = handler_fn(|ctx: RequestContext, req: Request<Bytes>| async move {
            let tenant = ctx.tenant.map(|t| t.to_string()).unwrap_or_default();
            let body = format!("{} {}", tenant, req.uri().path());
            Ok::<_, BoxError>(Response::new(Bytes::from(body)))
        });

        let ctx = RequestContext::new().with_tenant(TenantId::new("team-a").unwrap());
        let request = Request::new(Bytes::new());
        let response = handler.handle(ctx, request).await.unwrap();
        assert_eq!(response.body().as_ref(), b"team-a /");
    }

    #[tokio::test]
    async fn test_arc_handler() {
        let handler: Arc<dyn Handler> = Arc::new(handler_fn(|_, _| async {
            Err::<Response<Bytes>, BoxError>("boom".into())
        }));
        let err = handler
            .handle(RequestContext::default(), Request::new(Bytes::new()))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_remaining() {
        assert_eq!(RequestContext::new().remaining(), None);

        let ctx = RequestContext::new().with_timeout(Duration::from_secs(60));
        let remaining = ctx.remaining().unwrap();
        assert!(remaining > Duration::from_secs(59));

        let past = RequestContext::new().with_deadline(Instant::now() - Duration::from_millis(1));
        assert_eq!(past.remaining(), Some(Duration::ZERO));
    }

    #[test]
    fn test_cancel_is_shared_by_clones() {
        let ctx = RequestContext::new();
        let clone = ctx.clone();
        ctx.cancel.cancel();
        assert!(clone.is_cancelled());
    }
}
