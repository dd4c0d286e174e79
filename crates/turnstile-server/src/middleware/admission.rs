//! Middleware que aplica el admission controller antes de cualquier handler.

use axum::{
    body::Body,
    http::{Request, Response},
    response::IntoResponse,
};
use std::{
    sync::Arc,
    task::{Context, Poll},
};
use tower::{Layer, Service};

use crate::admission::AdmissionController;
use crate::error::AppError;

/// Layer that rejects requests once the token bucket is empty.
#[derive(Clone)]
pub struct AdmissionLayer {
    controller: Arc<AdmissionController>,
}

impl AdmissionLayer {
    pub fn new(controller: Arc<AdmissionController>) -> Self {
        Self { controller }
    }
}

impl<S> Layer<S> for AdmissionLayer {
    type Service = AdmissionMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AdmissionMiddleware {
            inner,
            controller: Arc::clone(&self.controller),
        }
    }
}

/// Rejected requests are answered here and never reach `inner`.
#[derive(Clone)]
pub struct AdmissionMiddleware<S> {
    inner: S,
    controller: Arc<AdmissionController>,
}

impl<S> Service<Request<Body>> for AdmissionMiddleware<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        if !self.controller.allow() {
            return Box::pin(async { Ok(AppError::RateLimited.into_response()) });
        }

        // El clon listo para usar es el que llamamos; el nuevo queda en self.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move { inner.call(request).await })
    }
}
