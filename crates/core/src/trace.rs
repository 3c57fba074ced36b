//! Span tracing — the seam for span-style observability vendors.
//!
//! A [`Tracer`] opens spans; each span is closed exactly once with a
//! [`SpanStatus`]. [`SpanGuard`] enforces the "exactly once" part: closing it
//! consumes the guard, and a guard dropped on an early-return path closes its
//! span with [`SpanStatus::Unset`].

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ObservabilityError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpanStatus {
    Unset,
    Ok,
    Error(String),
}

/// Identifies a span so children can point at it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanContext {
    pub trace_id: String,
    pub span_id: String,
}

/// An open span.
pub trait Span: Send + Sync {
    fn context(&self) -> SpanContext;

    fn set_attribute(&mut self, key: &str, value: Value);

    fn end(self: Box<Self>, status: SpanStatus);
}

#[async_trait]
pub trait Tracer: Send + Sync {
    /// Open a span; `parent` of `None` starts a new trace.
    fn start_span(&self, name: &str, parent: Option<&SpanContext>) -> Box<dyn Span>;

    /// Export every finished span.
    async fn flush(&self) -> std::result::Result<(), ObservabilityError>;
}

/// Owns an open span and closes it exactly once.
pub struct SpanGuard {
    span: Option<Box<dyn Span>>,
    context: SpanContext,
}

impl SpanGuard {
    pub fn start(tracer: &dyn Tracer, name: &str, parent: Option<&SpanContext>) -> Self {
        let span = tracer.start_span(name, parent);
        let context = span.context();
        Self {
            span: Some(span),
            context,
        }
    }

    pub fn context(&self) -> &SpanContext {
        &self.context
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        if let Some(span) = self.span.as_mut() {
            span.set_attribute(key, value.into());
        }
    }

    pub fn end(mut self, status: SpanStatus) {
        if let Some(span) = self.span.take() {
            span.end(status);
        }
    }
}

impl Drop for SpanGuard {
    fn drop(&mut self) {
        if let Some(span) = self.span.take() {
            span.end(SpanStatus::Unset);
        }
    }
}
