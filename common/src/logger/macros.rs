use tracing::{Level, Span};

use super::trace_id::TraceId;

/// Create a root span for one public scheduling operation.
pub fn root_span(name: &'static str, trace_id: &TraceId) -> Span {
    tracing::span!(Level::INFO, "op", op = name, trace_id = %trace_id)
}

/// Create a child span (inherits trace_id from the enclosing root span).
pub fn child_span(name: &'static str) -> Span {
    tracing::span!(Level::INFO, "step", step = name)
}
