//! Correlation and span identifiers for one flow run
//!
//! A flow run owns one [`CorrelationId`]; it doubles as the trace id. Every
//! signing attempt opens a child span under the flow's root so a re-sign
//! after expiry shows up as a sibling of the attempt it replaced.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Identifies every log line and artifact of one flow run
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct SpanId(u64);

impl SpanId {
    fn random() -> Self {
        Self(rand::random())
    }
}

impl std::fmt::Display for SpanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Position of one operation inside a flow's trace
#[derive(Debug, Clone, Serialize)]
pub struct TraceContext {
    correlation_id: CorrelationId,
    span_id: SpanId,
    parent_span_id: Option<SpanId>,
    operation: &'static str,
    depth: u32,
    started_at: DateTime<Utc>,
}

impl TraceContext {
    pub fn root(operation: &'static str, correlation_id: CorrelationId) -> Self {
        Self {
            correlation_id,
            span_id: SpanId::random(),
            parent_span_id: None,
            operation,
            depth: 0,
            started_at: Utc::now(),
        }
    }

    pub fn child_span(&self, operation: &'static str) -> Self {
        Self {
            correlation_id: self.correlation_id,
            span_id: SpanId::random(),
            parent_span_id: Some(self.span_id),
            operation,
            depth: self.depth + 1,
            started_at: Utc::now(),
        }
    }

    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    pub fn span_id(&self) -> SpanId {
        self.span_id
    }

    pub fn parent_span_id(&self) -> Option<SpanId> {
        self.parent_span_id
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

/// `<correlation>/<span>`, the form written into log fields
impl std::fmt::Display for TraceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.correlation_id, self.span_id)
    }
}
