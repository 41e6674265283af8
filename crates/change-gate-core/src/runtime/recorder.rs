// change-gate-core/src/runtime/recorder.rs
// ============================================================================
// Module: Change Gate Audit Recorder
// Description: Best-effort audit emission with counted, never-silent failures.
// Purpose: Give every service one seam for recording decisions.
// Dependencies: crate::core, crate::interfaces, crate::runtime::mint, serde_json
// ============================================================================

//! ## Overview
//! The recorder appends audit events to the injected [`AuditStore`]. Audit is
//! best-effort: a failed append never aborts the decision that produced it,
//! but the failure is counted, surfaced in apply result summaries, and the
//! event is routed to a fallback sink so it is never silently dropped.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write as _;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use crate::core::AuditEvent;
use crate::core::AuditEventId;
use crate::core::AuditEventParams;
use crate::interfaces::AuditStore;
use crate::interfaces::Clock;
use crate::runtime::mint::random_id;

// ============================================================================
// SECTION: Fallback Sinks
// ============================================================================

/// Sink receiving audit events whose store append failed.
pub trait AuditFallbackSink: Send + Sync {
    /// Records a fallback audit event.
    fn record(&self, event: &AuditEvent);
}

/// Fallback sink that logs JSON lines to stderr.
pub struct StderrFallbackSink;

impl AuditFallbackSink for StderrFallbackSink {
    fn record(&self, event: &AuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// No-op fallback sink for tests.
pub struct NoopFallbackSink;

impl AuditFallbackSink for NoopFallbackSink {
    fn record(&self, _event: &AuditEvent) {}
}

// ============================================================================
// SECTION: Recorder
// ============================================================================

/// Best-effort audit recorder shared by every service.
pub struct AuditRecorder {
    /// Audit persistence.
    store: Arc<dyn AuditStore + Send + Sync>,
    /// Time source for event timestamps.
    clock: Arc<dyn Clock + Send + Sync>,
    /// Destination for events whose append failed.
    fallback: Arc<dyn AuditFallbackSink>,
    /// Count of failed appends since construction.
    failures: AtomicU64,
}

impl AuditRecorder {
    /// Creates a recorder over the given store, clock, and fallback sink.
    #[must_use]
    pub fn new(
        store: Arc<dyn AuditStore + Send + Sync>,
        clock: Arc<dyn Clock + Send + Sync>,
        fallback: Arc<dyn AuditFallbackSink>,
    ) -> Self {
        Self {
            store,
            clock,
            fallback,
            failures: AtomicU64::new(0),
        }
    }

    /// Records a decision, returning the minted event.
    ///
    /// A failed append increments the failure counter and routes the event to
    /// the fallback sink; the caller's decision is never aborted.
    pub fn record(&self, params: AuditEventParams) -> AuditEvent {
        let event =
            AuditEvent::new(AuditEventId::new(random_id("audit")), self.clock.now(), params);
        if self.store.append(&event).is_err() {
            self.failures.fetch_add(1, Ordering::Relaxed);
            self.fallback.record(&event);
        }
        event
    }

    /// Returns the number of failed appends observed so far.
    #[must_use]
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}
