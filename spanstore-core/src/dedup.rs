//! Dependency write suppression
//!
//! Nearly every ingested span carries a (service, operation) pair that was
//! already persisted moments ago. [`DependencyDedupCache`] keeps a window of
//! recently written facts and edges (retention = ttl / 10) and only forwards
//! writes outside that window to the [`DependencyWriter`].
//!
//! A window slot is claimed before the write is issued, so concurrent
//! callers for the same key see the claim and skip. The claim is released
//! if the write fails, leaving the next call free to retry. No lock is held
//! across the store call.
//!
//! A separate identity cache maps (trace id, span id) to the recorded
//! (service, operation) for 24 hours, so that a child span arriving later can
//! resolve its parent's service and materialize a caller/callee edge.

use crate::cache::{Eviction, FactCache, TimedCache};
use crate::clock::Clock;
use crate::error::Result;
use crate::writer::{DependencyEdge, DependencyFact, DependencyWriter};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

/// Default retention of the call-identity cache
pub const DEFAULT_IDENTITY_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Default interval of the identity cache's eviction sweep
pub const DEFAULT_IDENTITY_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Identifies one span within one trace
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CallIdentity {
    pub trace_id: String,
    pub span_id: String,
}

impl CallIdentity {
    pub fn new(trace_id: impl Into<String>, span_id: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            span_id: span_id.into(),
        }
    }
}

/// The fields of an ingested span the dependency path needs
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpanCall {
    pub service: String,
    pub operation: String,
    pub identity: CallIdentity,
}

impl SpanCall {
    pub fn new(
        service: impl Into<String>,
        operation: impl Into<String>,
        trace_id: impl Into<String>,
        span_id: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            operation: operation.into(),
            identity: CallIdentity::new(trace_id, span_id),
        }
    }
}

/// Sizing of the caches behind a [`DependencyDedupCache`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DedupSettings {
    pub identity_retention: Duration,
    pub identity_sweep_interval: Duration,
}

impl Default for DedupSettings {
    fn default() -> Self {
        Self {
            identity_retention: DEFAULT_IDENTITY_RETENTION,
            identity_sweep_interval: DEFAULT_IDENTITY_SWEEP_INTERVAL,
        }
    }
}

/// Suppresses repeated dependency writes from the span ingestion path
#[derive(Debug)]
pub struct DependencyDedupCache {
    writer: DependencyWriter,
    facts: Box<dyn FactCache<DependencyFact, ()>>,
    edges: Box<dyn FactCache<DependencyEdge, ()>>,
    identities: Box<dyn FactCache<CallIdentity, DependencyFact>>,
}

impl DependencyDedupCache {
    /// The dedup windows last a tenth of the writer's ttl. Call
    /// [`start`](Self::start) before use and [`stop`](Self::stop) at shutdown.
    pub fn new(writer: DependencyWriter, settings: DedupSettings, clock: Arc<dyn Clock>) -> Self {
        let window = writer.ttl() / 10;
        Self {
            facts: Box::new(TimedCache::new(
                "dependency-facts",
                window,
                Eviction::OnAccess,
                Arc::clone(&clock),
            )),
            edges: Box::new(TimedCache::new(
                "dependency-edges",
                window,
                Eviction::OnAccess,
                Arc::clone(&clock),
            )),
            identities: Box::new(TimedCache::new(
                "call-identities",
                settings.identity_retention,
                Eviction::Sweep {
                    interval: settings.identity_sweep_interval,
                },
                clock,
            )),
            writer,
        }
    }

    /// Start background eviction. Must run inside a tokio runtime.
    pub fn start(&self) {
        self.facts.start();
        self.edges.start();
        self.identities.start();
        let window = self.writer.ttl() / 10;
        tracing::debug!(?window, "Dependency cache started");
    }

    /// Stop background eviction
    pub fn stop(&self) {
        self.facts.stop();
        self.edges.stop();
        self.identities.stop();
        tracing::debug!("Dependency cache stopped");
    }

    /// Remember who made this call and persist the (service, operation) fact
    /// unless it was written within the dedup window.
    pub async fn record_call(
        &self,
        service: &str,
        operation: &str,
        trace_id: &str,
        span_id: &str,
    ) -> Result<()> {
        let fact = DependencyFact::new(service, operation);
        self.identities
            .insert(CallIdentity::new(trace_id, span_id), fact.clone());

        persist_once(self.facts.as_ref(), fact, |f| async move {
            self.writer.write_fact(&f).await
        })
        .await
    }

    /// Persist a parent/child service edge for a call whose parent span is
    /// `(parent_trace_id, parent_span_id)`.
    ///
    /// Succeeds without writing when the parent was not recorded within the
    /// identity retention, or when parent and child are the same service.
    pub async fn register_edge(
        &self,
        child_service: &str,
        child_operation: &str,
        parent_trace_id: &str,
        parent_span_id: &str,
    ) -> Result<()> {
        let parent_key = CallIdentity::new(parent_trace_id, parent_span_id);
        let Some(parent) = self.identities.get(&parent_key) else {
            tracing::debug!(
                service = child_service,
                operation = child_operation,
                trace_id = parent_trace_id,
                span_id = parent_span_id,
                "Parent call is not cached"
            );
            return Ok(());
        };
        if parent.service == child_service {
            return Ok(());
        }

        let edge = DependencyEdge {
            parent_service: parent.service,
            child_service: child_service.to_string(),
        };
        persist_once(self.edges.as_ref(), edge, |e| async move {
            self.writer.write_edge(&e).await
        })
        .await
    }

    /// Record `span` and register an edge for each of its parent
    /// `references`, stopping at the first error.
    pub async fn observe_span(&self, span: &SpanCall, references: &[CallIdentity]) -> Result<()> {
        self.record_call(
            &span.service,
            &span.operation,
            &span.identity.trace_id,
            &span.identity.span_id,
        )
        .await?;
        for parent in references {
            self.register_edge(&span.service, &span.operation, &parent.trace_id, &parent.span_id)
                .await?;
        }
        Ok(())
    }
}

impl Drop for DependencyDedupCache {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Claim `key`'s window slot, write, then restart the window at completion.
/// A failed write releases the slot unless another caller has re-claimed it
/// since.
async fn persist_once<K, F, Fut>(window: &dyn FactCache<K, ()>, key: K, write: F) -> Result<()>
where
    K: Clone + Debug + Eq + Hash,
    F: FnOnce(K) -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    let Some(claimed_at) = window.insert_if_absent(key.clone(), ()) else {
        tracing::trace!(?key, "Dependency written recently, skipping");
        return Ok(());
    };

    match write(key.clone()).await {
        Ok(()) => {
            window.insert(key, ());
            Ok(())
        }
        Err(e) => {
            window.release(&key, claimed_at);
            tracing::warn!(?key, error = %e, "Failed to persist dependency");
            Err(e)
        }
    }
}
