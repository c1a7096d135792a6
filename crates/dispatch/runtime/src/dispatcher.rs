//! The message dispatcher.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use maple_dispatch_filter::MessageFilter;
use maple_dispatch_router::{DispatchOwner, EndpointTable, RouterError, RoutingTarget};
use maple_dispatch_throttle::{
    resume_waiter, QuotaThrottle, ReleaseScheduler, ServiceThrottle, TokioScheduler, Waiter,
};
use maple_dispatch_types::{Envelope, FilterId};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::config::DispatchConfig;
use crate::error::{DispatchError, Result};
use crate::metrics::DispatchMetrics;

/// Application code behind an endpoint.
#[async_trait]
pub trait EndpointHandler: Send + Sync {
    /// Process a request. `Ok(None)` means no reply.
    async fn handle(&self, envelope: Envelope) -> Result<Option<Envelope>>;
}

/// A routable endpoint: a filter, a priority and the handler it selects.
pub struct Endpoint {
    name: String,
    filter: MessageFilter,
    priority: i32,
    handler: Arc<dyn EndpointHandler>,
}

impl Endpoint {
    pub fn new(
        name: impl Into<String>,
        filter: MessageFilter,
        handler: Arc<dyn EndpointHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            filter,
            priority: 0,
            handler,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> FilterId {
        self.filter.id()
    }
}

impl RoutingTarget for Endpoint {
    fn filter(&self) -> &MessageFilter {
        &self.filter
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("name", &self.name)
            .field("filter", &self.filter.to_string())
            .field("priority", &self.priority)
            .finish()
    }
}

/// What happened to a dispatched envelope.
#[derive(Debug)]
pub enum DispatchOutcome {
    Handled {
        endpoint: String,
        reply: Option<Envelope>,
    },
    /// No endpoint accepted the envelope. `address_matched` separates a
    /// wrong operation at a known address from an unknown address.
    NoEndpoint { address_matched: bool },
}

#[derive(Debug, Default)]
struct Lifecycle {
    closed: AtomicBool,
    attached: AtomicUsize,
}

impl DispatchOwner for Lifecycle {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn entry_added(&self, filter: FilterId) {
        let attached = self.attached.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(filter = %filter, attached, "endpoint attached");
    }

    fn entry_removed(&self, filter: FilterId) {
        let attached = self.attached.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        debug!(filter = %filter, attached, "endpoint detached");
    }
}

/// A call slot held while a handler runs. Dropping it frees the slot.
struct CallSlot {
    throttle: Weak<ServiceThrottle>,
}

impl Drop for CallSlot {
    fn drop(&mut self) {
        if let Some(throttle) = self.throttle.upgrade() {
            throttle.release_call();
        }
    }
}

/// A queued call. If the caller gives up after the slot was handed over,
/// the slot is given back.
struct PendingCall {
    rx: Option<oneshot::Receiver<()>>,
    throttle: Weak<ServiceThrottle>,
}

impl PendingCall {
    async fn granted(mut self) -> Result<CallSlot> {
        if let Some(rx) = self.rx.as_mut() {
            rx.await.map_err(|_| DispatchError::Closed)?;
        }
        self.rx = None;
        Ok(CallSlot {
            throttle: self.throttle.clone(),
        })
    }
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        let Some(mut rx) = self.rx.take() else {
            return;
        };
        rx.close();
        if rx.try_recv().is_ok() {
            if let Some(throttle) = self.throttle.upgrade() {
                throttle.release_call();
            }
        }
    }
}

/// An envelope queued on the message quota. A unit of quota granted after
/// the caller gave up is returned.
struct PendingMessage {
    rx: Option<oneshot::Receiver<()>>,
    quota: Weak<QuotaThrottle<Waiter>>,
}

impl PendingMessage {
    async fn admitted(mut self) -> Result<()> {
        if let Some(rx) = self.rx.as_mut() {
            rx.await.map_err(|_| DispatchError::Closed)?;
        }
        self.rx = None;
        Ok(())
    }
}

impl Drop for PendingMessage {
    fn drop(&mut self) {
        let Some(mut rx) = self.rx.take() else {
            return;
        };
        rx.close();
        if rx.try_recv().is_ok() {
            give_back(&self.quota);
        }
    }
}

fn give_back(quota: &Weak<QuotaThrottle<Waiter>>) {
    if let Some(quota) = quota.upgrade() {
        if let Err(e) = quota.increment_limit(1) {
            warn!(error = %e, "could not return an unused message quota unit");
        }
    }
}

/// Routes envelopes to endpoints and runs their handlers under the
/// service throttles.
pub struct MessageDispatcher {
    endpoints: EndpointTable<Endpoint>,
    throttle: Arc<ServiceThrottle>,
    quota: Arc<QuotaThrottle<Waiter>>,
    lifecycle: Arc<Lifecycle>,
    metrics: DispatchMetrics,
}

impl MessageDispatcher {
    /// Build a dispatcher whose released waiters resume on the current
    /// tokio runtime.
    pub fn from_config(config: &DispatchConfig) -> Result<Self> {
        let scheduler = Arc::new(TokioScheduler::current()?);
        Self::new(config, scheduler)
    }

    pub fn new(config: &DispatchConfig, scheduler: Arc<dyn ReleaseScheduler>) -> Result<Self> {
        let lifecycle = Arc::new(Lifecycle::default());
        let endpoints = EndpointTable::with_config(config.routing, config.query)
            .with_owner(lifecycle.clone());
        let throttle = Arc::new(ServiceThrottle::new(&config.throttle, scheduler.clone())?);
        let quota = Arc::new(QuotaThrottle::new("messages", resume_waiter(), scheduler));
        Ok(Self {
            endpoints,
            throttle,
            quota,
            lifecycle,
            metrics: DispatchMetrics::default(),
        })
    }

    pub fn add_endpoint(&self, endpoint: Endpoint) -> Result<Arc<Endpoint>> {
        let endpoint = Arc::new(endpoint);
        match self.endpoints.add_entry(endpoint.clone()) {
            Ok(()) => Ok(endpoint),
            Err(RouterError::IllegalState(_)) => Err(DispatchError::Closed),
            Err(e) => Err(e.into()),
        }
    }

    pub fn remove_endpoint(&self, id: &FilterId) -> Option<Arc<Endpoint>> {
        self.endpoints.remove_entry(id)
    }

    pub fn endpoints(&self) -> Vec<Arc<Endpoint>> {
        self.endpoints.entries()
    }

    /// Endpoints the routing table has reported as attached.
    pub fn attached_endpoints(&self) -> usize {
        self.lifecycle.attached.load(Ordering::SeqCst)
    }

    /// Route the envelope, wait for admission and run the endpoint handler.
    pub async fn dispatch(&self, envelope: Envelope) -> Result<DispatchOutcome> {
        if self.is_closed() {
            return Err(DispatchError::Closed);
        }

        let lookup = match self.endpoints.lookup(&envelope) {
            Ok(lookup) => lookup,
            Err(e) => {
                if e.is_ambiguous() {
                    self.metrics.record_ambiguous();
                } else {
                    self.metrics.record_failure();
                }
                return Err(e.into());
            }
        };

        let Some(endpoint) = lookup.target else {
            self.metrics.record_unrouted(lookup.address_matched);
            if lookup.address_matched {
                debug!(envelope = %envelope.id, action = ?envelope.action(), "contract filter mismatch");
            } else {
                debug!(envelope = %envelope.id, to = ?envelope.to().map(|u| u.as_str()), "address filter mismatch");
            }
            return Ok(DispatchOutcome::NoEndpoint {
                address_matched: lookup.address_matched,
            });
        };

        self.admit_message().admitted().await?;
        let _slot = self.admit_call().granted().await?;

        debug!(envelope = %envelope.id, endpoint = %endpoint.name, "dispatching");
        match endpoint.handler.handle(envelope).await {
            Ok(reply) => {
                self.metrics.record_dispatched();
                Ok(DispatchOutcome::Handled {
                    endpoint: endpoint.name.clone(),
                    reply,
                })
            }
            Err(e) => {
                self.metrics.record_failure();
                warn!(endpoint = %endpoint.name, error = %e, "endpoint handler failed");
                Err(e)
            }
        }
    }

    fn admit_call(&self) -> PendingCall {
        let (tx, rx) = oneshot::channel();
        let handoff = Arc::downgrade(&self.throttle);
        let granted = self.throttle.acquire_call(Box::new(move || {
            if tx.send(()).is_err() {
                // the caller gave up while queued
                if let Some(throttle) = handoff.upgrade() {
                    throttle.release_call();
                }
            }
        }));
        PendingCall {
            rx: if granted { None } else { Some(rx) },
            throttle: Arc::downgrade(&self.throttle),
        }
    }

    fn admit_message(&self) -> PendingMessage {
        let (tx, rx) = oneshot::channel();
        let handoff = Arc::downgrade(&self.quota);
        let granted = self.quota.acquire(Box::new(move || {
            if tx.send(()).is_err() {
                // the caller gave up while queued
                give_back(&handoff);
            }
        }));
        PendingMessage {
            rx: if granted { None } else { Some(rx) },
            quota: Arc::downgrade(&self.quota),
        }
    }

    /// Cap the number of further envelopes admitted. Envelopes beyond the
    /// cap wait until the quota is raised or disabled.
    pub fn set_message_quota(&self, limit: i32) -> Result<()> {
        Ok(self.quota.set_limit(limit)?)
    }

    pub fn increment_message_quota(&self, delta: i32) -> Result<i32> {
        Ok(self.quota.increment_limit(delta)?)
    }

    pub fn disable_message_quota(&self) {
        self.quota.disable();
    }

    /// Stop accepting envelopes and service endpoints. Waiting envelopes
    /// held by the message quota are let through.
    pub fn close(&self) {
        if !self.lifecycle.closed.swap(true, Ordering::SeqCst) {
            info!(endpoints = self.endpoints.len(), "dispatcher closed");
            self.quota.disable();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.lifecycle.is_closed()
    }

    pub fn throttle(&self) -> &ServiceThrottle {
        &self.throttle
    }

    pub fn metrics(&self) -> &DispatchMetrics {
        &self.metrics
    }
}

impl fmt::Debug for MessageDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageDispatcher")
            .field("endpoints", &self.endpoints)
            .field("throttle", &self.throttle)
            .field("quota", &self.quota)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maple_dispatch_throttle::{InlineScheduler, ThrottleConfig};
    use maple_dispatch_types::EnvelopeVersion;

    struct Reply(&'static str);

    #[async_trait]
    impl EndpointHandler for Reply {
        async fn handle(&self, _envelope: Envelope) -> Result<Option<Envelope>> {
            Ok(Some(Envelope::new(EnvelopeVersion::Soap12).with_action(self.0)))
        }
    }

    fn dispatcher(calls: usize) -> MessageDispatcher {
        let config = DispatchConfig {
            throttle: ThrottleConfig {
                max_concurrent_calls: calls,
                ..ThrottleConfig::default()
            },
            ..DispatchConfig::default()
        };
        MessageDispatcher::new(&config, Arc::new(InlineScheduler)).unwrap()
    }

    fn action(a: &str) -> MessageFilter {
        MessageFilter::action([a]).unwrap()
    }

    #[tokio::test]
    async fn test_dispatch_to_handler() {
        let d = dispatcher(4);
        d.add_endpoint(Endpoint::new("orders", action("urn:submit"), Arc::new(Reply("urn:ok"))))
            .unwrap();

        let outcome = d
            .dispatch(Envelope::new(EnvelopeVersion::Soap12).with_action("urn:submit"))
            .await
            .unwrap();
        let DispatchOutcome::Handled { endpoint, reply } = outcome else {
            panic!("expected a handled outcome");
        };
        assert_eq!(endpoint, "orders");
        assert_eq!(reply.unwrap().action(), Some("urn:ok"));
        assert_eq!(d.metrics().snapshot().dispatched, 1);
        assert_eq!(d.throttle().calls().count(), 0);
    }

    #[tokio::test]
    async fn test_unrouted_envelope() {
        let d = dispatcher(4);
        let outcome = d
            .dispatch(Envelope::new(EnvelopeVersion::Soap12).with_action("urn:x"))
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            DispatchOutcome::NoEndpoint {
                address_matched: false
            }
        ));
        assert_eq!(d.metrics().snapshot().no_endpoint, 1);
    }

    #[tokio::test]
    async fn test_closed_dispatcher_rejects_work() {
        let d = dispatcher(4);
        let e = d
            .add_endpoint(Endpoint::new("a", action("urn:a"), Arc::new(Reply("urn:ok"))))
            .unwrap();
        assert_eq!(d.attached_endpoints(), 1);
        d.close();
        assert!(matches!(
            d.add_endpoint(Endpoint::new("b", action("urn:b"), Arc::new(Reply("urn:ok")))),
            Err(DispatchError::Closed)
        ));
        assert!(matches!(
            d.dispatch(Envelope::new(EnvelopeVersion::None).with_action("urn:a")).await,
            Err(DispatchError::Closed)
        ));
        assert!(d.remove_endpoint(&e.id()).is_some());
        assert_eq!(d.attached_endpoints(), 0);
    }

    #[tokio::test]
    async fn test_abandoned_wait_returns_slot() {
        let d = dispatcher(1);
        let held = d.admit_call().granted().await.unwrap();
        let queued = d.admit_call();
        assert_eq!(d.throttle().calls().waiting(), 1);

        drop(queued);
        drop(held);
        assert_eq!(d.throttle().calls().count(), 0);
        assert_eq!(d.throttle().calls().waiting(), 0);
    }

    #[tokio::test]
    async fn test_abandoned_message_returns_quota() {
        let d = dispatcher(4);
        d.set_message_quota(0).unwrap();
        let abandoned = d.admit_message();
        let live = d.admit_message();
        drop(abandoned);

        assert_eq!(d.increment_message_quota(1).unwrap(), 0);
        live.admitted().await.unwrap();
        assert_eq!(d.quota.limit(), 0);
        assert_eq!(d.quota.waiting(), 0);
    }

    #[tokio::test]
    async fn test_message_granted_then_dropped_returns_quota() {
        let d = dispatcher(4);
        d.set_message_quota(0).unwrap();
        let pending = d.admit_message();
        assert_eq!(d.increment_message_quota(1).unwrap(), 0);
        drop(pending);
        assert_eq!(d.quota.limit(), 1);
    }
}
