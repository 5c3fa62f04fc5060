//! Response dispatching
//!
//! Routes every inbound engine message to its registered handler by
//! correlation identifier. The dispatcher never interprets payloads, which
//! keeps it decoupled from message schema evolution: handlers pattern-match
//! on [`EngineMessage`] variants themselves.
//!
//! The identifier space is partitioned: the reserved broadcast identifier
//! receives every unsolicited engine message and is registered once for the
//! lifetime of a session; all other identifiers are allocated per in-flight
//! request and removed when the matching response arrives.

use crate::protocol::messages::{BROADCAST_CID, EngineMessage, InboundEnvelope};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use tracing::{debug, trace};

/// Handler invoked with the payload of a routed message.
///
/// Handlers run on the connection's delivery context and must not block;
/// long work has to be handed off so subsequent dispatch is not stalled.
pub type Handler = std::sync::Arc<dyn Fn(EngineMessage) + Send + Sync>;

/// Identifier of one in-flight request. Always positive on the wire; the
/// broadcast identifier is deliberately a different type so the two cannot be
/// confused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(i64);

impl RequestId {
    /// Wire representation of this identifier.
    pub fn wire(self) -> i64 {
        self.0
    }
}

/// Routing key of an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrelationId {
    /// The reserved identifier for unsolicited engine messages.
    Broadcast,
    /// An ordinary per-request identifier.
    Request(RequestId),
}

impl CorrelationId {
    /// Interpret a wire-level correlation value.
    pub fn from_wire(cid: i64) -> Self {
        if cid == BROADCAST_CID {
            CorrelationId::Broadcast
        } else {
            CorrelationId::Request(RequestId(cid))
        }
    }
}

/// Protocol anomalies detected while routing.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DispatchError {
    /// Inbound message with no registered handler; the message was dropped.
    #[error("no handler registered for correlation id {cid}, message dropped")]
    Unrouted { cid: i64 },
}

/// Correlation-identifier → handler table.
pub struct ResponseDispatcher {
    /// Broadcast handler; set once, before the session's first message.
    broadcast: OnceLock<Handler>,

    /// Handlers for in-flight requests, removed on dispatch.
    pending: Mutex<HashMap<i64, Handler>>,

    /// Next request identifier to allocate.
    next_request_id: AtomicI64,

    /// Count of dropped messages, observable as a diagnostic.
    unrouted: AtomicU64,
}

impl ResponseDispatcher {
    pub fn new() -> Self {
        Self {
            broadcast: OnceLock::new(),
            pending: Mutex::new(HashMap::new()),
            next_request_id: AtomicI64::new(1),
            unrouted: AtomicU64::new(0),
        }
    }

    /// Register the broadcast handler.
    ///
    /// Idempotent: the first registration wins and later calls are ignored
    /// with a trace, so session construction can assert the handler exists
    /// without racing re-registration.
    pub fn register_broadcast(&self, handler: Handler) {
        if self.broadcast.set(handler).is_err() {
            debug!("Broadcast handler already registered, keeping the existing one");
        }
    }

    /// Whether the broadcast handler has been registered.
    pub fn has_broadcast(&self) -> bool {
        self.broadcast.get().is_some()
    }

    /// Allocate a fresh request identifier. Identifiers are never reused
    /// within a session.
    pub fn allocate_request_id(&self) -> RequestId {
        RequestId(self.next_request_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Associate a handler with an in-flight request.
    pub fn register(&self, id: RequestId, handler: Handler) {
        // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
        self.pending.lock().unwrap().insert(id.wire(), handler);
    }

    /// Remove a registered request handler without invoking it.
    pub fn unregister(&self, id: RequestId) {
        // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
        self.pending.lock().unwrap().remove(&id.wire());
    }

    /// Route one inbound message to its handler.
    ///
    /// A non-broadcast identifier's handler is removed before invocation.
    /// An unregistered identifier drops the message and reports the anomaly;
    /// dispatch continues to work afterwards.
    pub fn dispatch(&self, envelope: InboundEnvelope) -> Result<(), DispatchError> {
        match CorrelationId::from_wire(envelope.cid) {
            CorrelationId::Broadcast => match self.broadcast.get() {
                Some(handler) => {
                    trace!("Dispatching broadcast message");
                    handler(envelope.message);
                    Ok(())
                }
                None => {
                    self.unrouted.fetch_add(1, Ordering::Relaxed);
                    Err(DispatchError::Unrouted { cid: BROADCAST_CID })
                }
            },
            CorrelationId::Request(id) => {
                let handler = {
                    // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
                    self.pending.lock().unwrap().remove(&id.wire())
                };
                match handler {
                    Some(handler) => {
                        trace!("Dispatching response for request {}", id.wire());
                        handler(envelope.message);
                        Ok(())
                    }
                    None => {
                        self.unrouted.fetch_add(1, Ordering::Relaxed);
                        Err(DispatchError::Unrouted { cid: id.wire() })
                    }
                }
            }
        }
    }

    /// Number of messages dropped for lack of a handler.
    pub fn unrouted_count(&self) -> u64 {
        self.unrouted.load(Ordering::Relaxed)
    }

    /// Number of in-flight requests still awaiting a response.
    pub fn pending_count(&self) -> usize {
        // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
        self.pending.lock().unwrap().len()
    }

    /// Discard all pending request handlers without invoking them.
    ///
    /// Called on session teardown; callers must not assume a registered
    /// handler is always eventually invoked.
    pub fn discard_pending(&self) {
        // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
        let discarded = {
            let mut pending = self.pending.lock().unwrap();
            let count = pending.len();
            pending.clear();
            count
        };
        if discarded > 0 {
            debug!("Discarded {} pending request handlers on teardown", discarded);
        }
    }
}

impl Default for ResponseDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    fn counting_handler() -> (Handler, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let captured = Arc::clone(&count);
        let handler: Handler = Arc::new(move |_message| {
            captured.fetch_add(1, Ordering::SeqCst);
        });
        (handler, count)
    }

    #[test]
    fn test_broadcast_dispatch_invokes_handler() {
        let dispatcher = ResponseDispatcher::new();
        let (handler, count) = counting_handler();
        dispatcher.register_broadcast(handler);

        dispatcher
            .dispatch(InboundEnvelope::broadcast(EngineMessage::Ack))
            .unwrap();
        dispatcher
            .dispatch(InboundEnvelope::broadcast(EngineMessage::Ack))
            .unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(dispatcher.unrouted_count(), 0);
    }

    #[test]
    fn test_broadcast_registration_is_idempotent_first_wins() {
        let dispatcher = ResponseDispatcher::new();
        let (first, first_count) = counting_handler();
        let (second, second_count) = counting_handler();

        dispatcher.register_broadcast(first);
        dispatcher.register_broadcast(second);

        dispatcher
            .dispatch(InboundEnvelope::broadcast(EngineMessage::Ack))
            .unwrap();

        assert_eq!(first_count.load(Ordering::SeqCst), 1);
        assert_eq!(second_count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_request_handler_invoked_once_and_removed() {
        let dispatcher = ResponseDispatcher::new();
        let (handler, count) = counting_handler();

        let id = dispatcher.allocate_request_id();
        dispatcher.register(id, handler);
        assert_eq!(dispatcher.pending_count(), 1);

        dispatcher
            .dispatch(InboundEnvelope {
                cid: id.wire(),
                message: EngineMessage::Ack,
            })
            .unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.pending_count(), 0);

        // A second delivery for the same id is now unrouted
        let result = dispatcher.dispatch(InboundEnvelope {
            cid: id.wire(),
            message: EngineMessage::Ack,
        });
        assert_eq!(result, Err(DispatchError::Unrouted { cid: id.wire() }));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unrouted_message_is_dropped_and_counted() {
        let dispatcher = ResponseDispatcher::new();
        let (handler, count) = counting_handler();
        dispatcher.register_broadcast(handler);

        let result = dispatcher.dispatch(InboundEnvelope {
            cid: 42,
            message: EngineMessage::Ack,
        });

        assert_eq!(result, Err(DispatchError::Unrouted { cid: 42 }));
        assert_eq!(dispatcher.unrouted_count(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        // Dispatch keeps working afterwards
        dispatcher
            .dispatch(InboundEnvelope::broadcast(EngineMessage::Ack))
            .unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_request_ids_are_unique() {
        let dispatcher = ResponseDispatcher::new();
        let a = dispatcher.allocate_request_id();
        let b = dispatcher.allocate_request_id();
        assert_ne!(a, b);
        assert!(a.wire() > 0 && b.wire() > 0);
    }

    #[test]
    fn test_discard_pending_does_not_invoke_handlers() {
        let dispatcher = ResponseDispatcher::new();
        let (handler, count) = counting_handler();

        let id = dispatcher.allocate_request_id();
        dispatcher.register(id, handler);
        dispatcher.discard_pending();

        assert_eq!(dispatcher.pending_count(), 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
