//! Socket event surface.
//!
//! Callers observe the transport the way they would a native socket:
//! `data`, `error` and `close` events. Listeners are registered per kind
//! or for all kinds.
//!
//! Events emitted before any listener is registered are held (up to
//! [`MAX_BACKLOG`]) and replayed, in order, to the first listener that
//! accepts them. Once a listener exists, events no listener accepts are
//! dropped.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::error::Error;

// ============================================================================
// Constants
// ============================================================================

/// Most events held while no listener is registered.
pub const MAX_BACKLOG: usize = 1024;

// ============================================================================
// Types
// ============================================================================

/// Event delivered to socket listeners.
#[derive(Debug)]
pub enum SocketEvent {
    /// Raw inbound bytes.
    Data(Bytes),
    /// Socket-level failure.
    Error(Error),
    /// The socket closed.
    Close,
}

/// Event kinds, for filtered listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// [`SocketEvent::Data`].
    Data,
    /// [`SocketEvent::Error`].
    Error,
    /// [`SocketEvent::Close`].
    Close,
}

impl SocketEvent {
    /// Kind of this event.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Data(_) => EventKind::Data,
            Self::Error(_) => EventKind::Error,
            Self::Close => EventKind::Close,
        }
    }
}

/// Listener callback.
///
/// Called on the transport's event loop task; must not block.
pub type EventHandler = Arc<dyn Fn(&SocketEvent) + Send + Sync>;

struct Listener {
    /// `None` accepts every kind.
    kind: Option<EventKind>,
    handler: EventHandler,
}

impl Listener {
    fn accepts(&self, kind: EventKind) -> bool {
        self.kind.is_none_or(|k| k == kind)
    }
}

// ============================================================================
// Emitter
// ============================================================================

#[derive(Default)]
struct EmitterInner {
    listeners: Vec<Listener>,
    backlog: VecDeque<SocketEvent>,
}

impl EmitterInner {
    fn hold(&mut self, event: SocketEvent) {
        if !self.listeners.is_empty() {
            trace!(kind = ?event.kind(), "No listener for event, dropping");
            return;
        }
        if self.backlog.len() == MAX_BACKLOG {
            warn!(max = MAX_BACKLOG, "Event backlog full, dropping oldest");
            self.backlog.pop_front();
        }
        self.backlog.push_back(event);
    }
}

/// Listener registry with backlog replay.
#[derive(Default)]
pub(crate) struct Emitter {
    inner: Mutex<EmitterInner>,
}

impl Emitter {
    /// Registers a listener and replays any held events it accepts.
    ///
    /// Replay runs under the registry lock so it cannot interleave with
    /// newer events. Handlers must not register listeners themselves.
    pub(crate) fn register(&self, kind: Option<EventKind>, handler: EventHandler) {
        let mut inner = self.inner.lock();
        let listener = Listener { kind, handler };

        let held = std::mem::take(&mut inner.backlog);
        for event in held {
            if listener.accepts(event.kind()) {
                (listener.handler)(&event);
            } else {
                inner.backlog.push_back(event);
            }
        }

        inner.listeners.push(listener);
    }

    /// Delivers an event to every accepting listener, or holds it until
    /// the first listener is registered.
    pub(crate) fn emit(&self, event: SocketEvent) {
        let handlers: Vec<EventHandler> = {
            let mut inner = self.inner.lock();
            let kind = event.kind();
            let handlers: Vec<_> = inner
                .listeners
                .iter()
                .filter(|l| l.accepts(kind))
                .map(|l| Arc::clone(&l.handler))
                .collect();

            if handlers.is_empty() {
                inner.hold(event);
                return;
            }
            handlers
        };

        for handler in handlers {
            handler(&event);
        }
    }

    /// Number of events waiting for a listener.
    pub(crate) fn held(&self) -> usize {
        self.inner.lock().backlog.len()
    }
}

// ============================================================================
// Tests
// ============================================================================
