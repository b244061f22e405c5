//! Query pipelining state machine.
//!
//! Pure protocol bookkeeping with no I/O. The socket feeds it outbound
//! buffers and inbound frames; it answers with [`Action`]s for the socket to
//! carry out.
//!
//! # Ordering
//!
//! Queued writes leave one group at a time. The head of the queue is the
//! group on the wire; the next one is released only after the head has
//! seen every Ready-For-Query it expects.
//!
//! ```text
//!  write(Q)            ┌───────┬──────┐
//!  ───────────────────►│ probe │ data │──► Send(probe), ArmProbeTimer
//!                      └───────┴──────┘
//!  D "1"  ───────────► CancelProbeTimer
//!  Z      ───────────► pop probe ──► Send(data)
//!  Z      ───────────► pop data  ──► Open
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};
use tracing::{debug, trace, warn};

use crate::protocol::{
    MessageCursor, RawMessage, SIMPLE_QUERY_REPLY_TAGS, TAG_DATA_ROW, TAG_QUERY,
    TAG_READY_FOR_QUERY, TransactionStatus, liveness_probe, scan_outbound,
};

// ============================================================================
// ReadyState
// ============================================================================

/// Protocol-level availability of the transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReadyState {
    /// No socket, or the socket has closed.
    #[default]
    Closed,
    /// Startup sent; queued writes may be released.
    Open,
    /// A simple query is on the wire awaiting its Ready-For-Query.
    Querying,
}

impl ReadyState {
    /// Returns `true` if moving from `self` to `next` is allowed.
    ///
    /// | From | To |
    /// |------|----|
    /// | any | `Closed` |
    /// | `Closed` | `Open` |
    /// | `Open` | `Open`, `Querying` |
    /// | `Querying` | `Open` |
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (_, Self::Closed)
                | (Self::Closed, Self::Open)
                | (Self::Open, Self::Open | Self::Querying)
                | (Self::Querying, Self::Open)
        )
    }
}

// ============================================================================
// SendLock
// ============================================================================

/// Single-slot send-ordering lock.
///
/// Held from the moment the head group is sent until its last
/// acknowledgment arrives, or until error recovery or close.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SendLock {
    /// No group on the wire.
    #[default]
    Idle,
    /// The head group has been sent and is not yet fully acknowledged.
    SendInFlight,
}

impl SendLock {
    /// Takes the lock if it is free.
    #[inline]
    pub fn try_acquire(&mut self) -> bool {
        match self {
            Self::Idle => {
                *self = Self::SendInFlight;
                true
            }
            Self::SendInFlight => false,
        }
    }

    /// Frees the lock. Returns `true` if it was held.
    #[inline]
    pub fn release(&mut self) -> bool {
        std::mem::replace(self, Self::Idle) == Self::SendInFlight
    }

    /// Returns `true` while a group is in flight.
    #[inline]
    #[must_use]
    pub const fn is_held(self) -> bool {
        matches!(self, Self::SendInFlight)
    }
}

// ============================================================================
// QueuedWrite
// ============================================================================

/// One outbound group waiting for (or awaiting acknowledgment of) its send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedWrite {
    /// Bytes sent as one WebSocket frame.
    pub payload: Bytes,
    /// Ready-For-Query replies still expected.
    pub remaining_acks: usize,
    /// Synthetic `select 1;` injected by the transport.
    pub is_liveness_probe: bool,
}

impl QueuedWrite {
    /// The liveness probe, expecting one acknowledgment.
    #[must_use]
    pub fn probe() -> Self {
        Self {
            payload: liveness_probe(),
            remaining_acks: 1,
            is_liveness_probe: true,
        }
    }

    /// A caller buffer with `queries` simple queries.
    ///
    /// A Sync-terminated batch with no simple query still gets the single
    /// Ready-For-Query that ends it.
    #[must_use]
    pub fn data(payload: Bytes, queries: usize) -> Self {
        Self {
            payload,
            remaining_acks: queries.max(1),
            is_liveness_probe: false,
        }
    }
}

// ============================================================================
// Action
// ============================================================================

/// Side effect requested by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Send bytes as one binary frame.
    Send(Bytes),
    /// Deliver bytes to the caller as a data event.
    Forward(Bytes),
    /// Start the liveness watchdog.
    ArmProbeTimer,
    /// Stop the liveness watchdog.
    CancelProbeTimer,
}

// ============================================================================
// Pipeline
// ============================================================================

/// Pending-query queue and the state that gates it.
#[derive(Debug)]
pub struct Pipeline {
    /// Liveness probing and queueing enabled.
    connection_check: bool,
    ready_state: ReadyState,
    pending: VecDeque<QueuedWrite>,
    lock: SendLock,
    /// Watchdog armed and not yet satisfied by a probe reply.
    probe_armed: bool,
    heartbeat_suppressed: bool,
    /// Partial inbound message carried to the next frame.
    inbound: BytesMut,
}

// ============================================================================
// Pipeline - Constructor & Accessors
// ============================================================================

impl Pipeline {
    /// Creates a closed pipeline.
    #[must_use]
    pub fn new(connection_check: bool) -> Self {
        Self {
            connection_check,
            ready_state: ReadyState::Closed,
            pending: VecDeque::new(),
            lock: SendLock::Idle,
            probe_armed: false,
            heartbeat_suppressed: false,
            inbound: BytesMut::new(),
        }
    }

    /// Current ready state.
    #[inline]
    #[must_use]
    pub const fn ready_state(&self) -> ReadyState {
        self.ready_state
    }

    /// Number of queued groups, in-flight head included.
    #[inline]
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Queued groups in send order.
    #[inline]
    pub fn pending(&self) -> impl Iterator<Item = &QueuedWrite> {
        self.pending.iter()
    }

    /// Send-ordering lock state.
    #[inline]
    #[must_use]
    pub const fn send_lock(&self) -> SendLock {
        self.lock
    }

    /// Returns `true` while the liveness watchdog is armed.
    #[inline]
    #[must_use]
    pub const fn is_probe_armed(&self) -> bool {
        self.probe_armed
    }

    /// Returns `true` while probing is suppressed after a failed transaction.
    #[inline]
    #[must_use]
    pub const fn is_heartbeat_suppressed(&self) -> bool {
        self.heartbeat_suppressed
    }
}

// ============================================================================
// Pipeline - Events
// ============================================================================

impl Pipeline {
    /// Marks the pipeline open once startup has been sent.
    pub fn open(&mut self) {
        self.transition(ReadyState::Open);
    }

    /// Classifies an outbound buffer and either sends it or queues it.
    pub fn write(&mut self, data: Bytes) -> Vec<Action> {
        let summary = scan_outbound(&data);

        if !self.connection_check || !summary.expects_ready() {
            trace!(len = data.len(), "Direct send");
            return vec![Action::Send(data)];
        }

        if summary.queries > 0 && !self.probe_armed && !self.heartbeat_suppressed {
            debug!("Queueing liveness probe");
            self.pending.push_back(QueuedWrite::probe());
        }

        let entry = QueuedWrite::data(data, summary.queries);
        trace!(
            acks = entry.remaining_acks,
            pending = self.pending.len() + 1,
            "Queueing write"
        );
        self.pending.push_back(entry);

        let mut actions = Vec::new();
        self.dispatch(&mut actions);
        actions
    }

    /// Observes an inbound frame.
    ///
    /// Bytes answering the liveness probe are consumed; everything else is
    /// forwarded in arrival order. With connection checking disabled the
    /// frame is forwarded untouched.
    pub fn on_inbound(&mut self, frame: Bytes) -> Vec<Action> {
        let mut actions = Vec::new();

        if !self.connection_check {
            if !frame.is_empty() {
                actions.push(Action::Forward(frame));
            }
            return actions;
        }

        self.inbound.extend_from_slice(&frame);
        let buffered = std::mem::take(&mut self.inbound).freeze();
        let mut cursor = MessageCursor::new(&buffered);
        let mut forward = BytesMut::new();

        loop {
            match cursor.next_message() {
                Ok(Some(message)) => {
                    if self.observe(message, &mut actions) {
                        forward.extend_from_slice(message.bytes);
                    }
                }
                Ok(None) => {
                    self.inbound.extend_from_slice(cursor.rest());
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "Unframeable inbound bytes, passing through");
                    forward.extend_from_slice(cursor.rest());
                    break;
                }
            }
        }

        if !forward.is_empty() {
            actions.push(Action::Forward(forward.freeze()));
        }
        actions
    }

    /// Handles the watchdog firing.
    ///
    /// Returns `true` if the probe was still unanswered and the connection
    /// must be closed.
    pub fn on_probe_timeout(&mut self) -> bool {
        std::mem::replace(&mut self.probe_armed, false)
    }

    /// Tears down all state. Returns the number of discarded groups.
    pub fn close(&mut self) -> usize {
        let discarded = self.pending.len();
        self.pending.clear();
        self.inbound.clear();
        self.lock.release();
        self.probe_armed = false;
        self.heartbeat_suppressed = false;
        self.transition(ReadyState::Closed);
        discarded
    }
}

// ============================================================================
// Pipeline - Internals
// ============================================================================

impl Pipeline {
    fn transition(&mut self, next: ReadyState) {
        debug_assert!(
            self.ready_state.can_transition_to(next),
            "invalid ready state transition {:?} -> {:?}",
            self.ready_state,
            next
        );
        self.ready_state = next;
    }

    fn probe_at_head(&self) -> bool {
        self.pending.front().is_some_and(|w| w.is_liveness_probe)
    }

    /// Releases the head group if nothing is in flight.
    fn dispatch(&mut self, actions: &mut Vec<Action>) {
        if self.lock.is_held() || self.ready_state != ReadyState::Open || self.pending.is_empty() {
            return;
        }

        if !self.lock.try_acquire() {
            return;
        }

        let Some(head) = self.pending.front() else {
            self.lock.release();
            return;
        };
        let payload = head.payload.clone();
        let is_probe = head.is_liveness_probe;

        if payload.first() == Some(&TAG_QUERY) {
            self.transition(ReadyState::Querying);
        }

        if is_probe {
            self.probe_armed = true;
            actions.push(Action::ArmProbeTimer);
        }

        trace!(len = payload.len(), probe = is_probe, "Dispatching head");
        actions.push(Action::Send(payload));
    }

    /// Updates bookkeeping for one message. Returns `true` to forward it.
    ///
    /// While the probe is at the head only its own replies are consumed;
    /// asynchronous messages (ParameterStatus, NoticeResponse,
    /// NotificationResponse) still reach the caller.
    fn observe(&mut self, message: RawMessage<'_>, actions: &mut Vec<Action>) -> bool {
        if self.probe_at_head() {
            if !SIMPLE_QUERY_REPLY_TAGS.contains(&message.tag) {
                trace!(tag = %char::from(message.tag), "Forwarding asynchronous message");
                return true;
            }

            match message.tag {
                TAG_DATA_ROW if message.body.contains(&b'1') => {
                    if std::mem::replace(&mut self.probe_armed, false) {
                        debug!("Liveness probe answered");
                        actions.push(Action::CancelProbeTimer);
                    }
                }
                TAG_READY_FOR_QUERY => self.acknowledge(actions),
                _ => {}
            }
            return false;
        }

        if message.tag == TAG_READY_FOR_QUERY && !message.body.is_empty() {
            if message.ready_status() == Some(TransactionStatus::Failed) {
                self.recover_from_failed_transaction(actions);
            } else {
                self.acknowledge(actions);
            }
        }

        true
    }

    fn acknowledge(&mut self, actions: &mut Vec<Action>) {
        let Some(head) = self.pending.front_mut() else {
            return;
        };

        head.remaining_acks = head.remaining_acks.saturating_sub(1);
        if head.remaining_acks > 0 {
            trace!(remaining = head.remaining_acks, "Partial acknowledgment");
            return;
        }

        self.pending.pop_front();
        self.transition(ReadyState::Open);
        self.heartbeat_suppressed = false;
        self.lock.release();
        self.dispatch(actions);
    }

    fn recover_from_failed_transaction(&mut self, actions: &mut Vec<Action>) {
        self.heartbeat_suppressed = true;

        let dropped_head = self.pending.pop_front().is_some();
        let mut dropped_probes = 0;
        while self.probe_at_head() {
            self.pending.pop_front();
            dropped_probes += 1;
        }

        debug!(
            dropped_head,
            dropped_probes,
            pending = self.pending.len(),
            "Recovered from failed transaction"
        );

        if self.ready_state != ReadyState::Closed {
            self.transition(ReadyState::Open);
        }
        self.lock.release();
        self.dispatch(actions);
    }
}

// ============================================================================
// Tests
// ============================================================================
