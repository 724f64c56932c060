//! Subscriber state and the per-connection close cell
//! A subscriber is a registered connection endpoint: an id, a bounded mailbox and
//! the callback fired when the mailbox overflows.

use bytes::Bytes;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, oneshot};

use crate::constants::{CLOSE_POLICY_VIOLATION, SLOW_CONSUMER_REASON};
use crate::core::envelope::{RoomId, SubscriberId};
use crate::error::{HubError, Result};

/// Fired by publishers when a subscriber's mailbox is full
pub type OverflowCallback = Arc<dyn Fn() + Send + Sync>;

/// Which room a subscriber currently belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Membership {
    Unassigned,
    Member(RoomId),
    Departed,
}

/// Outcome of a non-blocking delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Enqueued,
    /// Mailbox was full; the overflow callback has fired
    Overflowed,
    /// The owning session is gone
    Closed,
}

pub struct Subscriber {
    id: SubscriberId,
    mailbox: mpsc::Sender<Bytes>,
    on_overflow: OverflowCallback,
    membership: Mutex<Membership>,
}

impl Subscriber {
    pub(crate) fn new(
        id: SubscriberId,
        mailbox: mpsc::Sender<Bytes>,
        on_overflow: OverflowCallback,
    ) -> Self {
        Self {
            id,
            mailbox,
            on_overflow,
            membership: Mutex::new(Membership::Unassigned),
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Try to enqueue without waiting; a full mailbox triggers the overflow callback instead
    pub fn deliver(&self, payload: Bytes) -> Delivery {
        match self.mailbox.try_send(payload) {
            Ok(()) => Delivery::Enqueued,
            Err(mpsc::error::TrySendError::Full(_)) => {
                (self.on_overflow)();
                Delivery::Overflowed
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    /// Enqueue outside the overflow policy; hands the payload back when it does not fit
    pub(crate) fn offer(&self, payload: Bytes) -> std::result::Result<(), Bytes> {
        self.mailbox.try_send(payload).map_err(|e| e.into_inner())
    }

    /// Room the subscriber is currently a member of
    pub fn current_room(&self) -> Result<Option<RoomId>> {
        match &*self.membership.lock()? {
            Membership::Member(room) => Ok(Some(room.clone())),
            _ => Ok(None),
        }
    }

    /// Membership lock; always taken before any room lock
    pub(crate) fn membership(&self) -> Result<MutexGuard<'_, Membership>> {
        Ok(self.membership.lock()?)
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("queued", &(self.mailbox.max_capacity() - self.mailbox.capacity()))
            .finish()
    }
}

/// Close frame requested for a connection from outside its session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseRequest {
    pub code: u16,
    pub reason: String,
}

impl CloseRequest {
    pub fn slow_consumer() -> Self {
        Self {
            code: CLOSE_POLICY_VIOLATION,
            reason: SLOW_CONSUMER_REASON.to_string(),
        }
    }
}

#[derive(Default)]
struct CellState {
    closed: bool,
    handle: Option<oneshot::Sender<CloseRequest>>,
}

/// Shared closed flag plus the connection's close handle.
/// Written by the session and by eviction callbacks running on publisher tasks.
#[derive(Default)]
pub struct ConnectionCell {
    state: Mutex<CellState>,
}

impl ConnectionCell {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CellState> {
        // Plain data behind this lock; a poisoned guard is still consistent
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Install the close handle once the connection is live.
    /// Fails if an eviction already marked the cell closed.
    pub fn attach(&self, handle: oneshot::Sender<CloseRequest>) -> Result<()> {
        let mut state = self.lock();
        if state.closed {
            return Err(HubError::ConnectionClosed);
        }
        state.handle = Some(handle);
        Ok(())
    }

    /// Mark closed and take the handle if present, as one step.
    /// Returns true when this call delivered the close request.
    pub fn close(&self, request: CloseRequest) -> bool {
        let handle = {
            let mut state = self.lock();
            state.closed = true;
            state.handle.take()
        };
        match handle {
            Some(handle) => handle.send(request).is_ok(),
            None => false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}
