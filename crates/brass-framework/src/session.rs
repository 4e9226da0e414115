//! Open conversations, one per session id.
//!
//! A matcher that suspends leaves a [`Conversation`] behind. The next event
//! of the same session resumes it instead of going through routing. Access
//! to a session is serialized by an async mutex handed out from a shared
//! map, so two events of one session never race on its conversation. A
//! session's entry leaves the map with the last guard that has nothing open.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use brass_core::EventType;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::time::Instant;
use tracing::debug;

use crate::matcher::Matcher;
use crate::matcher::instance::MatcherInstance;
use crate::permission::CompiledPermission;

/// A suspended matcher instance waiting for its session's next event.
pub(crate) struct Conversation {
    instance: MatcherInstance,
    event_type: EventType,
    permission: CompiledPermission,
    expires_at: Instant,
}

impl Conversation {
    pub(crate) fn new(
        instance: MatcherInstance,
        event_type: EventType,
        permission: CompiledPermission,
        expires_at: Instant,
    ) -> Self {
        Self {
            instance,
            event_type,
            permission,
            expires_at,
        }
    }

    pub(crate) fn matcher(&self) -> &Matcher {
        self.instance.matcher()
    }

    /// What the sender of the resuming event must be allowed.
    pub(crate) fn permission(&self) -> &CompiledPermission {
        &self.permission
    }

    pub(crate) fn is_expired(&self, now: Instant) -> bool {
        self.expires_at <= now
    }

    pub(crate) fn into_instance(self) -> MatcherInstance {
        self.instance
    }
}

type Slot = Arc<AsyncMutex<Option<Conversation>>>;
type Slots = Arc<Mutex<HashMap<String, Slot>>>;

/// Conversations keyed by session id.
pub struct SessionStore {
    slots: Slots,
    ttl: Duration,
}

impl SessionStore {
    /// Creates a store whose conversations live for `ttl` after each turn.
    pub fn new(ttl: Duration) -> Self {
        Self {
            slots: Arc::default(),
            ttl,
        }
    }

    /// Returns the conversation time-to-live.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Locks session `id`, waiting for whoever holds it.
    pub(crate) async fn lock(&self, id: &str) -> SessionGuard {
        let slot = self.slots.lock().entry(id.to_string()).or_default().clone();
        SessionGuard {
            id: id.to_string(),
            slots: self.slots.clone(),
            slot: slot.clone(),
            guard: slot.lock_owned().await,
        }
    }

    /// Drops expired conversations and unused slots.
    ///
    /// Sessions that are locked right now are left alone. Returns the number
    /// of conversations dropped.
    pub fn sweep(&self, now: Instant) -> usize {
        let mut slots = self.slots.lock();
        let mut expired = 0;
        slots.retain(|id, slot| {
            let Ok(mut conversation) = slot.try_lock() else {
                return true;
            };
            if conversation.as_ref().is_some_and(|c| c.is_expired(now)) {
                debug!(session = id.as_str(), "Conversation expired");
                *conversation = None;
                expired += 1;
            }
            conversation.is_some() || Arc::strong_count(slot) > 1
        });
        expired
    }

    /// Returns the number of open conversations.
    ///
    /// Sessions that are locked right now are not counted.
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| slot.try_lock().is_ok_and(|c| c.is_some()))
            .count()
    }

    /// Returns true if no conversation is open.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(120))
    }
}

/// Exclusive access to one session.
pub(crate) struct SessionGuard {
    id: String,
    slots: Slots,
    slot: Slot,
    guard: OwnedMutexGuard<Option<Conversation>>,
}

impl SessionGuard {
    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    /// Takes the open conversation if `event_type` may resume it.
    ///
    /// An expired conversation is dropped. One opened on another event type
    /// stays open and `None` is returned.
    pub(crate) fn take_resumable(
        &mut self,
        event_type: EventType,
        now: Instant,
    ) -> Option<Conversation> {
        let conversation = self.guard.as_ref()?;
        if conversation.is_expired(now) {
            debug!(session = self.id.as_str(), "Conversation expired");
            *self.guard = None;
            return None;
        }
        if conversation.event_type != event_type {
            debug!(
                session = self.id.as_str(),
                expected = %conversation.event_type,
                got = %event_type,
                "Event type cannot resume conversation"
            );
            return None;
        }
        self.guard.take()
    }

    /// Opens `conversation` unless one is already open.
    ///
    /// Returns `false` and drops `conversation` if the session is taken.
    pub(crate) fn store(&mut self, conversation: Conversation) -> bool {
        if self.guard.is_some() {
            return false;
        }
        *self.guard = Some(conversation);
        true
    }

    /// Returns true if a conversation is open.
    pub(crate) fn is_open(&self) -> bool {
        self.guard.is_some()
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.is_open() {
            return;
        }
        let mut slots = self.slots.lock();
        // The map, this guard and its lock hold the only references; anyone
        // else holding or waiting clones the slot under the map lock first.
        if slots.get(&self.id).is_some_and(|slot| Arc::ptr_eq(slot, &self.slot))
            && Arc::strong_count(&self.slot) == 3
        {
            slots.remove(&self.id);
        }
    }
}
