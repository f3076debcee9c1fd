//! Session context - which session is focused, and who is listening

use crate::core::session::SessionId;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// Session-level change notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Created(SessionId),
    Activated(SessionId),
    Deleted(SessionId),
    MetadataSaved(SessionId),
}

impl SessionEvent {
    pub fn session_id(&self) -> &SessionId {
        match self {
            SessionEvent::Created(id)
            | SessionEvent::Activated(id)
            | SessionEvent::Deleted(id)
            | SessionEvent::MetadataSaved(id) => id,
        }
    }
}

/// Type for session event handlers
pub type SessionEventHandler = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

/// Explicit handle for the focused session
///
/// Created once by the caller and injected into the stores that need it;
/// nothing here is process-global.
#[derive(Default)]
pub struct SessionContext {
    active: RwLock<Option<SessionId>>,
    handlers: RwLock<Vec<SessionEventHandler>>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently focused session
    pub fn active(&self) -> Option<SessionId> {
        read(&self.active).clone()
    }

    /// Replace the focus without notifying anyone
    pub fn set_active(&self, id: Option<SessionId>) {
        *write(&self.active) = id;
    }

    /// Focus `id` and notify subscribers
    pub fn activate(&self, id: SessionId) {
        self.set_active(Some(id.clone()));
        self.notify(SessionEvent::Activated(id));
    }

    /// Drop the focus if it points at `id`; returns whether it did
    pub fn deactivate_if(&self, id: &SessionId) -> bool {
        let mut active = write(&self.active);
        if active.as_ref() == Some(id) {
            *active = None;
            true
        } else {
            false
        }
    }

    /// Register a handler for session events
    pub fn subscribe<F>(&self, handler: F)
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        write(&self.handlers).push(Arc::new(handler));
    }

    /// Emit an event to all handlers
    pub fn notify(&self, event: SessionEvent) {
        debug!("Session event: {:?}", event);
        // Clone out so a handler may subscribe without deadlocking
        let handlers: Vec<SessionEventHandler> = read(&self.handlers).clone();
        for handler in &handlers {
            handler(&event);
        }
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("active", &self.active())
            .field("handlers", &read(&self.handlers).len())
            .finish()
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn id(raw: &str) -> SessionId {
        SessionId::parse(raw).unwrap()
    }

    #[test]
    fn test_activate_and_clear() {
        let ctx = SessionContext::new();
        assert!(ctx.active().is_none());

        ctx.activate(id("s1"));
        assert_eq!(ctx.active(), Some(id("s1")));

        assert!(!ctx.deactivate_if(&id("s2")));
        assert_eq!(ctx.active(), Some(id("s1")));

        assert!(ctx.deactivate_if(&id("s1")));
        assert!(ctx.active().is_none());
    }

    #[test]
    fn test_subscribers_receive_events() {
        let ctx = SessionContext::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        ctx.subscribe(move |event| sink.lock().unwrap().push(event.clone()));

        ctx.activate(id("s1"));
        ctx.notify(SessionEvent::MetadataSaved(id("s1")));

        let events = seen.lock().unwrap();
        assert_eq!(
            *events,
            vec![SessionEvent::Activated(id("s1")), SessionEvent::MetadataSaved(id("s1"))]
        );
        assert_eq!(events[1].session_id(), &id("s1"));
    }
}
