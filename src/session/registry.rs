//! Table of live sessions, used for bulk shutdown

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Identifier assigned to each accepted connection
pub type SessionId = u32;

/// Default bound on concurrent sessions and on the id space
pub const MAX_CONNECTIONS: u32 = 50000;

#[derive(Debug)]
struct Slot {
    serial: u64,
    token: CancellationToken,
}

/// Maps session ids to the handle used to force them closed
///
/// Ids are assigned from a wrapping counter. Closed sessions clear their slot
/// instead of removing it.
#[derive(Debug)]
pub struct SessionRegistry {
    next_id: AtomicU32,
    next_serial: AtomicU64,
    max_connections: u32,
    slots: Mutex<HashMap<SessionId, Option<Slot>>>,
}

impl SessionRegistry {
    /// Create a registry whose ids wrap at `max_connections`
    pub fn new(max_connections: u32) -> Self {
        SessionRegistry {
            next_id: AtomicU32::new(1),
            next_serial: AtomicU64::new(0),
            max_connections: max_connections.max(1),
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<SessionId, Option<Slot>>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a session and return the guard that unregisters it on drop
    ///
    /// The id counter wraps without collision detection; if a long-lived
    /// session still holds a reused id, the newer session takes the slot.
    pub fn register(self: &Arc<Self>, token: CancellationToken) -> SessionGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) % self.max_connections;
        let serial = self.next_serial.fetch_add(1, Ordering::Relaxed);

        self.slots().insert(
            id,
            Some(Slot {
                serial,
                token: token.clone(),
            }),
        );

        SessionGuard {
            id,
            serial,
            token,
            registry: Arc::clone(self),
        }
    }

    fn unregister(&self, id: SessionId, serial: u64) {
        let mut slots = self.slots();
        if let Some(slot) = slots.get_mut(&id) {
            // A newer session may have taken over this id
            if slot.as_ref().map(|s| s.serial) == Some(serial) {
                *slot = None;
            }
        }
    }

    /// Force every registered session closed
    ///
    /// Returns the number of sessions signalled.
    pub fn close_all(&self) -> usize {
        let slots = self.slots();
        let mut closed = 0;
        for slot in slots.values().flatten() {
            slot.token.cancel();
            closed += 1;
        }
        debug!("Closing {} registered sessions", closed);
        closed
    }

    /// Number of occupied slots
    pub fn active_count(&self) -> usize {
        self.slots().values().filter(|slot| slot.is_some()).count()
    }

    /// Whether `id` currently has a live session
    pub fn is_registered(&self, id: SessionId) -> bool {
        matches!(self.slots().get(&id), Some(Some(_)))
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(MAX_CONNECTIONS)
    }
}

/// RAII handle for one registered session
///
/// Dropping the guard clears the session's slot, so a session is removed
/// from the registry exactly once however its task ends.
pub struct SessionGuard {
    id: SessionId,
    serial: u64,
    token: CancellationToken,
    registry: Arc<SessionRegistry>,
}

impl SessionGuard {
    /// Assigned session id
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Token cancelled by `close_all`
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.unregister(self.id, self.serial);
    }
}
