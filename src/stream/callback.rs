// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Delivery of asynchronous output notifications.
//
// The endpoint holds a strong reference to a `SessionCallback`, which holds
// only a weak reference to the session's `CallbackSlot`. The slot in turn
// holds the client's handler weakly. Dropping the session drops the slot, so
// late notifications fail to upgrade and are discarded.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use tracing::trace;

use crate::endpoint::StreamOutCallback;

#[derive(Default)]
pub(crate) struct CallbackSlot {
    handler: Mutex<Option<Weak<dyn StreamOutCallback>>>,
}

impl CallbackSlot {
    pub(crate) fn set(&self, handler: Weak<dyn StreamOutCallback>) {
        *self.handler.lock().unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    pub(crate) fn clear(&self) {
        *self.handler.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub(crate) fn is_set(&self) -> bool {
        self.handler.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    fn handler(&self) -> Option<Arc<dyn StreamOutCallback>> {
        let guard = self.handler.lock().unwrap_or_else(PoisonError::into_inner);
        guard.as_ref().and_then(Weak::upgrade)
    }
}

/// Callback object registered with the endpoint on behalf of a session.
pub struct SessionCallback {
    slot: Weak<CallbackSlot>,
}

impl SessionCallback {
    pub(crate) fn new(slot: &Arc<CallbackSlot>) -> Self {
        Self { slot: Arc::downgrade(slot) }
    }

    fn dispatch(&self, event: &'static str, deliver: impl FnOnce(&dyn StreamOutCallback)) {
        // Upgrading pins the slot for the duration of the call.
        let Some(slot) = self.slot.upgrade() else {
            trace!(event, "stream already closed, dropping notification");
            return;
        };
        // The lock is released before the handler runs.
        let Some(handler) = slot.handler() else {
            trace!(event, "no handler registered, dropping notification");
            return;
        };
        trace!(event, "async callback");
        deliver(handler.as_ref());
    }
}

impl StreamOutCallback for SessionCallback {
    fn on_write_ready(&self) {
        self.dispatch("on_write_ready", |h| h.on_write_ready());
    }

    fn on_drain_ready(&self) {
        self.dispatch("on_drain_ready", |h| h.on_drain_ready());
    }

    fn on_error(&self) {
        self.dispatch("on_error", |h| h.on_error());
    }
}
