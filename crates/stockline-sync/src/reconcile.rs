//! # Identifier Reconciliation Hub
//!
//! When the authority accepts a Create it issues the record's permanent id.
//! The engine rewrites the RecordStore entry and every still-pending queue
//! item in one step; this module covers the third leg - references held by
//! external collaborators (a bill line holding a product id, a cart, a
//! report cache) that the core cannot see.
//!
//! Collaborators subscribe with `on_reconciled(old_id, new_id)` hooks. The
//! hub also keeps the old->new mapping for the engine's Create idempotency
//! check: a drain pass that lost a race can ask whether another pass already
//! reconciled its target.

use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

use stockline_core::id::Identifier;

/// Subscription callback: `(old_id, new_id)`.
pub type ReconciledHook = Box<dyn Fn(&Identifier, &Identifier) + Send + Sync>;

/// Fan-out point for identifier reconciliation events.
#[derive(Default)]
pub struct ReconcileHub {
    subscribers: Mutex<Vec<ReconciledHook>>,
    log: Mutex<HashMap<Identifier, Identifier>>,
}

impl ReconcileHub {
    pub fn new() -> Self {
        ReconcileHub::default()
    }

    /// Registers a hook invoked on every reconciliation.
    pub fn subscribe(&self, hook: impl Fn(&Identifier, &Identifier) + Send + Sync + 'static) {
        let mut subscribers = self.subscribers.lock().expect("hub mutex poisoned");
        subscribers.push(Box::new(hook));
    }

    /// Records a completed reconciliation and notifies subscribers.
    pub fn record(&self, old_id: Identifier, new_id: Identifier) {
        debug!(old = %old_id, new = %new_id, "identifier reconciled");
        {
            let mut log = self.log.lock().expect("hub mutex poisoned");
            log.insert(old_id.clone(), new_id.clone());
        }
        let subscribers = self.subscribers.lock().expect("hub mutex poisoned");
        for hook in subscribers.iter() {
            hook(&old_id, &new_id);
        }
    }

    /// The server id a local id was reconciled to, if any (this process
    /// lifetime).
    pub fn resolve(&self, old_id: &Identifier) -> Option<Identifier> {
        let log = self.log.lock().expect("hub mutex poisoned");
        log.get(old_id).cloned()
    }
}
