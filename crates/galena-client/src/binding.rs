//! The method-binding cache.
//!
//! Remote methods are addressed by name but invoked by numeric wire id; the
//! association is obtained once per (plugin, method, input type, output
//! type) tuple through the reserved `CoreBind` call and shared by every
//! typed caller. The cache is the only cross-thread shared structure in the
//! library: a mutex-guarded ordered map. Concurrent lookups with equal keys
//! coalesce onto a single wire call, and every disconnect invalidates all
//! entries.

use std::collections::BTreeMap;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Identity of a method binding.
///
/// Equality is structural on the full tuple; two requests naming the same
/// method with different message types are distinct bindings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct BindRequest {
    /// Plugin name; empty for core methods.
    pub plugin: String,
    /// Method name.
    pub method: String,
    /// Fully qualified input message type name.
    pub input_msg: String,
    /// Fully qualified output message type name.
    pub output_msg: String,
}

impl BindRequest {
    /// Creates a bind request.
    pub fn new(
        plugin: impl Into<String>,
        method: impl Into<String>,
        input_msg: impl Into<String>,
        output_msg: impl Into<String>,
    ) -> Self {
        Self {
            plugin: plugin.into(),
            method: method.into(),
            input_msg: input_msg.into(),
            output_msg: output_msg.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BindState {
    /// The CoreBind call is in flight.
    Pending,
    /// The server assigned a wire id.
    Bound(i16),
    /// The bind failed, or the link that produced it went away.
    Failed,
}

/// A shared method binding.
///
/// Many typed callers may hold the same binding; it resolves exactly once
/// per link. A binding is ready iff the bind call finished with `Ok`.
#[derive(Debug)]
pub struct Binding {
    state: Mutex<BindState>,
    done: Condvar,
}

impl Binding {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(BindState::Pending),
            done: Condvar::new(),
        }
    }

    /// Creates an already-resolved binding for a fixed wire id.
    pub(crate) fn bound(assigned_id: i16) -> Self {
        Self {
            state: Mutex::new(BindState::Bound(assigned_id)),
            done: Condvar::new(),
        }
    }

    /// Resolves a pending binding. `None` marks it failed.
    pub(crate) fn complete(&self, assigned_id: Option<i16>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == BindState::Pending {
            *state = match assigned_id {
                Some(id) => BindState::Bound(id),
                None => BindState::Failed,
            };
        }
        self.done.notify_all();
    }

    /// Marks the binding failed regardless of its current state.
    pub(crate) fn invalidate(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *state = BindState::Failed;
        self.done.notify_all();
    }

    /// Returns true if the binding resolved successfully and is still valid.
    pub fn ready(&self) -> bool {
        matches!(
            *self.state.lock().unwrap_or_else(PoisonError::into_inner),
            BindState::Bound(_)
        )
    }

    /// Returns the assigned wire id of a ready binding.
    pub fn assigned_id(&self) -> Option<i16> {
        match *self.state.lock().unwrap_or_else(PoisonError::into_inner) {
            BindState::Bound(id) => Some(id),
            _ => None,
        }
    }

    /// Blocks until the binding resolves; true on success.
    pub fn wait(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        while *state == BindState::Pending {
            state = self
                .done
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        matches!(*state, BindState::Bound(_))
    }

    /// Blocks until the binding resolves or the timeout elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<bool> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        while *state == BindState::Pending {
            let remaining = deadline.checked_duration_since(Instant::now())?;
            let (guard, _) = self
                .done
                .wait_timeout(state, remaining)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
        Some(matches!(*state, BindState::Bound(_)))
    }
}

/// Mutex-guarded map of bindings, keyed by the full bind-request tuple.
pub(crate) struct BindingCache {
    map: Mutex<BTreeMap<BindRequest, Arc<Binding>>>,
}

impl BindingCache {
    pub fn new() -> Self {
        Self {
            map: Mutex::new(BTreeMap::new()),
        }
    }

    /// Lock-bounded upsert. Returns the shared binding and whether it was
    /// newly created (in which case the caller must issue the CoreBind
    /// call — outside this lock).
    pub fn get(&self, request: &BindRequest) -> (Arc<Binding>, bool) {
        let mut map = self.map.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = map.get(request) {
            return (existing.clone(), false);
        }

        let binding = Arc::new(Binding::new());
        map.insert(request.clone(), binding.clone());
        (binding, true)
    }

    /// Drops every entry and fails every binding, pending or bound.
    /// Outstanding holders keep their `Arc` but observe the failure and
    /// re-bind on the next link.
    pub fn invalidate_all(&self) {
        let entries =
            std::mem::take(&mut *self.map.lock().unwrap_or_else(PoisonError::into_inner));
        for binding in entries.into_values() {
            binding.invalidate();
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.map
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
