//! In-flight function calls of one connection pair.

use std::collections::HashMap;

/// A function call announced by the upstream and not yet cleared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingToolCall {
    pub call_id: String,
    /// Conversation item that preceded the call
    pub previous_item_id: String,
}

/// Pending calls keyed by call id.
///
/// Owned by the upstream-to-client forwarding task of a single connection
/// pair, so it needs no locking.
#[derive(Debug, Default)]
pub struct PendingToolCalls {
    calls: HashMap<String, PendingToolCall>,
}

impl PendingToolCalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a call. Returns `false` when the call id is already tracked,
    /// in which case the existing record is kept.
    pub fn insert(&mut self, call_id: &str, previous_item_id: &str) -> bool {
        if self.calls.contains_key(call_id) {
            return false;
        }
        self.calls.insert(
            call_id.to_string(),
            PendingToolCall {
                call_id: call_id.to_string(),
                previous_item_id: previous_item_id.to_string(),
            },
        );
        true
    }

    pub fn get(&self, call_id: &str) -> Option<&PendingToolCall> {
        self.calls.get(call_id)
    }

    /// Remove every call, returning how many were pending.
    pub fn clear(&mut self) -> usize {
        let count = self.calls.len();
        self.calls.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}
