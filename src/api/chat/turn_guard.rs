//! Per-conversation single-flight guard.
//!
//! Two concurrent turns on one conversation would interleave message
//! ordering and deduct against a stale balance read, so the second request
//! is rejected up front with a conflict instead.

use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::sync::Mutex;
use uuid::Uuid;

static ACTIVE_TURNS: Lazy<Mutex<HashSet<Uuid>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// Held for the duration of one turn; released on drop.
#[derive(Debug)]
pub struct TurnGuard {
    conversation_id: Uuid,
}

pub fn try_begin_turn(conversation_id: Uuid) -> Option<TurnGuard> {
    let mut active = ACTIVE_TURNS.lock().expect("turn guard lock poisoned");
    if active.insert(conversation_id) {
        Some(TurnGuard { conversation_id })
    } else {
        None
    }
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        if let Ok(mut active) = ACTIVE_TURNS.lock() {
            active.remove(&self.conversation_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_concurrent_turn_is_rejected() {
        let conversation_id = Uuid::new_v4();

        let guard = try_begin_turn(conversation_id).expect("first turn");
        assert!(try_begin_turn(conversation_id).is_none());

        drop(guard);
        assert!(try_begin_turn(conversation_id).is_some());
    }

    #[test]
    fn different_conversations_run_in_parallel() {
        let a = try_begin_turn(Uuid::new_v4());
        let b = try_begin_turn(Uuid::new_v4());
        assert!(a.is_some());
        assert!(b.is_some());
    }
}
