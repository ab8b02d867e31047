//! Optimistic mutation lifecycle
//!
//! A mutation is applied locally as `Pending`, then settles as `Confirmed`
//! when the backend accepts it or `Failed` once it has been rolled back.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use uuid::Uuid;

const LOG_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Like,
    Unlike,
    Comment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
    Pending,
    Confirmed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub id: Uuid,
    pub post_id: Uuid,
    pub kind: MutationKind,
    pub state: MutationState,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
}

/// Bounded record of recent mutations, oldest first
#[derive(Debug, Default)]
pub struct MutationLog {
    entries: VecDeque<Mutation>,
}

impl MutationLog {
    /// Record a freshly applied mutation as `Pending`
    pub fn begin(&mut self, id: Uuid, post_id: Uuid, kind: MutationKind) {
        if self.entries.len() == LOG_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(Mutation {
            id,
            post_id,
            kind,
            state: MutationState::Pending,
            error: None,
            started_at: Utc::now(),
        });
    }

    pub fn confirm(&mut self, id: Uuid) -> Option<Mutation> {
        self.settle(id, MutationState::Confirmed, None)
    }

    pub fn fail(&mut self, id: Uuid, error: impl ToString) -> Option<Mutation> {
        self.settle(id, MutationState::Failed, Some(error.to_string()))
    }

    pub fn get(&self, id: Uuid) -> Option<Mutation> {
        self.entries.iter().find(|m| m.id == id).cloned()
    }

    pub fn snapshot(&self) -> Vec<Mutation> {
        self.entries.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn settle(&mut self, id: Uuid, state: MutationState, error: Option<String>) -> Option<Mutation> {
        let entry = self.entries.iter_mut().find(|m| m.id == id)?;
        entry.state = state;
        entry.error = error;
        Some(entry.clone())
    }
}
