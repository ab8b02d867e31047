//! Single source of truth for post state
//!
//! Every feed synchronizer shares one `PostStore`, so a like applied through
//! the home feed is immediately visible in a profile feed showing the same
//! post. Each method is one critical section under a synchronous lock.
//!
//! Optimistic edits stay registered under their mutation id until the
//! backend answers. A server copy arriving in the meantime gets the pending
//! edits re-applied on top, so a reload never hides an in-flight change.

use crate::models::{Comment, Like, Post};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

/// Result of an insert-if-absent / remove-if-present like change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LikeChange {
    /// The like set changed; carries the inserted or removed like
    Applied(Like),
    /// The like set already had the requested shape
    Unchanged,
    /// The post is not loaded
    Missing,
}

#[derive(Debug, Clone)]
enum LocalEdit {
    AddLike(Like),
    RemoveLike(Like),
    AddComment(Comment),
}

impl LocalEdit {
    fn apply(&self, post: &mut Post) {
        match self {
            LocalEdit::AddLike(like) => {
                if !post.is_liked_by(like.account_id) {
                    post.likes.push(like.clone());
                }
            }
            LocalEdit::RemoveLike(like) => post.likes.retain(|l| l.account_id != like.account_id),
            LocalEdit::AddComment(comment) => {
                if !post.comments.iter().any(|c| c.id == comment.id) {
                    post.comments.push(comment.clone());
                }
            }
        }
    }

    fn revert(self, post: &mut Post) {
        match self {
            LocalEdit::AddLike(like) => post.likes.retain(|l| l.id != like.id),
            LocalEdit::RemoveLike(like) => {
                if !post.is_liked_by(like.account_id) {
                    post.likes.push(like);
                }
            }
            LocalEdit::AddComment(comment) => post.comments.retain(|c| c.id != comment.id),
        }
    }
}

#[derive(Debug)]
struct PendingEdit {
    mutation_id: Uuid,
    post_id: Uuid,
    edit: LocalEdit,
}

#[derive(Default)]
struct Inner {
    posts: HashMap<Uuid, Post>,
    /// Unsettled edits in the order they were applied
    pending: Vec<PendingEdit>,
}

impl Inner {
    fn take_pending(&mut self, mutation_id: Uuid) -> Option<PendingEdit> {
        let index = self.pending.iter().position(|p| p.mutation_id == mutation_id)?;
        Some(self.pending.remove(index))
    }
}

#[derive(Default)]
pub struct PostStore {
    inner: RwLock<Inner>,
}

impl PostStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace posts with the backend's version, keeping unsettled local edits
    pub fn upsert_many(&self, posts: impl IntoIterator<Item = Post>) {
        let mut guard = self.inner.write();
        let Inner { posts: stored, pending } = &mut *guard;
        for mut post in posts {
            let post_id = post.id;
            for edit in pending.iter().filter(|p| p.post_id == post_id) {
                edit.edit.apply(&mut post);
            }
            stored.insert(post.id, post);
        }
    }

    pub fn get(&self, post_id: Uuid) -> Option<Post> {
        self.inner.read().posts.get(&post_id).cloned()
    }

    /// Posts for the given ids, in order, skipping unknown ids
    pub fn snapshot(&self, ids: &[Uuid]) -> Vec<Post> {
        let guard = self.inner.read();
        ids.iter().filter_map(|id| guard.posts.get(id).cloned()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().posts.is_empty()
    }

    /// Drop every post and forget unsettled edits
    pub fn clear(&self) {
        let mut guard = self.inner.write();
        guard.posts.clear();
        guard.pending.clear();
    }

    /// Add `like` unless its account already likes the post
    pub fn add_like(&self, post_id: Uuid, like: Like, mutation_id: Uuid) -> LikeChange {
        let mut guard = self.inner.write();
        let Some(post) = guard.posts.get_mut(&post_id) else {
            return LikeChange::Missing;
        };
        if post.is_liked_by(like.account_id) {
            return LikeChange::Unchanged;
        }
        post.likes.push(like.clone());
        guard.pending.push(PendingEdit {
            mutation_id,
            post_id,
            edit: LocalEdit::AddLike(like.clone()),
        });
        LikeChange::Applied(like)
    }

    /// Remove the account's like, if any
    pub fn remove_like(&self, post_id: Uuid, account_id: Uuid, mutation_id: Uuid) -> LikeChange {
        let mut guard = self.inner.write();
        let Some(post) = guard.posts.get_mut(&post_id) else {
            return LikeChange::Missing;
        };
        let Some(index) = post.likes.iter().position(|l| l.account_id == account_id) else {
            return LikeChange::Unchanged;
        };
        let removed = post.likes.remove(index);
        guard.pending.push(PendingEdit {
            mutation_id,
            post_id,
            edit: LocalEdit::RemoveLike(removed.clone()),
        });
        LikeChange::Applied(removed)
    }

    /// Append a comment; returns `false` when the post is not loaded
    pub fn append_comment(&self, post_id: Uuid, comment: Comment, mutation_id: Uuid) -> bool {
        let mut guard = self.inner.write();
        let Some(post) = guard.posts.get_mut(&post_id) else {
            return false;
        };
        post.comments.push(comment.clone());
        guard.pending.push(PendingEdit {
            mutation_id,
            post_id,
            edit: LocalEdit::AddComment(comment),
        });
        true
    }

    /// Swap a pending comment's client-generated identity for the backend's
    pub fn adopt_comment_identity(&self, mutation_id: Uuid, canonical_id: Uuid, created_at: Option<DateTime<Utc>>) {
        let mut guard = self.inner.write();
        let Inner { posts, pending } = &mut *guard;
        let Some(PendingEdit {
            post_id,
            edit: LocalEdit::AddComment(pending_comment),
            ..
        }) = pending.iter_mut().find(|p| p.mutation_id == mutation_id)
        else {
            return;
        };

        if let Some(comment) = posts
            .get_mut(&*post_id)
            .and_then(|post| post.comments.iter_mut().find(|c| c.id == pending_comment.id))
        {
            comment.id = canonical_id;
            if created_at.is_some() {
                comment.created_at = created_at;
            }
        }
        pending_comment.id = canonical_id;
        if created_at.is_some() {
            pending_comment.created_at = created_at;
        }
    }

    /// The backend accepted the edit; the current local state stands
    pub fn confirm(&self, mutation_id: Uuid) {
        self.inner.write().take_pending(mutation_id);
    }

    /// The backend rejected the edit; undo it on the stored post
    pub fn rollback(&self, mutation_id: Uuid) {
        let mut guard = self.inner.write();
        let Some(PendingEdit { post_id, edit, .. }) = guard.take_pending(mutation_id) else {
            return;
        };
        if let Some(post) = guard.posts.get_mut(&post_id) {
            edit.revert(post);
        }
    }
}
