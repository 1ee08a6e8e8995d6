use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{CommentId, PostId, UserId};
use crate::{Error, Result};

/// Maximum length of a comment, in characters.
pub const MAX_COMMENT_CHARS: usize = 500;

/// A comment on a post, optionally replying to another comment on the same post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub post_id: PostId,
    pub author_id: UserId,
    pub parent_id: Option<CommentId>,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Comment {
    pub fn is_reply(&self) -> bool {
        self.parent_id.is_some()
    }
}

/// A comment together with its replies, oldest first.
///
/// Reply chains can be arbitrarily deep, so walking and dropping a node
/// never recurses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentNode {
    pub comment: Comment,
    pub replies: Vec<CommentNode>,
}

impl CommentNode {
    /// Number of comments in this subtree, including this one.
    pub fn subtree_size(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(&node.replies);
        }
        count
    }
}

impl Drop for CommentNode {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.replies);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.replies);
        }
    }
}

/// Arranges a post's comments into reply trees.
///
/// `comments` must be in creation order; that order is kept among siblings.
/// A comment whose parent is missing from the slice is treated as top-level.
pub fn build_thread(comments: Vec<Comment>) -> Vec<CommentNode> {
    let present: HashSet<CommentId> = comments.iter().map(|c| c.id).collect();
    let mut children: HashMap<CommentId, Vec<usize>> = HashMap::new();
    let mut roots = Vec::new();

    for (idx, comment) in comments.iter().enumerate() {
        match comment.parent_id {
            Some(parent) if present.contains(&parent) => {
                children.entry(parent).or_default().push(idx);
            }
            _ => roots.push(idx),
        }
    }

    // Pre-order walk. Reversed, every reply comes before its parent.
    let mut order = Vec::with_capacity(comments.len());
    let mut stack: Vec<usize> = roots.iter().rev().copied().collect();
    while let Some(idx) = stack.pop() {
        order.push(idx);
        if let Some(replies) = children.get(&comments[idx].id) {
            stack.extend(replies.iter().rev());
        }
    }

    let mut slots: Vec<Option<Comment>> = comments.into_iter().map(Some).collect();
    let mut built: HashMap<usize, CommentNode> = HashMap::new();
    for idx in order.into_iter().rev() {
        let Some(comment) = slots[idx].take() else {
            continue;
        };
        let replies = children
            .remove(&comment.id)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|reply| built.remove(&reply))
            .collect();
        built.insert(idx, CommentNode { comment, replies });
    }

    roots
        .into_iter()
        .filter_map(|idx| built.remove(&idx))
        .collect()
}

pub(crate) fn validate_comment(content: &str) -> Result<()> {
    if content.trim().is_empty() {
        return Err(Error::Validation("comment cannot be empty".into()));
    }
    if content.chars().count() > MAX_COMMENT_CHARS {
        return Err(Error::Validation(format!(
            "comments are limited to {MAX_COMMENT_CHARS} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment(id: i64, parent: Option<i64>) -> Comment {
        Comment {
            id: CommentId::new(id),
            post_id: PostId::new(1),
            author_id: UserId::new(1),
            parent_id: parent.map(CommentId::new),
            content: format!("comment {id}"),
            created_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn build_thread_nests_replies_in_order() {
        let thread = build_thread(vec![
            comment(1, None),
            comment(2, Some(1)),
            comment(3, None),
            comment(4, Some(2)),
            comment(5, Some(1)),
        ]);

        assert_eq!(thread.len(), 2);
        assert_eq!(thread[0].comment.id, CommentId::new(1));
        assert_eq!(thread[0].subtree_size(), 4);

        let replies: Vec<i64> = thread[0]
            .replies
            .iter()
            .map(|n| n.comment.id.get())
            .collect();
        assert_eq!(replies, vec![2, 5]);
        assert_eq!(thread[0].replies[0].replies[0].comment.id, CommentId::new(4));
        assert!(thread[1].replies.is_empty());
    }

    #[test]
    fn orphaned_reply_becomes_top_level() {
        let thread = build_thread(vec![comment(7, Some(99))]);
        assert_eq!(thread.len(), 1);
        assert!(thread[0].comment.is_reply());
    }

    #[test]
    fn deep_reply_chain_builds_and_drops_without_recursion() {
        const DEPTH: i64 = 50_000;
        let chain: Vec<Comment> = (1..=DEPTH)
            .map(|id| comment(id, (id > 1).then(|| id - 1)))
            .collect();

        let thread = build_thread(chain);

        assert_eq!(thread.len(), 1);
        assert_eq!(thread[0].subtree_size(), DEPTH as usize);

        let mut node = &thread[0];
        let mut depth = 1;
        while let Some(reply) = node.replies.first() {
            assert_eq!(reply.comment.parent_id, Some(node.comment.id));
            node = reply;
            depth += 1;
        }
        assert_eq!(depth, DEPTH);
        assert_eq!(node.comment.id, CommentId::new(DEPTH));
    }

    #[test]
    fn comment_validation() {
        assert!(validate_comment("nice post").is_ok());
        assert!(validate_comment("  ").is_err());
        assert!(validate_comment(&"x".repeat(MAX_COMMENT_CHARS + 1)).is_err());
    }
}
