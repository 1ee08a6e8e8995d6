use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{MainTag, PostId, UserId};

/// One recorded read of a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub user_id: UserId,
    pub post_id: PostId,
    #[serde(with = "time::serde::rfc3339")]
    pub viewed_at: OffsetDateTime,
}

/// A post saved for later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadLaterEntry {
    pub user_id: UserId,
    pub post_id: PostId,
    #[serde(with = "time::serde::rfc3339")]
    pub added_on: OffsetDateTime,
}

/// A user's preferred main tags.
///
/// Not every user has one; callers treat a missing record as an empty set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPreference {
    pub user_id: UserId,
    pub preferred_tags: Vec<MainTag>,
}
