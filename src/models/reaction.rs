use std::fmt;
use std::str::FromStr;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{CommentId, PostId, UserId};
use crate::{Error, Result};

/// The value of a reaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionKind {
    Upvote,
    Downvote,
}

impl ReactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Upvote => "upvote",
            Self::Downvote => "downvote",
        }
    }
}

impl fmt::Display for ReactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReactionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "upvote" => Ok(Self::Upvote),
            "downvote" => Ok(Self::Downvote),
            other => Err(Error::InvalidReactionKind(other.to_string())),
        }
    }
}

impl ToSql for ReactionKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ReactionKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// Discriminant of a reaction subject, stored alongside the subject id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectKind {
    Post,
    Comment,
}

impl SubjectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Comment => "comment",
        }
    }

    /// Table holding the rows this kind points at.
    pub(crate) fn table(self) -> &'static str {
        match self {
            Self::Post => "posts",
            Self::Comment => "comments",
        }
    }

    /// Pairs this kind with a raw id.
    pub fn subject(self, id: i64) -> Subject {
        match self {
            Self::Post => Subject::Post(PostId::new(id)),
            Self::Comment => Subject::Comment(CommentId::new(id)),
        }
    }
}

impl fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubjectKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "post" => Ok(Self::Post),
            "comment" => Ok(Self::Comment),
            other => Err(Error::InvalidSubjectKind(other.to_string())),
        }
    }
}

impl ToSql for SubjectKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for SubjectKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// Something a user can react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Subject {
    Post(PostId),
    Comment(CommentId),
}

impl Subject {
    pub fn kind(self) -> SubjectKind {
        match self {
            Self::Post(_) => SubjectKind::Post,
            Self::Comment(_) => SubjectKind::Comment,
        }
    }

    pub fn id(self) -> i64 {
        match self {
            Self::Post(id) => id.get(),
            Self::Comment(id) => id.get(),
        }
    }

    /// Parses a `(kind, id)` pair as received from a request.
    ///
    /// # Examples
    ///
    /// ```
    /// use quire::{PostId, Subject};
    ///
    /// assert_eq!(Subject::parse("post", 3).unwrap(), Subject::Post(PostId::new(3)));
    /// assert!(Subject::parse("photo", 3).is_err());
    /// ```
    pub fn parse(kind: &str, id: i64) -> Result<Self> {
        Ok(kind.parse::<SubjectKind>()?.subject(id))
    }
}

impl From<PostId> for Subject {
    fn from(id: PostId) -> Self {
        Self::Post(id)
    }
}

impl From<CommentId> for Subject {
    fn from(id: CommentId) -> Self {
        Self::Comment(id)
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.id())
    }
}

/// A stored reaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub user_id: UserId,
    pub subject: Subject,
    pub kind: ReactionKind,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Tally of reactions on one subject.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionCounts {
    pub upvotes: i64,
    pub downvotes: i64,
}

impl ReactionCounts {
    /// Upvotes minus downvotes.
    pub fn score(&self) -> i64 {
        self.upvotes - self.downvotes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_kind_rejects_unknown_kinds() {
        assert_eq!("post".parse::<SubjectKind>().unwrap(), SubjectKind::Post);
        assert_eq!(
            "comment".parse::<SubjectKind>().unwrap(),
            SubjectKind::Comment
        );
        assert!(matches!(
            "Post".parse::<SubjectKind>(),
            Err(Error::InvalidSubjectKind(kind)) if kind == "Post"
        ));
    }

    #[test]
    fn reaction_kind_rejects_unknown_values() {
        assert_eq!(
            "downvote".parse::<ReactionKind>().unwrap(),
            ReactionKind::Downvote
        );
        assert!(matches!(
            "like".parse::<ReactionKind>(),
            Err(Error::InvalidReactionKind(_))
        ));
    }

    #[test]
    fn subject_serializes_as_tagged_pair() {
        let json = serde_json::to_string(&Subject::Comment(CommentId::new(4))).unwrap();
        assert_eq!(json, r#"{"kind":"comment","id":4}"#);

        let back: Subject = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Subject::Comment(CommentId::new(4)));
    }

    #[test]
    fn subject_maps_to_storage_table() {
        assert_eq!(Subject::Post(PostId::new(1)).kind().table(), "posts");
        assert_eq!(Subject::Comment(CommentId::new(1)).kind().table(), "comments");
    }

    #[test]
    fn score_subtracts_downvotes() {
        let counts = ReactionCounts {
            upvotes: 5,
            downvotes: 7,
        };
        assert_eq!(counts.score(), -2);
    }
}
