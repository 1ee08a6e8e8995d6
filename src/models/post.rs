use std::fmt;
use std::str::FromStr;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{PostId, SubTagId, TagId, UserId};
use crate::{Error, Result};

/// Maximum length of a post title, in characters.
pub const MAX_TITLE_CHARS: usize = 200;

/// Publication state of a post. Only published posts show up in feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    #[default]
    Draft,
    Published,
}

impl PostStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
        }
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "draft" => Ok(Self::Draft),
            "published" => Ok(Self::Published),
            other => Err(Error::InvalidStatus(other.to_string())),
        }
    }
}

impl ToSql for PostStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for PostStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// An authored article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub title: String,
    pub slug: String,
    pub author_id: UserId,
    pub content: String,
    pub excerpt: Option<String>,
    pub status: PostStatus,
    pub main_tag_id: TagId,
    pub sub_tag_id: Option<SubTagId>,
    pub featured_image: Option<String>,
    /// Denormalized count of comments, refreshed whenever comments change.
    pub comments_count: i64,
    /// Number of recorded reads.
    pub view_count: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Post {
    pub fn is_published(&self) -> bool {
        self.status == PostStatus::Published
    }
}

/// Fields for a post about to be created.
///
/// # Examples
///
/// ```
/// use quire::{NewPost, PostStatus, TagId};
///
/// let post = NewPost::new("Hello", "First post", TagId::new(1)).publish();
/// assert_eq!(post.status, PostStatus::Published);
/// assert!(post.sub_tag.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub main_tag: TagId,
    pub sub_tag: Option<SubTagId>,
    pub status: PostStatus,
    pub excerpt: Option<String>,
    pub featured_image: Option<String>,
}

impl NewPost {
    /// Creates a draft with the required fields.
    pub fn new(title: impl Into<String>, content: impl Into<String>, main_tag: TagId) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            main_tag,
            sub_tag: None,
            status: PostStatus::Draft,
            excerpt: None,
            featured_image: None,
        }
    }

    pub fn sub_tag(mut self, sub_tag: SubTagId) -> Self {
        self.sub_tag = Some(sub_tag);
        self
    }

    pub fn status(mut self, status: PostStatus) -> Self {
        self.status = status;
        self
    }

    /// Shorthand for `status(PostStatus::Published)`.
    pub fn publish(self) -> Self {
        self.status(PostStatus::Published)
    }

    pub fn excerpt(mut self, excerpt: impl Into<String>) -> Self {
        self.excerpt = Some(excerpt.into());
        self
    }

    pub fn featured_image(mut self, image: impl Into<String>) -> Self {
        self.featured_image = Some(image.into());
        self
    }
}

/// Partial update of a post. `None` leaves a field unchanged.
///
/// `sub_tag` and `excerpt` are doubly optional so they can be cleared:
/// `Some(None)` removes the value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
    pub status: Option<PostStatus>,
    pub main_tag: Option<TagId>,
    pub sub_tag: Option<Option<SubTagId>>,
    pub excerpt: Option<Option<String>>,
    pub featured_image: Option<Option<String>>,
}

pub(crate) fn validate_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(Error::Validation("post title cannot be empty".into()));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(Error::Validation(format!(
            "post titles are limited to {MAX_TITLE_CHARS} characters"
        )));
    }
    Ok(())
}

/// Lowercase, ASCII-alphanumeric slug with single dashes between words.
///
/// Falls back to `"post"` when the title has no usable characters.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("post");
    }
    slug
}
