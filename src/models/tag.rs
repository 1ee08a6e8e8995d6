use serde::{Deserialize, Serialize};

use super::{SubTagId, TagId, UserId};
use crate::{Error, Result};

/// Maximum length of a tag name, in characters.
pub const MAX_TAG_CHARS: usize = 100;

/// A site-wide category. Names are unique ignoring case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MainTag {
    pub id: TagId,
    pub name: String,
}

/// A category created by one user for their own posts.
///
/// Names only need to be unique within the owner's sub-tags.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubTag {
    pub id: SubTagId,
    pub name: String,
    pub owner_id: UserId,
}

/// Trims a tag name and checks it is usable.
pub(crate) fn normalize_tag_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation("tag name cannot be empty".into()));
    }
    if trimmed.chars().count() > MAX_TAG_CHARS {
        return Err(Error::Validation(format!(
            "tag names are limited to {MAX_TAG_CHARS} characters"
        )));
    }
    Ok(trimmed.to_string())
}
