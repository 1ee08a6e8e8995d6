use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::UserId;
use crate::{Error, Result};

/// Maximum length of a profile bio, in characters.
pub const MAX_BIO_CHARS: usize = 500;

/// A registered account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub bio: String,
    /// Opaque reference to a profile picture, if one was uploaded.
    pub avatar: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Registration data for a new account.
///
/// # Examples
///
/// ```
/// use quire::NewUser;
///
/// let user = NewUser::new("ada", "ada@example.com").bio("Writes about engines");
/// assert_eq!(user.username, "ada");
/// assert!(user.validate().is_ok());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub bio: String,
    pub avatar: Option<String>,
}

impl NewUser {
    pub fn new(username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            ..Default::default()
        }
    }

    pub fn bio(mut self, bio: impl Into<String>) -> Self {
        self.bio = bio.into();
        self
    }

    pub fn avatar(mut self, avatar: impl Into<String>) -> Self {
        self.avatar = Some(avatar.into());
        self
    }

    /// Checks the fields that the database cannot check for us.
    pub fn validate(&self) -> Result<()> {
        let username = self.username.trim();
        if username.is_empty() {
            return Err(Error::Validation("username cannot be empty".into()));
        }
        if username.chars().any(char::is_whitespace) {
            return Err(Error::Validation(
                "username cannot contain whitespace".into(),
            ));
        }
        validate_email(&self.email)?;
        validate_bio(&self.bio)
    }
}

pub(crate) fn validate_bio(bio: &str) -> Result<()> {
    if bio.chars().count() > MAX_BIO_CHARS {
        return Err(Error::Validation(format!(
            "bio is limited to {MAX_BIO_CHARS} characters"
        )));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<()> {
    let email = email.trim();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    };
    if !valid {
        return Err(Error::Validation(format!(
            "{email:?} is not a valid email address"
        )));
    }
    Ok(())
}
