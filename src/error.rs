use thiserror::Error;

/// Errors returned by the quire library.
#[derive(Debug, Error)]
pub enum Error {
    /// A reaction subject kind other than `post` or `comment`.
    #[error("Invalid subject kind: {0:?} (expected \"post\" or \"comment\")")]
    InvalidSubjectKind(String),

    /// A reaction value other than `upvote` or `downvote`.
    #[error("Invalid reaction: {0:?} (expected \"upvote\" or \"downvote\")")]
    InvalidReactionKind(String),

    /// A post status other than `draft` or `published`.
    #[error("Invalid post status: {0:?} (expected \"draft\" or \"published\")")]
    InvalidStatus(String),

    /// The referenced record does not exist, or is not owned by the acting user.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// Input rejected before touching the database.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// A user tried to follow or unfollow themselves.
    #[error("Users cannot follow themselves")]
    SelfFollow,

    /// A unique value is already taken.
    #[error("{0} is already taken")]
    Duplicate(String),

    /// A write conflict that persisted after replaying the operation.
    #[error("Write conflict, try again: {0}")]
    Transient(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Invalid timestamp: {0}")]
    Timestamp(#[from] time::error::ComponentRange),
}

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// True for errors caused by the caller's input rather than the system.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidSubjectKind(_)
                | Self::InvalidReactionKind(_)
                | Self::InvalidStatus(_)
                | Self::NotFound { .. }
                | Self::Validation(_)
                | Self::SelfFollow
                | Self::Duplicate(_)
        )
    }

    /// True when replaying the failed write may succeed.
    ///
    /// Covers lock contention and unique-key violations raised by a
    /// concurrent writer inserting the same row first. Other constraint
    /// failures (CHECK, foreign keys) are not conflicts.
    pub fn is_conflict(&self) -> bool {
        match self {
            Self::Transient(_) => true,
            Self::Database(rusqlite::Error::SqliteFailure(err, _)) => {
                matches!(
                    err.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                ) || matches!(
                    err.extended_code,
                    rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                        | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                )
            }
            _ => false,
        }
    }
}

/// Maps a unique-constraint failure on insert to [`Error::Duplicate`].
pub(crate) fn map_unique(err: rusqlite::Error, what: &str) -> Error {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            Error::Duplicate(what.to_string())
        }
        _ => Error::Database(err),
    }
}
