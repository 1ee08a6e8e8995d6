use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Declares a typed wrapper around a database row id.
///
/// Each id is its own type so a `PostId` can never be passed where a
/// `CommentId` is expected, even though both are `i64` underneath.
macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Creates a new id.
            pub fn new(id: i64) -> Self {
                Self(id)
            }

            /// Returns the underlying id value.
            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.0))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                i64::column_result(value).map(Self)
            }
        }
    };
}

row_id!(
    /// Unique identifier for a user.
    UserId
);
row_id!(
    /// Unique identifier for a post.
    PostId
);
row_id!(
    /// Unique identifier for a comment.
    CommentId
);
row_id!(
    /// Unique identifier for a main tag.
    TagId
);
row_id!(
    /// Unique identifier for a user-owned sub-tag.
    SubTagId
);
