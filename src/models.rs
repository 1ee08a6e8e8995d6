mod comment;
mod ids;
mod post;
mod reaction;
mod reading;
mod tag;
mod user;

pub use comment::{Comment, CommentNode, MAX_COMMENT_CHARS, build_thread};
pub use ids::{CommentId, PostId, SubTagId, TagId, UserId};
pub use post::{MAX_TITLE_CHARS, NewPost, Post, PostStatus, PostUpdate, slugify};
pub use reaction::{Reaction, ReactionCounts, ReactionKind, Subject, SubjectKind};
pub use reading::{HistoryEntry, ReadLaterEntry, UserPreference};
pub use tag::{MAX_TAG_CHARS, MainTag, SubTag};
pub use user::{MAX_BIO_CHARS, NewUser, User};

pub(crate) use comment::validate_comment;
pub(crate) use post::validate_title;
pub(crate) use tag::normalize_tag_name;
pub(crate) use user::validate_bio;
