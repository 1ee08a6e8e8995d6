pub mod config;
pub mod db;
mod error;
pub mod models;
mod service;

pub use config::Config;
pub use db::Database;
pub use error::{Error, Result};
pub use models::{
    Comment, CommentId, CommentNode, HistoryEntry, MAX_BIO_CHARS, MAX_COMMENT_CHARS, MAX_TAG_CHARS,
    MAX_TITLE_CHARS, MainTag, NewPost, NewUser, Post, PostId, PostStatus, PostUpdate,
    ReadLaterEntry, Reaction, ReactionCounts, ReactionKind, Subject, SubjectKind, SubTag, SubTagId,
    TagId, User, UserId, UserPreference, build_thread, slugify,
};
pub use service::{BlogService, FEED_LIMIT, TRENDING_AUTHOR_LIMIT, dedupe_by_key};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_accessible_from_crate_root() {
        let db = Database::in_memory();
        assert!(db.is_ok());
    }

    #[test]
    fn types_accessible_from_crate_root() {
        let subject: Subject = PostId::new(3).into();
        assert_eq!(subject.kind(), SubjectKind::Post);
        assert_eq!(format!("{}", ReactionKind::Upvote), "upvote");

        let post = NewPost::new("Hello", "body", TagId::new(1)).publish();
        assert_eq!(post.status, PostStatus::Published);

        let service = BlogService::new(Database::in_memory().expect("in-memory database"));
        assert!(service.list_main_tags().expect("list tags").is_empty());
    }
}
