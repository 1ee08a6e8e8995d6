use rusqlite::Connection;
use tracing::debug;

use super::{
    BlogService, COMMENT_COLUMNS, comment_from_row, query_all, query_opt, require_user, row_exists,
};
use crate::db::now;
use crate::models::validate_comment;
use crate::{Comment, CommentId, CommentNode, Error, PostId, Result, UserId, build_thread};

impl BlogService {
    /// Adds a comment to `post`, optionally replying to `parent`.
    ///
    /// The parent must be a comment on the same post. The post's
    /// `comments_count` is refreshed in the same transaction.
    ///
    /// # Examples
    ///
    /// ```
    /// use quire::{BlogService, Database, NewPost, NewUser};
    ///
    /// # fn main() -> quire::Result<()> {
    /// let service = BlogService::new(Database::in_memory()?);
    /// let ada = service.register_user(NewUser::new("ada", "ada@example.com"))?;
    /// let tag = service.get_or_create_main_tag("rust")?;
    /// let post = service.create_post(ada.id, NewPost::new("Hello", "...", tag.id).publish())?;
    ///
    /// let top = service.add_comment(ada.id, post.id, "First!", None)?;
    /// let reply = service.add_comment(ada.id, post.id, "Replying to myself", Some(top.id))?;
    /// assert!(reply.is_reply());
    /// assert_eq!(service.get_post(post.id)?.unwrap().comments_count, 2);
    /// # Ok(())
    /// # }
    /// ```
    pub fn add_comment(
        &self,
        author: UserId,
        post: PostId,
        content: &str,
        parent: Option<CommentId>,
    ) -> Result<Comment> {
        validate_comment(content)?;
        let created_at = now()?;

        let comment = self.db.immediate(|conn| {
            require_user(conn, author)?;
            if !row_exists(conn, "posts", post.get())? {
                return Err(Error::not_found("post", post));
            }
            if let Some(parent_id) = parent {
                let parent_comment = fetch_comment(conn, parent_id)?
                    .ok_or_else(|| Error::not_found("comment", parent_id))?;
                if parent_comment.post_id != post {
                    return Err(Error::Validation(format!(
                        "comment {parent_id} belongs to a different post"
                    )));
                }
            }

            conn.execute(
                "INSERT INTO comments (post_id, author_id, parent_id, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![post, author, parent, content, created_at.unix_timestamp()],
            )?;
            let id = CommentId::new(conn.last_insert_rowid());
            refresh_comments_count(conn, post)?;

            Ok(Comment {
                id,
                post_id: post,
                author_id: author,
                parent_id: parent,
                content: content.to_string(),
                created_at,
            })
        })?;

        debug!(comment = %comment.id, post = %post, reply = comment.is_reply(), "added comment");
        Ok(comment)
    }

    /// Retrieves a comment by id.
    pub fn get_comment(&self, id: CommentId) -> Result<Option<Comment>> {
        fetch_comment(self.db.connection(), id)
    }

    /// Replaces the text of a comment written by `author`.
    pub fn update_comment(&self, author: UserId, id: CommentId, content: &str) -> Result<Comment> {
        validate_comment(content)?;
        let conn = self.db.connection();

        let updated = conn.execute(
            "UPDATE comments SET content = ?1 WHERE id = ?2 AND author_id = ?3",
            rusqlite::params![content, id, author],
        )?;
        if updated == 0 {
            return Err(Error::not_found("comment", id));
        }

        fetch_comment(conn, id)?.ok_or_else(|| Error::not_found("comment", id))
    }

    /// Deletes a comment written by `author`, together with its replies.
    pub fn delete_comment(&self, author: UserId, id: CommentId) -> Result<()> {
        self.db.immediate(|conn| {
            let post: PostId = query_opt(
                conn,
                "SELECT post_id FROM comments WHERE id = ?1 AND author_id = ?2",
                rusqlite::params![id, author],
                |row| row.get(0),
            )?
            .ok_or_else(|| Error::not_found("comment", id))?;

            conn.execute("DELETE FROM comments WHERE id = ?1", [id])?;
            refresh_comments_count(conn, post)
        })
    }

    /// The comments on `post` arranged as reply trees, oldest first.
    pub fn comment_thread(&self, post: PostId) -> Result<Vec<CommentNode>> {
        let comments = query_all(
            self.db.connection(),
            &format!(
                "SELECT {COMMENT_COLUMNS} FROM comments c WHERE c.post_id = ?1
                 ORDER BY c.created_at, c.id"
            ),
            [post],
            comment_from_row,
        )?;
        Ok(build_thread(comments))
    }

    /// Every comment written by `author`, newest first.
    pub fn user_comments(&self, author: UserId) -> Result<Vec<Comment>> {
        query_all(
            self.db.connection(),
            &format!(
                "SELECT {COMMENT_COLUMNS} FROM comments c WHERE c.author_id = ?1
                 ORDER BY c.created_at DESC, c.id DESC"
            ),
            [author],
            comment_from_row,
        )
    }
}

fn fetch_comment(conn: &Connection, id: CommentId) -> Result<Option<Comment>> {
    query_opt(
        conn,
        &format!("SELECT {COMMENT_COLUMNS} FROM comments c WHERE c.id = ?1"),
        [id],
        comment_from_row,
    )
}

/// Recounts the comments on `post` into its denormalized counter.
fn refresh_comments_count(conn: &Connection, post: PostId) -> Result<()> {
    conn.execute(
        "UPDATE posts SET comments_count = (SELECT COUNT(*) FROM comments WHERE post_id = ?1)
         WHERE id = ?1",
        [post],
    )?;
    Ok(())
}
