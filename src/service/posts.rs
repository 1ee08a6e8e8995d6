use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use super::tags::sub_tag_from_row;
use super::{
    BlogService, POST_COLUMNS, fetch_post, post_from_row, query_all, query_opt, require_user,
    row_exists,
};
use crate::db::now;
use crate::models::validate_title;
use crate::{Error, NewPost, Post, PostId, PostUpdate, Result, SubTagId, TagId, UserId, slugify};

impl BlogService {
    /// Creates a post by `author`.
    ///
    /// The slug is derived from the title; when it is taken a numeric
    /// suffix is appended (`hello`, `hello-2`, `hello-3`, ...). A sub-tag,
    /// if given, must belong to the author.
    ///
    /// # Examples
    ///
    /// ```
    /// use quire::{BlogService, Database, NewPost, NewUser};
    ///
    /// # fn main() -> quire::Result<()> {
    /// let service = BlogService::new(Database::in_memory()?);
    /// let ada = service.register_user(NewUser::new("ada", "ada@example.com"))?;
    /// let rust = service.get_or_create_main_tag("rust")?;
    ///
    /// let first = service.create_post(ada.id, NewPost::new("Hello", "...", rust.id))?;
    /// let second = service.create_post(ada.id, NewPost::new("Hello", "again", rust.id))?;
    /// assert_eq!(first.slug, "hello");
    /// assert_eq!(second.slug, "hello-2");
    /// # Ok(())
    /// # }
    /// ```
    pub fn create_post(&self, author: UserId, post: NewPost) -> Result<Post> {
        validate_title(&post.title)?;
        validate_content(&post.content)?;
        let title = post.title.trim().to_string();
        let ts = now()?.unix_timestamp();

        let created = self.db.immediate(|conn| {
            require_user(conn, author)?;
            check_tags(conn, author, post.main_tag, post.sub_tag)?;
            let slug = unique_slug(conn, &slugify(&title))?;

            conn.execute(
                "INSERT INTO posts (title, slug, author_id, content, excerpt, status,
                                    main_tag_id, sub_tag_id, featured_image, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
                rusqlite::params![
                    title,
                    slug,
                    author,
                    post.content,
                    post.excerpt,
                    post.status,
                    post.main_tag,
                    post.sub_tag,
                    post.featured_image,
                    ts
                ],
            )?;

            let id = PostId::new(conn.last_insert_rowid());
            fetch_post(conn, id)?.ok_or_else(|| Error::not_found("post", id))
        })?;

        info!(
            post = %created.id,
            author = %author,
            slug = %created.slug,
            status = %created.status,
            "created post"
        );
        Ok(created)
    }

    /// Retrieves a post by id. Returns `None` if it does not exist.
    pub fn get_post(&self, id: PostId) -> Result<Option<Post>> {
        fetch_post(self.db.connection(), id)
    }

    /// Retrieves a post by slug.
    pub fn get_post_by_slug(&self, slug: &str) -> Result<Option<Post>> {
        query_opt(
            self.db.connection(),
            &format!("SELECT {POST_COLUMNS} FROM posts p WHERE p.slug = ?1"),
            [slug],
            post_from_row,
        )
    }

    /// Applies `update` to a post owned by `author`.
    ///
    /// Fails with `NotFound` when the post does not exist or belongs to
    /// someone else. The slug is kept when the title changes so existing
    /// links stay valid.
    pub fn update_post(&self, author: UserId, id: PostId, update: PostUpdate) -> Result<Post> {
        if let Some(title) = &update.title {
            validate_title(title)?;
        }
        if let Some(content) = &update.content {
            validate_content(content)?;
        }
        let ts = now()?.unix_timestamp();

        self.db.immediate(|conn| {
            let mut post = fetch_post(conn, id)?
                .filter(|p| p.author_id == author)
                .ok_or_else(|| Error::not_found("post", id))?;

            if let Some(title) = update.title {
                post.title = title.trim().to_string();
            }
            if let Some(content) = update.content {
                post.content = content;
            }
            if let Some(status) = update.status {
                post.status = status;
            }
            if let Some(main_tag) = update.main_tag {
                post.main_tag_id = main_tag;
            }
            if let Some(sub_tag) = update.sub_tag {
                post.sub_tag_id = sub_tag;
            }
            if let Some(excerpt) = update.excerpt {
                post.excerpt = excerpt;
            }
            if let Some(image) = update.featured_image {
                post.featured_image = image;
            }
            check_tags(conn, author, post.main_tag_id, post.sub_tag_id)?;

            conn.execute(
                "UPDATE posts SET title = ?1, content = ?2, status = ?3, main_tag_id = ?4,
                        sub_tag_id = ?5, excerpt = ?6, featured_image = ?7, updated_at = ?8
                 WHERE id = ?9",
                rusqlite::params![
                    post.title,
                    post.content,
                    post.status,
                    post.main_tag_id,
                    post.sub_tag_id,
                    post.excerpt,
                    post.featured_image,
                    ts,
                    id
                ],
            )?;

            fetch_post(conn, id)?.ok_or_else(|| Error::not_found("post", id))
        })
    }

    /// Deletes a post owned by `author`, with its comments and reactions.
    pub fn delete_post(&self, author: UserId, id: PostId) -> Result<()> {
        let removed = self.db.connection().execute(
            "DELETE FROM posts WHERE id = ?1 AND author_id = ?2",
            rusqlite::params![id, author],
        )?;
        if removed == 0 {
            return Err(Error::not_found("post", id));
        }
        info!(post = %id, author = %author, "deleted post");
        Ok(())
    }

    /// Every post by `author`, drafts included, newest first.
    pub fn user_posts(&self, author: UserId) -> Result<Vec<Post>> {
        query_all(
            self.db.connection(),
            &format!(
                "SELECT {POST_COLUMNS} FROM posts p WHERE p.author_id = ?1
                 ORDER BY p.created_at DESC, p.id DESC"
            ),
            [author],
            post_from_row,
        )
    }
}

fn validate_content(content: &str) -> Result<()> {
    if content.trim().is_empty() {
        return Err(Error::Validation("post content cannot be empty".into()));
    }
    Ok(())
}

/// Checks the main tag exists and the sub-tag, if any, belongs to `author`.
fn check_tags(
    conn: &Connection,
    author: UserId,
    main_tag: TagId,
    sub_tag: Option<SubTagId>,
) -> Result<()> {
    if !row_exists(conn, "main_tags", main_tag.get())? {
        return Err(Error::not_found("main tag", main_tag));
    }

    if let Some(sub_tag) = sub_tag {
        let tag = conn
            .query_row(
                "SELECT id, name, owner_id FROM sub_tags WHERE id = ?1",
                [sub_tag],
                sub_tag_from_row,
            )
            .optional()?
            .ok_or_else(|| Error::not_found("sub-tag", sub_tag))?;
        if tag.owner_id != author {
            return Err(Error::Validation(format!(
                "sub-tag {:?} belongs to another user",
                tag.name
            )));
        }
    }
    Ok(())
}

/// First of `base`, `base-2`, `base-3`, ... not used by any post.
fn unique_slug(conn: &Connection, base: &str) -> Result<String> {
    let mut stmt = conn.prepare("SELECT EXISTS(SELECT 1 FROM posts WHERE slug = ?1)")?;
    let mut candidate = base.to_string();
    let mut n = 2;
    while stmt.query_row([&candidate], |row| row.get::<_, bool>(0))? {
        candidate = format!("{base}-{n}");
        n += 1;
    }
    Ok(candidate)
}
