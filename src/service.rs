mod accounts;
mod comments;
mod personalize;
mod posts;
mod reactions;
mod reading;
mod tags;

use rusqlite::{Connection, OptionalExtension, Params, Row};

use crate::db::timestamp;
use crate::{Comment, Database, Error, MainTag, Post, Result, User, UserId};

pub use personalize::{FEED_LIMIT, TRENDING_AUTHOR_LIMIT, dedupe_by_key};

/// Service layer providing the platform's operations.
///
/// BlogService owns a Database instance and exposes accounts, follows,
/// tags, posts, comments, reactions, reading lists, preferences and the
/// personalized feeds. The acting user is always passed explicitly;
/// authentication happens elsewhere.
///
/// # Examples
///
/// ```
/// use quire::{BlogService, Database};
///
/// # fn main() -> quire::Result<()> {
/// let db = Database::in_memory()?;
/// let service = BlogService::new(db);
/// # Ok(())
/// # }
/// ```
pub struct BlogService {
    db: Database,
}

impl BlogService {
    /// Creates a new BlogService with the given database.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Returns a reference to the underlying database.
    ///
    /// Useful for testing or advanced operations that need direct database access.
    pub fn database(&self) -> &Database {
        &self.db
    }
}

pub(crate) const USER_COLUMNS: &str = "u.id, u.username, u.email, u.bio, u.avatar, u.created_at";

pub(crate) const POST_COLUMNS: &str = "p.id, p.title, p.slug, p.author_id, p.content, p.excerpt, \
     p.status, p.main_tag_id, p.sub_tag_id, p.featured_image, p.comments_count, p.view_count, \
     p.created_at, p.updated_at";

pub(crate) const COMMENT_COLUMNS: &str =
    "c.id, c.post_id, c.author_id, c.parent_id, c.content, c.created_at";

pub(crate) fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        bio: row.get(3)?,
        avatar: row.get(4)?,
        created_at: timestamp(row, 5)?,
    })
}

pub(crate) fn post_from_row(row: &Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        title: row.get(1)?,
        slug: row.get(2)?,
        author_id: row.get(3)?,
        content: row.get(4)?,
        excerpt: row.get(5)?,
        status: row.get(6)?,
        main_tag_id: row.get(7)?,
        sub_tag_id: row.get(8)?,
        featured_image: row.get(9)?,
        comments_count: row.get(10)?,
        view_count: row.get(11)?,
        created_at: timestamp(row, 12)?,
        updated_at: timestamp(row, 13)?,
    })
}

pub(crate) fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        post_id: row.get(1)?,
        author_id: row.get(2)?,
        parent_id: row.get(3)?,
        content: row.get(4)?,
        created_at: timestamp(row, 5)?,
    })
}

pub(crate) fn main_tag_from_row(row: &Row<'_>) -> rusqlite::Result<MainTag> {
    Ok(MainTag {
        id: row.get(0)?,
        name: row.get(1)?,
    })
}

/// Runs `sql` and maps every row.
pub(crate) fn query_all<T, P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
    map: fn(&Row<'_>) -> rusqlite::Result<T>,
) -> Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, map)?
        .collect::<rusqlite::Result<Vec<T>>>()?;
    Ok(rows)
}

/// Runs `sql` expecting at most one row.
pub(crate) fn query_opt<T, P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
    map: fn(&Row<'_>) -> rusqlite::Result<T>,
) -> Result<Option<T>> {
    Ok(conn.query_row(sql, params, map).optional()?)
}

/// Checks whether `table` holds a row with the given id.
///
/// `table` must be a literal table name, never user input.
pub(crate) fn row_exists(conn: &Connection, table: &str, id: i64) -> Result<bool> {
    let exists: bool = conn.query_row(
        &format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE id = ?1)"),
        [id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

pub(crate) fn require_user(conn: &Connection, id: UserId) -> Result<()> {
    if !row_exists(conn, "users", id.get())? {
        return Err(Error::not_found("user", id));
    }
    Ok(())
}

pub(crate) fn fetch_user(conn: &Connection, id: UserId) -> Result<Option<User>> {
    query_opt(
        conn,
        &format!("SELECT {USER_COLUMNS} FROM users u WHERE u.id = ?1"),
        [id],
        user_from_row,
    )
}

pub(crate) fn fetch_post(conn: &Connection, id: crate::PostId) -> Result<Option<Post>> {
    query_opt(
        conn,
        &format!("SELECT {POST_COLUMNS} FROM posts p WHERE p.id = ?1"),
        [id],
        post_from_row,
    )
}
