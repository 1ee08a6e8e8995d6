use rusqlite::Connection;
use tracing::{debug, info};

use super::{BlogService, main_tag_from_row, query_all, require_user, row_exists};
use crate::db::{now, timestamp};
use crate::{
    Error, HistoryEntry, MainTag, PostId, ReadLaterEntry, Result, TagId, UserId, UserPreference,
};

impl BlogService {
    /// Records that `user` read `post`.
    ///
    /// Appends to the reading history, bumps the post's `view_count`, and
    /// adds the post's main tag to the reader's preferences, creating the
    /// preference record if the user had none.
    pub fn record_read(&self, user: UserId, post: PostId) -> Result<HistoryEntry> {
        let viewed_at = now()?;

        let entry = self.db.immediate(|conn| {
            require_user(conn, user)?;
            let main_tag: TagId = conn
                .query_row("SELECT main_tag_id FROM posts WHERE id = ?1", [post], |row| {
                    row.get(0)
                })
                .map_err(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Error::not_found("post", post),
                    other => other.into(),
                })?;

            conn.execute(
                "INSERT INTO reading_history (user_id, post_id, viewed_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![user, post, viewed_at.unix_timestamp()],
            )?;
            conn.execute(
                "UPDATE posts SET view_count = view_count + 1 WHERE id = ?1",
                [post],
            )?;
            ensure_preference_record(conn, user)?;
            conn.execute(
                "INSERT OR IGNORE INTO preferred_tags (user_id, tag_id) VALUES (?1, ?2)",
                rusqlite::params![user, main_tag],
            )?;

            Ok(HistoryEntry {
                user_id: user,
                post_id: post,
                viewed_at,
            })
        })?;

        debug!(user = %user, post = %post, "recorded read");
        Ok(entry)
    }

    /// Posts `user` has read, most recent read first. Re-reads appear once per read.
    pub fn reading_history(&self, user: UserId) -> Result<Vec<HistoryEntry>> {
        query_all(
            self.db.connection(),
            "SELECT user_id, post_id, viewed_at FROM reading_history
             WHERE user_id = ?1 ORDER BY viewed_at DESC, id DESC",
            [user],
            |row| {
                Ok(HistoryEntry {
                    user_id: row.get(0)?,
                    post_id: row.get(1)?,
                    viewed_at: timestamp(row, 2)?,
                })
            },
        )
    }

    /// Saves `post` to `user`'s read-later list.
    ///
    /// Returns `false` if it was already saved.
    pub fn add_to_read_later(&self, user: UserId, post: PostId) -> Result<bool> {
        let added_on = now()?.unix_timestamp();

        self.db.immediate(|conn| {
            require_user(conn, user)?;
            if !row_exists(conn, "posts", post.get())? {
                return Err(Error::not_found("post", post));
            }
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO read_later (user_id, post_id, added_on) VALUES (?1, ?2, ?3)",
                rusqlite::params![user, post, added_on],
            )?;
            Ok(inserted > 0)
        })
    }

    /// Removes `post` from `user`'s read-later list.
    ///
    /// Returns `false` if it was not saved.
    pub fn remove_from_read_later(&self, user: UserId, post: PostId) -> Result<bool> {
        let removed = self.db.connection().execute(
            "DELETE FROM read_later WHERE user_id = ?1 AND post_id = ?2",
            rusqlite::params![user, post],
        )?;
        Ok(removed > 0)
    }

    /// `user`'s read-later list, most recently saved first.
    pub fn read_later(&self, user: UserId) -> Result<Vec<ReadLaterEntry>> {
        query_all(
            self.db.connection(),
            "SELECT user_id, post_id, added_on FROM read_later
             WHERE user_id = ?1 ORDER BY added_on DESC, rowid DESC",
            [user],
            |row| {
                Ok(ReadLaterEntry {
                    user_id: row.get(0)?,
                    post_id: row.get(1)?,
                    added_on: timestamp(row, 2)?,
                })
            },
        )
    }

    /// `user`'s preference record, or `None` if they never set one.
    pub fn preferences(&self, user: UserId) -> Result<Option<UserPreference>> {
        let conn = self.db.connection();
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM user_preferences WHERE user_id = ?1)",
            [user],
            |row| row.get(0),
        )?;
        if !exists {
            return Ok(None);
        }

        Ok(Some(UserPreference {
            user_id: user,
            preferred_tags: fetch_preferred_tags(conn, user)?,
        }))
    }

    /// `user`'s preferred main tags ordered by name; empty when the user
    /// has no preference record.
    pub fn preferred_tags(&self, user: UserId) -> Result<Vec<MainTag>> {
        fetch_preferred_tags(self.db.connection(), user)
    }

    /// Replaces `user`'s preferred tags with `tag_ids`.
    ///
    /// Ids that match no main tag are ignored. Creates the preference
    /// record if needed.
    ///
    /// # Examples
    ///
    /// ```
    /// use quire::{BlogService, Database, NewUser, TagId};
    ///
    /// # fn main() -> quire::Result<()> {
    /// let service = BlogService::new(Database::in_memory()?);
    /// let ada = service.register_user(NewUser::new("ada", "ada@example.com"))?;
    /// let rust = service.get_or_create_main_tag("rust")?;
    ///
    /// assert!(service.preferences(ada.id)?.is_none());
    ///
    /// let prefs = service.update_preferences(ada.id, &[rust.id, TagId::new(404)])?;
    /// assert_eq!(prefs.preferred_tags, vec![rust]);
    /// # Ok(())
    /// # }
    /// ```
    pub fn update_preferences(&self, user: UserId, tag_ids: &[TagId]) -> Result<UserPreference> {
        let preference = self.db.immediate(|conn| {
            require_user(conn, user)?;
            ensure_preference_record(conn, user)?;
            conn.execute("DELETE FROM preferred_tags WHERE user_id = ?1", [user])?;

            let mut insert = conn.prepare(
                "INSERT OR IGNORE INTO preferred_tags (user_id, tag_id)
                 SELECT ?1, id FROM main_tags WHERE id = ?2",
            )?;
            for tag in tag_ids {
                insert.execute(rusqlite::params![user, tag])?;
            }

            Ok(UserPreference {
                user_id: user,
                preferred_tags: fetch_preferred_tags(conn, user)?,
            })
        })?;

        info!(
            user = %user,
            tags = preference.preferred_tags.len(),
            "updated preferences"
        );
        Ok(preference)
    }
}

fn ensure_preference_record(conn: &Connection, user: UserId) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO user_preferences (user_id) VALUES (?1)",
        [user],
    )?;
    Ok(())
}

fn fetch_preferred_tags(conn: &Connection, user: UserId) -> Result<Vec<MainTag>> {
    query_all(
        conn,
        "SELECT t.id, t.name FROM preferred_tags pt
         JOIN main_tags t ON t.id = pt.tag_id
         WHERE pt.user_id = ?1 ORDER BY t.name",
        [user],
        main_tag_from_row,
    )
}
