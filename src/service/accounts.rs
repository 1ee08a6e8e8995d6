use rusqlite::OptionalExtension;
use tracing::{debug, info};

use super::{
    BlogService, USER_COLUMNS, fetch_user, query_all, query_opt, require_user, user_from_row,
};
use crate::db::now;
use crate::error::map_unique;
use crate::models::validate_bio;
use crate::{Error, NewUser, Result, User, UserId};

impl BlogService {
    /// Registers a new account.
    ///
    /// Usernames are unique as typed; emails are unique ignoring case.
    ///
    /// # Examples
    ///
    /// ```
    /// use quire::{BlogService, Database, NewUser};
    ///
    /// # fn main() -> quire::Result<()> {
    /// let service = BlogService::new(Database::in_memory()?);
    ///
    /// let ada = service.register_user(NewUser::new("ada", "ada@example.com"))?;
    /// assert_eq!(ada.username, "ada");
    ///
    /// // Same email in another case is taken
    /// assert!(service.register_user(NewUser::new("ada2", "ADA@example.com")).is_err());
    /// # Ok(())
    /// # }
    /// ```
    pub fn register_user(&self, new_user: NewUser) -> Result<User> {
        new_user.validate()?;
        let username = new_user.username.trim();
        let email = new_user.email.trim();
        let created_at = now()?;

        let user = self.db.immediate(|conn| {
            let taken: Option<String> = conn
                .query_row(
                    "SELECT CASE WHEN username = ?1 THEN 'username' ELSE 'email' END
                     FROM users WHERE username = ?1 OR email = ?2 COLLATE NOCASE",
                    (username, email),
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(field) = taken {
                let value = if field == "username" { username } else { email };
                return Err(Error::Duplicate(format!("{field} {value:?}")));
            }

            conn.execute(
                "INSERT INTO users (username, email, bio, avatar, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    username,
                    email,
                    new_user.bio,
                    new_user.avatar,
                    created_at.unix_timestamp()
                ],
            )
            .map_err(|e| map_unique(e, &format!("username {username:?}")))?;

            Ok(User {
                id: UserId::new(conn.last_insert_rowid()),
                username: username.to_string(),
                email: email.to_string(),
                bio: new_user.bio.clone(),
                avatar: new_user.avatar.clone(),
                created_at,
            })
        })?;

        info!(user = %user.id, username = %user.username, "registered user");
        Ok(user)
    }

    /// Retrieves a user by id. Returns `None` if no such user exists.
    pub fn get_user(&self, id: UserId) -> Result<Option<User>> {
        fetch_user(self.db.connection(), id)
    }

    /// Looks a user up by exact username.
    pub fn find_user(&self, username: &str) -> Result<Option<User>> {
        query_opt(
            self.db.connection(),
            &format!("SELECT {USER_COLUMNS} FROM users u WHERE u.username = ?1"),
            [username],
            user_from_row,
        )
    }

    /// Like [`BlogService::find_user`], failing with `NotFound` when absent.
    pub fn user_by_username(&self, username: &str) -> Result<User> {
        self.find_user(username)?
            .ok_or_else(|| Error::not_found("user", username))
    }

    /// Replaces a user's bio and avatar reference.
    pub fn update_profile(&self, id: UserId, bio: &str, avatar: Option<&str>) -> Result<User> {
        validate_bio(bio)?;
        let conn = self.db.connection();

        let updated = conn.execute(
            "UPDATE users SET bio = ?1, avatar = ?2 WHERE id = ?3",
            rusqlite::params![bio, avatar, id],
        )?;
        if updated == 0 {
            return Err(Error::not_found("user", id));
        }

        fetch_user(conn, id)?.ok_or_else(|| Error::not_found("user", id))
    }

    /// Deletes a user and everything they own.
    ///
    /// Posts, comments, sub-tags, reactions, follow edges in both
    /// directions, preferences and reading lists go with the account.
    /// Deleting a missing user is a no-op.
    pub fn delete_user(&self, id: UserId) -> Result<()> {
        let removed = self
            .db
            .connection()
            .execute("DELETE FROM users WHERE id = ?1", [id])?;
        if removed > 0 {
            info!(user = %id, "deleted user");
        }
        Ok(())
    }

    /// Makes `user` follow `target`.
    ///
    /// Returns `true` when a new edge was created and `false` when it
    /// already existed.
    pub fn follow(&self, user: UserId, target: UserId) -> Result<bool> {
        if user == target {
            return Err(Error::SelfFollow);
        }
        let created_at = now()?.unix_timestamp();

        let created = self.db.immediate(|conn| {
            require_user(conn, user)?;
            require_user(conn, target)?;
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO user_follows (follower_id, followed_id, created_at)
                 VALUES (?1, ?2, ?3)",
                rusqlite::params![user, target, created_at],
            )?;
            Ok(inserted > 0)
        })?;

        if created {
            info!(follower = %user, followed = %target, "followed user");
        }
        Ok(created)
    }

    /// Removes the follow edge from `user` to `target`, if any.
    ///
    /// Returns whether an edge was removed.
    pub fn unfollow(&self, user: UserId, target: UserId) -> Result<bool> {
        if user == target {
            return Err(Error::SelfFollow);
        }

        let removed = self.db.connection().execute(
            "DELETE FROM user_follows WHERE follower_id = ?1 AND followed_id = ?2",
            [user, target],
        )?;
        debug!(follower = %user, followed = %target, removed, "unfollow");
        Ok(removed > 0)
    }

    /// Whether `user` follows `target`.
    pub fn is_following(&self, user: UserId, target: UserId) -> Result<bool> {
        let exists: bool = self.db.connection().query_row(
            "SELECT EXISTS(SELECT 1 FROM user_follows WHERE follower_id = ?1 AND followed_id = ?2)",
            [user, target],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Users that `user` follows, most recently followed first.
    pub fn following(&self, user: UserId) -> Result<Vec<User>> {
        query_all(
            self.db.connection(),
            &format!(
                "SELECT {USER_COLUMNS} FROM user_follows f
                 JOIN users u ON u.id = f.followed_id
                 WHERE f.follower_id = ?1
                 ORDER BY f.created_at DESC, u.id DESC"
            ),
            [user],
            user_from_row,
        )
    }

    /// Users following `user`, most recent first.
    pub fn followers(&self, user: UserId) -> Result<Vec<User>> {
        query_all(
            self.db.connection(),
            &format!(
                "SELECT {USER_COLUMNS} FROM user_follows f
                 JOIN users u ON u.id = f.follower_id
                 WHERE f.followed_id = ?1
                 ORDER BY f.created_at DESC, u.id DESC"
            ),
            [user],
            user_from_row,
        )
    }
}
