use rusqlite::{Connection, OptionalExtension, Row};
use tracing::{debug, warn};

use super::{BlogService, query_all, require_user, row_exists};
use crate::db::{now, timestamp};
use crate::{
    Error, PostId, Reaction, ReactionCounts, ReactionKind, Result, Subject, SubjectKind, UserId,
};

impl BlogService {
    /// Toggles a reaction given the raw values of a request.
    ///
    /// Parses `subject_kind` (`post` or `comment`) and `reaction`
    /// (`upvote` or `downvote`), then behaves like [`BlogService::toggle`].
    ///
    /// # Examples
    ///
    /// ```
    /// use quire::{BlogService, Database, NewPost, NewUser, ReactionKind};
    ///
    /// # fn main() -> quire::Result<()> {
    /// let service = BlogService::new(Database::in_memory()?);
    /// let ada = service.register_user(NewUser::new("ada", "ada@example.com"))?;
    /// let tag = service.get_or_create_main_tag("rust")?;
    /// let post = service.create_post(ada.id, NewPost::new("Hello", "...", tag.id).publish())?;
    ///
    /// let id = post.id.get();
    /// let upvote = Some(ReactionKind::Upvote);
    /// assert_eq!(service.toggle_reaction(ada.id, "post", id, "upvote")?, upvote);
    /// assert_eq!(service.toggle_reaction(ada.id, "post", id, "upvote")?, None);
    /// let downvote = Some(ReactionKind::Downvote);
    /// assert_eq!(service.toggle_reaction(ada.id, "post", id, "downvote")?, downvote);
    /// assert!(service.toggle_reaction(ada.id, "photo", id, "upvote").is_err());
    /// # Ok(())
    /// # }
    /// ```
    pub fn toggle_reaction(
        &self,
        user: UserId,
        subject_kind: &str,
        subject_id: i64,
        reaction: &str,
    ) -> Result<Option<ReactionKind>> {
        let subject = Subject::parse(subject_kind, subject_id)?;
        let kind: ReactionKind = reaction.parse()?;
        self.toggle(user, subject, kind)
    }

    /// Toggles `user`'s reaction on `subject`.
    ///
    /// - no reaction yet: `kind` is recorded and returned
    /// - same `kind` already recorded: it is removed and `None` is returned
    /// - the other kind recorded: it is replaced by `kind`, which is returned
    ///
    /// Afterwards the user holds at most one reaction on the subject. The
    /// read and the write happen under one write lock; if a concurrent
    /// writer still gets in the way the decision is replayed once before
    /// giving up with [`Error::Transient`].
    pub fn toggle(
        &self,
        user: UserId,
        subject: Subject,
        kind: ReactionKind,
    ) -> Result<Option<ReactionKind>> {
        let outcome = match self.db.immediate(|conn| apply_toggle(conn, user, subject, kind)) {
            Err(e) if e.is_conflict() => {
                warn!(
                    user = %user,
                    subject = %subject,
                    error = %e,
                    "reaction toggle conflicted, replaying"
                );
                self.db
                    .immediate(|conn| apply_toggle(conn, user, subject, kind))
                    .map_err(|e| {
                        if e.is_conflict() {
                            Error::Transient(e.to_string())
                        } else {
                            e
                        }
                    })?
            }
            other => other?,
        };

        debug!(
            user = %user,
            subject = %subject,
            requested = %kind,
            current = outcome.map(ReactionKind::as_str).unwrap_or("none"),
            "toggled reaction"
        );
        Ok(outcome)
    }

    /// The reaction `user` holds on `subject`, if any.
    pub fn reaction_of(&self, user: UserId, subject: Subject) -> Result<Option<ReactionKind>> {
        current_reaction(self.db.connection(), user, subject)
    }

    /// Upvote and downvote totals for `subject`.
    pub fn reaction_counts(&self, subject: Subject) -> Result<ReactionCounts> {
        let counts = self.db.connection().query_row(
            "SELECT COALESCE(SUM(value = 'upvote'), 0), COALESCE(SUM(value = 'downvote'), 0)
             FROM reactions WHERE subject_kind = ?1 AND subject_id = ?2",
            rusqlite::params![subject.kind(), subject.id()],
            |row| {
                Ok(ReactionCounts {
                    upvotes: row.get(0)?,
                    downvotes: row.get(1)?,
                })
            },
        )?;
        Ok(counts)
    }

    /// Reactions `user` holds on posts, most recent first.
    pub fn user_post_reactions(&self, user: UserId) -> Result<Vec<Reaction>> {
        query_all(
            self.db.connection(),
            "SELECT user_id, subject_kind, subject_id, value, created_at FROM reactions
             WHERE user_id = ?1 AND subject_kind = 'post'
             ORDER BY created_at DESC, id DESC",
            [user],
            reaction_from_row,
        )
    }
}

/// One toggle decision, run inside the caller's transaction.
fn apply_toggle(
    conn: &Connection,
    user: UserId,
    subject: Subject,
    kind: ReactionKind,
) -> Result<Option<ReactionKind>> {
    require_user(conn, user)?;
    let subject_kind = subject.kind();
    if !row_exists(conn, subject_kind.table(), subject.id())? {
        return Err(Error::not_found(subject_kind.as_str(), subject.id()));
    }

    let ts = now()?.unix_timestamp();
    let outcome = match current_reaction(conn, user, subject)? {
        Some(existing) if existing == kind => {
            conn.execute(
                "DELETE FROM reactions
                 WHERE user_id = ?1 AND subject_kind = ?2 AND subject_id = ?3",
                rusqlite::params![user, subject_kind, subject.id()],
            )?;
            None
        }
        Some(_) => {
            conn.execute(
                "UPDATE reactions SET value = ?1, created_at = ?2
                 WHERE user_id = ?3 AND subject_kind = ?4 AND subject_id = ?5",
                rusqlite::params![kind, ts, user, subject_kind, subject.id()],
            )?;
            Some(kind)
        }
        None => {
            conn.execute(
                "INSERT INTO reactions (user_id, subject_kind, subject_id, value, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![user, subject_kind, subject.id(), kind, ts],
            )?;
            Some(kind)
        }
    };

    if let Subject::Post(post) = subject {
        sync_upvoted_post(conn, user, post, outcome == Some(ReactionKind::Upvote), ts)?;
    }

    Ok(outcome)
}

/// Keeps `upvoted_posts` in step with the user's reaction on a post.
fn sync_upvoted_post(
    conn: &Connection,
    user: UserId,
    post: PostId,
    upvoted: bool,
    ts: i64,
) -> Result<()> {
    if upvoted {
        conn.execute(
            "INSERT OR IGNORE INTO upvoted_posts (user_id, post_id, upvoted_on)
             VALUES (?1, ?2, ?3)",
            rusqlite::params![user, post, ts],
        )?;
    } else {
        conn.execute(
            "DELETE FROM upvoted_posts WHERE user_id = ?1 AND post_id = ?2",
            rusqlite::params![user, post],
        )?;
    }
    Ok(())
}

fn current_reaction(
    conn: &Connection,
    user: UserId,
    subject: Subject,
) -> Result<Option<ReactionKind>> {
    let value = conn
        .query_row(
            "SELECT value FROM reactions
             WHERE user_id = ?1 AND subject_kind = ?2 AND subject_id = ?3",
            rusqlite::params![user, subject.kind(), subject.id()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value)
}

fn reaction_from_row(row: &Row<'_>) -> rusqlite::Result<Reaction> {
    let kind: SubjectKind = row.get(1)?;
    Ok(Reaction {
        user_id: row.get(0)?,
        subject: kind.subject(row.get(2)?),
        kind: row.get(3)?,
        created_at: timestamp(row, 4)?,
    })
}
