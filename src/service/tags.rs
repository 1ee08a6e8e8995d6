use rusqlite::OptionalExtension;

use super::{BlogService, main_tag_from_row, query_all, query_opt, require_user};
use crate::models::normalize_tag_name;
use crate::{MainTag, Result, SubTag, SubTagId, TagId, UserId};

impl BlogService {
    /// Gets or creates a main tag by name.
    ///
    /// Names are trimmed and matched ignoring case; an existing tag keeps
    /// its original spelling.
    ///
    /// # Examples
    ///
    /// ```
    /// use quire::{BlogService, Database};
    ///
    /// # fn main() -> quire::Result<()> {
    /// let service = BlogService::new(Database::in_memory()?);
    ///
    /// let rust = service.get_or_create_main_tag("Rust")?;
    /// assert_eq!(service.get_or_create_main_tag(" rust ")?, rust);
    /// # Ok(())
    /// # }
    /// ```
    pub fn get_or_create_main_tag(&self, name: &str) -> Result<MainTag> {
        let name = normalize_tag_name(name)?;

        self.db.immediate(|conn| {
            let existing: Option<MainTag> = conn
                .query_row(
                    "SELECT id, name FROM main_tags WHERE name = ?1",
                    [&name],
                    main_tag_from_row,
                )
                .optional()?;
            if let Some(tag) = existing {
                return Ok(tag);
            }

            conn.execute("INSERT INTO main_tags (name) VALUES (?1)", [&name])?;
            Ok(MainTag {
                id: TagId::new(conn.last_insert_rowid()),
                name: name.clone(),
            })
        })
    }

    /// Finds a main tag by name, ignoring case.
    pub fn find_main_tag(&self, name: &str) -> Result<Option<MainTag>> {
        query_opt(
            self.db.connection(),
            "SELECT id, name FROM main_tags WHERE name = ?1",
            [name.trim()],
            main_tag_from_row,
        )
    }

    /// All main tags ordered by name.
    pub fn list_main_tags(&self) -> Result<Vec<MainTag>> {
        query_all(
            self.db.connection(),
            "SELECT id, name FROM main_tags ORDER BY name",
            [],
            main_tag_from_row,
        )
    }

    /// Gets or creates a sub-tag owned by `owner`.
    ///
    /// Two users may each own a sub-tag with the same name.
    pub fn get_or_create_sub_tag(&self, owner: UserId, name: &str) -> Result<SubTag> {
        let name = normalize_tag_name(name)?;

        self.db.immediate(|conn| {
            require_user(conn, owner)?;

            let existing: Option<SubTag> = conn
                .query_row(
                    "SELECT id, name, owner_id FROM sub_tags WHERE owner_id = ?1 AND name = ?2",
                    rusqlite::params![owner, name],
                    sub_tag_from_row,
                )
                .optional()?;
            if let Some(tag) = existing {
                return Ok(tag);
            }

            conn.execute(
                "INSERT INTO sub_tags (name, owner_id) VALUES (?1, ?2)",
                rusqlite::params![name, owner],
            )?;
            Ok(SubTag {
                id: SubTagId::new(conn.last_insert_rowid()),
                name: name.clone(),
                owner_id: owner,
            })
        })
    }

    /// Sub-tags owned by `owner`, ordered by name.
    pub fn list_sub_tags(&self, owner: UserId) -> Result<Vec<SubTag>> {
        query_all(
            self.db.connection(),
            "SELECT id, name, owner_id FROM sub_tags WHERE owner_id = ?1 ORDER BY name",
            [owner],
            sub_tag_from_row,
        )
    }
}

pub(crate) fn sub_tag_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SubTag> {
    Ok(SubTag {
        id: row.get(0)?,
        name: row.get(1)?,
        owner_id: row.get(2)?,
    })
}
