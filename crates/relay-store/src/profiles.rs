//! CRUD operations for [`Profile`] records.

use rusqlite::params;

use relay_shared::UserId;

use crate::database::Database;
use crate::error::{not_found, Result, StoreError};
use crate::models::Profile;
use crate::rows;

impl Database {
    /// Register a new profile.  Fails with [`StoreError::Conflict`] if the id
    /// is already taken.
    pub fn insert_profile(&self, profile: &Profile) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO profiles (id, name, display_name, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    profile.id.as_str(),
                    profile.name,
                    profile.display_name,
                    rows::format_ts(&profile.created_at),
                ],
            )
            .map_err(StoreError::from_write)?;
        Ok(())
    }

    pub fn get_profile(&self, id: &UserId) -> Result<Profile> {
        self.conn()
            .query_row(
                "SELECT id, name, display_name, created_at FROM profiles WHERE id = ?1",
                params![id.as_str()],
                row_to_profile,
            )
            .map_err(not_found)
    }

    /// Update the self-chosen display name and return the updated row.
    pub fn set_profile_display_name(&self, id: &UserId, display_name: &str) -> Result<Profile> {
        let affected = self.conn().execute(
            "UPDATE profiles SET display_name = ?1 WHERE id = ?2",
            params![display_name, id.as_str()],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        self.get_profile(id)
    }

    /// Case-insensitive id prefix search, ordered by id.
    ///
    /// Ids are stored upper-cased, so the prefix is upper-cased and matched
    /// with a plain `LIKE` (wildcards in the prefix are escaped).
    pub fn search_profiles_by_id_prefix(&self, prefix: &str, limit: usize) -> Result<Vec<Profile>> {
        let escaped: String = prefix
            .to_ascii_uppercase()
            .chars()
            .flat_map(|c| match c {
                '%' | '_' | '\\' => vec!['\\', c],
                other => vec![other],
            })
            .collect();
        let pattern = format!("{escaped}%");

        let mut stmt = self.conn().prepare(
            "SELECT id, name, display_name, created_at
             FROM profiles
             WHERE id LIKE ?1 ESCAPE '\\'
             ORDER BY id ASC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![pattern, limit as i64], row_to_profile)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }
}

fn row_to_profile(row: &rusqlite::Row<'_>) -> rusqlite::Result<Profile> {
    Ok(Profile {
        id: rows::user_id(row, 0)?,
        name: row.get(1)?,
        display_name: row.get(2)?,
        created_at: rows::timestamp(row, 3)?,
    })
}
