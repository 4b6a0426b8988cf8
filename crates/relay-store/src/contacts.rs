//! CRUD operations for [`Contact`] records.

use rusqlite::params;

use relay_shared::UserId;

use crate::database::Database;
use crate::error::{not_found, Result, StoreError};
use crate::models::Contact;
use crate::rows;

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a contact.  A second row for the same `(owner, contact)` pair is
    /// rejected with [`StoreError::Conflict`].
    pub fn insert_contact(&self, contact: &Contact) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO contacts (owner_id, contact_id, contact_name, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    contact.owner_id.as_str(),
                    contact.contact_id.as_str(),
                    contact.contact_name,
                    rows::format_ts(&contact.created_at),
                ],
            )
            .map_err(StoreError::from_write)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_contact(&self, owner: &UserId, contact: &UserId) -> Result<Contact> {
        self.conn()
            .query_row(
                "SELECT owner_id, contact_id, contact_name, created_at
                 FROM contacts
                 WHERE owner_id = ?1 AND contact_id = ?2",
                params![owner.as_str(), contact.as_str()],
                row_to_contact,
            )
            .map_err(not_found)
    }

    /// All contacts of `owner`, oldest first.
    pub fn list_contacts(&self, owner: &UserId) -> Result<Vec<Contact>> {
        let mut stmt = self.conn().prepare(
            "SELECT owner_id, contact_id, contact_name, created_at
             FROM contacts
             WHERE owner_id = ?1
             ORDER BY created_at ASC",
        )?;

        let rows = stmt.query_map(params![owner.as_str()], row_to_contact)?;

        let mut contacts = Vec::new();
        for row in rows {
            contacts.push(row?);
        }
        Ok(contacts)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete a contact and return the removed row, if there was one.
    pub fn delete_contact(&self, owner: &UserId, contact: &UserId) -> Result<Option<Contact>> {
        let existing = match self.get_contact(owner, contact) {
            Ok(c) => c,
            Err(StoreError::NotFound) => return Ok(None),
            Err(e) => return Err(e),
        };
        self.conn().execute(
            "DELETE FROM contacts WHERE owner_id = ?1 AND contact_id = ?2",
            params![owner.as_str(), contact.as_str()],
        )?;
        Ok(Some(existing))
    }
}

fn row_to_contact(row: &rusqlite::Row<'_>) -> rusqlite::Result<Contact> {
    Ok(Contact {
        owner_id: rows::user_id(row, 0)?,
        contact_id: rows::user_id(row, 1)?,
        contact_name: row.get(2)?,
        created_at: rows::timestamp(row, 3)?,
    })
}
