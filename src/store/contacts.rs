use log::info;
use rusqlite::params;

use super::MedicationStore;
use crate::db::schema::{EmergencyContact, NewContact};
use crate::error::AppResult;

impl MedicationStore {
    /// 新增紧急联系人（is_emergency 固定为 1）
    pub fn add_contact(&self, contact: &NewContact) -> AppResult<i64> {
        let id = self.db.with_connection(|conn| {
            conn.execute(
                "INSERT INTO contacts (name, phone, email, relation, is_emergency)
                 VALUES (?1, ?2, ?3, ?4, 1)",
                params![contact.name, contact.phone, contact.email, contact.relation],
            )?;
            Ok(conn.last_insert_rowid())
        })?;

        info!("Added contact #{} ({})", id, contact.name);
        Ok(id)
    }

    pub fn get_contacts(&self) -> AppResult<Vec<EmergencyContact>> {
        self.db.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, phone, email, relation, is_emergency FROM contacts ORDER BY id",
            )?;
            let contacts = stmt
                .query_map([], |row| {
                    let flag: Option<i64> = row.get(5)?;
                    Ok(EmergencyContact {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        phone: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                        email: row.get(3)?,
                        relation: row.get(4)?,
                        is_emergency: flag.unwrap_or(0) != 0,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(contacts)
        })
    }

    pub fn delete_contact(&self, id: i64) -> AppResult<()> {
        self.db.with_connection(|conn| {
            conn.execute("DELETE FROM contacts WHERE id = ?1", [id])?;
            Ok(())
        })?;

        info!("Deleted contact #{}", id);
        Ok(())
    }
}
