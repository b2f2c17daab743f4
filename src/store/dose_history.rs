use chrono::{DateTime, Local};
use log::debug;
use rusqlite::params;

use super::MedicationStore;
use crate::clock::{start_of_day, Clock};
use crate::db::schema::DoseHistoryEntry;
use crate::error::AppResult;

impl MedicationStore {
    /// 记录一次服药（时间为当前时刻）
    pub fn log_dose(&self, medicine_id: i64, time_slot: &str) -> AppResult<i64> {
        self.log_dose_at(medicine_id, time_slot, self.clock.now())
    }

    /// 按指定时刻记录服药
    pub fn log_dose_at(
        &self,
        medicine_id: i64,
        time_slot: &str,
        taken_at: DateTime<Local>,
    ) -> AppResult<i64> {
        let taken_at = taken_at.timestamp_millis();

        let id = self.db.with_connection(|conn| {
            conn.execute(
                "INSERT INTO dose_history (medicine_id, taken_at, time_slot) VALUES (?1, ?2, ?3)",
                params![medicine_id, taken_at, time_slot],
            )?;
            Ok(conn.last_insert_rowid())
        })?;

        debug!("Logged dose {} for medicine #{}", time_slot, medicine_id);
        Ok(id)
    }

    /// 今天（本地零点起）已服用的时间段
    pub fn get_dose_history(&self, medicine_id: i64) -> AppResult<Vec<String>> {
        let now = self.clock.now();
        let since = start_of_day(&Local, now.date_naive()).timestamp_millis();

        self.db.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT time_slot FROM dose_history
                 WHERE medicine_id = ?1 AND taken_at >= ?2
                 ORDER BY taken_at ASC",
            )?;
            let slots = stmt
                .query_map(params![medicine_id, since], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            Ok(slots)
        })
    }

    /// 全部服药记录，最新在前
    pub fn get_dose_entries(&self, medicine_id: i64) -> AppResult<Vec<DoseHistoryEntry>> {
        self.db.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, medicine_id, taken_at, time_slot FROM dose_history
                 WHERE medicine_id = ?1
                 ORDER BY taken_at DESC, id DESC",
            )?;
            let entries = stmt
                .query_map([medicine_id], |row| {
                    Ok(DoseHistoryEntry {
                        id: row.get(0)?,
                        medicine_id: row.get(1)?,
                        taken_at: row.get(2)?,
                        time_slot: row.get(3)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(entries)
        })
    }
}
