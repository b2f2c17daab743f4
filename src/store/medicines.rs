use log::info;
use rusqlite::{params, OptionalExtension, Row};

use super::MedicationStore;
use crate::db::schema::{DoseTimes, ExternalLinks, Medicine};
use crate::error::{AppError, AppResult};

const SELECT_MEDICINE: &str =
    "SELECT id, name, dosage, frequency, times, external_links, created_at FROM medicines";

/// 行原始值，JSON 列在锁外解析
struct MedicineRow {
    id: i64,
    name: String,
    dosage: Option<String>,
    frequency: Option<i64>,
    times: Option<String>,
    external_links: Option<String>,
    created_at: Option<i64>,
}

impl MedicineRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            dosage: row.get(2)?,
            frequency: row.get(3)?,
            times: row.get(4)?,
            external_links: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    fn into_medicine(self) -> AppResult<Medicine> {
        let times = DoseTimes::from_column(self.id, self.times.as_deref())?;
        let external_links = ExternalLinks::from_column(self.id, self.external_links.as_deref())?;

        Ok(Medicine {
            id: self.id,
            name: self.name,
            dosage: self.dosage.unwrap_or_default(),
            frequency: self.frequency.unwrap_or(0).max(0) as u32,
            times,
            external_links,
            created_at: self.created_at.unwrap_or(0),
        })
    }
}

impl MedicationStore {
    /// 新增药品，返回新 id
    pub fn add_medicine(
        &self,
        name: &str,
        dosage: &str,
        frequency: u32,
        times: &DoseTimes,
        external_links: &ExternalLinks,
    ) -> AppResult<i64> {
        let times_json = times.to_column()?;
        let links_json = external_links.to_column()?;
        let created_at = self.now_millis();

        let id = self.db.with_connection(|conn| {
            conn.execute(
                "INSERT INTO medicines (name, dosage, frequency, times, external_links, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![name, dosage, frequency, times_json, links_json, created_at],
            )?;
            Ok(conn.last_insert_rowid())
        })?;

        info!("Added medicine #{} ({}) with {} dose time(s)", id, name, times.len());
        Ok(id)
    }

    /// 所有药品，按创建时间倒序
    pub fn get_medicines(&self) -> AppResult<Vec<Medicine>> {
        let rows = self.db.with_connection(|conn| {
            let mut stmt =
                conn.prepare(&format!("{} ORDER BY created_at DESC, id DESC", SELECT_MEDICINE))?;
            let rows = stmt
                .query_map([], MedicineRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;

        rows.into_iter().map(MedicineRow::into_medicine).collect()
    }

    /// 按 id 查询
    pub fn get_medicine(&self, id: i64) -> AppResult<Option<Medicine>> {
        let row = self.db.with_connection(|conn| {
            Ok(conn
                .query_row(
                    &format!("{} WHERE id = ?1", SELECT_MEDICINE),
                    [id],
                    MedicineRow::from_row,
                )
                .optional()?)
        })?;

        row.map(MedicineRow::into_medicine).transpose()
    }

    /// 更新服药频率和时间（名称、剂量、链接创建后不可改）
    pub fn update_medicine(&self, id: i64, frequency: u32, times: &DoseTimes) -> AppResult<()> {
        let times_json = times.to_column()?;

        let changed = self.db.with_connection(|conn| {
            Ok(conn.execute(
                "UPDATE medicines SET frequency = ?1, times = ?2 WHERE id = ?3",
                params![frequency, times_json, id],
            )?)
        })?;

        if changed == 0 {
            return Err(AppError::not_found(format!("药品 #{} 不存在", id)));
        }

        info!("Updated medicine #{} schedule: {:?}", id, times.labels());
        Ok(())
    }

    /// 删除药品及其服药记录（通知需调用方先取消）
    pub fn delete_medicine(&self, id: i64) -> AppResult<()> {
        self.db.with_connection_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM medicines WHERE id = ?1", [id])?;
            tx.execute("DELETE FROM dose_history WHERE medicine_id = ?1", [id])?;
            tx.commit()?;
            Ok(())
        })?;

        info!("Deleted medicine #{}", id);
        Ok(())
    }
}
