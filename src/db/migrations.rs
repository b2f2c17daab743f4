/// 数据库迁移
///
/// 负责创建和更新数据库表结构。所有步骤都可重复执行：
/// 建表用 IF NOT EXISTS，加列前先查 PRAGMA table_info。

use anyhow::Result;
use log::{debug, info};
use rusqlite::Connection;

/// 运行所有迁移
pub fn run_migrations(conn: &Connection) -> Result<()> {
    enable_wal(conn)?;
    create_medicines_table(conn)?;
    create_dose_history_table(conn)?;
    create_contacts_table(conn)?;

    Ok(())
}

/// 开启 WAL（内存库会返回 "memory"）
fn enable_wal(conn: &Connection) -> Result<()> {
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    debug!("journal_mode={}", mode);
    Ok(())
}

/// 表中是否已有该列
fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<String>>>()?;

    Ok(names.iter().any(|name| name == column))
}

/// 缺列时补上（只加列，不改已有数据）
fn add_column_if_missing(conn: &Connection, table: &str, column: &str, decl: &str) -> Result<()> {
    if !has_column(conn, table, column)? {
        conn.execute(
            &format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, decl),
            [],
        )?;
        info!("Migrated {}: added column {}", table, column);
    }
    Ok(())
}

/// 创建 medicines 表
fn create_medicines_table(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS medicines (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            dosage TEXT,
            frequency INTEGER,
            times TEXT,
            external_links TEXT,
            created_at INTEGER
        )",
        [],
    )?;

    // 早期版本没有 external_links
    add_column_if_missing(conn, "medicines", "external_links", "TEXT")?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_medicines_created_at
         ON medicines(created_at DESC)",
        [],
    )?;

    Ok(())
}

/// 创建 dose_history 表
fn create_dose_history_table(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS dose_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            medicine_id INTEGER,
            taken_at INTEGER,
            time_slot TEXT,
            FOREIGN KEY(medicine_id) REFERENCES medicines(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_dose_history_medicine
         ON dose_history(medicine_id, taken_at)",
        [],
    )?;

    Ok(())
}

/// 创建 contacts 表
fn create_contacts_table(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS contacts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            phone TEXT,
            email TEXT,
            relation TEXT,
            is_emergency INTEGER DEFAULT 1
        )",
        [],
    )?;

    // 早期版本没有 email
    add_column_if_missing(conn, "contacts", "email", "TEXT")?;

    Ok(())
}
