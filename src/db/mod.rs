use log::{error, info};
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::error::{AppError, AppResult};

pub mod schema;
pub mod migrations;

/// 数据库管理器
///
/// 显式的生命周期：open → initialize → （使用）→ shutdown
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// 打开数据库文件（不存在则创建）
    pub fn open(db_path: PathBuf) -> AppResult<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&db_path)?;
        info!("Opened database at {}", db_path.display());
        Ok(Self::from_connection(conn))
    }

    /// 内存数据库（测试用）
    pub fn open_in_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// 初始化数据库表结构
    pub fn initialize(&self) -> AppResult<()> {
        self.with_connection(|conn| Ok(migrations::run_migrations(conn)?))
    }

    /// 初始化失败只记录日志，继续使用现有表结构
    pub fn initialize_or_log(&self) -> bool {
        match self.initialize() {
            Ok(()) => true,
            Err(e) => {
                error!("Database initialization failed, continuing with existing schema: {}", e);
                false
            }
        }
    }

    /// 获取数据库连接的引用（需要锁定）
    pub fn with_connection<F, R>(&self, f: F) -> AppResult<R>
    where
        F: FnOnce(&Connection) -> AppResult<R>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|_| AppError::database(3, "数据库连接锁已损坏"))?;
        f(&conn)
    }

    /// 同上，可变连接（事务需要）
    pub fn with_connection_mut<F, R>(&self, f: F) -> AppResult<R>
    where
        F: FnOnce(&mut Connection) -> AppResult<R>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| AppError::database(3, "数据库连接锁已损坏"))?;
        f(&mut conn)
    }

    /// 关闭连接
    ///
    /// 仍有其他克隆持有连接时只释放本句柄。
    pub fn shutdown(self) -> AppResult<()> {
        match Arc::try_unwrap(self.conn) {
            Ok(mutex) => {
                let conn = mutex
                    .into_inner()
                    .map_err(|_| AppError::database(3, "数据库连接锁已损坏"))?;
                conn.close().map_err(|(_, e)| AppError::from(e))?;
                info!("Database closed");
                Ok(())
            }
            Err(_) => Ok(()),
        }
    }
}
