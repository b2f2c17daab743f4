/// 统一错误处理系统
///
/// 提供类型安全的错误定义和用户友好的错误消息

use thiserror::Error;

/// 应用错误类型
#[derive(Error, Debug)]
pub enum AppError {
    /// 数据库相关错误
    #[error("[ERR_DATABASE_{0:03}] {1}")]
    Database(u16, String),

    /// 记录中的 JSON 列无法解析
    #[error("[ERR_CORRUPT_RECORD] {table}#{id}.{column}: {reason}")]
    CorruptRecord {
        table: &'static str,
        id: i64,
        column: &'static str,
        reason: String,
    },

    /// 通知注册/查询/取消失败
    #[error("[ERR_NOTIFICATION_{0:03}] {1}")]
    Notification(u16, String),

    /// 权限错误
    #[error("[ERR_PERMISSION_{0:03}] {1}")]
    Permission(u16, String),

    /// 验证错误
    #[error("[ERR_VALIDATION_{0:03}] {1}")]
    Validation(u16, String),

    /// 序列化/反序列化错误
    #[error("[ERR_SERDE_{0:03}] {1}")]
    Serde(u16, String),

    /// IO 相关错误
    #[error("[ERR_IO_{0:03}] {1}")]
    IO(u16, String),

    /// 设置相关错误
    #[error("[ERR_SETTINGS_{0:03}] {1}")]
    Settings(u16, String),

    /// 记录不存在
    #[error("[ERR_NOT_FOUND] {0}")]
    NotFound(String),

    /// 未知错误
    #[error("[ERR_UNKNOWN] {0}")]
    Unknown(String),
}

impl AppError {
    /// 创建数据库错误
    pub fn database(code: u16, msg: impl Into<String>) -> Self {
        Self::Database(code, msg.into())
    }

    /// 创建损坏记录错误
    pub fn corrupt_record(
        table: &'static str,
        id: i64,
        column: &'static str,
        reason: impl Into<String>,
    ) -> Self {
        Self::CorruptRecord {
            table,
            id,
            column,
            reason: reason.into(),
        }
    }

    /// 创建通知错误
    pub fn notification(code: u16, msg: impl Into<String>) -> Self {
        Self::Notification(code, msg.into())
    }

    /// 创建权限错误
    pub fn permission(code: u16, msg: impl Into<String>) -> Self {
        Self::Permission(code, msg.into())
    }

    /// 创建验证错误
    pub fn validation(code: u16, msg: impl Into<String>) -> Self {
        Self::Validation(code, msg.into())
    }

    /// 创建序列化错误
    pub fn serde(code: u16, msg: impl Into<String>) -> Self {
        Self::Serde(code, msg.into())
    }

    /// 创建 IO 错误
    pub fn io(code: u16, msg: impl Into<String>) -> Self {
        Self::IO(code, msg.into())
    }

    /// 创建设置错误
    pub fn settings(code: u16, msg: impl Into<String>) -> Self {
        Self::Settings(code, msg.into())
    }

    /// 创建记录不存在错误
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}

/// 从标准 IO 错误转换
impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::io(1, "文件或目录不存在"),
            std::io::ErrorKind::PermissionDenied => Self::permission(1, "权限不足"),
            std::io::ErrorKind::AlreadyExists => Self::io(2, "文件或目录已存在"),
            _ => Self::io(999, format!("IO 错误: {}", err)),
        }
    }
}

/// 从 serde_json 错误转换
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::serde(1, format!("JSON 序列化错误: {}", err))
    }
}

/// 从 anyhow 错误转换
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Unknown(err.to_string())
    }
}

/// 从 rusqlite 错误转换
impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(_, Some(msg)) => {
                Self::database(1, format!("数据库错误: {}", msg))
            }
            rusqlite::Error::QueryReturnedNoRows => {
                Self::database(2, "查询未返回结果")
            }
            _ => Self::database(999, format!("数据库错误: {}", err)),
        }
    }
}

/// 应用 Result 类型别名
pub type AppResult<T> = Result<T, AppError>;
