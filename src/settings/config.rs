/// 应用配置定义

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 应用设置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppSettings {
    /// 数据库文件路径（None 时使用系统数据目录）
    pub database_path: Option<String>,

    /// nag 触发时刻距现在多少分钟内视为"需要处理"
    pub active_window_minutes: i64,

    /// 服药时间之后多少分钟内仍可标记为已服用
    pub dose_window_minutes: i64,

    /// 日志级别: error / warn / info / debug / trace
    pub log_level: String,

    /// 修改频率时是否按预设生成服药时间
    pub default_time_presets: bool,
}

impl AppSettings {
    /// 实际使用的数据库路径
    pub fn resolved_database_path(&self) -> PathBuf {
        match &self.database_path {
            Some(path) => PathBuf::from(path),
            None => dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("medtrack")
                .join("medicines.db"),
        }
    }
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            database_path: None,
            active_window_minutes: 15,
            dose_window_minutes: 60,
            log_level: String::from("info"),
            default_time_presets: true,
        }
    }
}
