/// 应用设置管理模块
///
/// 设置以 JSON 文件持久化

use log::{info, warn};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{AppError, AppResult};

pub mod config;
pub use config::AppSettings;

const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// 设置管理器
pub struct SettingsManager {
    settings: Arc<Mutex<AppSettings>>,
}

impl SettingsManager {
    /// 创建新的设置管理器
    pub fn new() -> Self {
        Self {
            settings: Arc::new(Mutex::new(AppSettings::default())),
        }
    }

    /// 从配置加载设置
    pub fn with_settings(settings: AppSettings) -> AppResult<Self> {
        Self::validate_settings(&settings)?;
        Ok(Self {
            settings: Arc::new(Mutex::new(settings)),
        })
    }

    /// 从 JSON 文件加载；文件不存在时使用默认设置
    pub fn load(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            info!("Settings file {} not found, using defaults", path.display());
            return Ok(Self::new());
        }

        let raw = std::fs::read_to_string(path)?;
        let settings: AppSettings = serde_json::from_str(&raw)
            .map_err(|e| AppError::settings(1, format!("设置文件解析失败: {}", e)))?;
        Self::with_settings(settings)
    }

    /// 加载设置；文件不存在时写出默认设置供用户修改
    ///
    /// 写文件失败不影响启动。
    pub fn load_or_create(path: &Path) -> AppResult<Self> {
        if path.exists() {
            return Self::load(path);
        }

        let manager = Self::new();
        match manager.save(path) {
            Ok(()) => info!("Default settings written to {}", path.display()),
            Err(e) => warn!("Failed to write default settings to {}: {}", path.display(), e),
        }
        Ok(manager)
    }

    /// 保存到 JSON 文件
    pub fn save(&self, path: &Path) -> AppResult<()> {
        let json = serde_json::to_string_pretty(&self.get())?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, json)?;
        Ok(())
    }

    /// 获取当前设置的副本
    pub fn get(&self) -> AppSettings {
        self.lock().clone()
    }

    /// 验证设置
    fn validate_settings(settings: &AppSettings) -> AppResult<()> {
        if !(1..=1440).contains(&settings.active_window_minutes) {
            return Err(AppError::settings(2, "提醒窗口必须在 1-1440 分钟之间"));
        }

        if !(1..=1440).contains(&settings.dose_window_minutes) {
            return Err(AppError::settings(3, "服药窗口必须在 1-1440 分钟之间"));
        }

        if !LOG_LEVELS.contains(&settings.log_level.as_str()) {
            return Err(AppError::settings(
                4,
                format!("未知的日志级别: {}", settings.log_level),
            ));
        }

        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, AppSettings> {
        // 设置只做整体替换，锁中毒时数据仍然完整
        self.settings
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for SettingsManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_settings() {
        let manager = SettingsManager::new();
        let settings = manager.get();

        assert_eq!(settings.active_window_minutes, 15);
        assert_eq!(settings.dose_window_minutes, 60);
    }

    #[test]
    fn test_validate_windows() {
        let mut settings = AppSettings::default();

        settings.active_window_minutes = 0;
        assert!(SettingsManager::validate_settings(&settings).is_err());

        settings.active_window_minutes = 15;
        settings.dose_window_minutes = 1441;
        assert!(SettingsManager::validate_settings(&settings).is_err());

        settings.dose_window_minutes = 60;
        assert!(SettingsManager::validate_settings(&settings).is_ok());
    }

    #[test]
    fn test_validate_log_level() {
        let mut settings = AppSettings::default();
        settings.log_level = "verbose".to_string();
        assert!(SettingsManager::validate_settings(&settings).is_err());

        settings.log_level = "debug".to_string();
        assert!(SettingsManager::validate_settings(&settings).is_ok());
    }

    #[test]
    fn test_with_settings_rejects_negative_window() {
        let mut invalid = AppSettings::default();
        invalid.dose_window_minutes = -5;

        let err = SettingsManager::with_settings(invalid).err().unwrap();
        assert!(matches!(err, AppError::Settings(3, _)));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let mut settings = AppSettings::default();
        settings.active_window_minutes = 20;
        settings.database_path = Some("/tmp/meds.db".to_string());
        let manager = SettingsManager::with_settings(settings.clone()).unwrap();
        manager.save(&path).unwrap();

        let loaded = SettingsManager::load(&path).unwrap();
        assert_eq!(loaded.get(), settings);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let loaded = SettingsManager::load(&dir.path().join("nope.json")).unwrap();
        assert_eq!(loaded.get(), AppSettings::default());
    }

    #[test]
    fn test_load_or_create_writes_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config").join("settings.json");

        let created = SettingsManager::load_or_create(&path).unwrap();
        assert_eq!(created.get(), AppSettings::default());
        assert!(path.exists());

        // 用户修改后的文件不会被覆盖
        let mut edited = AppSettings::default();
        edited.default_time_presets = false;
        SettingsManager::with_settings(edited.clone())
            .unwrap()
            .save(&path)
            .unwrap();
        assert_eq!(SettingsManager::load_or_create(&path).unwrap().get(), edited);
    }

    #[test]
    fn test_load_invalid_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = SettingsManager::load(&path).err().unwrap();
        assert!(matches!(err, AppError::Settings(1, _)));
    }
}
