// 模块声明
mod error;
pub mod clock;
pub mod db;
pub mod settings;
pub mod store;
pub mod notification;
pub mod reminders;

// 导出错误类型供其他模块使用
pub use error::{AppError, AppResult};

use log::{info, warn};
use std::path::Path;
use std::sync::Arc;

use db::Database;
use notification::{InMemoryNotificationCenter, NotificationService, ReminderScheduler};
use reminders::{ReminderService, SlotStatus};
use settings::SettingsManager;
use store::MedicationStore;

/// 初始化日志（RUST_LOG 优先于设置中的级别）
pub fn init_logging(default_level: &str) {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_secs()
        .try_init();
}

/// 应用状态
pub struct AppState {
    pub db: Arc<Database>,
    pub settings: Arc<SettingsManager>,
    pub reminders: ReminderService,
}

impl AppState {
    /// 打开数据库并组装服务
    ///
    /// 数据库初始化失败不中断启动，沿用已有表结构。
    pub fn new(settings: SettingsManager, notifications: Arc<dyn NotificationService>) -> AppResult<Self> {
        let current = settings.get();
        let db = Arc::new(Database::open(current.resolved_database_path())?);
        db.initialize_or_log();

        let store = MedicationStore::new(Arc::clone(&db));
        let scheduler = ReminderScheduler::new(notifications)
            .with_active_window(current.active_window_minutes);
        let reminders = ReminderService::new(store, Arc::new(scheduler)).with_settings(&current);

        Ok(Self {
            db,
            settings: Arc::new(settings),
            reminders,
        })
    }
}

/// 命令行入口：加载设置、恢复提醒、输出今日服药状态
pub async fn run(settings_path: Option<&Path>) -> anyhow::Result<()> {
    let settings = match settings_path {
        Some(path) => SettingsManager::load_or_create(path)?,
        None => SettingsManager::new(),
    };
    init_logging(&settings.get().log_level);

    let center: Arc<dyn NotificationService> = Arc::new(InMemoryNotificationCenter::new());
    let state = AppState::new(settings, center)?;

    match state.reminders.restore_schedules().await {
        Ok(restored) => info!("Reminders restored ({} dose time(s) re-registered)", restored),
        Err(e) => warn!("Failed to restore reminders: {}", e),
    }

    let medicines = state.reminders.medicines()?;
    info!("{} medicine(s) on file", medicines.len());

    for medicine in &medicines {
        let statuses = state.reminders.slot_statuses(medicine)?;
        let summary: Vec<String> = statuses
            .iter()
            .map(|(time, status)| {
                let label = match status {
                    SlotStatus::Taken => "taken",
                    SlotStatus::Due => "due",
                    SlotStatus::Upcoming => "upcoming",
                    SlotStatus::Missed => "missed",
                };
                format!("{} {}", time, label)
            })
            .collect();
        info!(
            "#{} {} ({}, {}x daily): {}",
            medicine.id,
            medicine.name,
            medicine.dosage,
            medicine.frequency,
            summary.join(", ")
        );
    }

    let actionable = state.reminders.actionable_medicine_ids().await?;
    if !actionable.is_empty() {
        info!("Action needed for medicine id(s): {:?}", actionable);
    }

    let contacts = state.reminders.contacts()?;
    info!("{} emergency contact(s)", contacts.len());

    let AppState { db, reminders, .. } = state;
    drop(reminders);
    match Arc::try_unwrap(db) {
        Ok(db) => db.shutdown()?,
        Err(_) => warn!("Database still in use, skipping explicit close"),
    }
    Ok(())
}
