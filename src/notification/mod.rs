/// 服药通知
///
/// 平台通知服务只暴露三个能力：注册、列出、取消。调度器不保存任何
/// 本地状态，所有对账（确认服药、取消、是否需要处理）都是对
/// `list_all()` 结果的过滤。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::schema::DoseTime;
use crate::error::AppResult;

pub mod center;
pub mod scheduler;

pub use center::InMemoryNotificationCenter;
pub use scheduler::ReminderScheduler;

/// 通知类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    /// 每日固定提醒
    Base,
    /// 服药后的追加提醒
    Nag,
}

/// 通知携带的数据
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub medicine_id: i64,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub hour: u8,
    pub minute: u8,
}

impl NotificationPayload {
    pub fn is_nag_for(&self, medicine_id: i64) -> bool {
        self.medicine_id == medicine_id && self.kind == NotificationKind::Nag
    }
}

/// 通知内容
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationContent {
    pub title: String,
    pub body: String,
    pub payload: NotificationPayload,
    pub sound: bool,
}

/// 触发条件
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NotificationTrigger {
    /// 每天 hour:minute
    Daily { hour: u8, minute: u8 },
    /// 单次，绝对时刻
    OneShot { at: DateTime<Utc> },
}

/// 平台中已登记的一条通知
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduledNotification {
    pub identifier: String,
    pub content: NotificationContent,
    pub trigger: NotificationTrigger,
}

impl ScheduledNotification {
    pub fn payload(&self) -> &NotificationPayload {
        &self.content.payload
    }

    /// 单次触发时刻；每日通知返回 None
    pub fn fire_at(&self) -> Option<DateTime<Utc>> {
        match self.trigger {
            NotificationTrigger::OneShot { at } => Some(at),
            NotificationTrigger::Daily { .. } => None,
        }
    }
}

/// 平台通知服务
#[async_trait]
pub trait NotificationService: Send + Sync {
    /// 请求通知权限，返回是否已授权
    async fn request_permission(&self) -> AppResult<bool>;

    /// 登记通知；同 identifier 的旧通知被替换
    async fn register(&self, notification: ScheduledNotification) -> AppResult<()>;

    /// 当前所有待触发的通知
    async fn list_all(&self) -> AppResult<Vec<ScheduledNotification>>;

    /// 取消一条通知；不存在时什么也不做
    async fn cancel(&self, identifier: &str) -> AppResult<()>;
}

/// 每日提醒的 identifier
pub fn base_identifier(medicine_id: i64, time: DoseTime) -> String {
    format!("med-{}-base-{}-{}", medicine_id, time.hour(), time.minute())
}

/// 追加提醒的 identifier（ordinal 从 1 开始）
pub fn nag_identifier(medicine_id: i64, time: DoseTime, ordinal: u32) -> String {
    format!(
        "med-{}-nag-{}-{}-{}",
        medicine_id,
        time.hour(),
        time.minute(),
        ordinal
    )
}
