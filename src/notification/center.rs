/// 进程内通知中心
///
/// 模拟平台的已登记通知表：同 identifier 覆盖，单次通知触发后即移除。
/// 没有真实推送通道时（命令行、测试）使用。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::{NotificationService, NotificationTrigger, ScheduledNotification};
use crate::error::{AppError, AppResult};

/// 进程内通知中心
#[derive(Debug)]
pub struct InMemoryNotificationCenter {
    entries: Mutex<BTreeMap<String, ScheduledNotification>>,
    permission: AtomicBool,
}

impl InMemoryNotificationCenter {
    /// 默认已授权
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            permission: AtomicBool::new(true),
        }
    }

    /// 设置授权状态（拒绝后 register 失败）
    pub fn set_permission(&self, granted: bool) {
        self.permission.store(granted, Ordering::SeqCst);
    }

    /// 触发所有已到期的单次通知，并从表中移除
    pub fn deliver_due(&self, now: DateTime<Utc>) -> AppResult<Vec<ScheduledNotification>> {
        let mut entries = self.lock()?;
        let due: Vec<String> = entries
            .values()
            .filter(|n| matches!(n.trigger, NotificationTrigger::OneShot { at } if at <= now))
            .map(|n| n.identifier.clone())
            .collect();

        let delivered: Vec<ScheduledNotification> =
            due.iter().filter_map(|id| entries.remove(id)).collect();

        if !delivered.is_empty() {
            debug!("Delivered {} one-shot notification(s)", delivered.len());
        }
        Ok(delivered)
    }

    pub fn len(&self) -> usize {
        self.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, BTreeMap<String, ScheduledNotification>>> {
        self.entries
            .lock()
            .map_err(|_| AppError::notification(500, "通知表锁已损坏"))
    }
}

impl Default for InMemoryNotificationCenter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationService for InMemoryNotificationCenter {
    async fn request_permission(&self) -> AppResult<bool> {
        Ok(self.permission.load(Ordering::SeqCst))
    }

    async fn register(&self, notification: ScheduledNotification) -> AppResult<()> {
        if !self.permission.load(Ordering::SeqCst) {
            return Err(AppError::permission(2, "未获得通知权限"));
        }
        self.lock()?
            .insert(notification.identifier.clone(), notification);
        Ok(())
    }

    async fn list_all(&self) -> AppResult<Vec<ScheduledNotification>> {
        Ok(self.lock()?.values().cloned().collect())
    }

    async fn cancel(&self, identifier: &str) -> AppResult<()> {
        self.lock()?.remove(identifier);
        Ok(())
    }
}
