/// 服药提醒调度器
///
/// 每个服药时间登记一条每日提醒（base），再针对下一次出现的时刻登记
/// 5 条单次追加提醒（nag），分别在 +1..+5 分钟触发。确认服药只取消 nag，
/// 删除/编辑药品时取消全部。

use chrono::{DateTime, Duration, TimeZone, Utc};
use log::{info, warn};
use std::collections::BTreeSet;
use std::sync::Arc;

use super::{
    base_identifier, nag_identifier, NotificationContent, NotificationKind, NotificationPayload,
    NotificationService, NotificationTrigger, ScheduledNotification,
};
use crate::clock::{resolve_local, Clock, SystemClock};
use crate::db::schema::{DoseTime, Medicine};
use crate::error::AppResult;

/// 每个服药时间的追加提醒条数
pub const NAG_COUNT: u32 = 5;

/// 追加提醒间隔（分钟）
pub const NAG_INTERVAL_MINUTES: i64 = 1;

/// 默认"需要处理"窗口（分钟）
pub const DEFAULT_ACTIVE_WINDOW_MINUTES: i64 = 15;

/// 下一次出现 hour:minute 的时刻
///
/// 今天的该时刻严格晚于 now 则取今天，否则取明天（恰好等于 now 视为已过）。
pub fn next_occurrence<Tz: TimeZone>(now: &DateTime<Tz>, time: DoseTime) -> DateTime<Tz> {
    let tz = now.timezone();
    let today = now.date_naive();

    let candidate = resolve_local(&tz, today.and_time(time.as_naive_time()));
    if candidate > *now {
        return candidate;
    }

    let tomorrow = today + Duration::days(1);
    resolve_local(&tz, tomorrow.and_time(time.as_naive_time()))
}

/// 某次服药对应的 nag 触发时刻
pub fn nag_instants(dose_at: DateTime<Utc>) -> Vec<DateTime<Utc>> {
    (1..=NAG_COUNT)
        .map(|i| dose_at + Duration::minutes(i as i64 * NAG_INTERVAL_MINUTES))
        .collect()
}

/// 服药提醒调度器
pub struct ReminderScheduler {
    service: Arc<dyn NotificationService>,
    clock: Arc<dyn Clock>,
    active_window: Duration,
}

impl ReminderScheduler {
    /// 使用系统时钟
    pub fn new(service: Arc<dyn NotificationService>) -> Self {
        Self::with_clock(service, Arc::new(SystemClock))
    }

    pub fn with_clock(service: Arc<dyn NotificationService>, clock: Arc<dyn Clock>) -> Self {
        Self {
            service,
            clock,
            active_window: Duration::minutes(DEFAULT_ACTIVE_WINDOW_MINUTES),
        }
    }

    /// 调整"需要处理"窗口
    pub fn with_active_window(mut self, minutes: i64) -> Self {
        self.active_window = Duration::minutes(minutes);
        self
    }

    /// 请求通知权限
    pub async fn request_permission(&self) -> AppResult<bool> {
        let granted = self.service.request_permission().await?;
        if !granted {
            warn!("Notification permission not granted, reminders will not fire");
        }
        Ok(granted)
    }

    /// 登记每日提醒，然后为下一次服药登记 nag
    pub async fn schedule_dose_with_nags(
        &self,
        medicine_id: i64,
        name: &str,
        dosage: &str,
        time: DoseTime,
    ) -> AppResult<()> {
        self.register_base(medicine_id, name, dosage, time).await?;
        self.schedule_nags_for_next_dose(medicine_id, name, dosage, time)
            .await?;
        Ok(())
    }

    /// 登记每日提醒，同一时间重复登记会覆盖
    async fn register_base(
        &self,
        medicine_id: i64,
        name: &str,
        dosage: &str,
        time: DoseTime,
    ) -> AppResult<()> {
        let base = ScheduledNotification {
            identifier: base_identifier(medicine_id, time),
            content: NotificationContent {
                title: format!("Time to take your medicine: {}", name),
                body: format!("Dosage: {}", dosage),
                payload: NotificationPayload {
                    medicine_id,
                    kind: NotificationKind::Base,
                    hour: time.hour(),
                    minute: time.minute(),
                },
                sound: true,
            },
            trigger: NotificationTrigger::Daily {
                hour: time.hour(),
                minute: time.minute(),
            },
        };
        self.service.register(base).await
    }

    /// 为下一次服药登记 5 条 nag，返回它们的触发时刻
    ///
    /// identifier 固定，重复调用会覆盖之前的同一批。
    pub async fn schedule_nags_for_next_dose(
        &self,
        medicine_id: i64,
        name: &str,
        _dosage: &str,
        time: DoseTime,
    ) -> AppResult<Vec<DateTime<Utc>>> {
        let next = next_occurrence(&self.clock.now(), time).with_timezone(&Utc);
        let instants = nag_instants(next);

        for (ordinal, at) in (1..=NAG_COUNT).zip(instants.iter()) {
            let nag = ScheduledNotification {
                identifier: nag_identifier(medicine_id, time, ordinal),
                content: NotificationContent {
                    title: format!("Reminder: Have you taken {}?", name),
                    body: "Please confirm in the app to stop these alerts.".to_string(),
                    payload: NotificationPayload {
                        medicine_id,
                        kind: NotificationKind::Nag,
                        hour: time.hour(),
                        minute: time.minute(),
                    },
                    sound: true,
                },
                trigger: NotificationTrigger::OneShot { at: *at },
            };
            self.service.register(nag).await?;
        }

        info!(
            "Scheduled {} nag(s) for medicine #{} at {} (next dose {})",
            NAG_COUNT, medicine_id, time, next
        );
        Ok(instants)
    }

    /// 为药品的每个服药时间登记提醒
    pub async fn schedule_medicine(&self, medicine: &Medicine) -> AppResult<()> {
        for time in medicine.times.iter() {
            self.schedule_dose_with_nags(medicine.id, &medicine.name, &medicine.dosage, *time)
                .await?;
        }
        Ok(())
    }

    /// 确认服药：只取消该药品的 nag，保留每日提醒
    pub async fn confirm_dose(&self, medicine_id: i64) -> AppResult<usize> {
        let cancelled = self
            .cancel_where(|n| n.payload().is_nag_for(medicine_id))
            .await?;
        info!("Confirmed dose for medicine #{}, cancelled {} nag(s)", medicine_id, cancelled);
        Ok(cancelled)
    }

    /// 取消该药品的全部通知（删除、编辑前）
    pub async fn cancel_medicine_notifications(&self, medicine_id: i64) -> AppResult<usize> {
        let cancelled = self
            .cancel_where(|n| n.payload().medicine_id == medicine_id)
            .await?;
        info!("Cancelled {} notification(s) for medicine #{}", cancelled, medicine_id);
        Ok(cancelled)
    }

    /// 有 nag 落在 now ± 窗口内的药品
    pub async fn get_active_medicine_ids(&self) -> AppResult<BTreeSet<i64>> {
        Ok(self
            .active_nags()
            .await?
            .iter()
            .map(|payload| payload.medicine_id)
            .collect())
    }

    /// 该药品 nag 正落在窗口内的服药时间
    pub async fn active_slots_for(&self, medicine_id: i64) -> AppResult<BTreeSet<DoseTime>> {
        Ok(self
            .active_nags()
            .await?
            .iter()
            .filter(|payload| payload.medicine_id == medicine_id)
            .filter_map(|payload| DoseTime::new(payload.hour, payload.minute).ok())
            .collect())
    }

    async fn active_nags(&self) -> AppResult<Vec<NotificationPayload>> {
        let now = self.clock.now().with_timezone(&Utc);
        let window = self.active_window;

        Ok(self
            .service
            .list_all()
            .await?
            .iter()
            .filter(|n| n.payload().kind == NotificationKind::Nag)
            .filter(|n| n.fire_at().map_or(false, |at| (at - now).abs() <= window))
            .map(|n| n.payload().clone())
            .collect())
    }

    /// 补齐提醒
    ///
    /// 通知表被清空（新进程、平台重置）时每日提醒也会丢失，缺了就重新登记。
    /// 某个服药时间没有未来的 nag（已触发被平台移除，或从未登记）时，
    /// 针对下一次服药重新登记一批。重复的服药时间只处理一次。
    /// 返回补登记过的服药时间个数。
    pub async fn replenish_nags(&self, medicines: &[Medicine]) -> AppResult<usize> {
        let now = self.clock.now().with_timezone(&Utc);
        let existing = self.service.list_all().await?;

        let bases: BTreeSet<&str> = existing
            .iter()
            .filter(|n| n.payload().kind == NotificationKind::Base)
            .map(|n| n.identifier.as_str())
            .collect();
        let pending: BTreeSet<(i64, u8, u8)> = existing
            .iter()
            .filter(|n| n.payload().kind == NotificationKind::Nag)
            .filter(|n| n.fire_at().map_or(false, |at| at > now))
            .map(|n| (n.payload().medicine_id, n.payload().hour, n.payload().minute))
            .collect();

        let mut seen = BTreeSet::new();
        let mut restored = 0;
        for medicine in medicines {
            for time in medicine.times.iter() {
                let key = (medicine.id, time.hour(), time.minute());
                if !seen.insert(key) {
                    continue;
                }

                let has_base = bases.contains(base_identifier(medicine.id, *time).as_str());
                let has_nags = pending.contains(&key);
                if has_base && has_nags {
                    continue;
                }

                if !has_base {
                    self.register_base(medicine.id, &medicine.name, &medicine.dosage, *time)
                        .await?;
                }
                if !has_nags {
                    self.schedule_nags_for_next_dose(medicine.id, &medicine.name, &medicine.dosage, *time)
                        .await?;
                }
                restored += 1;
            }
        }

        if restored > 0 {
            info!("Replenished reminders for {} dose time(s)", restored);
        }
        Ok(restored)
    }

    /// 取消所有满足条件的通知，返回取消条数
    async fn cancel_where<F>(&self, predicate: F) -> AppResult<usize>
    where
        F: Fn(&ScheduledNotification) -> bool + Send,
    {
        let targets: Vec<String> = self
            .service
            .list_all()
            .await?
            .into_iter()
            .filter(|n| predicate(n))
            .map(|n| n.identifier)
            .collect();

        for identifier in &targets {
            self.service.cancel(identifier).await?;
        }
        Ok(targets.len())
    }
}
