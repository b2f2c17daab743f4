/// 服药提醒流程
///
/// 把存储和调度器串起来，对应提醒页面上的操作：新增、编辑、删除、
/// 标记已服用、启动时补齐提醒。存储和通知之间没有两阶段提交，
/// 编辑总是先取消旧通知再写库、再重新登记。

use chrono::{DateTime, Local, Timelike};
use log::{info, warn};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::db::schema::{DoseTime, DoseTimes, EmergencyContact, Medicine, NewContact, NewMedicine};
use crate::error::{AppError, AppResult};
use crate::notification::ReminderScheduler;
use crate::settings::AppSettings;
use crate::store::MedicationStore;

pub mod presets;

pub use presets::{default_times_for_frequency, fit_times_to_frequency};

/// 今日某个服药时间的状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotStatus {
    /// 已服用
    Taken,
    /// 在服药窗口内，尚未服用
    Due,
    /// 还没到
    Upcoming,
    /// 窗口已过且未服用
    Missed,
}

/// 服药提醒服务
pub struct ReminderService {
    store: MedicationStore,
    scheduler: Arc<ReminderScheduler>,
    clock: Arc<dyn Clock>,
    dose_window_minutes: i64,
    default_time_presets: bool,
}

impl ReminderService {
    pub fn new(store: MedicationStore, scheduler: Arc<ReminderScheduler>) -> Self {
        Self::with_clock(store, scheduler, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: MedicationStore,
        scheduler: Arc<ReminderScheduler>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            scheduler,
            clock,
            dose_window_minutes: AppSettings::default().dose_window_minutes,
            default_time_presets: AppSettings::default().default_time_presets,
        }
    }

    /// 应用设置中的服药窗口和频率预设开关
    pub fn with_settings(mut self, settings: &AppSettings) -> Self {
        self.dose_window_minutes = settings.dose_window_minutes;
        self.default_time_presets = settings.default_time_presets;
        self
    }

    pub fn store(&self) -> &MedicationStore {
        &self.store
    }

    /// 新增药品并登记所有服药时间的提醒
    pub async fn add_medicine(&self, new: NewMedicine) -> AppResult<Medicine> {
        if new.name.trim().is_empty() {
            return Err(AppError::validation(10, "药品名称不能为空"));
        }

        let id = self.store.add_medicine(
            &new.name,
            &new.dosage,
            new.frequency,
            &new.times,
            &new.external_links,
        )?;

        let medicine = self
            .store
            .get_medicine(id)?
            .ok_or_else(|| AppError::not_found(format!("药品 #{} 不存在", id)))?;

        self.scheduler.schedule_medicine(&medicine).await?;
        info!("Medicine #{} ({}) added with reminders", id, medicine.name);
        Ok(medicine)
    }

    /// 修改服药计划：取消旧通知 → 写库 → 重新登记
    pub async fn edit_schedule(
        &self,
        id: i64,
        frequency: u32,
        times: DoseTimes,
    ) -> AppResult<Medicine> {
        if times.is_empty() {
            return Err(AppError::validation(11, "至少需要一个服药时间"));
        }

        let existing = self
            .store
            .get_medicine(id)?
            .ok_or_else(|| AppError::not_found(format!("药品 #{} 不存在", id)))?;

        self.scheduler.cancel_medicine_notifications(id).await?;
        self.store.update_medicine(id, frequency, &times)?;

        let updated = Medicine {
            frequency,
            times,
            ..existing
        };
        self.scheduler.schedule_medicine(&updated).await?;
        Ok(updated)
    }

    /// 修改频率
    ///
    /// 开启预设时服药时间按预设重新生成，否则保留原有时间，
    /// 多出的截掉，不足的用预设补齐。
    pub async fn edit_frequency(&self, id: i64, frequency: u32) -> AppResult<Medicine> {
        let times = if self.default_time_presets {
            default_times_for_frequency(frequency)
        } else {
            let existing = self
                .store
                .get_medicine(id)?
                .ok_or_else(|| AppError::not_found(format!("药品 #{} 不存在", id)))?;
            fit_times_to_frequency(&existing.times, frequency)
        };
        self.edit_schedule(id, frequency, times).await
    }

    /// 删除药品：先取消通知，再删库
    pub async fn delete_medicine(&self, id: i64) -> AppResult<()> {
        self.scheduler.cancel_medicine_notifications(id).await?;
        self.store.delete_medicine(id)
    }

    pub fn medicines(&self) -> AppResult<Vec<Medicine>> {
        self.store.get_medicines()
    }

    /// 今日每个服药时间的状态
    pub fn slot_statuses(&self, medicine: &Medicine) -> AppResult<Vec<(DoseTime, SlotStatus)>> {
        let taken = self.store.get_dose_history(medicine.id)?;
        let now = minutes_of_day(&self.clock.now());
        let window = u32::try_from(self.dose_window_minutes).unwrap_or(0);

        Ok(medicine
            .times
            .iter()
            .map(|time| {
                let status = if taken.contains(&time.to_string()) {
                    SlotStatus::Taken
                } else if now < time.minutes_of_day() {
                    SlotStatus::Upcoming
                } else if now <= time.minutes_of_day() + window {
                    SlotStatus::Due
                } else {
                    SlotStatus::Missed
                };
                (*time, status)
            })
            .collect())
    }

    /// 当前在窗口内且今天尚未服用的时间
    pub fn due_slots(&self, medicine: &Medicine) -> AppResult<Vec<DoseTime>> {
        Ok(self
            .slot_statuses(medicine)?
            .into_iter()
            .filter(|(_, status)| *status == SlotStatus::Due)
            .map(|(time, _)| time)
            .collect())
    }

    /// 需要显示"已服用"按钮的药品
    ///
    /// 服药窗口内有未服用时间，或者有 nag 落在提醒窗口内。
    pub async fn actionable_medicine_ids(&self) -> AppResult<BTreeSet<i64>> {
        let mut ids = self.scheduler.get_active_medicine_ids().await?;
        for medicine in self.store.get_medicines()? {
            if !self.due_slots(&medicine)?.is_empty() {
                ids.insert(medicine.id);
            }
        }
        Ok(ids)
    }

    /// 标记已服用
    ///
    /// 记录当前窗口内的服药时间（若有），并停止 nag。每日提醒保留。
    /// 其他服药时间的 nag 随后按下一次服药重新登记；没有记录到时间段时，
    /// 正在提醒的那个时间不再登记。返回记录的时间段。
    pub async fn mark_as_taken(&self, id: i64) -> AppResult<Option<DoseTime>> {
        let medicine = self
            .store
            .get_medicine(id)?
            .ok_or_else(|| AppError::not_found(format!("药品 #{} 不存在", id)))?;

        let slot = self.due_slots(&medicine)?.into_iter().next();
        match slot {
            Some(slot) => {
                self.store.log_dose(id, &slot.to_string())?;
            }
            None => warn!("No due slot for medicine #{}, only silencing nags", id),
        }

        let silenced = self.scheduler.active_slots_for(id).await?;
        self.scheduler.confirm_dose(id).await?;

        let rearm = Medicine {
            times: DoseTimes(
                medicine
                    .times
                    .iter()
                    .copied()
                    .filter(|time| Some(*time) == slot || !silenced.contains(time))
                    .collect(),
            ),
            ..medicine
        };
        self.scheduler.replenish_nags(std::slice::from_ref(&rearm)).await?;
        Ok(slot)
    }

    /// 启动时补齐所有药品的提醒，返回补登记的服药时间个数
    pub async fn restore_schedules(&self) -> AppResult<usize> {
        if !self.scheduler.request_permission().await? {
            return Ok(0);
        }
        let medicines = self.store.get_medicines()?;
        self.scheduler.replenish_nags(&medicines).await
    }

    pub fn add_contact(&self, contact: NewContact) -> AppResult<i64> {
        if contact.name.trim().is_empty() || contact.phone.trim().is_empty() {
            return Err(AppError::validation(12, "联系人姓名和电话不能为空"));
        }
        self.store.add_contact(&contact)
    }

    pub fn contacts(&self) -> AppResult<Vec<EmergencyContact>> {
        self.store.get_contacts()
    }

    pub fn delete_contact(&self, id: i64) -> AppResult<()> {
        self.store.delete_contact(id)
    }
}

fn minutes_of_day(now: &DateTime<Local>) -> u32 {
    now.hour() * 60 + now.minute()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::db::schema::ExternalLinks;
    use crate::db::Database;
    use crate::notification::{InMemoryNotificationCenter, NotificationKind, NotificationService};
    use chrono::{TimeZone, Utc};

    struct Fixture {
        service: ReminderService,
        center: Arc<InMemoryNotificationCenter>,
        clock: Arc<FixedClock>,
    }

    fn at(h: u32, m: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 6, 15, h, m, 0).unwrap()
    }

    fn fixture(now: DateTime<Local>) -> Fixture {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        let clock = Arc::new(FixedClock::new(now));
        let center = Arc::new(InMemoryNotificationCenter::new());
        let store = MedicationStore::with_clock(Arc::new(db), clock.clone());
        let scheduler = Arc::new(ReminderScheduler::with_clock(center.clone(), clock.clone()));
        let service = ReminderService::with_clock(store, scheduler, clock.clone());
        Fixture { service, center, clock }
    }

    fn new_medicine(name: &str, times: &[&str]) -> NewMedicine {
        NewMedicine {
            name: name.to_string(),
            dosage: "500mg".to_string(),
            frequency: times.len() as u32,
            times: DoseTimes::parse(times).unwrap(),
            external_links: ExternalLinks::default(),
        }
    }

    #[tokio::test]
    async fn test_add_medicine_schedules_each_slot() {
        let f = fixture(at(9, 0));
        let med = f
            .service
            .add_medicine(new_medicine("Amoxicillin", &["10:00", "20:00"]))
            .await
            .unwrap();

        let all = f.center.list_all().await.unwrap();
        assert_eq!(all.len(), 12);
        assert!(all.iter().all(|n| n.payload().medicine_id == med.id));
    }

    #[tokio::test]
    async fn test_add_medicine_requires_name() {
        let f = fixture(at(9, 0));
        let err = f.service.add_medicine(new_medicine("  ", &["10:00"])).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(10, _)));
        assert!(f.center.is_empty());
    }

    #[tokio::test]
    async fn test_edit_schedule_replaces_notifications() {
        let f = fixture(at(9, 0));
        let med = f
            .service
            .add_medicine(new_medicine("Amoxicillin", &["10:00", "20:00"]))
            .await
            .unwrap();

        let updated = f
            .service
            .edit_schedule(med.id, 1, DoseTimes::parse(&["12:30"]).unwrap())
            .await
            .unwrap();
        assert_eq!(updated.times.labels(), vec!["12:30"]);

        let all = f.center.list_all().await.unwrap();
        assert_eq!(all.len(), 6);
        assert!(all.iter().all(|n| n.payload().hour == 12 && n.payload().minute == 30));

        let stored = f.service.store().get_medicine(med.id).unwrap().unwrap();
        assert_eq!(stored.frequency, 1);
        assert_eq!(stored.name, "Amoxicillin");
    }

    #[tokio::test]
    async fn test_edit_schedule_rejects_empty_times() {
        let f = fixture(at(9, 0));
        let med = f.service.add_medicine(new_medicine("A", &["10:00"])).await.unwrap();

        let err = f
            .service
            .edit_schedule(med.id, 0, DoseTimes::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(11, _)));
        // 校验失败不会动已有通知
        assert_eq!(f.center.len(), 6);
    }

    #[tokio::test]
    async fn test_edit_frequency_uses_presets() {
        let f = fixture(at(9, 0));
        let med = f.service.add_medicine(new_medicine("A", &["10:00"])).await.unwrap();

        let updated = f.service.edit_frequency(med.id, 3).await.unwrap();
        assert_eq!(updated.times.labels(), vec!["08:00", "14:00", "20:00"]);
        assert_eq!(f.center.len(), 18);
    }

    #[tokio::test]
    async fn test_edit_frequency_keeps_times_without_presets() {
        let mut f = fixture(at(9, 0));
        let mut settings = AppSettings::default();
        settings.default_time_presets = false;
        f.service = f.service.with_settings(&settings);

        let med = f
            .service
            .add_medicine(new_medicine("A", &["09:30", "21:15"]))
            .await
            .unwrap();

        let grown = f.service.edit_frequency(med.id, 3).await.unwrap();
        assert_eq!(grown.times.labels(), vec!["09:30", "21:15", "20:00"]);
        assert_eq!(f.center.len(), 18);

        let shrunk = f.service.edit_frequency(med.id, 1).await.unwrap();
        assert_eq!(shrunk.times.labels(), vec!["09:30"]);
        assert_eq!(f.center.len(), 6);

        let stored = f.service.store().get_medicine(med.id).unwrap().unwrap();
        assert_eq!(stored.times.labels(), vec!["09:30"]);
        assert_eq!(stored.frequency, 1);
    }

    #[tokio::test]
    async fn test_delete_medicine_cancels_everything() {
        let f = fixture(at(9, 0));
        let med = f.service.add_medicine(new_medicine("A", &["10:00"])).await.unwrap();
        let other = f.service.add_medicine(new_medicine("B", &["11:00"])).await.unwrap();

        f.service.delete_medicine(med.id).await.unwrap();

        assert!(f.service.store().get_medicine(med.id).unwrap().is_none());
        let all = f.center.list_all().await.unwrap();
        assert!(all.iter().all(|n| n.payload().medicine_id == other.id));
    }

    #[tokio::test]
    async fn test_slot_statuses() {
        let f = fixture(at(10, 30));
        let med = f
            .service
            .add_medicine(new_medicine("A", &["08:00", "10:00", "20:00"]))
            .await
            .unwrap();

        let statuses: Vec<SlotStatus> = f
            .service
            .slot_statuses(&med)
            .unwrap()
            .into_iter()
            .map(|(_, s)| s)
            .collect();
        assert_eq!(
            statuses,
            vec![SlotStatus::Missed, SlotStatus::Due, SlotStatus::Upcoming]
        );
    }

    #[tokio::test]
    async fn test_negative_dose_window_is_zero() {
        let mut f = fixture(at(10, 0));
        let mut settings = AppSettings::default();
        settings.dose_window_minutes = -5;
        f.service = f.service.with_settings(&settings);

        let med = f.service.add_medicine(new_medicine("A", &["10:00"])).await.unwrap();
        assert_eq!(f.service.due_slots(&med).unwrap(), vec![med.times.0[0]]);

        f.clock.set(at(10, 1));
        let statuses = f.service.slot_statuses(&med).unwrap();
        assert_eq!(statuses[0].1, SlotStatus::Missed);
    }

    #[tokio::test]
    async fn test_mark_as_taken_logs_slot_and_rearms_nags() {
        let f = fixture(at(9, 0));
        let med = f
            .service
            .add_medicine(new_medicine("Amoxicillin", &["10:00", "20:00"]))
            .await
            .unwrap();

        f.clock.set(at(10, 3));
        assert!(f.service.actionable_medicine_ids().await.unwrap().contains(&med.id));

        let slot = f.service.mark_as_taken(med.id).await.unwrap();
        assert_eq!(slot.map(|s| s.to_string()), Some("10:00".to_string()));
        assert_eq!(f.service.store().get_dose_history(med.id).unwrap(), vec!["10:00"]);

        let all = f.center.list_all().await.unwrap();
        assert_eq!(all.len(), 12);
        let bases = all.iter().filter(|n| n.payload().kind == NotificationKind::Base).count();
        assert_eq!(bases, 2);

        // 20:00 那批还在今天，10:00 那批移到明天
        let nags_at = |hour: u8| -> Vec<DateTime<Utc>> {
            all.iter()
                .filter(|n| n.payload().kind == NotificationKind::Nag && n.payload().hour == hour)
                .filter_map(|n| n.fire_at())
                .collect()
        };
        let evening = nags_at(20);
        assert_eq!(evening.len(), 5);
        assert!(evening.contains(&at(20, 1).with_timezone(&Utc)));
        let morning = nags_at(10);
        assert_eq!(morning.len(), 5);
        assert!(morning.contains(&(at(10, 1) + chrono::Duration::days(1)).with_timezone(&Utc)));

        assert!(f.service.actionable_medicine_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_as_taken_before_slot_silences_current_nags() {
        let f = fixture(at(9, 0));
        let med = f
            .service
            .add_medicine(new_medicine("A", &["10:00", "20:00"]))
            .await
            .unwrap();

        // 09:50：10:00 的 nag 已在窗口内，但时间段还没到
        f.clock.set(at(9, 50));
        assert!(f.service.actionable_medicine_ids().await.unwrap().contains(&med.id));

        assert!(f.service.mark_as_taken(med.id).await.unwrap().is_none());
        assert!(f.service.actionable_medicine_ids().await.unwrap().is_empty());

        let all = f.center.list_all().await.unwrap();
        assert_eq!(all.len(), 7);
        assert!(all
            .iter()
            .filter(|n| n.payload().kind == NotificationKind::Nag)
            .all(|n| n.payload().hour == 20));
    }

    #[tokio::test]
    async fn test_mark_as_taken_outside_window() {
        let f = fixture(at(9, 0));
        let med = f.service.add_medicine(new_medicine("A", &["10:00"])).await.unwrap();

        let slot = f.service.mark_as_taken(med.id).await.unwrap();
        assert!(slot.is_none());
        assert!(f.service.store().get_dose_history(med.id).unwrap().is_empty());
        // nag 不在窗口内，按下一次服药重新登记
        assert_eq!(f.center.len(), 6);
    }

    #[tokio::test]
    async fn test_mark_as_taken_missing_medicine() {
        let f = fixture(at(9, 0));
        let err = f.service.mark_as_taken(99).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_restore_schedules_after_delivery() {
        let f = fixture(at(9, 0));
        f.service.add_medicine(new_medicine("A", &["10:00"])).await.unwrap();

        f.clock.set(at(11, 0));
        f.center
            .deliver_due(f.clock.now().with_timezone(&chrono::Utc))
            .unwrap();
        assert_eq!(f.center.len(), 1);

        assert_eq!(f.service.restore_schedules().await.unwrap(), 1);
        assert_eq!(f.center.len(), 6);
    }

    #[tokio::test]
    async fn test_restore_schedules_on_empty_table() {
        let f = fixture(at(9, 0));
        let med = f
            .service
            .add_medicine(new_medicine("A", &["10:00", "20:00"]))
            .await
            .unwrap();
        // 新进程：平台通知表是空的
        for n in f.center.list_all().await.unwrap() {
            f.center.cancel(&n.identifier).await.unwrap();
        }
        assert!(f.center.is_empty());
        assert_eq!(f.service.medicines().unwrap()[0].id, med.id);

        assert_eq!(f.service.restore_schedules().await.unwrap(), 2);
        let all = f.center.list_all().await.unwrap();
        assert_eq!(all.len(), 12);
        assert_eq!(
            all.iter().filter(|n| n.payload().kind == NotificationKind::Base).count(),
            2
        );
    }

    #[tokio::test]
    async fn test_restore_schedules_without_permission() {
        let f = fixture(at(9, 0));
        f.service.add_medicine(new_medicine("A", &["10:00"])).await.unwrap();
        f.center.set_permission(false);

        assert_eq!(f.service.restore_schedules().await.unwrap(), 0);
    }

    #[test]
    fn test_contact_validation() {
        let f = fixture(at(9, 0));
        let err = f
            .service
            .add_contact(NewContact {
                name: "Ana".to_string(),
                phone: " ".to_string(),
                email: None,
                relation: None,
            })
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(12, _)));
        assert!(f.service.contacts().unwrap().is_empty());
    }
}
