/// 药品存储
///
/// 药品、服药记录、紧急联系人的增删改查，以及"今天已服用的时间段"查询。
/// 所有失败直接返回给调用方，不做重试。

use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::db::Database;

mod contacts;
mod dose_history;
mod medicines;

/// 药品存储
#[derive(Clone)]
pub struct MedicationStore {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
}

impl MedicationStore {
    /// 使用系统时钟
    pub fn new(db: Arc<Database>) -> Self {
        Self::with_clock(db, Arc::new(SystemClock))
    }

    pub fn with_clock(db: Arc<Database>, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    fn now_millis(&self) -> i64 {
        self.clock.now().timestamp_millis()
    }
}
