/// 数据库表结构定义
///
/// 表说明：
/// - medicines: 药品及其每日服药时间
/// - dose_history: 服药确认记录
/// - contacts: 紧急联系人
///
/// times / external_links 在库中以 JSON 数组文本保存，读写都经过
/// DoseTimes / ExternalLinks 这两个值对象。

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{AppError, AppResult};

/// 每日服药时间点 (HH:MM, 24 小时制)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DoseTime {
    hour: u8,
    minute: u8,
}

impl DoseTime {
    pub fn new(hour: u8, minute: u8) -> AppResult<Self> {
        if hour > 23 {
            return Err(AppError::validation(2, "小时必须在 0-23 之间"));
        }
        if minute > 59 {
            return Err(AppError::validation(3, "分钟必须在 0-59 之间"));
        }
        Ok(Self { hour, minute })
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    /// 自零点起的分钟数
    pub fn minutes_of_day(&self) -> u32 {
        self.hour as u32 * 60 + self.minute as u32
    }

    pub fn as_naive_time(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour as u32, self.minute as u32, 0).unwrap_or_default()
    }
}

impl FromStr for DoseTime {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hour, minute) = s
            .split_once(':')
            .ok_or_else(|| AppError::validation(1, format!("时间格式必须是 HH:MM: {}", s)))?;

        if hour.is_empty()
            || hour.len() > 2
            || minute.len() != 2
            || !hour.bytes().chain(minute.bytes()).all(|b| b.is_ascii_digit())
        {
            return Err(AppError::validation(1, format!("时间格式必须是 HH:MM: {}", s)));
        }

        let hour: u8 = hour
            .parse()
            .map_err(|_| AppError::validation(1, format!("小时必须是有效的数字: {}", s)))?;
        let minute: u8 = minute
            .parse()
            .map_err(|_| AppError::validation(1, format!("分钟必须是有效的数字: {}", s)))?;

        Self::new(hour, minute)
    }
}

impl fmt::Display for DoseTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl Serialize for DoseTime {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DoseTime {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// 服药时间列表（times 列）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DoseTimes(pub Vec<DoseTime>);

impl DoseTimes {
    /// 从 "HH:MM" 字符串列表解析
    pub fn parse<S: AsRef<str>>(times: &[S]) -> AppResult<Self> {
        times
            .iter()
            .map(|t| t.as_ref().parse())
            .collect::<AppResult<Vec<_>>>()
            .map(Self)
    }

    pub fn to_column(&self) -> AppResult<String> {
        Ok(serde_json::to_string(&self.0)?)
    }

    /// 从列值还原，格式不对时返回 CorruptRecord
    pub fn from_column(id: i64, raw: Option<&str>) -> AppResult<Self> {
        let raw = raw.ok_or_else(|| AppError::corrupt_record("medicines", id, "times", "NULL"))?;
        serde_json::from_str(raw)
            .map_err(|e| AppError::corrupt_record("medicines", id, "times", e.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &DoseTime> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// "HH:MM" 形式
    pub fn labels(&self) -> Vec<String> {
        self.0.iter().map(|t| t.to_string()).collect()
    }
}

/// 外部链接列表（external_links 列）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalLinks(pub Vec<String>);

impl ExternalLinks {
    pub fn to_column(&self) -> AppResult<String> {
        Ok(serde_json::to_string(&self.0)?)
    }

    /// NULL 视为空列表（旧库迁移前没有这一列）
    pub fn from_column(id: i64, raw: Option<&str>) -> AppResult<Self> {
        match raw {
            None => Ok(Self::default()),
            Some(raw) => serde_json::from_str(raw).map_err(|e| {
                AppError::corrupt_record("medicines", id, "external_links", e.to_string())
            }),
        }
    }
}

/// 药品
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Medicine {
    pub id: i64,
    pub name: String,
    pub dosage: String,
    pub frequency: u32,
    pub times: DoseTimes,
    pub external_links: ExternalLinks,
    pub created_at: i64, // Unix 毫秒
}

/// 新药品
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMedicine {
    pub name: String,
    pub dosage: String,
    pub frequency: u32,
    pub times: DoseTimes,
    #[serde(default)]
    pub external_links: ExternalLinks,
}

/// 服药记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoseHistoryEntry {
    pub id: i64,
    pub medicine_id: i64,
    pub taken_at: i64, // Unix 毫秒
    pub time_slot: String,
}

/// 紧急联系人
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyContact {
    pub id: i64,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub relation: Option<String>,
    pub is_emergency: bool,
}

/// 新联系人
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewContact {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub relation: Option<String>,
}
