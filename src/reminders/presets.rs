/// 按每日次数生成的默认服药时间

use crate::db::schema::{DoseTime, DoseTimes};

const PRESETS: [&[(u8, u8)]; 4] = [
    &[(10, 0)],
    &[(10, 0), (20, 0)],
    &[(8, 0), (14, 0), (20, 0)],
    &[(8, 0), (12, 0), (16, 0), (20, 0)],
];

/// 1-4 次使用预设，更多次数全部填 12:00 交给用户调整
pub fn default_times_for_frequency(frequency: u32) -> DoseTimes {
    let times = match frequency {
        0 => Vec::new(),
        1..=4 => PRESETS[frequency as usize - 1]
            .iter()
            .filter_map(|&(h, m)| DoseTime::new(h, m).ok())
            .collect(),
        n => DoseTime::new(12, 0)
            .map(|noon| vec![noon; n as usize])
            .unwrap_or_default(),
    };
    DoseTimes(times)
}

/// 保留已有时间并调整到 frequency 个，不足的位置取预设
pub fn fit_times_to_frequency(times: &DoseTimes, frequency: u32) -> DoseTimes {
    let target = frequency as usize;
    let mut fitted: Vec<DoseTime> = times.iter().copied().take(target).collect();
    if fitted.len() < target {
        let presets = default_times_for_frequency(frequency);
        fitted.extend(presets.iter().copied().skip(fitted.len()));
    }
    DoseTimes(fitted)
}
