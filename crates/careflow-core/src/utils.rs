//! 通用工具函数

use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};

/// 两个时间点之间的分钟数（可为负）
pub fn minutes_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_seconds() as f64 / 60.0
}

/// 是否为周五或周六
pub fn is_late_week(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Fri | Weekday::Sat)
}

/// 保留指定小数位
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// 除数为零时返回 0
pub fn safe_div(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}
