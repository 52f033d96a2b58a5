// 资格策略
// 纯谓词：根据消费者偏好与实际距离判断此刻能否发送邻近通知

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// 免打扰时段，"HH:MM" 文本，支持跨夜窗口
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuietHours {
    pub enabled: bool,
    pub start: String,
    pub end: String,
}

/// 消费者邻近通知偏好
///
/// 引擎侧只读；由外部的资料更新路径负责修改。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerProximityPrefs {
    pub consumer_id: String,
    pub longitude: f64,
    pub latitude: f64,
    pub enabled: bool,
    pub radius_meters: i32,
    pub quiet_hours: QuietHours,
    pub do_not_disturb: bool,
}

/// 判断此刻是否可以向该消费者发送邻近通知
///
/// 当前时刻由调用方注入，本函数不做任何I/O。
pub fn is_eligible(prefs: &ConsumerProximityPrefs, distance_meters: f64, local_time: NaiveTime) -> bool {
    if !prefs.enabled || prefs.do_not_disturb {
        return false;
    }

    if distance_meters > prefs.radius_meters as f64 {
        return false;
    }

    if in_quiet_hours(&prefs.quiet_hours, local_time) {
        return false;
    }

    true
}

/// 当前时刻是否落在免打扰时段内（边界按分钟粒度，含两端）
///
/// start <= end 为同日窗口 [start, end]；
/// start > end 为跨夜窗口，time >= start 或 time <= end 均算在内。
pub fn in_quiet_hours(quiet: &QuietHours, local_time: NaiveTime) -> bool {
    if !quiet.enabled {
        return false;
    }

    // 零填充的 "HH:MM" 文本可以直接按字典序比较
    let current = local_time.format("%H:%M").to_string();

    if quiet.start <= quiet.end {
        current >= quiet.start && current <= quiet.end
    } else {
        current >= quiet.start || current <= quiet.end
    }
}
