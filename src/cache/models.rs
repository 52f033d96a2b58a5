// 缓存模型
// 定义写入Redis的位置记录结构

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 缓存中的供应商位置记录
///
/// 以短TTL写入，索引重启或供应商失联后记录自然过期，
/// 避免向消费者返回事实上已经离线的"附近供应商"。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedVendorLocation {
    pub vendor_id: String,
    pub longitude: f64,
    pub latitude: f64,
    pub last_update: DateTime<Utc>,
    pub is_active: bool,
}
