/// 缓存键模块
/// 提供位置缓存与实时频道相关的键生成函数

/// 在线供应商GEO索引键
pub const VENDOR_GEO_KEY: &str = "vendors:active";

/// 消费者群体实时事件频道
pub const CONSUMER_CHANNEL: &str = "role:consumer";

/// 供应商位置详情键（带TTL）
pub fn vendor_location_key(vendor_id: &str) -> String {
    format!("vendor:location:{}", vendor_id)
}

/// 单个用户的实时事件频道
pub fn user_channel(user_id: &str) -> String {
    format!("user:{}", user_id)
}
