/// 缓存模块
/// 基于Redis的在线供应商GEO索引、短TTL位置记录与发布订阅

// 缓存键
pub mod keys;

// 缓存模型
pub mod models;

// 缓存操作
pub mod operations;

pub use keys::{CONSUMER_CHANNEL, VENDOR_GEO_KEY, user_channel, vendor_location_key};
pub use models::CachedVendorLocation;
pub use operations::LocationCacheOperations;
