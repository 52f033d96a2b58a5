// 缓存操作
// 在线供应商GEO索引的读写与实时事件发布

use crate::cache::keys::{VENDOR_GEO_KEY, vendor_location_key};
use crate::cache::models::CachedVendorLocation;
use chrono::Utc;
use redis::{AsyncCommands, Client as RedisClient};
use std::sync::Arc;

/// 位置缓存操作
pub struct LocationCacheOperations {
    redis_client: Arc<RedisClient>,
}

impl LocationCacheOperations {
    /// 创建新的位置缓存操作实例
    pub fn new(redis_client: Arc<RedisClient>) -> Self {
        Self { redis_client }
    }

    /// 更新供应商在GEO索引中的位置，并写入带TTL的详情记录
    pub async fn geo_upsert(
        &self,
        vendor_id: &str,
        longitude: f64,
        latitude: f64,
        ttl_secs: u64,
    ) -> redis::RedisResult<()> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;

        // 将供应商位置添加到GEO索引
        let _: () = redis::cmd("GEOADD")
            .arg(VENDOR_GEO_KEY)
            .arg(longitude)
            .arg(latitude)
            .arg(vendor_id)
            .query_async(&mut conn)
            .await?;

        // 写入详情记录，TTL到期即视为过期位置
        let record = CachedVendorLocation {
            vendor_id: vendor_id.to_string(),
            longitude,
            latitude,
            last_update: Utc::now(),
            is_active: true,
        };
        let record_json = serde_json::to_string(&record).unwrap_or_default();

        let _: () = conn
            .set_ex(vendor_location_key(vendor_id), record_json, ttl_secs)
            .await?;

        Ok(())
    }

    /// 基于地理坐标查找半径内的供应商，按距离升序返回
    ///
    /// 返回 (供应商ID, 距离米数, (经度, 纬度)) 三元组列表。
    pub async fn geo_radius(
        &self,
        longitude: f64,
        latitude: f64,
        radius_meters: f64,
    ) -> redis::RedisResult<Vec<(String, f64, (f64, f64))>> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;

        // 使用GEOSEARCH命令查找附近供应商
        redis::cmd("GEOSEARCH")
            .arg(VENDOR_GEO_KEY)
            .arg("FROMLONLAT")
            .arg(longitude)
            .arg(latitude)
            .arg("BYRADIUS")
            .arg(radius_meters)
            .arg("m")
            .arg("ASC")
            .arg("WITHDIST")
            .arg("WITHCOORD")
            .query_async(&mut conn)
            .await
    }

    /// 读取供应商的TTL详情记录，过期或不存在时返回None
    pub async fn get_location(
        &self,
        vendor_id: &str,
    ) -> redis::RedisResult<Option<CachedVendorLocation>> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;

        let record: Option<String> = conn.get(vendor_location_key(vendor_id)).await?;
        Ok(record.and_then(|json| serde_json::from_str(&json).ok()))
    }

    /// 将供应商从GEO索引与详情记录中移除
    pub async fn geo_remove(&self, vendor_id: &str) -> redis::RedisResult<()> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;

        let _: () = conn.zrem(VENDOR_GEO_KEY, vendor_id).await?;
        let _: () = conn.del(vendor_location_key(vendor_id)).await?;

        Ok(())
    }

    /// 仅从GEO索引中清掉过期成员（详情记录已自行过期）
    pub async fn evict_stale_member(&self, vendor_id: &str) -> redis::RedisResult<()> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let _: () = conn.zrem(VENDOR_GEO_KEY, vendor_id).await?;
        Ok(())
    }

    /// 当前GEO索引中的供应商数量
    pub async fn active_vendor_count(&self) -> redis::RedisResult<i64> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        conn.zcard(VENDOR_GEO_KEY).await
    }

    /// 向指定频道发布实时事件
    pub async fn publish(&self, channel: &str, payload: String) -> redis::RedisResult<()> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let _: () = conn.publish(channel, payload).await?;
        Ok(())
    }
}
