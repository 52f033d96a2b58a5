// 位置索引
// 在线实体位置的可查询索引：Redis GEO为主，数据库线性扫描兜底

use crate::cache::operations::LocationCacheOperations;
use crate::database::operations::location::VendorLocationOperations;
use crate::error::EngineResult;
use crate::geo::{self, Position, RadiusHit};
use chrono::Utc;
use redis::Client as RedisClient;
use sqlx::PgPool;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// 实体位置索引
///
/// `radius_query` 按距离升序返回。调用方除了延迟之外
/// 观察不到走的是主索引还是降级路径。
pub trait VendorIndex: Send + Sync {
    /// 写入/覆盖实体位置，幂等
    fn upsert(
        &self,
        entity_id: &str,
        entity_name: &str,
        longitude: f64,
        latitude: f64,
    ) -> impl Future<Output = EngineResult<()>> + Send;

    /// 将实体从在线索引移除，不存在时为空操作
    fn remove(&self, entity_id: &str) -> impl Future<Output = EngineResult<()>> + Send;

    /// 查询半径内的全部实体，按距离升序
    fn radius_query(
        &self,
        longitude: f64,
        latitude: f64,
        radius_meters: f64,
    ) -> impl Future<Output = EngineResult<Vec<RadiusHit>>> + Send;

    /// 查询实体的最后已知位置
    fn lookup(&self, entity_id: &str) -> impl Future<Output = EngineResult<Option<Position>>> + Send;

    /// 在线实体数量与主索引可用性（观测用）
    fn index_stats(&self) -> impl Future<Output = (i64, bool)> + Send;
}

/// 生产位置索引：Redis GEO + Postgres
///
/// 写入时数据库先行（最后已知位置以库为准），Redis尽力而为；
/// 查询时Redis优先，不可用则对最近在线的行做线性扫描。
pub struct GeoIndex {
    cache: LocationCacheOperations,
    locations: VendorLocationOperations,
    ttl_secs: u64,
    /// 主索引是否处于降级状态，只在状态翻转时记日志
    degraded: AtomicBool,
    /// 已经记录过降级日志的实体，防止刷屏
    degraded_entities: Mutex<HashSet<String>>,
}

impl GeoIndex {
    /// 创建新的位置索引实例
    pub fn new(redis_client: Arc<RedisClient>, db: Arc<PgPool>, ttl_secs: u64) -> Self {
        Self {
            cache: LocationCacheOperations::new(redis_client),
            locations: VendorLocationOperations::new(db),
            ttl_secs,
            degraded: AtomicBool::new(false),
            degraded_entities: Mutex::new(HashSet::new()),
        }
    }

    /// 每个实体只记一次降级日志
    fn log_entity_degraded(&self, entity_id: &str, err: &redis::RedisError) {
        let mut logged = self.degraded_entities.lock().unwrap();
        if logged.insert(entity_id.to_string()) {
            tracing::warn!(
                "Redis update failed, position served from database only: entity={} err={}",
                entity_id,
                err
            );
        }
    }

    fn clear_entity_degraded(&self, entity_id: &str) {
        self.degraded_entities.lock().unwrap().remove(entity_id);
    }

    fn mark_degraded(&self, err: &redis::RedisError) {
        if !self.degraded.swap(true, Ordering::Relaxed) {
            tracing::warn!("主地理索引不可用，降级为数据库线性扫描: {}", err);
        }
    }

    fn mark_recovered(&self) {
        if self.degraded.swap(false, Ordering::Relaxed) {
            tracing::info!("主地理索引已恢复");
        }
    }

}

impl VendorIndex for GeoIndex {
    async fn upsert(
        &self,
        entity_id: &str,
        entity_name: &str,
        longitude: f64,
        latitude: f64,
    ) -> EngineResult<()> {
        // 系统记录先行：崩溃恢复后以最后写入为准
        self.locations
            .upsert_position(entity_id, entity_name, longitude, latitude)
            .await?;

        match self
            .cache
            .geo_upsert(entity_id, longitude, latitude, self.ttl_secs)
            .await
        {
            Ok(()) => self.clear_entity_degraded(entity_id),
            Err(e) => self.log_entity_degraded(entity_id, &e),
        }

        Ok(())
    }

    async fn remove(&self, entity_id: &str) -> EngineResult<()> {
        self.locations.set_offline(entity_id).await?;

        if let Err(e) = self.cache.geo_remove(entity_id).await {
            self.log_entity_degraded(entity_id, &e);
        }

        Ok(())
    }

    async fn radius_query(
        &self,
        longitude: f64,
        latitude: f64,
        radius_meters: f64,
    ) -> EngineResult<Vec<RadiusHit>> {
        match self.cache.geo_radius(longitude, latitude, radius_meters).await {
            Ok(members) => {
                self.mark_recovered();

                let mut hits = Vec::with_capacity(members.len());
                for (entity_id, distance, (lon, lat)) in members {
                    // TTL详情记录兜底：索引重启或实体失联后不再返回过期位置
                    match self.cache.get_location(&entity_id).await {
                        Ok(Some(_)) => hits.push(RadiusHit {
                            entity_id,
                            longitude: lon,
                            latitude: lat,
                            distance_meters: distance,
                        }),
                        Ok(None) => {
                            // 详情已过期：尝试数据库的最近位置，否则清掉陈旧成员
                            match self.locations.find(&entity_id).await? {
                                Some(row)
                                    if row.is_online
                                        && (Utc::now() - row.updated_at).num_seconds()
                                            <= self.ttl_secs as i64 =>
                                {
                                    hits.push(RadiusHit {
                                        entity_id,
                                        longitude: row.longitude,
                                        latitude: row.latitude,
                                        distance_meters: distance,
                                    });
                                }
                                _ => {
                                    tracing::debug!("清理过期的索引成员: {}", entity_id);
                                    let _ = self.cache.evict_stale_member(&entity_id).await;
                                }
                            }
                        }
                        Err(e) => {
                            // 读详情失败不丢掉命中，GEO坐标仍然可用
                            tracing::debug!("读取位置详情失败: entity={} err={}", entity_id, e);
                            hits.push(RadiusHit {
                                entity_id,
                                longitude: lon,
                                latitude: lat,
                                distance_meters: distance,
                            });
                        }
                    }
                }
                Ok(hits)
            }
            Err(e) => {
                // 降级：对最近在线的行做线性扫描，结果形状与主路径一致
                self.mark_degraded(&e);
                let rows = self.locations.recent_online(self.ttl_secs).await?;
                Ok(geo::filter_within_radius(
                    rows.into_iter()
                        .map(|row| (row.vendor_id, row.longitude, row.latitude)),
                    longitude,
                    latitude,
                    radius_meters,
                ))
            }
        }
    }

    async fn lookup(&self, entity_id: &str) -> EngineResult<Option<Position>> {
        match self.cache.get_location(entity_id).await {
            Ok(Some(record)) => {
                return Ok(Some(Position {
                    longitude: record.longitude,
                    latitude: record.latitude,
                    updated_at: record.last_update,
                }));
            }
            Ok(None) => {}
            Err(e) => self.log_entity_degraded(entity_id, &e),
        }

        let row = self.locations.find(entity_id).await?;
        Ok(row.map(|r| Position {
            longitude: r.longitude,
            latitude: r.latitude,
            updated_at: r.updated_at,
        }))
    }

    async fn index_stats(&self) -> (i64, bool) {
        match self.cache.active_vendor_count().await {
            Ok(count) => (count, true),
            Err(_) => (0, false),
        }
    }
}
