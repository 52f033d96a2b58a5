// 消费者目录
// 为邻近检查提供粗过滤后的候选消费者及其通知偏好

use crate::database::models::ConsumerEntity;
use crate::error::EngineResult;
use crate::notify::eligibility::{ConsumerProximityPrefs, QuietHours};
use serde::Serialize;
use sqlx::PgPool;
use std::future::Future;
use std::sync::Arc;

/// 每度纬度对应的米数（近似），用于SQL粗过滤的包围盒换算
const METERS_PER_DEG: f64 = 111_320.0;

/// 消费者偏好汇总
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConsumerPrefStats {
    pub total_consumers: i64,
    pub proximity_enabled: i64,
    pub do_not_disturb_enabled: i64,
    pub average_radius_m: f64,
}

/// 消费者目录
///
/// 只读协作方：返回已开启通知且未开勿扰的附近候选，
/// 细粒度的半径与免打扰时段判断仍由资格策略完成。
pub trait ConsumerDirectory: Send + Sync {
    /// 查找可能收到邻近通知的候选消费者（粗过滤）
    fn find_eligible_candidates(
        &self,
        longitude: f64,
        latitude: f64,
        max_radius_meters: f64,
    ) -> impl Future<Output = EngineResult<Vec<ConsumerProximityPrefs>>> + Send;

    /// 消费者通知偏好汇总（观测用）
    fn preference_stats(&self) -> impl Future<Output = EngineResult<ConsumerPrefStats>> + Send;
}

/// 基于Postgres的消费者目录
pub struct PgConsumerDirectory {
    db: Arc<PgPool>,
}

impl PgConsumerDirectory {
    /// 创建新的消费者目录实例
    pub fn new(db: Arc<PgPool>) -> Self {
        Self { db }
    }
}

impl ConsumerDirectory for PgConsumerDirectory {
    async fn find_eligible_candidates(
        &self,
        longitude: f64,
        latitude: f64,
        max_radius_meters: f64,
    ) -> EngineResult<Vec<ConsumerProximityPrefs>> {
        // 包围盒粗过滤，经度跨度按 cos(纬度) 放大
        let lat_delta = max_radius_meters / METERS_PER_DEG;
        let lon_delta = max_radius_meters / (METERS_PER_DEG * latitude.to_radians().cos().abs().max(1e-6));

        let consumers = sqlx::query_as::<_, ConsumerEntity>(
            r#"
            SELECT consumer_id, longitude, latitude, proximity_enabled, notify_radius_m,
                   quiet_hours_enabled, quiet_start, quiet_end, do_not_disturb
            FROM consumer_notification_prefs
            WHERE is_active = TRUE
              AND proximity_enabled = TRUE
              AND do_not_disturb = FALSE
              AND latitude BETWEEN $2 - $3 AND $2 + $3
              AND longitude BETWEEN $1 - $4 AND $1 + $4
            "#,
        )
        .bind(longitude)
        .bind(latitude)
        .bind(lat_delta)
        .bind(lon_delta)
        .fetch_all(&*self.db)
        .await?;

        Ok(consumers.into_iter().map(ConsumerProximityPrefs::from).collect())
    }

    async fn preference_stats(&self) -> EngineResult<ConsumerPrefStats> {
        let row = sqlx::query_as::<_, (i64, i64, i64, f64)>(
            r#"
            SELECT COUNT(*),
                   COUNT(*) FILTER (WHERE proximity_enabled),
                   COUNT(*) FILTER (WHERE do_not_disturb),
                   COALESCE(AVG(notify_radius_m), 0)::FLOAT8
            FROM consumer_notification_prefs
            WHERE is_active = TRUE
            "#,
        )
        .fetch_one(&*self.db)
        .await?;

        Ok(ConsumerPrefStats {
            total_consumers: row.0,
            proximity_enabled: row.1,
            do_not_disturb_enabled: row.2,
            average_radius_m: row.3,
        })
    }
}

impl From<ConsumerEntity> for ConsumerProximityPrefs {
    fn from(entity: ConsumerEntity) -> Self {
        ConsumerProximityPrefs {
            consumer_id: entity.consumer_id,
            longitude: entity.longitude,
            latitude: entity.latitude,
            enabled: entity.proximity_enabled,
            radius_meters: entity.notify_radius_m,
            quiet_hours: QuietHours {
                enabled: entity.quiet_hours_enabled,
                start: entity.quiet_start,
                end: entity.quiet_end,
            },
            do_not_disturb: entity.do_not_disturb,
        }
    }
}
