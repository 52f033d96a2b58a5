// 模拟供应商存储库
// 模拟的创建、查询、移动状态回写与过期清理

use crate::database::models::SimulationEntity;
use crate::simulation::movement::SimulationState;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;
use std::sync::Arc;

/// 模拟供应商存储库
pub struct SimulationOperations {
    db: Arc<PgPool>,
}

impl SimulationOperations {
    /// 创建新的模拟存储库实例
    pub fn new(db: Arc<PgPool>) -> Self {
        Self { db }
    }

    /// 写入一个新的模拟实体
    pub async fn create(&self, entity: &SimulationEntity) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO vendor_simulations (
                simulation_id, name, movement_pattern, longitude, latitude,
                speed_kmh, route, current_route_index, wait_remaining_secs,
                direction_deg, orbit_radius_m, center_longitude, center_latitude,
                is_active, total_distance_m, last_location_update, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(&entity.simulation_id)
        .bind(&entity.name)
        .bind(&entity.movement_pattern)
        .bind(entity.longitude)
        .bind(entity.latitude)
        .bind(entity.speed_kmh)
        .bind(&entity.route)
        .bind(entity.current_route_index)
        .bind(entity.wait_remaining_secs)
        .bind(entity.direction_deg)
        .bind(entity.orbit_radius_m)
        .bind(entity.center_longitude)
        .bind(entity.center_latitude)
        .bind(entity.is_active)
        .bind(entity.total_distance_m)
        .bind(entity.last_location_update)
        .bind(entity.created_at)
        .execute(&*self.db)
        .await?;

        Ok(())
    }

    /// 按ID查找模拟
    pub async fn find(&self, simulation_id: &str) -> Result<Option<SimulationEntity>, sqlx::Error> {
        sqlx::query_as::<_, SimulationEntity>(
            r#"
            SELECT simulation_id, name, movement_pattern, longitude, latitude,
                   speed_kmh, route, current_route_index, wait_remaining_secs,
                   direction_deg, orbit_radius_m, center_longitude, center_latitude,
                   is_active, total_distance_m, last_location_update, created_at
            FROM vendor_simulations
            WHERE simulation_id = $1
            "#,
        )
        .bind(simulation_id)
        .fetch_optional(&*self.db)
        .await
    }

    /// 列出全部模拟，最新创建的在前
    pub async fn list(&self) -> Result<Vec<SimulationEntity>, sqlx::Error> {
        sqlx::query_as::<_, SimulationEntity>(
            r#"
            SELECT simulation_id, name, movement_pattern, longitude, latitude,
                   speed_kmh, route, current_route_index, wait_remaining_secs,
                   direction_deg, orbit_radius_m, center_longitude, center_latitude,
                   is_active, total_distance_m, last_location_update, created_at
            FROM vendor_simulations
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&*self.db)
        .await
    }

    /// 删除模拟，返回是否确有删除
    pub async fn delete(&self, simulation_id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM vendor_simulations WHERE simulation_id = $1
            "#,
        )
        .bind(simulation_id)
        .execute(&*self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// 回写一步移动后的完整状态
    pub async fn update_movement(
        &self,
        state: &SimulationState,
        updated_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        let (center_lon, center_lat) = match state.config.center {
            Some((lon, lat)) => (Some(lon), Some(lat)),
            None => (None, None),
        };

        sqlx::query(
            r#"
            UPDATE vendor_simulations SET
                longitude = $2,
                latitude = $3,
                current_route_index = $4,
                wait_remaining_secs = $5,
                direction_deg = $6,
                center_longitude = $7,
                center_latitude = $8,
                total_distance_m = $9,
                last_location_update = $10
            WHERE simulation_id = $1
            "#,
        )
        .bind(&state.simulation_id)
        .bind(state.longitude)
        .bind(state.latitude)
        .bind(state.config.current_route_index as i32)
        .bind(state.config.wait_remaining_secs)
        .bind(state.config.direction_deg)
        .bind(center_lon)
        .bind(center_lat)
        .bind(state.total_distance_traveled)
        .bind(updated_at)
        .execute(&*self.db)
        .await?;

        Ok(())
    }

    /// 汇总统计：总数、活跃数、累计/平均移动距离
    pub async fn aggregate_stats(&self) -> Result<(i64, i64, f64, f64), sqlx::Error> {
        sqlx::query_as::<_, (i64, i64, f64, f64)>(
            r#"
            SELECT COUNT(*),
                   COUNT(*) FILTER (WHERE is_active),
                   COALESCE(SUM(total_distance_m), 0)::FLOAT8,
                   COALESCE(AVG(total_distance_m), 0)::FLOAT8
            FROM vendor_simulations
            "#,
        )
        .fetch_one(&*self.db)
        .await
    }

    /// 按移动模式统计数量
    pub async fn pattern_counts(&self) -> Result<Vec<(String, i64)>, sqlx::Error> {
        sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT movement_pattern, COUNT(*)
            FROM vendor_simulations
            GROUP BY movement_pattern
            "#,
        )
        .fetch_all(&*self.db)
        .await
    }

    /// 清理超过给定小时数且非活跃的模拟，返回删除行数
    pub async fn delete_older_than(&self, hours: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM vendor_simulations
            WHERE is_active = FALSE
              AND created_at < NOW() - ($1 * INTERVAL '1 hour')
            "#,
        )
        .bind(hours as f64)
        .execute(&*self.db)
        .await?;

        Ok(result.rows_affected())
    }
}
