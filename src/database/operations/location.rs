// 供应商位置存储库
// 最后已知位置的系统记录，同时是地理索引的降级扫描数据源

use crate::database::models::VendorLocationEntity;
use sqlx::PgPool;
use std::sync::Arc;

/// 供应商位置存储库
pub struct VendorLocationOperations {
    db: Arc<PgPool>,
}

impl VendorLocationOperations {
    /// 创建新的供应商位置存储库实例
    pub fn new(db: Arc<PgPool>) -> Self {
        Self { db }
    }

    /// 写入最后已知位置，后写覆盖先写
    pub async fn upsert_position(
        &self,
        vendor_id: &str,
        vendor_name: &str,
        longitude: f64,
        latitude: f64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO vendor_locations (
                vendor_id, vendor_name, longitude, latitude, is_online, updated_at
            ) VALUES ($1, $2, $3, $4, TRUE, NOW())
            ON CONFLICT (vendor_id) DO UPDATE SET
                vendor_name = EXCLUDED.vendor_name,
                longitude = EXCLUDED.longitude,
                latitude = EXCLUDED.latitude,
                is_online = TRUE,
                updated_at = NOW()
            "#,
        )
        .bind(vendor_id)
        .bind(vendor_name)
        .bind(longitude)
        .bind(latitude)
        .execute(&*self.db)
        .await?;

        Ok(())
    }

    /// 标记供应商离线，保留历史位置行
    pub async fn set_offline(&self, vendor_id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE vendor_locations SET is_online = FALSE, updated_at = NOW()
            WHERE vendor_id = $1
            "#,
        )
        .bind(vendor_id)
        .execute(&*self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// 查找单个供应商的最后已知位置
    pub async fn find(&self, vendor_id: &str) -> Result<Option<VendorLocationEntity>, sqlx::Error> {
        sqlx::query_as::<_, VendorLocationEntity>(
            r#"
            SELECT vendor_id, vendor_name, longitude, latitude, is_online,
                   delivery_radius_m, accepting_orders, updated_at
            FROM vendor_locations
            WHERE vendor_id = $1
            "#,
        )
        .bind(vendor_id)
        .fetch_optional(&*self.db)
        .await
    }

    /// 列出最近窗口内更新过位置的在线供应商
    ///
    /// 降级路径在这批行上用距离计算做线性扫描。
    pub async fn recent_online(
        &self,
        ttl_secs: u64,
    ) -> Result<Vec<VendorLocationEntity>, sqlx::Error> {
        sqlx::query_as::<_, VendorLocationEntity>(
            r#"
            SELECT vendor_id, vendor_name, longitude, latitude, is_online,
                   delivery_radius_m, accepting_orders, updated_at
            FROM vendor_locations
            WHERE is_online = TRUE
              AND updated_at > NOW() - ($1 * INTERVAL '1 second')
            "#,
        )
        .bind(ttl_secs as f64)
        .fetch_all(&*self.db)
        .await
    }
}
