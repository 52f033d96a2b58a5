// 通知记录存储库
// 每次下发尝试先落库，推送结果回写状态

use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// 通知记录存储库
pub struct NotificationOperations {
    db: Arc<PgPool>,
}

impl NotificationOperations {
    /// 创建新的通知记录存储库实例
    pub fn new(db: Arc<PgPool>) -> Self {
        Self { db }
    }

    /// 写入一条通知记录，返回生成的通知ID
    pub async fn insert(
        &self,
        user_id: &str,
        title: &str,
        body: &str,
        data: &serde_json::Value,
        notification_type: &str,
    ) -> Result<String, sqlx::Error> {
        let notification_id = Uuid::new_v4().to_string();

        sqlx::query(
            r#"
            INSERT INTO notifications (
                id, user_id, title, body, data, notification_type, push_status
            ) VALUES ($1, $2, $3, $4, $5, $6, 'pending')
            "#,
        )
        .bind(&notification_id)
        .bind(user_id)
        .bind(title)
        .bind(body)
        .bind(sqlx::types::Json(data))
        .bind(notification_type)
        .execute(&*self.db)
        .await?;

        Ok(notification_id)
    }

    /// 回写推送状态：sent / failed
    pub async fn mark_push_status(
        &self,
        notification_id: &str,
        status: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE notifications SET push_status = $2 WHERE id = $1
            "#,
        )
        .bind(notification_id)
        .bind(status)
        .execute(&*self.db)
        .await?;

        Ok(())
    }
}
