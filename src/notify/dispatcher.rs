// 通知下发
// 外部协作方接口与推送网关实现：先落库，再尽力推送

use crate::database::operations::notification::NotificationOperations;
use crate::error::EngineResult;
use sqlx::PgPool;
use std::future::Future;
use std::sync::Arc;

/// 一次下发尝试的结果
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub success: bool,
    pub notification_id: Option<String>,
}

/// 通知下发协作方
///
/// 下发失败由调用方记录后继续，本层不做重试（重试策略属于网关）。
pub trait NotificationDispatcher: Send + Sync {
    fn send(
        &self,
        recipient_id: &str,
        title: &str,
        body: &str,
        payload: serde_json::Value,
    ) -> impl Future<Output = EngineResult<DispatchOutcome>> + Send;
}

/// 推送网关下发器
///
/// 通知先写入数据库；配置了网关时再POST出去，
/// 推送失败只回写状态，不影响本次下发结果。
pub struct PushDispatcher {
    notifications: NotificationOperations,
    http: reqwest::Client,
    gateway_url: Option<String>,
    gateway_key: Option<String>,
}

impl PushDispatcher {
    /// 创建新的推送下发器实例
    pub fn new(db: Arc<PgPool>, gateway_url: Option<String>, gateway_key: Option<String>) -> Self {
        Self {
            notifications: NotificationOperations::new(db),
            http: reqwest::Client::new(),
            gateway_url,
            gateway_key,
        }
    }
}

impl NotificationDispatcher for PushDispatcher {
    async fn send(
        &self,
        recipient_id: &str,
        title: &str,
        body: &str,
        payload: serde_json::Value,
    ) -> EngineResult<DispatchOutcome> {
        let notification_type = payload
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or("general")
            .to_string();

        let notification_id = self
            .notifications
            .insert(recipient_id, title, body, &payload, &notification_type)
            .await?;

        if let Some(url) = &self.gateway_url {
            let mut request = self.http.post(url).json(&serde_json::json!({
                "to": recipient_id,
                "title": title,
                "body": body,
                "data": payload,
            }));
            if let Some(key) = &self.gateway_key {
                request = request.bearer_auth(key);
            }

            match request.send().await.and_then(|r| r.error_for_status()) {
                Ok(_) => {
                    self.notifications
                        .mark_push_status(&notification_id, "sent")
                        .await?;
                    tracing::debug!(
                        "推送网关已接收通知: user={} id={}",
                        recipient_id,
                        notification_id
                    );
                }
                Err(e) => {
                    // 推送失败不影响已落库的通知
                    tracing::error!("推送网关调用失败: user={} err={}", recipient_id, e);
                    if let Err(db_err) = self
                        .notifications
                        .mark_push_status(&notification_id, "failed")
                        .await
                    {
                        tracing::warn!("回写推送状态失败: {}", db_err);
                    }
                }
            }
        }

        Ok(DispatchOutcome {
            success: true,
            notification_id: Some(notification_id),
        })
    }
}
