// 实时广播
// 外部协作方接口与Redis发布订阅实现，发后不理

use crate::cache::operations::LocationCacheOperations;
use crate::cache::keys::user_channel;
use crate::error::EngineResult;
use chrono::Utc;
use redis::Client as RedisClient;
use std::future::Future;
use std::sync::Arc;

/// 实时广播协作方
///
/// 不假定任何投递保证；失败由调用方记录后继续。
pub trait RealtimeBroadcaster: Send + Sync {
    /// 向单个用户推送事件
    fn publish_to_user(
        &self,
        user_id: &str,
        event: &str,
        data: serde_json::Value,
    ) -> impl Future<Output = EngineResult<()>> + Send;

    /// 向群体频道推送事件
    fn publish_to_group(
        &self,
        group_key: &str,
        event: &str,
        data: serde_json::Value,
    ) -> impl Future<Output = EngineResult<()>> + Send;
}

/// 基于Redis发布订阅的实时广播器
///
/// 网关侧订阅 user:{id} 与群体频道，转发给已连接的客户端。
pub struct RedisBroadcaster {
    cache: LocationCacheOperations,
}

impl RedisBroadcaster {
    /// 创建新的广播器实例
    pub fn new(redis_client: Arc<RedisClient>) -> Self {
        Self {
            cache: LocationCacheOperations::new(redis_client),
        }
    }

    async fn publish(&self, channel: &str, event: &str, data: serde_json::Value) -> EngineResult<()> {
        let envelope = serde_json::json!({
            "event": event,
            "data": data,
            "timestamp": Utc::now(),
        });
        self.cache.publish(channel, envelope.to_string()).await?;
        Ok(())
    }
}

impl RealtimeBroadcaster for RedisBroadcaster {
    async fn publish_to_user(
        &self,
        user_id: &str,
        event: &str,
        data: serde_json::Value,
    ) -> EngineResult<()> {
        self.publish(&user_channel(user_id), event, data).await
    }

    async fn publish_to_group(
        &self,
        group_key: &str,
        event: &str,
        data: serde_json::Value,
    ) -> EngineResult<()> {
        self.publish(group_key, event, data).await
    }
}
