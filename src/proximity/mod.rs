// 邻近检查引擎
// 位置更新 → 索引写入 → 候选查找 → 资格判定 → 冷却去重 → 通知+广播

use crate::cache::keys::CONSUMER_CHANNEL;
use crate::config::Config;
use crate::database::operations::consumer::{ConsumerDirectory, ConsumerPrefStats};
use crate::error::{EngineError, EngineResult};
use crate::geo::{self, RadiusHit};
use crate::index::VendorIndex;
use crate::notify::broadcaster::RealtimeBroadcaster;
use crate::notify::cooldown::CooldownTracker;
use crate::notify::dispatcher::NotificationDispatcher;
use crate::notify::eligibility::{ConsumerProximityPrefs, is_eligible};
use chrono::{DateTime, Local, NaiveTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// 位置更新的来源：真实供应商或模拟供应商
///
/// 引擎对两者一视同仁，事件载荷里只多一个模拟标记。
#[derive(Debug, Clone)]
pub enum PositionSource {
    RealVendor { id: String, name: String },
    SimulatedVendor { id: String, name: String },
}

impl PositionSource {
    pub fn id(&self) -> &str {
        match self {
            PositionSource::RealVendor { id, .. } => id,
            PositionSource::SimulatedVendor { id, .. } => id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            PositionSource::RealVendor { name, .. } => name,
            PositionSource::SimulatedVendor { name, .. } => name,
        }
    }

    pub fn is_simulation(&self) -> bool {
        matches!(self, PositionSource::SimulatedVendor { .. })
    }
}

/// 单个消费者的处理结果
#[derive(Debug, Clone, Serialize)]
pub struct CandidateOutcome {
    pub consumer_id: String,
    pub distance_meters: f64,
    pub notified: bool,
    pub notification_id: Option<String>,
}

/// 一次邻近检查的汇总结果
#[derive(Debug, Clone, Serialize)]
pub struct ProximityCheckOutcome {
    pub entity_id: String,
    pub consumers_found: usize,
    pub notifications_sent: usize,
    pub results: Vec<CandidateOutcome>,
}

/// 手动诊断检查的结果，绕过资格与冷却
#[derive(Debug, Clone, Serialize)]
pub struct ManualCheckResult {
    pub vendor_id: String,
    pub distance_meters: f64,
    pub estimated_arrival: String,
    pub vendor_location: [f64; 2],
    pub consumer_location: [f64; 2],
}

/// 邻近引擎观测指标
#[derive(Debug, Clone, Serialize)]
pub struct ProximityStats {
    pub active_cooldowns: usize,
    pub cooldown_window_secs: u64,
    pub checks_run: u64,
    pub notifications_sent: u64,
    pub active_vendors: i64,
    pub index_available: bool,
    pub consumers: ConsumerPrefStats,
}

/// 邻近检查引擎
///
/// 全部可变状态（冷却表、计数器）集中在这个结构里，
/// 由一个调度上下文持有并以引用传入各操作，没有模块级单例。
pub struct ProximityEngine<I, D, N, B> {
    index: I,
    directory: D,
    dispatcher: N,
    broadcaster: B,
    config: Config,
    cooldowns: CooldownTracker,
    checks_run: AtomicU64,
    notifications_sent: AtomicU64,
}

impl<I, D, N, B> ProximityEngine<I, D, N, B>
where
    I: VendorIndex,
    D: ConsumerDirectory,
    N: NotificationDispatcher,
    B: RealtimeBroadcaster,
{
    /// 装配引擎
    pub fn new(index: I, directory: D, dispatcher: N, broadcaster: B, config: Config) -> Self {
        Self {
            index,
            directory,
            dispatcher,
            broadcaster,
            config,
            cooldowns: CooldownTracker::new(),
            checks_run: AtomicU64::new(0),
            notifications_sent: AtomicU64::new(0),
        }
    }

    /// 实体位置更新入口：写入索引并触发完整邻近检查
    ///
    /// 只要坐标合法，调用方视角下总是成功；
    /// 下游通知扇出的局部失败只记日志。
    pub async fn update_entity_position(
        &self,
        source: &PositionSource,
        longitude: f64,
        latitude: f64,
    ) -> EngineResult<ProximityCheckOutcome> {
        self.run_proximity_pass(source, longitude, latitude, Utc::now(), Local::now().time())
            .await
    }

    /// 以显式时间执行一次完整邻近检查
    async fn run_proximity_pass(
        &self,
        source: &PositionSource,
        longitude: f64,
        latitude: f64,
        now: DateTime<Utc>,
        local_time: NaiveTime,
    ) -> EngineResult<ProximityCheckOutcome> {
        if !geo::coordinates_valid(longitude, latitude) {
            tracing::warn!(
                "非法的地理坐标: entity={} 经度={} 纬度={}",
                source.id(),
                longitude,
                latitude
            );
            return Err(EngineError::InvalidCoordinates {
                longitude,
                latitude,
            });
        }

        // 索引写入先于邻近查询：同一实体内的先后保证
        self.index
            .upsert(source.id(), source.name(), longitude, latitude)
            .await?;
        self.checks_run.fetch_add(1, Ordering::Relaxed);

        // 候选查找失败只降级：位置更新本身不能因此失败
        let candidates = match self
            .directory
            .find_eligible_candidates(longitude, latitude, self.config.max_search_radius)
            .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::error!("查找候选消费者失败: entity={} err={}", source.id(), e);
                Vec::new()
            }
        };

        tracing::debug!(
            "邻近检查: entity={} 候选消费者 {} 人",
            source.id(),
            candidates.len()
        );

        let mut results = Vec::new();
        let mut notifications_sent = 0;

        for consumer in &candidates {
            // 单个候选的失败不能阻塞其余候选
            match self
                .process_candidate(source, consumer, longitude, latitude, now, local_time)
                .await
            {
                Ok(Some(outcome)) => {
                    if outcome.notified {
                        notifications_sent += 1;
                    }
                    results.push(outcome);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(
                        "处理候选消费者失败: entity={} consumer={} err={}",
                        source.id(),
                        consumer.consumer_id,
                        e
                    );
                }
            }
        }

        // 与个人通知无关：无条件向消费者群体广播位置更新，供地图展示
        let location_event = serde_json::json!({
            "vendorId": source.id(),
            "vendorName": source.name(),
            "coordinates": [longitude, latitude],
            "isActive": true,
            "isSimulation": source.is_simulation(),
            "timestamp": now,
        });
        if let Err(e) = self
            .broadcaster
            .publish_to_group(CONSUMER_CHANNEL, "vendor-location-updated", location_event)
            .await
        {
            tracing::warn!("位置广播失败: entity={} err={}", source.id(), e);
        }

        tracing::info!(
            "邻近检查完成: entity={} 候选 {} 人，发出通知 {} 条",
            source.id(),
            candidates.len(),
            notifications_sent
        );

        Ok(ProximityCheckOutcome {
            entity_id: source.id().to_string(),
            consumers_found: candidates.len(),
            notifications_sent,
            results,
        })
    }

    /// 处理单个候选消费者；不符合资格或处于冷却期时返回None
    async fn process_candidate(
        &self,
        source: &PositionSource,
        consumer: &ConsumerProximityPrefs,
        vendor_longitude: f64,
        vendor_latitude: f64,
        now: DateTime<Utc>,
        local_time: NaiveTime,
    ) -> EngineResult<Option<CandidateOutcome>> {
        let distance = geo::distance_meters(
            consumer.latitude,
            consumer.longitude,
            vendor_latitude,
            vendor_longitude,
        );

        // 目录返回的坐标不在引擎的校验边界内，距离非法时按单候选失败处理
        if !distance.is_finite() {
            return Err(EngineError::InvalidCoordinates {
                longitude: consumer.longitude,
                latitude: consumer.latitude,
            });
        }

        if !is_eligible(consumer, distance, local_time) {
            tracing::debug!(
                "消费者不符合通知条件: consumer={} 距离={:.0}m",
                consumer.consumer_id,
                distance
            );
            return Ok(None);
        }

        if !self.cooldowns.try_consume(
            source.id(),
            &consumer.consumer_id,
            now.timestamp_millis(),
            self.config.cooldown_window_ms(),
        ) {
            tracing::debug!(
                "通知处于冷却期: entity={} consumer={}",
                source.id(),
                consumer.consumer_id
            );
            return Ok(None);
        }

        // 冷却保护的是下发尝试本身，之后的失败不回滚冷却
        let rounded = distance.round() as i64;
        let estimated_arrival = geo::estimate_arrival(distance);
        let title = if source.is_simulation() {
            "Vendor Nearby (Simulation)"
        } else {
            "Vendor Nearby"
        };
        let body = format!(
            "{} is {}m away • Estimated arrival: {}",
            source.name(),
            rounded,
            estimated_arrival
        );
        let payload = serde_json::json!({
            "type": "vendor_nearby",
            "vendorId": source.id(),
            "vendorName": source.name(),
            "distance": rounded.to_string(),
            "estimatedArrival": estimated_arrival,
            "vendorLocation": { "longitude": vendor_longitude, "latitude": vendor_latitude },
            "consumerLocation": { "longitude": consumer.longitude, "latitude": consumer.latitude },
            "isSimulation": source.is_simulation(),
            "timestamp": now,
        });

        let (notified, notification_id) = match self
            .dispatcher
            .send(&consumer.consumer_id, title, &body, payload)
            .await
        {
            Ok(outcome) => (outcome.success, outcome.notification_id),
            Err(e) => {
                tracing::error!(
                    "通知下发失败: consumer={} err={}",
                    consumer.consumer_id,
                    e
                );
                (false, None)
            }
        };

        if notified {
            self.notifications_sent.fetch_add(1, Ordering::Relaxed);
            tracing::info!(
                "邻近通知已发出: entity={} consumer={} 距离={}m",
                source.id(),
                consumer.consumer_id,
                rounded
            );
        }

        // 定向实时事件与推送通知走不同通道，一并发出
        let realtime_event = serde_json::json!({
            "type": "vendor-nearby",
            "vendorId": source.id(),
            "vendorName": source.name(),
            "distance": rounded,
            "isSimulation": source.is_simulation(),
            "timestamp": now,
        });
        if let Err(e) = self
            .broadcaster
            .publish_to_user(&consumer.consumer_id, "vendor-nearby", realtime_event)
            .await
        {
            tracing::warn!(
                "实时通知广播失败: consumer={} err={}",
                consumer.consumer_id,
                e
            );
        }

        Ok(Some(CandidateOutcome {
            consumer_id: consumer.consumer_id.clone(),
            distance_meters: distance,
            notified,
            notification_id,
        }))
    }

    /// 供应商上线：登记位置并向消费者群体广播
    pub async fn vendor_online(
        &self,
        vendor_id: &str,
        vendor_name: &str,
        longitude: f64,
        latitude: f64,
    ) -> EngineResult<()> {
        if !geo::coordinates_valid(longitude, latitude) {
            return Err(EngineError::InvalidCoordinates {
                longitude,
                latitude,
            });
        }

        self.index
            .upsert(vendor_id, vendor_name, longitude, latitude)
            .await?;

        let event = serde_json::json!({
            "vendorId": vendor_id,
            "vendorName": vendor_name,
            "coordinates": [longitude, latitude],
            "status": "online",
            "timestamp": Utc::now(),
        });
        if let Err(e) = self
            .broadcaster
            .publish_to_group(CONSUMER_CHANNEL, "vendor-online", event)
            .await
        {
            tracing::warn!("上线广播失败: vendor={} err={}", vendor_id, e);
        }

        tracing::info!("供应商已上线: {}", vendor_id);
        Ok(())
    }

    /// 供应商下线：移出在线索引并向消费者群体广播
    pub async fn vendor_offline(&self, vendor_id: &str, vendor_name: &str) -> EngineResult<()> {
        self.index.remove(vendor_id).await?;

        let event = serde_json::json!({
            "vendorId": vendor_id,
            "vendorName": vendor_name,
            "status": "offline",
            "timestamp": Utc::now(),
        });
        if let Err(e) = self
            .broadcaster
            .publish_to_group(CONSUMER_CHANNEL, "vendor-offline", event)
            .await
        {
            tracing::warn!("下线广播失败: vendor={} err={}", vendor_id, e);
        }

        tracing::info!("供应商已下线: {}", vendor_id);
        Ok(())
    }

    /// 消费者侧查询：附近的在线供应商，按距离升序
    pub async fn get_nearby_vendors(
        &self,
        longitude: f64,
        latitude: f64,
        radius_meters: f64,
    ) -> EngineResult<Vec<RadiusHit>> {
        if !geo::coordinates_valid(longitude, latitude) {
            return Err(EngineError::InvalidCoordinates {
                longitude,
                latitude,
            });
        }

        // 将查询半径限制在引擎级上限内
        let radius = radius_meters.min(self.config.max_search_radius);
        self.index.radius_query(longitude, latitude, radius).await
    }

    /// 手动邻近检查（诊断用）：绕过资格判定与冷却
    pub async fn manual_proximity_check(
        &self,
        vendor_id: &str,
        consumer_longitude: f64,
        consumer_latitude: f64,
    ) -> EngineResult<ManualCheckResult> {
        if !geo::coordinates_valid(consumer_longitude, consumer_latitude) {
            return Err(EngineError::InvalidCoordinates {
                longitude: consumer_longitude,
                latitude: consumer_latitude,
            });
        }

        let position = self
            .index
            .lookup(vendor_id)
            .await?
            .ok_or_else(|| EngineError::EntityNotFound(vendor_id.to_string()))?;

        let distance = geo::distance_meters(
            consumer_latitude,
            consumer_longitude,
            position.latitude,
            position.longitude,
        );

        Ok(ManualCheckResult {
            vendor_id: vendor_id.to_string(),
            distance_meters: distance.round(),
            estimated_arrival: geo::estimate_arrival(distance),
            vendor_location: [position.longitude, position.latitude],
            consumer_location: [consumer_longitude, consumer_latitude],
        })
    }

    /// 清理过期的冷却记录，由周期任务调用
    pub fn sweep_cooldowns(&self) {
        self.cooldowns
            .sweep(Utc::now().timestamp_millis(), self.config.cooldown_window_ms());
        tracing::debug!("冷却记录清理完成，剩余 {} 条", self.cooldowns.active_count());
    }

    /// 引擎观测指标
    pub async fn get_proximity_stats(&self) -> EngineResult<ProximityStats> {
        let (active_vendors, index_available) = self.index.index_stats().await;
        let consumers = self.directory.preference_stats().await?;

        Ok(ProximityStats {
            active_cooldowns: self.cooldowns.active_count(),
            cooldown_window_secs: self.config.notification_cooldown_secs,
            checks_run: self.checks_run.load(Ordering::Relaxed),
            notifications_sent: self.notifications_sent.load(Ordering::Relaxed),
            active_vendors,
            index_available,
            consumers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Position;
    use crate::notify::dispatcher::DispatchOutcome;
    use crate::notify::eligibility::QuietHours;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicBool;

    /// 内存位置索引：与数据库降级路径共用线性扫描
    #[derive(Default)]
    struct MemoryIndex {
        entries: Mutex<HashMap<String, (f64, f64)>>,
    }

    impl VendorIndex for MemoryIndex {
        async fn upsert(
            &self,
            entity_id: &str,
            _entity_name: &str,
            longitude: f64,
            latitude: f64,
        ) -> EngineResult<()> {
            self.entries
                .lock()
                .unwrap()
                .insert(entity_id.to_string(), (longitude, latitude));
            Ok(())
        }

        async fn remove(&self, entity_id: &str) -> EngineResult<()> {
            self.entries.lock().unwrap().remove(entity_id);
            Ok(())
        }

        async fn radius_query(
            &self,
            longitude: f64,
            latitude: f64,
            radius_meters: f64,
        ) -> EngineResult<Vec<RadiusHit>> {
            let entries: Vec<(String, f64, f64)> = self
                .entries
                .lock()
                .unwrap()
                .iter()
                .map(|(id, (lon, lat))| (id.clone(), *lon, *lat))
                .collect();
            Ok(geo::filter_within_radius(
                entries,
                longitude,
                latitude,
                radius_meters,
            ))
        }

        async fn lookup(&self, entity_id: &str) -> EngineResult<Option<Position>> {
            Ok(self
                .entries
                .lock()
                .unwrap()
                .get(entity_id)
                .map(|(lon, lat)| Position::new(*lon, *lat)))
        }

        async fn index_stats(&self) -> (i64, bool) {
            (self.entries.lock().unwrap().len() as i64, true)
        }
    }

    /// 固定候选列表的消费者目录
    struct StaticDirectory {
        consumers: Vec<ConsumerProximityPrefs>,
    }

    impl ConsumerDirectory for StaticDirectory {
        async fn find_eligible_candidates(
            &self,
            _longitude: f64,
            _latitude: f64,
            _max_radius_meters: f64,
        ) -> EngineResult<Vec<ConsumerProximityPrefs>> {
            Ok(self.consumers.clone())
        }

        async fn preference_stats(&self) -> EngineResult<ConsumerPrefStats> {
            Ok(ConsumerPrefStats {
                total_consumers: self.consumers.len() as i64,
                ..Default::default()
            })
        }
    }

    /// 记录每次下发的假下发器，可切换为失败模式
    #[derive(Default)]
    struct RecordingDispatcher {
        sent: Mutex<Vec<(String, String, String)>>,
        fail: AtomicBool,
    }

    impl NotificationDispatcher for RecordingDispatcher {
        async fn send(
            &self,
            recipient_id: &str,
            title: &str,
            body: &str,
            _payload: serde_json::Value,
        ) -> EngineResult<DispatchOutcome> {
            if self.fail.load(Ordering::Relaxed) {
                return Err(EngineError::DispatchFailure("gateway down".to_string()));
            }
            self.sent.lock().unwrap().push((
                recipient_id.to_string(),
                title.to_string(),
                body.to_string(),
            ));
            Ok(DispatchOutcome {
                success: true,
                notification_id: Some(format!("n{}", self.sent.lock().unwrap().len())),
            })
        }
    }

    /// 记录事件的假广播器
    #[derive(Default)]
    struct RecordingBroadcaster {
        user_events: Mutex<Vec<(String, String)>>,
        group_events: Mutex<Vec<(String, String)>>,
    }

    impl RealtimeBroadcaster for RecordingBroadcaster {
        async fn publish_to_user(
            &self,
            user_id: &str,
            event: &str,
            _data: serde_json::Value,
        ) -> EngineResult<()> {
            self.user_events
                .lock()
                .unwrap()
                .push((user_id.to_string(), event.to_string()));
            Ok(())
        }

        async fn publish_to_group(
            &self,
            group_key: &str,
            event: &str,
            _data: serde_json::Value,
        ) -> EngineResult<()> {
            self.group_events
                .lock()
                .unwrap()
                .push((group_key.to_string(), event.to_string()));
            Ok(())
        }
    }

    fn test_config() -> Config {
        Config {
            database_url: String::new(),
            redis_url: String::new(),
            max_search_radius: 5000.0,
            notification_cooldown_secs: 300,
            vendor_location_ttl_secs: 300,
            simulation_update_interval_ms: 5000,
            simulation_max_age_hours: 24,
            cooldown_sweep_interval_secs: 600,
            push_gateway_url: None,
            push_gateway_key: None,
        }
    }

    /// 供应商 (77.0, 28.0) 东侧约 300 米处的消费者
    fn nearby_consumer() -> ConsumerProximityPrefs {
        let (lon, lat) = geo::offset_position(77.0, 28.0, 0.0, 300.0);
        ConsumerProximityPrefs {
            consumer_id: "consumer-1".to_string(),
            longitude: lon,
            latitude: lat,
            enabled: true,
            radius_meters: 1000,
            quiet_hours: QuietHours {
                enabled: false,
                start: "22:00".to_string(),
                end: "08:00".to_string(),
            },
            do_not_disturb: false,
        }
    }

    fn engine_with(
        consumers: Vec<ConsumerProximityPrefs>,
    ) -> ProximityEngine<MemoryIndex, StaticDirectory, RecordingDispatcher, RecordingBroadcaster>
    {
        ProximityEngine::new(
            MemoryIndex::default(),
            StaticDirectory { consumers },
            RecordingDispatcher::default(),
            RecordingBroadcaster::default(),
            test_config(),
        )
    }

    fn noon() -> NaiveTime {
        NaiveTime::from_hms_opt(12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn full_pipeline_notifies_once_then_cooldown_then_again() {
        let engine = engine_with(vec![nearby_consumer()]);
        let vendor = PositionSource::RealVendor {
            id: "vendor-1".to_string(),
            name: "Fresh Cart".to_string(),
        };
        let t0 = Utc::now();
        let window_ms = engine.config.cooldown_window_ms();

        // 第一次更新：恰好一条通知、一条定向事件、一条冷却记录
        let outcome = engine
            .run_proximity_pass(&vendor, 77.0, 28.0, t0, noon())
            .await
            .unwrap();
        assert_eq!(outcome.consumers_found, 1);
        assert_eq!(outcome.notifications_sent, 1);
        assert_eq!(engine.dispatcher.sent.lock().unwrap().len(), 1);
        assert_eq!(engine.cooldowns.active_count(), 1);
        assert_eq!(
            engine.broadcaster.user_events.lock().unwrap().as_slice(),
            &[("consumer-1".to_string(), "vendor-nearby".to_string())]
        );

        // 一秒后的第二次更新：冷却期内，零新增通知
        let outcome = engine
            .run_proximity_pass(&vendor, 77.0, 28.0, t0 + chrono::Duration::seconds(1), noon())
            .await
            .unwrap();
        assert_eq!(outcome.notifications_sent, 0);
        assert_eq!(engine.dispatcher.sent.lock().unwrap().len(), 1);

        // 冷却窗口过后：恰好再发一条
        let outcome = engine
            .run_proximity_pass(
                &vendor,
                77.0,
                28.0,
                t0 + chrono::Duration::milliseconds(window_ms + 1000),
                noon(),
            )
            .await
            .unwrap();
        assert_eq!(outcome.notifications_sent, 1);
        assert_eq!(engine.dispatcher.sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn location_broadcast_happens_regardless_of_eligibility() {
        let mut dnd = nearby_consumer();
        dnd.do_not_disturb = true;
        let engine = engine_with(vec![dnd]);
        let vendor = PositionSource::SimulatedVendor {
            id: "sim_1".to_string(),
            name: "Sim Cart".to_string(),
        };

        let outcome = engine
            .run_proximity_pass(&vendor, 77.0, 28.0, Utc::now(), noon())
            .await
            .unwrap();

        // 没有人符合通知条件
        assert_eq!(outcome.notifications_sent, 0);
        assert!(engine.dispatcher.sent.lock().unwrap().is_empty());
        // 但地图更新广播照常发出
        let group_events = engine.broadcaster.group_events.lock().unwrap();
        assert_eq!(
            group_events.as_slice(),
            &[(CONSUMER_CHANNEL.to_string(), "vendor-location-updated".to_string())]
        );
    }

    #[tokio::test]
    async fn dispatch_failure_is_absorbed_and_keeps_cooldown() {
        let engine = engine_with(vec![nearby_consumer()]);
        engine.dispatcher.fail.store(true, Ordering::Relaxed);
        let vendor = PositionSource::RealVendor {
            id: "vendor-1".to_string(),
            name: "Fresh Cart".to_string(),
        };
        let t0 = Utc::now();

        // 下发失败：调用整体仍然成功，冷却已被消费
        let outcome = engine
            .run_proximity_pass(&vendor, 77.0, 28.0, t0, noon())
            .await
            .unwrap();
        assert_eq!(outcome.notifications_sent, 0);
        assert_eq!(engine.cooldowns.active_count(), 1);

        // 网关恢复后冷却期内依旧不重发：冷却保护的是尝试本身
        engine.dispatcher.fail.store(false, Ordering::Relaxed);
        let outcome = engine
            .run_proximity_pass(&vendor, 77.0, 28.0, t0 + chrono::Duration::seconds(2), noon())
            .await
            .unwrap();
        assert_eq!(outcome.notifications_sent, 0);
        assert!(engine.dispatcher.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn out_of_radius_consumer_is_not_notified() {
        let mut far = nearby_consumer();
        let (lon, lat) = geo::offset_position(77.0, 28.0, 0.0, 1500.0);
        far.longitude = lon;
        far.latitude = lat;
        let engine = engine_with(vec![far]);
        let vendor = PositionSource::RealVendor {
            id: "vendor-1".to_string(),
            name: "Fresh Cart".to_string(),
        };

        let outcome = engine
            .run_proximity_pass(&vendor, 77.0, 28.0, Utc::now(), noon())
            .await
            .unwrap();
        assert_eq!(outcome.notifications_sent, 0);
    }

    #[tokio::test]
    async fn quiet_hours_block_notification_at_night() {
        let mut consumer = nearby_consumer();
        consumer.quiet_hours.enabled = true;
        let engine = engine_with(vec![consumer]);
        let vendor = PositionSource::RealVendor {
            id: "vendor-1".to_string(),
            name: "Fresh Cart".to_string(),
        };

        let night = NaiveTime::from_hms_opt(23, 0, 0).unwrap();
        let outcome = engine
            .run_proximity_pass(&vendor, 77.0, 28.0, Utc::now(), night)
            .await
            .unwrap();
        assert_eq!(outcome.notifications_sent, 0);
    }

    #[tokio::test]
    async fn invalid_coordinates_rejected_at_the_boundary() {
        let engine = engine_with(vec![nearby_consumer()]);
        let vendor = PositionSource::RealVendor {
            id: "vendor-1".to_string(),
            name: "Fresh Cart".to_string(),
        };

        let result = engine.update_entity_position(&vendor, 181.0, 28.0).await;
        assert!(matches!(
            result,
            Err(EngineError::InvalidCoordinates { .. })
        ));
        // 管线没有启动
        assert!(engine.dispatcher.sent.lock().unwrap().is_empty());
        assert!(engine.broadcaster.group_events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn one_bad_candidate_does_not_block_others() {
        // 第一个候选坐标损坏导致距离非法而失败，第二个照常收到通知
        let mut broken = nearby_consumer();
        broken.consumer_id = "consumer-broken".to_string();
        broken.longitude = f64::NAN;
        let mut ok = nearby_consumer();
        ok.consumer_id = "consumer-ok".to_string();
        let engine = engine_with(vec![broken, ok]);
        let vendor = PositionSource::RealVendor {
            id: "vendor-1".to_string(),
            name: "Fresh Cart".to_string(),
        };

        let outcome = engine
            .run_proximity_pass(&vendor, 77.0, 28.0, Utc::now(), noon())
            .await
            .unwrap();
        assert_eq!(outcome.notifications_sent, 1);
        let sent = engine.dispatcher.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "consumer-ok");
    }

    #[tokio::test]
    async fn manual_check_bypasses_cooldown_and_eligibility() {
        let engine = engine_with(vec![]);
        let vendor = PositionSource::RealVendor {
            id: "vendor-1".to_string(),
            name: "Fresh Cart".to_string(),
        };
        engine
            .update_entity_position(&vendor, 77.0, 28.0)
            .await
            .unwrap();

        let (lon, lat) = geo::offset_position(77.0, 28.0, 0.0, 300.0);
        let check = engine
            .manual_proximity_check("vendor-1", lon, lat)
            .await
            .unwrap();
        assert!((check.distance_meters - 300.0).abs() < 5.0);
        assert_eq!(check.estimated_arrival, "4 minutes");
        // 诊断查询不留下冷却记录
        assert_eq!(engine.cooldowns.active_count(), 0);

        let missing = engine.manual_proximity_check("vendor-404", lon, lat).await;
        assert!(matches!(missing, Err(EngineError::EntityNotFound(_))));
    }

    #[tokio::test]
    async fn vendor_offline_removes_from_index_and_broadcasts() {
        let engine = engine_with(vec![]);
        engine
            .vendor_online("vendor-1", "Fresh Cart", 77.0, 28.0)
            .await
            .unwrap();
        assert!(engine.index.lookup("vendor-1").await.unwrap().is_some());

        engine.vendor_offline("vendor-1", "Fresh Cart").await.unwrap();
        assert!(engine.index.lookup("vendor-1").await.unwrap().is_none());

        let group_events = engine.broadcaster.group_events.lock().unwrap();
        let events: Vec<&str> = group_events.iter().map(|(_, e)| e.as_str()).collect();
        assert_eq!(events, vec!["vendor-online", "vendor-offline"]);
    }

    #[tokio::test]
    async fn nearby_vendor_query_is_distance_ordered_and_capped() {
        let engine = engine_with(vec![]);
        for (id, meters) in [("v-far", 4000.0), ("v-near", 500.0), ("v-out", 9000.0)] {
            let (lon, lat) = geo::offset_position(77.0, 28.0, 90.0, meters);
            engine
                .vendor_online(id, id, lon, lat)
                .await
                .unwrap();
        }

        // 请求半径超过引擎上限时按上限截断
        let hits = engine.get_nearby_vendors(77.0, 28.0, 50_000.0).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["v-near", "v-far"]);
    }

    #[tokio::test]
    async fn stats_reflect_engine_activity() {
        let engine = engine_with(vec![nearby_consumer()]);
        let vendor = PositionSource::RealVendor {
            id: "vendor-1".to_string(),
            name: "Fresh Cart".to_string(),
        };
        engine
            .run_proximity_pass(&vendor, 77.0, 28.0, Utc::now(), noon())
            .await
            .unwrap();

        let stats = engine.get_proximity_stats().await.unwrap();
        assert_eq!(stats.checks_run, 1);
        assert_eq!(stats.notifications_sent, 1);
        assert_eq!(stats.active_cooldowns, 1);
        assert_eq!(stats.active_vendors, 1);
        assert!(stats.index_available);
        assert_eq!(stats.cooldown_window_secs, 300);
    }
}
