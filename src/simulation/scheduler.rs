// 模拟调度器
// 每个活跃模拟一个独立定时任务，驱动移动状态机与邻近检查管线

use crate::database::models::SimulationEntity;
use crate::database::operations::consumer::ConsumerDirectory;
use crate::database::operations::simulation::SimulationOperations;
use crate::error::{EngineError, EngineResult};
use crate::geo;
use crate::index::VendorIndex;
use crate::notify::broadcaster::RealtimeBroadcaster;
use crate::notify::dispatcher::NotificationDispatcher;
use crate::proximity::{PositionSource, ProximityEngine};
use crate::simulation::movement::{MovementPattern, SimulationState, Waypoint};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use sqlx::types::Json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use uuid::Uuid;

/// 过期模拟清理任务的运行间隔
const PURGE_INTERVAL: Duration = Duration::from_secs(3600);

/// 创建模拟的请求参数
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSimulationRequest {
    pub name: String,
    pub longitude: f64,
    pub latitude: f64,
    #[serde(default = "default_pattern")]
    pub pattern: MovementPattern,
    /// 移动速度（公里/小时）
    #[serde(default = "default_speed")]
    pub speed_kmh: f64,
    /// 线性模式的航点路线
    #[serde(default)]
    pub route: Vec<Waypoint>,
    /// 环绕模式的轨道半径（米）
    #[serde(default = "default_orbit_radius")]
    pub orbit_radius_m: f64,
}

fn default_pattern() -> MovementPattern {
    MovementPattern::Static
}

fn default_speed() -> f64 {
    5.0
}

fn default_orbit_radius() -> f64 {
    500.0
}

/// 模拟详情：实体加运行状态
#[derive(Debug, Clone, Serialize)]
pub struct SimulationDetail {
    #[serde(flatten)]
    pub entity: SimulationEntity,
    pub is_running: bool,
}

/// 模拟列表与计数
#[derive(Debug, Clone, Serialize)]
pub struct SimulationList {
    pub simulations: Vec<SimulationDetail>,
    pub total_count: usize,
    pub active_count: usize,
    pub running_count: usize,
}

/// 模拟观测指标
#[derive(Debug, Clone, Serialize)]
pub struct SimulationStats {
    pub total_simulations: i64,
    pub active_simulations: i64,
    pub running_simulations: usize,
    pub total_distance_m: f64,
    pub average_distance_m: f64,
    pub pattern_counts: HashMap<String, i64>,
    pub update_interval_ms: u64,
}

/// 定时任务登记表
///
/// 每个活跃模拟最多一个定时器；重复登记会先停掉旧任务。
#[derive(Debug, Default)]
struct TaskRegistry {
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl TaskRegistry {
    /// 登记新任务，已有同名任务时先中止旧任务
    fn register(&self, simulation_id: &str, handle: JoinHandle<()>) {
        let mut tasks = self.tasks.lock().unwrap();
        if let Some(old) = tasks.insert(simulation_id.to_string(), handle) {
            old.abort();
        }
    }

    /// 中止并移除任务；返回是否确有任务在运行
    fn remove(&self, simulation_id: &str) -> bool {
        match self.tasks.lock().unwrap().remove(simulation_id) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// 中止全部任务
    fn abort_all(&self) -> usize {
        let mut tasks = self.tasks.lock().unwrap();
        let count = tasks.len();
        for (_, handle) in tasks.drain() {
            handle.abort();
        }
        count
    }

    fn is_running(&self, simulation_id: &str) -> bool {
        self.tasks
            .lock()
            .unwrap()
            .get(simulation_id)
            .is_some_and(|handle| !handle.is_finished())
    }

    fn running_count(&self) -> usize {
        self.tasks
            .lock()
            .unwrap()
            .values()
            .filter(|handle| !handle.is_finished())
            .count()
    }
}

/// 模拟调度器
///
/// 运行中的模拟由调度器独占驱动：位置与累计距离只在tick里写入。
pub struct SimulationScheduler<I, D, N, B> {
    engine: Arc<ProximityEngine<I, D, N, B>>,
    simulations: SimulationOperations,
    update_interval: Duration,
    max_age_hours: i64,
    registry: TaskRegistry,
}

impl<I, D, N, B> SimulationScheduler<I, D, N, B>
where
    I: VendorIndex + 'static,
    D: ConsumerDirectory + 'static,
    N: NotificationDispatcher + 'static,
    B: RealtimeBroadcaster + 'static,
{
    /// 装配调度器
    pub fn new(
        engine: Arc<ProximityEngine<I, D, N, B>>,
        db: Arc<PgPool>,
        update_interval: Duration,
        max_age_hours: i64,
    ) -> Self {
        Self {
            engine,
            simulations: SimulationOperations::new(db),
            update_interval,
            max_age_hours,
            registry: TaskRegistry::default(),
        }
    }

    /// 创建新的模拟供应商
    pub async fn create_simulation(
        &self,
        request: CreateSimulationRequest,
    ) -> EngineResult<SimulationEntity> {
        if !geo::coordinates_valid(request.longitude, request.latitude) {
            return Err(EngineError::InvalidCoordinates {
                longitude: request.longitude,
                latitude: request.latitude,
            });
        }
        for waypoint in &request.route {
            if !geo::coordinates_valid(waypoint.longitude, waypoint.latitude) {
                return Err(EngineError::InvalidCoordinates {
                    longitude: waypoint.longitude,
                    latitude: waypoint.latitude,
                });
            }
        }

        let now = Utc::now();
        let (center_longitude, center_latitude) = if request.pattern == MovementPattern::Circular {
            // 环绕圆心在创建时固定为初始位置
            (Some(request.longitude), Some(request.latitude))
        } else {
            (None, None)
        };

        let entity = SimulationEntity {
            simulation_id: format!("sim_{}", Uuid::new_v4()),
            name: request.name,
            movement_pattern: request.pattern.as_str().to_string(),
            longitude: request.longitude,
            latitude: request.latitude,
            speed_kmh: request.speed_kmh.clamp(0.1, 50.0),
            route: Json(request.route),
            current_route_index: 0,
            wait_remaining_secs: 0.0,
            direction_deg: rand::random::<f64>() * 360.0,
            orbit_radius_m: request.orbit_radius_m.clamp(10.0, 5000.0),
            center_longitude,
            center_latitude,
            is_active: true,
            total_distance_m: 0.0,
            last_location_update: now,
            created_at: now,
        };

        self.simulations.create(&entity).await?;
        tracing::info!(
            "模拟已创建: {} pattern={} 位置=({}, {})",
            entity.simulation_id,
            entity.movement_pattern,
            entity.longitude,
            entity.latitude
        );

        Ok(entity)
    }

    /// 查询单个模拟
    pub async fn get_simulation(&self, simulation_id: &str) -> EngineResult<SimulationDetail> {
        let entity = self
            .simulations
            .find(simulation_id)
            .await?
            .ok_or_else(|| EngineError::EntityNotFound(simulation_id.to_string()))?;

        Ok(SimulationDetail {
            is_running: self.registry.is_running(&entity.simulation_id),
            entity,
        })
    }

    /// 列出全部模拟
    pub async fn list_simulations(&self) -> EngineResult<SimulationList> {
        let entities = self.simulations.list().await?;
        let simulations: Vec<SimulationDetail> = entities
            .into_iter()
            .map(|entity| SimulationDetail {
                is_running: self.registry.is_running(&entity.simulation_id),
                entity,
            })
            .collect();

        Ok(SimulationList {
            total_count: simulations.len(),
            active_count: simulations.iter().filter(|s| s.entity.is_active).count(),
            running_count: simulations.iter().filter(|s| s.is_running).count(),
            simulations,
        })
    }

    /// 删除模拟，运行中的先停掉定时器
    pub async fn delete_simulation(&self, simulation_id: &str) -> EngineResult<()> {
        self.stop(simulation_id);

        if !self.simulations.delete(simulation_id).await? {
            return Err(EngineError::EntityNotFound(simulation_id.to_string()));
        }

        tracing::info!("模拟已删除: {}", simulation_id);
        Ok(())
    }

    /// 启动模拟的移动定时器
    ///
    /// 对已在运行的模拟重复调用会先停掉旧定时器，保证单定时器不重复tick。
    pub async fn start(self: &Arc<Self>, simulation_id: &str) -> EngineResult<()> {
        let entity = self
            .simulations
            .find(simulation_id)
            .await?
            .filter(|entity| entity.is_active)
            .ok_or_else(|| EngineError::EntityNotFound(simulation_id.to_string()))?;

        let scheduler = Arc::clone(self);
        let id = entity.simulation_id.clone();
        let period = self.update_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                match scheduler.tick(&id).await {
                    Ok(true) => {}
                    Ok(false) => {
                        // 模拟已消失或停用，定时器自行退出
                        tracing::info!("模拟不再活跃，停止定时器: {}", id);
                        break;
                    }
                    Err(e) => {
                        // 单次tick失败不终止循环，也不影响其他模拟
                        tracing::error!("模拟tick失败: {} err={}", id, e);
                    }
                }
            }
        });

        self.registry.register(simulation_id, handle);
        tracing::info!("模拟已启动: {}", simulation_id);
        Ok(())
    }

    /// 推进一个模拟时间步；返回false表示模拟已消失，定时器应退出
    async fn tick(&self, simulation_id: &str) -> EngineResult<bool> {
        let Some(entity) = self.simulations.find(simulation_id).await? else {
            return Ok(false);
        };
        if !entity.is_active {
            return Ok(false);
        }

        // 各任务独立计算自上次tick以来的流逝时间，抖动或漏拍下仍然正确
        let now = Utc::now();
        let delta_secs =
            ((now - entity.last_location_update).num_milliseconds() as f64 / 1000.0).max(0.0);

        let mut state = SimulationState::from_entity(&entity);
        let (longitude, latitude) = state.next_position(delta_secs);

        // 先持久化位置，再走索引写入→邻近查询的管线
        self.simulations.update_movement(&state, now).await?;

        let source = PositionSource::SimulatedVendor {
            id: entity.simulation_id.clone(),
            name: entity.name.clone(),
        };
        if let Err(e) = self
            .engine
            .update_entity_position(&source, longitude, latitude)
            .await
        {
            tracing::error!("模拟 {} 的邻近检查失败: {}", simulation_id, e);
        }

        tracing::debug!(
            "模拟位置已更新: {} 位置=({:.6}, {:.6}) 模式={}",
            simulation_id,
            longitude,
            latitude,
            entity.movement_pattern
        );

        Ok(true)
    }

    /// 手动覆盖模拟位置，驱动与定时tick相同的管线
    pub async fn update_simulation_position(
        &self,
        simulation_id: &str,
        longitude: f64,
        latitude: f64,
    ) -> EngineResult<()> {
        if !geo::coordinates_valid(longitude, latitude) {
            return Err(EngineError::InvalidCoordinates {
                longitude,
                latitude,
            });
        }

        let entity = self
            .simulations
            .find(simulation_id)
            .await?
            .filter(|entity| entity.is_active)
            .ok_or_else(|| EngineError::EntityNotFound(simulation_id.to_string()))?;

        let mut state = SimulationState::from_entity(&entity);
        state.move_to(longitude, latitude);
        self.simulations.update_movement(&state, Utc::now()).await?;

        let source = PositionSource::SimulatedVendor {
            id: entity.simulation_id,
            name: entity.name,
        };
        if let Err(e) = self
            .engine
            .update_entity_position(&source, longitude, latitude)
            .await
        {
            tracing::error!("模拟 {} 的邻近检查失败: {}", simulation_id, e);
        }

        tracing::info!(
            "模拟位置已手动更新: {} 位置=({}, {})",
            simulation_id,
            longitude,
            latitude
        );
        Ok(())
    }

    /// 停止模拟的定时器；返回后不会再有新的位置更新发出
    pub fn stop(&self, simulation_id: &str) -> bool {
        let stopped = self.registry.remove(simulation_id);
        if stopped {
            tracing::info!("模拟已停止: {}", simulation_id);
        }
        stopped
    }

    /// 停止全部运行中的模拟
    pub fn stop_all(&self) {
        let count = self.registry.abort_all();
        if count > 0 {
            tracing::info!("已停止全部 {} 个模拟", count);
        }
    }

    /// 指定模拟是否在运行
    pub fn is_running(&self, simulation_id: &str) -> bool {
        self.registry.is_running(simulation_id)
    }

    /// 模拟观测指标
    pub async fn get_simulation_stats(&self) -> EngineResult<SimulationStats> {
        let (total, active, total_distance, average_distance) =
            self.simulations.aggregate_stats().await?;
        let pattern_counts = self.simulations.pattern_counts().await?.into_iter().collect();

        Ok(SimulationStats {
            total_simulations: total,
            active_simulations: active,
            running_simulations: self.registry.running_count(),
            total_distance_m: total_distance.round(),
            average_distance_m: average_distance.round(),
            pattern_counts,
            update_interval_ms: self.update_interval.as_millis() as u64,
        })
    }

    /// 清理超龄且非活跃的模拟
    pub async fn purge_old(&self) -> EngineResult<u64> {
        let deleted = self.simulations.delete_older_than(self.max_age_hours).await?;
        if deleted > 0 {
            tracing::info!("清理了 {} 个过期模拟", deleted);
        }
        Ok(deleted)
    }

    /// 启动周期清理任务，返回句柄供停机时中止
    pub fn spawn_purge_task(self: &Arc<Self>) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + PURGE_INTERVAL, PURGE_INTERVAL);
            loop {
                ticker.tick().await;
                if let Err(e) = scheduler.purge_old().await {
                    tracing::error!("清理过期模拟失败: {}", e);
                }
            }
        })
    }
}
