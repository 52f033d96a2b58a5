use redis::Client as RedisClient;
use sqlx::PgPool;
use std::sync::Arc;

use config::Config;

pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod geo;
pub mod index;
pub mod notify;
pub mod proximity;
pub mod simulation;

use database::operations::consumer::PgConsumerDirectory;
use index::GeoIndex;
use notify::broadcaster::RedisBroadcaster;
use notify::dispatcher::PushDispatcher;
use proximity::ProximityEngine;
use simulation::scheduler::SimulationScheduler;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub redis: Arc<RedisClient>,
}

/// 生产装配下的邻近引擎与调度器
pub type AppEngine =
    ProximityEngine<GeoIndex, PgConsumerDirectory, PushDispatcher, RedisBroadcaster>;
pub type AppScheduler =
    SimulationScheduler<GeoIndex, PgConsumerDirectory, PushDispatcher, RedisBroadcaster>;

/// 按配置装配引擎与模拟调度器
///
/// 引擎状态有显式的生命周期：这里创建，停机时由调用方
/// 停掉调度器与后台任务。
pub fn build_engine(state: &AppState) -> (Arc<AppEngine>, Arc<AppScheduler>) {
    let db = Arc::new(state.pool.clone());

    let engine = Arc::new(ProximityEngine::new(
        GeoIndex::new(
            state.redis.clone(),
            db.clone(),
            state.config.vendor_location_ttl_secs,
        ),
        PgConsumerDirectory::new(db.clone()),
        PushDispatcher::new(
            db.clone(),
            state.config.push_gateway_url.clone(),
            state.config.push_gateway_key.clone(),
        ),
        RedisBroadcaster::new(state.redis.clone()),
        state.config.clone(),
    ));

    let scheduler = Arc::new(SimulationScheduler::new(
        engine.clone(),
        db,
        state.config.simulation_update_interval(),
        state.config.simulation_max_age_hours,
    ));

    (engine, scheduler)
}
