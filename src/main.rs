use std::sync::Arc;

use proximity_engine::{AppState, build_engine, config::Config};
use sqlx::Executor;
use sqlx::postgres::PgPoolOptions;
use tokio::time::{Instant, interval_at};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().expect("Failed to load configuration");

    // 设置数据库连接池
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("SET application_name = 'proximity_engine';")
                    .await?;
                Ok(())
            })
        })
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to Postgres");

    // 设置 Redis 客户端
    let redis_client =
        redis::Client::open(config.redis_url.clone()).expect("Failed to create Redis client");

    // 设置应用状态并装配引擎
    let state = AppState {
        pool,
        config: config.clone(),
        redis: Arc::new(redis_client),
    };
    let (engine, scheduler) = build_engine(&state);

    // 周期清理过期的冷却记录
    let sweep_handle = {
        let engine = engine.clone();
        let every = config.cooldown_sweep_interval();
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            loop {
                ticker.tick().await;
                engine.sweep_cooldowns();
            }
        })
    };

    // 周期清理过期的模拟
    let purge_handle = scheduler.spawn_purge_task();

    tracing::info!(
        "Proximity engine running (search radius {}m, cooldown {}s)",
        config.max_search_radius,
        config.notification_cooldown_secs
    );

    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for shutdown signal");

    // 有序停机：先停模拟定时器，再停后台任务
    scheduler.stop_all();
    sweep_handle.abort();
    purge_handle.abort();
    tracing::info!("Proximity engine stopped");
}
