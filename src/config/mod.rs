use std::env;
use std::time::Duration;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub max_search_radius: f64,
    pub notification_cooldown_secs: u64,
    pub vendor_location_ttl_secs: u64,
    pub simulation_update_interval_ms: u64,
    pub simulation_max_age_hours: i64,
    pub cooldown_sweep_interval_secs: u64,
    pub push_gateway_url: Option<String>,
    pub push_gateway_key: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        dotenv::dotenv().ok();

        Ok(Config {
            database_url: env::var("DATABASE_URL")?,
            redis_url: env::var("REDIS_URL")?,
            max_search_radius: env_or("MAX_SEARCH_RADIUS", 5000.0),
            notification_cooldown_secs: env_or("NOTIFICATION_COOLDOWN_SECS", 300),
            vendor_location_ttl_secs: env_or("CACHE_TTL_VENDOR_LOCATION", 300),
            simulation_update_interval_ms: env_or("SIMULATION_UPDATE_INTERVAL_MS", 5000),
            simulation_max_age_hours: env_or("SIMULATION_MAX_AGE_HOURS", 24),
            cooldown_sweep_interval_secs: env_or("COOLDOWN_SWEEP_INTERVAL_SECS", 600),
            push_gateway_url: env::var("PUSH_GATEWAY_URL").ok(),
            push_gateway_key: env::var("PUSH_GATEWAY_KEY").ok(),
        })
    }

    pub fn cooldown_window_ms(&self) -> i64 {
        self.notification_cooldown_secs as i64 * 1000
    }

    pub fn cooldown_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cooldown_sweep_interval_secs)
    }

    pub fn simulation_update_interval(&self) -> Duration {
        Duration::from_millis(self.simulation_update_interval_ms)
    }
}

/// 读取环境变量并解析，缺失或非法时回退到默认值
fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
