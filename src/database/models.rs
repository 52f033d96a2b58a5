// 数据库实体
// 定义供应商位置、消费者偏好、通知与模拟相关的实体

use crate::simulation::movement::Waypoint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;

/// 供应商在线位置实体（最后已知位置）
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct VendorLocationEntity {
    /// 供应商ID
    pub vendor_id: String,
    /// 供应商名称
    pub vendor_name: String,
    /// 经度
    pub longitude: f64,
    /// 纬度
    pub latitude: f64,
    /// 是否在线
    pub is_online: bool,
    /// 配送半径（米）
    pub delivery_radius_m: i32,
    /// 是否接单
    pub accepting_orders: bool,
    /// 最近一次位置更新时间
    pub updated_at: DateTime<Utc>,
}

/// 消费者通知偏好实体
#[derive(Debug, Clone, FromRow)]
pub struct ConsumerEntity {
    /// 消费者ID
    pub consumer_id: String,
    /// 经度
    pub longitude: f64,
    /// 纬度
    pub latitude: f64,
    /// 是否开启邻近通知
    pub proximity_enabled: bool,
    /// 个性化通知半径（米）
    pub notify_radius_m: i32,
    /// 是否启用免打扰时段
    pub quiet_hours_enabled: bool,
    /// 免打扰时段起点 "HH:MM"
    pub quiet_start: String,
    /// 免打扰时段终点 "HH:MM"
    pub quiet_end: String,
    /// 勿扰开关
    pub do_not_disturb: bool,
}

/// 模拟供应商实体
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SimulationEntity {
    /// 模拟ID
    pub simulation_id: String,
    /// 展示名称
    pub name: String,
    /// 移动模式：static | linear | circular | random
    pub movement_pattern: String,
    /// 当前经度
    pub longitude: f64,
    /// 当前纬度
    pub latitude: f64,
    /// 移动速度（公里/小时）
    pub speed_kmh: f64,
    /// 线性模式的航点路线
    pub route: Json<Vec<Waypoint>>,
    /// 当前目标航点下标
    pub current_route_index: i32,
    /// 当前航点的剩余等待秒数
    pub wait_remaining_secs: f64,
    /// 当前方位角（度）
    pub direction_deg: f64,
    /// 环绕模式的轨道半径（米）
    pub orbit_radius_m: f64,
    /// 环绕中心经度
    pub center_longitude: Option<f64>,
    /// 环绕中心纬度
    pub center_latitude: Option<f64>,
    /// 是否活跃
    pub is_active: bool,
    /// 累计移动距离（米）
    pub total_distance_m: f64,
    /// 最近一次位置更新时间
    pub last_location_update: DateTime<Utc>,
    /// 创建时间
    pub created_at: DateTime<Utc>,
}
