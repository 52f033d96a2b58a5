// 地理计算工具
// 半正矢距离、坐标校验、等距柱状投影偏移与步行到达时间估算

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 地球半径（米），球面近似
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// 每度纬度对应的米数（近似）
const METERS_PER_DEG_LAT: f64 = 111_320.0;

/// 估算到达时间所用的供应商步行速度（公里/小时）
const WALKING_SPEED_KMH: f64 = 5.0;

/// 地理位置，经纬度总是成对写入，不存在只更新一半的状态
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub longitude: f64,
    pub latitude: f64,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
            updated_at: Utc::now(),
        }
    }
}

/// 半径查询命中项，按距离升序返回
#[derive(Debug, Clone, Serialize)]
pub struct RadiusHit {
    pub entity_id: String,
    pub longitude: f64,
    pub latitude: f64,
    pub distance_meters: f64,
}

/// 校验坐标范围，纬度[-90,90]，经度[-180,180]
pub fn coordinates_valid(longitude: f64, latitude: f64) -> bool {
    (-180.0..=180.0).contains(&longitude) && (-90.0..=90.0).contains(&latitude)
}

/// 两点间的球面距离（米），半正矢公式
pub fn distance_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_phi = (lat2 - lat1).to_radians();
    let delta_lambda = (lon2 - lon1).to_radians();

    let a = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// 从一点沿给定方位角（度）偏移若干米，等距柱状投影近似
///
/// 经度方向按 cos(纬度) 缩放；结果始终收拢到合法坐标范围内。
pub fn offset_position(longitude: f64, latitude: f64, bearing_deg: f64, meters: f64) -> (f64, f64) {
    let angle = bearing_deg.to_radians();
    let delta_lat = meters / METERS_PER_DEG_LAT;
    let delta_lon = meters / (METERS_PER_DEG_LAT * latitude.to_radians().cos());

    let new_lat = (latitude + delta_lat * angle.sin()).clamp(-90.0, 90.0);
    let new_lon = (longitude + delta_lon * angle.cos()).clamp(-180.0, 180.0);

    (new_lon, new_lat)
}

/// 线性扫描：在 (id, 经度, 纬度) 列表中筛出半径内的条目，按距离升序排序
///
/// 数据库降级路径与主索引共用这一结果形状。
pub fn filter_within_radius(
    entries: impl IntoIterator<Item = (String, f64, f64)>,
    longitude: f64,
    latitude: f64,
    radius_meters: f64,
) -> Vec<RadiusHit> {
    let mut hits: Vec<RadiusHit> = entries
        .into_iter()
        .filter_map(|(entity_id, lon, lat)| {
            let distance = distance_meters(latitude, longitude, lat, lon);
            (distance <= radius_meters).then_some(RadiusHit {
                entity_id,
                longitude: lon,
                latitude: lat,
                distance_meters: distance,
            })
        })
        .collect();

    hits.sort_by(|a, b| a.distance_meters.total_cmp(&b.distance_meters));
    hits
}

/// 根据距离估算供应商步行到达时间的展示文本
pub fn estimate_arrival(distance_meters: f64) -> String {
    let speed_ms = WALKING_SPEED_KMH * 1000.0 / 3600.0;
    let minutes = (distance_meters / speed_ms / 60.0).ceil() as i64;

    if minutes < 1 {
        "Less than 1 minute".to_string()
    } else if minutes == 1 {
        "1 minute".to_string()
    } else if minutes < 60 {
        format!("{} minutes", minutes)
    } else {
        let hours = minutes / 60;
        let rem = minutes % 60;
        if rem > 0 {
            format!("{}h {}m", hours, rem)
        } else {
            format!("{}h", hours)
        }
    }
}
