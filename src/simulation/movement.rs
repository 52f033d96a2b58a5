// 移动模式状态机
// 根据流逝时间推进模拟供应商的位置

use crate::database::models::SimulationEntity;
use crate::geo;
use serde::{Deserialize, Serialize};

/// 移动模式，封闭枚举，新增模式必须在所有匹配处补全
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementPattern {
    /// 原地不动
    Static,
    /// 沿航点路线直线移动
    Linear,
    /// 绕固定圆心环绕
    Circular,
    /// 每步随机方向游走
    Random,
}

impl MovementPattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementPattern::Static => "static",
            MovementPattern::Linear => "linear",
            MovementPattern::Circular => "circular",
            MovementPattern::Random => "random",
        }
    }

    /// 从存储的文本解析，未知值回退为静止
    pub fn parse(value: &str) -> Self {
        match value {
            "linear" => MovementPattern::Linear,
            "circular" => MovementPattern::Circular,
            "random" => MovementPattern::Random,
            _ => MovementPattern::Static,
        }
    }
}

/// 路线航点，可选的到站等待时间
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Waypoint {
    pub longitude: f64,
    pub latitude: f64,
    /// 到达该航点后停留的秒数
    #[serde(default)]
    pub wait_secs: f64,
}

/// 移动配置与逐步推进的内部状态
#[derive(Debug, Clone)]
pub struct MovementConfig {
    /// 速度（公里/小时）
    pub speed_kmh: f64,
    /// 线性模式的航点路线
    pub route: Vec<Waypoint>,
    /// 当前目标航点下标
    pub current_route_index: usize,
    /// 当前航点的剩余等待秒数
    pub wait_remaining_secs: f64,
    /// 当前方位角（度）
    pub direction_deg: f64,
    /// 环绕模式的轨道半径（米）
    pub orbit_radius_m: f64,
    /// 环绕圆心，创建环绕模拟时固定为初始位置
    pub center: Option<(f64, f64)>,
}

/// 模拟供应商状态
///
/// 运行期间由调度器独占持有：位置与累计距离只有调度器写入。
#[derive(Debug, Clone)]
pub struct SimulationState {
    pub simulation_id: String,
    pub name: String,
    pub pattern: MovementPattern,
    pub longitude: f64,
    pub latitude: f64,
    pub config: MovementConfig,
    pub is_active: bool,
    pub total_distance_traveled: f64,
}

impl SimulationState {
    /// 从数据库实体还原状态
    pub fn from_entity(entity: &SimulationEntity) -> Self {
        let center = match (entity.center_longitude, entity.center_latitude) {
            (Some(lon), Some(lat)) => Some((lon, lat)),
            _ => None,
        };

        SimulationState {
            simulation_id: entity.simulation_id.clone(),
            name: entity.name.clone(),
            pattern: MovementPattern::parse(&entity.movement_pattern),
            longitude: entity.longitude,
            latitude: entity.latitude,
            config: MovementConfig {
                speed_kmh: entity.speed_kmh,
                route: entity.route.0.clone(),
                current_route_index: entity.current_route_index.max(0) as usize,
                wait_remaining_secs: entity.wait_remaining_secs,
                direction_deg: entity.direction_deg,
                orbit_radius_m: entity.orbit_radius_m,
                center,
            },
            is_active: entity.is_active,
            total_distance_traveled: entity.total_distance_m,
        }
    }

    /// 按移动模式推进一个时间步，返回新位置并累计移动距离
    pub fn next_position(&mut self, delta_secs: f64) -> (f64, f64) {
        let (old_lon, old_lat) = (self.longitude, self.latitude);

        let (lon, lat) = match self.pattern {
            MovementPattern::Static => (old_lon, old_lat),
            MovementPattern::Linear => self.step_linear(delta_secs),
            MovementPattern::Circular => self.step_circular(delta_secs),
            MovementPattern::Random => self.step_random(delta_secs),
        };

        self.move_to(lon, lat);
        (lon, lat)
    }

    /// 直接落到指定位置并累计移动距离（手动覆盖与状态机共用）
    pub fn move_to(&mut self, longitude: f64, latitude: f64) {
        self.total_distance_traveled +=
            geo::distance_meters(self.latitude, self.longitude, latitude, longitude);
        self.longitude = longitude;
        self.latitude = latitude;
    }

    fn speed_ms(&self) -> f64 {
        self.config.speed_kmh * 1000.0 / 3600.0
    }

    fn step_linear(&mut self, delta_secs: f64) -> (f64, f64) {
        if self.config.route.is_empty() {
            return (self.longitude, self.latitude);
        }

        // 航点等待：先消耗剩余等待时间，余量再用于移动
        let mut delta = delta_secs;
        if self.config.wait_remaining_secs > 0.0 {
            if delta <= self.config.wait_remaining_secs {
                self.config.wait_remaining_secs -= delta;
                return (self.longitude, self.latitude);
            }
            delta -= self.config.wait_remaining_secs;
            self.config.wait_remaining_secs = 0.0;
        }

        let index = self.config.current_route_index % self.config.route.len();
        let target = self.config.route[index].clone();

        let step = self.speed_ms() * delta;
        let to_target =
            geo::distance_meters(self.latitude, self.longitude, target.latitude, target.longitude);

        if to_target <= step {
            // 吸附到航点，推进下标（走完一圈回到起点）
            self.config.current_route_index = (index + 1) % self.config.route.len();
            self.config.wait_remaining_secs = target.wait_secs;
            return (target.longitude, target.latitude);
        }

        let ratio = step / to_target;
        (
            self.longitude + (target.longitude - self.longitude) * ratio,
            self.latitude + (target.latitude - self.latitude) * ratio,
        )
    }

    fn step_circular(&mut self, delta_secs: f64) -> (f64, f64) {
        // 圆心缺省固定为当前位置（正常创建路径下总是已写入）
        let (center_lon, center_lat) = match self.config.center {
            Some(center) => center,
            None => {
                let center = (self.longitude, self.latitude);
                self.config.center = Some(center);
                center
            }
        };

        let radius = self.config.orbit_radius_m.max(1.0);
        // 角速度（弧度/秒）= 线速度 / 半径
        let angular_speed = self.speed_ms() / radius;
        let new_direction =
            (self.config.direction_deg + (angular_speed * delta_secs).to_degrees()) % 360.0;
        self.config.direction_deg = new_direction;

        geo::offset_position(center_lon, center_lat, new_direction, radius)
    }

    fn step_random(&mut self, delta_secs: f64) -> (f64, f64) {
        let step = self.speed_ms() * delta_secs;
        let bearing = rand::random::<f64>() * 360.0;
        self.config.direction_deg = bearing;

        geo::offset_position(self.longitude, self.latitude, bearing, step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(pattern: MovementPattern, speed_kmh: f64) -> SimulationState {
        SimulationState {
            simulation_id: "sim_test".to_string(),
            name: "Test Cart".to_string(),
            pattern,
            longitude: 77.0,
            latitude: 28.0,
            config: MovementConfig {
                speed_kmh,
                route: Vec::new(),
                current_route_index: 0,
                wait_remaining_secs: 0.0,
                direction_deg: 0.0,
                orbit_radius_m: 100.0,
                center: None,
            },
            is_active: true,
            total_distance_traveled: 0.0,
        }
    }

    #[test]
    fn static_pattern_never_moves() {
        let mut sim = state(MovementPattern::Static, 10.0);
        for _ in 0..10 {
            let (lon, lat) = sim.next_position(5.0);
            assert_eq!((lon, lat), (77.0, 28.0));
        }
        assert_eq!(sim.total_distance_traveled, 0.0);
    }

    #[test]
    fn linear_reaches_waypoint_and_accumulates_distance() {
        // 正东 10 米处的单个航点，1 m/s（3.6 km/h），1 秒一步
        let mut sim = state(MovementPattern::Linear, 3.6);
        let (target_lon, target_lat) = geo::offset_position(77.0, 28.0, 0.0, 10.0);
        sim.config.route = vec![Waypoint {
            longitude: target_lon,
            latitude: target_lat,
            wait_secs: 0.0,
        }];

        for _ in 0..10 {
            sim.next_position(1.0);
        }

        let remaining = geo::distance_meters(sim.latitude, sim.longitude, target_lat, target_lon);
        assert!(remaining < 0.1, "expected to sit on the waypoint, {remaining}m away");
        assert!(
            (sim.total_distance_traveled - 10.0).abs() < 0.1,
            "expected ~10m traveled, got {}",
            sim.total_distance_traveled
        );
    }

    #[test]
    fn linear_wraps_route_after_last_waypoint() {
        let mut sim = state(MovementPattern::Linear, 3.6);
        let a = geo::offset_position(77.0, 28.0, 0.0, 2.0);
        let b = geo::offset_position(77.0, 28.0, 0.0, 4.0);
        sim.config.route = vec![
            Waypoint { longitude: a.0, latitude: a.1, wait_secs: 0.0 },
            Waypoint { longitude: b.0, latitude: b.1, wait_secs: 0.0 },
        ];

        // 2 米/步：第一步吸附航点0，第二步吸附航点1，下标回绕到0
        sim.next_position(2.0);
        assert_eq!(sim.config.current_route_index, 1);
        sim.next_position(2.0);
        assert_eq!(sim.config.current_route_index, 0);
    }

    #[test]
    fn linear_honors_waypoint_wait() {
        let mut sim = state(MovementPattern::Linear, 3.6);
        let stop = geo::offset_position(77.0, 28.0, 0.0, 1.0);
        let next = geo::offset_position(77.0, 28.0, 0.0, 11.0);
        sim.config.route = vec![
            Waypoint { longitude: stop.0, latitude: stop.1, wait_secs: 5.0 },
            Waypoint { longitude: next.0, latitude: next.1, wait_secs: 0.0 },
        ];

        // 第一步到站并开始等待
        sim.next_position(1.0);
        let arrived = (sim.longitude, sim.latitude);
        assert_eq!(sim.config.current_route_index, 1);
        assert!(sim.config.wait_remaining_secs > 0.0);

        // 等待期内位置保持不变
        sim.next_position(3.0);
        assert_eq!((sim.longitude, sim.latitude), arrived);
        assert!((sim.config.wait_remaining_secs - 2.0).abs() < 1e-9);

        // 等待耗尽后，剩余时间用于向下一个航点移动
        sim.next_position(3.0);
        assert_eq!(sim.config.wait_remaining_secs, 0.0);
        assert_ne!((sim.longitude, sim.latitude), arrived);
    }

    #[test]
    fn circular_returns_to_start_after_full_period() {
        // 100 米半径，1 m/s：一个周期 2πr 秒
        let mut sim = state(MovementPattern::Circular, 3.6);
        sim.config.center = Some((77.0, 28.0));
        sim.config.orbit_radius_m = 100.0;
        sim.config.direction_deg = 0.0;
        // 起点放在方位角 0 的轨道点上
        let (start_lon, start_lat) = geo::offset_position(77.0, 28.0, 0.0, 100.0);
        sim.longitude = start_lon;
        sim.latitude = start_lat;

        let period = 2.0 * std::f64::consts::PI * 100.0;
        let steps = 360;
        for _ in 0..steps {
            sim.next_position(period / steps as f64);
        }

        let drift = geo::distance_meters(sim.latitude, sim.longitude, start_lat, start_lon);
        assert!(drift < 1.0, "expected orbit closure, drifted {drift}m");
    }

    #[test]
    fn circular_pins_center_on_first_step() {
        let mut sim = state(MovementPattern::Circular, 3.6);
        assert!(sim.config.center.is_none());
        sim.next_position(1.0);
        assert_eq!(sim.config.center, Some((77.0, 28.0)));
    }

    #[test]
    fn random_moves_one_step_within_bounds() {
        let mut sim = state(MovementPattern::Random, 3.6);
        for _ in 0..50 {
            let (old_lon, old_lat) = (sim.longitude, sim.latitude);
            let (lon, lat) = sim.next_position(2.0);
            assert!(geo::coordinates_valid(lon, lat));
            let moved = geo::distance_meters(old_lat, old_lon, lat, lon);
            // 每步 2 米，等距柱状近似允许少量偏差
            assert!(moved < 2.5, "single step moved {moved}m");
        }
        assert!(sim.total_distance_traveled > 0.0);
    }

    #[test]
    fn pattern_round_trips_through_text() {
        for pattern in [
            MovementPattern::Static,
            MovementPattern::Linear,
            MovementPattern::Circular,
            MovementPattern::Random,
        ] {
            assert_eq!(MovementPattern::parse(pattern.as_str()), pattern);
        }
        assert_eq!(MovementPattern::parse("teleport"), MovementPattern::Static);
    }
}
