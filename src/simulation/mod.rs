/// 模拟供应商模块
/// 合成移动轨迹驱动与真实供应商相同的位置更新→邻近检查管线

// 移动模式状态机
pub mod movement;

// 模拟调度器
pub mod scheduler;

pub use movement::{MovementPattern, SimulationState, Waypoint};
pub use scheduler::SimulationScheduler;
