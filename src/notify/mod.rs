/// 通知模块
/// 资格判定、冷却去重、通知下发与实时广播

// 资格策略
pub mod eligibility;

// 冷却跟踪
pub mod cooldown;

// 通知下发
pub mod dispatcher;

// 实时广播
pub mod broadcaster;

pub use broadcaster::{RealtimeBroadcaster, RedisBroadcaster};
pub use cooldown::CooldownTracker;
pub use dispatcher::{DispatchOutcome, NotificationDispatcher, PushDispatcher};
pub use eligibility::{ConsumerProximityPrefs, QuietHours, is_eligible};
