/// 数据库模块
/// Postgres作为位置、偏好、通知与模拟的系统记录

// 数据库实体
pub mod models;

// 数据库操作
pub mod operations;
