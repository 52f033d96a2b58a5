/// 数据库操作模块
/// 按实体拆分的Postgres操作

// 供应商位置操作
pub mod location;

// 消费者目录操作
pub mod consumer;

// 通知记录操作
pub mod notification;

// 模拟供应商操作
pub mod simulation;
