// 错误定义
// 邻近通知引擎的统一错误类型

use thiserror::Error;

/// 引擎错误
///
/// 纯计算类错误（非法输入）同步返回给调用方；
/// 基础设施类错误由调用链降级吸收，不向上暴露为整体失败。
#[derive(Debug, Error)]
pub enum EngineError {
    /// 非法坐标，在边界处拒绝，不进入后续管线
    #[error("非法的地理坐标: 经度={longitude}, 纬度={latitude}")]
    InvalidCoordinates { longitude: f64, latitude: f64 },

    /// 未知的供应商或模拟ID
    #[error("实体不存在: {0}")]
    EntityNotFound(String),

    /// 主地理索引（Redis）不可用
    #[error("地理索引不可用: {0}")]
    IndexUnavailable(#[from] redis::RedisError),

    /// 数据库错误
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    /// 通知下发失败
    #[error("通知下发失败: {0}")]
    DispatchFailure(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
