//! 错误定义模块

use thiserror::Error;

/// 系统统一错误类型
#[derive(Error, Debug)]
pub enum NlstError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("无效的过滤条件: {0}")]
    InvalidFilter(String),

    #[error("上游查询失败: {0}")]
    UpstreamQuery(String),

    #[error("结果缺少预期列: {column}")]
    SchemaMismatch { column: String },

    #[error("网络错误: {0}")]
    Network(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("系统内部错误: {0}")]
    Internal(String),
}

/// 系统统一结果类型
pub type Result<T> = std::result::Result<T, NlstError>;
