//! # NLST Core
//!
//! NLST影像体积仪表盘的核心模块，提供数据模型、错误定义、
//! 过滤引擎和派生列处理。本crate不做任何I/O。

pub mod enrich;
pub mod error;
pub mod filter;
pub mod models;
pub mod utils;

pub use error::{NlstError, Result};
pub use models::*;
