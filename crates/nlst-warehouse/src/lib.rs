//! # NLST Warehouse
//!
//! 数据仓库访问层：参数化查询构造、连接池管理、结果行到
//! 核心模型的映射。本crate是系统中唯一执行网络I/O的部分。

pub mod connection;
pub mod fetch;
pub mod query;

pub use connection::{WarehouseConfig, WarehousePool, VolumeUnit};
pub use fetch::{SqlWarehouse, Warehouse};
pub use query::{BindValue, BuiltQuery, QueryBuilder};
